use std::f64::consts::PI;
use std::sync::Arc;

use crate::settings::AudioSettings;

use super::dsp::Oversample;

// Fixed stage constants, never user-controlled.
pub const NOISE_GATE_OPEN_THRESHOLD: f32 = -100.0;
pub const NOISE_GATE_KNEE: f32 = 0.0;
pub const NOISE_GATE_RATIO: f32 = 20.0;
pub const NOISE_GATE_ATTACK: f32 = 0.0;
pub const NOISE_GATE_RELEASE: f32 = 0.2;

pub const BASS_FREQUENCY: f32 = 250.0;
pub const MID_FREQUENCY: f32 = 1000.0;
pub const MID_Q: f32 = 1.0;
pub const TREBLE_FREQUENCY: f32 = 4000.0;
pub const DEESSER_Q: f32 = 2.5;

pub const COMPRESSOR_KNEE: f32 = 5.0;
pub const COMPRESSOR_ATTACK: f32 = 0.01;
pub const COMPRESSOR_RELEASE: f32 = 0.25;

pub const DOUBLER_DELAY_LEFT: f32 = 0.015;
pub const DOUBLER_DELAY_RIGHT: f32 = 0.025;
pub const DOUBLER_PAN: f32 = 0.8;

pub const CURVE_SAMPLES: usize = 44_100;
pub const SATURATION_OVERSAMPLE: Oversample = Oversample::X4;

/// Which parts of the settings record actually reach the stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectTier {
  pub effects_active: bool,
  pub premium_active: bool,
}

impl EffectTier {
  pub fn new(bypassed: bool, is_paid: bool) -> Self {
    let effects_active = !bypassed;
    Self { effects_active, premium_active: effects_active && is_paid }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DynamicsParams {
  pub threshold: f32,
  pub knee: f32,
  pub ratio: f32,
  pub attack: f32,
  pub release: f32,
}

/// Dry/wet pair of a constant-sum crossfade.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crossfade {
  pub dry: f32,
  pub wet: f32,
}

impl Crossfade {
  pub fn from_wet(wet: f32) -> Self {
    let wet = wet.clamp(0.0, 1.0);
    Self { dry: 1.0 - wet, wet }
  }
}

/// Every tunable stage value for one update pass. Produced by [`StageParams::resolve`]
/// and applied to the live graph as a single snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct StageParams {
  pub noise_gate: DynamicsParams,
  pub bass_gain: f32,
  pub mid_gain: f32,
  pub treble_gain: f32,
  pub deesser_frequency: f32,
  pub deesser_gain: f32,
  pub compressor: DynamicsParams,
  pub saturation_curve: Option<Arc<[f32]>>,
  pub oversample: Oversample,
  pub doubler: Crossfade,
  pub reverb: Crossfade,
}

impl StageParams {
  /// Pure mapping from the stored record plus bypass and entitlement to stage values.
  pub fn resolve(settings: &AudioSettings, bypassed: bool, is_paid: bool) -> Self {
    let tier = EffectTier::new(bypassed, is_paid);
    let active = tier.effects_active;
    let premium = tier.premium_active;
    let pick = |on: bool, value: f32, neutral: f32| if on { value } else { neutral };

    Self {
      noise_gate: DynamicsParams {
        threshold: pick(active, settings.noise_gate_threshold, NOISE_GATE_OPEN_THRESHOLD),
        knee: NOISE_GATE_KNEE,
        ratio: NOISE_GATE_RATIO,
        attack: NOISE_GATE_ATTACK,
        release: NOISE_GATE_RELEASE,
      },
      bass_gain: pick(active, settings.bass_gain, 0.0),
      mid_gain: pick(active, settings.mid_gain, 0.0),
      treble_gain: pick(active, settings.treble_gain, 0.0),
      // center frequency is not gated
      deesser_frequency: settings.deesser_frequency,
      deesser_gain: pick(active, settings.deesser_cut, 0.0),
      compressor: DynamicsParams {
        threshold: pick(active, settings.compressor_threshold, 0.0),
        knee: COMPRESSOR_KNEE,
        ratio: pick(active, settings.compressor_ratio, 1.0),
        attack: COMPRESSOR_ATTACK,
        release: COMPRESSOR_RELEASE,
      },
      saturation_curve: if premium { saturation_curve(settings.saturation) } else { None },
      oversample: SATURATION_OVERSAMPLE,
      doubler: Crossfade::from_wet(pick(premium, settings.stereo_width, 0.0)),
      reverb: Crossfade::from_wet(pick(premium, settings.reverb, 0.0)),
    }
  }
}

/// Soft-clipping transfer curve for saturation `amount` in [0, 1].
/// Returns `None` (linear passthrough) when the amount is zero.
pub fn saturation_curve(amount: f32) -> Option<Arc<[f32]>> {
  let k = amount as f64 * 100.0;
  if k == 0.0 || !k.is_finite() { return None; }
  let deg = PI / 180.0;
  let n = CURVE_SAMPLES;
  let curve: Vec<f32> = (0..n)
    .map(|i| {
      let x = i as f64 * 2.0 / (n - 1) as f64 - 1.0;
      ((3.0 + k) * x * 20.0 * deg / (PI + k * x.abs())) as f32
    })
    .collect();
  Some(curve.into())
}
