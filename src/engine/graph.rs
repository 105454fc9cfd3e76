use std::time::{SystemTime, UNIX_EPOCH};

use dasp::{signal, Signal};

use crate::error::CaptureError;

use super::capture::{AudioSource, MediaStream};
use super::dsp::{
  BiquadFilter, Compressor, Convolver, DelayLine, FilterKind, Gain, NoiseGate, StereoPanner, WaveShaper,
};
use super::params::{
  StageParams, BASS_FREQUENCY, DEESSER_Q, DOUBLER_DELAY_LEFT, DOUBLER_DELAY_RIGHT, DOUBLER_PAN, MID_FREQUENCY,
  MID_Q, TREBLE_FREQUENCY,
};

pub const IMPULSE_SECONDS: f32 = 2.0;
pub const IMPULSE_DECAY: f32 = 3.0;

const SHELF_Q: f32 = 1.0;
const MAX_DOUBLER_DELAY: f32 = 0.05;

/// Decaying stereo noise burst used as the reverb's impulse response.
/// Each channel draws from its own uniform source.
pub fn impulse_response(sr: f32, seconds: f32, decay: f32, seed: u64) -> Vec<Vec<f32>> {
  let len = (sr * seconds).round().max(1.0) as usize;
  (0..2u64)
    .map(|ch| {
      let mut noise = signal::noise(seed ^ (ch + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
      (0..len)
        .map(|i| {
          let env = (1.0 - i as f32 / len as f32).powf(decay);
          noise.next() as f32 * env
        })
        .collect()
    })
    .collect()
}

fn session_seed() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0x5EED)
}

/// The fixed effect chain of one session, one named slot per stage.
///
/// Wiring, in signal order:
/// source -> noise gate -> bass -> mid -> treble -> de-esser -> compressor -> saturator;
/// saturator -> (delay 15 ms, pan left) + (delay 25 ms, pan right) -> doubler wet,
/// saturator -> doubler dry; both -> reverb input;
/// reverb input -> reverb dry, reverb input -> convolver -> reverb wet; both -> master.
pub struct SignalGraph {
  pub sr: f32,
  pub noise_gate: NoiseGate,
  pub bass: BiquadFilter,
  pub mid: BiquadFilter,
  pub treble: BiquadFilter,
  pub deesser: BiquadFilter,
  pub compressor: Compressor,
  pub saturator: WaveShaper,
  pub doubler_delay_left: DelayLine,
  pub doubler_pan_left: StereoPanner,
  pub doubler_delay_right: DelayLine,
  pub doubler_pan_right: StereoPanner,
  pub doubler_wet: Gain,
  pub doubler_dry: Gain,
  pub convolver: Convolver,
  pub reverb_wet: Gain,
  pub reverb_dry: Gain,
  pub master: Gain,
}

impl SignalGraph {
  /// Build the chain for a freshly captured stream. Video tracks are stopped
  /// here; the stream must carry a live audio track.
  pub fn build(stream: &mut MediaStream, sample_rate: f32) -> Result<(Self, AudioSource), CaptureError> {
    stream.stop_video_tracks();
    let source = stream.take_audio_source().ok_or(CaptureError::NoAudioTrack)?;
    let ir = impulse_response(sample_rate, IMPULSE_SECONDS, IMPULSE_DECAY, session_seed());
    log::debug!("graph: {} Hz, impulse response {} frames", sample_rate, ir[0].len());
    Ok((Self::with_impulse_response(sample_rate, &ir), source))
  }

  pub fn with_impulse_response(sr: f32, ir: &[Vec<f32>]) -> Self {
    let mut doubler_delay_left = DelayLine::new(MAX_DOUBLER_DELAY, sr);
    doubler_delay_left.set_delay_time(DOUBLER_DELAY_LEFT);
    let mut doubler_delay_right = DelayLine::new(MAX_DOUBLER_DELAY, sr);
    doubler_delay_right.set_delay_time(DOUBLER_DELAY_RIGHT);

    Self {
      sr,
      noise_gate: NoiseGate::new(sr),
      bass: BiquadFilter::new(FilterKind::LowShelf, sr, BASS_FREQUENCY, SHELF_Q),
      mid: BiquadFilter::new(FilterKind::Peaking, sr, MID_FREQUENCY, MID_Q),
      treble: BiquadFilter::new(FilterKind::HighShelf, sr, TREBLE_FREQUENCY, SHELF_Q),
      deesser: BiquadFilter::new(FilterKind::Peaking, sr, 8000.0, DEESSER_Q),
      compressor: Compressor::new(sr),
      saturator: WaveShaper::new(sr),
      doubler_delay_left,
      doubler_pan_left: StereoPanner::new(-DOUBLER_PAN),
      doubler_delay_right,
      doubler_pan_right: StereoPanner::new(DOUBLER_PAN),
      doubler_wet: Gain::new(0.0),
      doubler_dry: Gain::new(1.0),
      convolver: Convolver::new(ir, sr),
      reverb_wet: Gain::new(0.0),
      reverb_dry: Gain::new(1.0),
      master: Gain::new(1.0),
    }
  }

  /// Retune every stage from one snapshot.
  pub fn apply(&mut self, p: &StageParams) {
    let g = &p.noise_gate;
    self.noise_gate.set_threshold(g.threshold);
    self.noise_gate.set_knee(g.knee);
    self.noise_gate.set_ratio(g.ratio);
    self.noise_gate.set_attack(g.attack);
    self.noise_gate.set_release(g.release);

    self.bass.set_gain(p.bass_gain);
    self.mid.set_gain(p.mid_gain);
    self.treble.set_gain(p.treble_gain);
    self.deesser.set_frequency(p.deesser_frequency);
    self.deesser.set_gain(p.deesser_gain);

    let c = &p.compressor;
    self.compressor.set_threshold(c.threshold);
    self.compressor.set_knee(c.knee);
    self.compressor.set_ratio(c.ratio);
    self.compressor.set_attack(c.attack);
    self.compressor.set_release(c.release);

    self.saturator.set_curve(p.saturation_curve.clone());
    self.saturator.set_oversample(p.oversample);

    self.doubler_wet.set(p.doubler.wet);
    self.doubler_dry.set(p.doubler.dry);
    self.reverb_wet.set(p.reverb.wet);
    self.reverb_dry.set(p.reverb.dry);
  }

  /// One stereo frame through the whole chain; returns the master output.
  #[inline]
  pub fn render(&mut self, l: f32, r: f32) -> (f32, f32) {
    let (l, r) = self.noise_gate.process(l, r);
    let (l, r) = self.bass.process(l, r);
    let (l, r) = self.mid.process(l, r);
    let (l, r) = self.treble.process(l, r);
    let (l, r) = self.deesser.process(l, r);
    let (l, r) = self.compressor.process(l, r);
    let (l, r) = self.saturator.process(l, r);

    // doubler
    let (al, ar) = self.doubler_delay_left.process(l, r);
    let (al, ar) = self.doubler_pan_left.process(al, ar);
    let (bl, br) = self.doubler_delay_right.process(l, r);
    let (bl, br) = self.doubler_pan_right.process(bl, br);
    let (wl, wr) = self.doubler_wet.process(al + bl, ar + br);
    let (dl, dr) = self.doubler_dry.process(l, r);
    let (l, r) = (wl + dl, wr + dr);

    // reverb
    let (cl, cr) = self.convolver.process(l, r);
    let (cl, cr) = self.reverb_wet.process(cl, cr);
    let (dl, dr) = self.reverb_dry.process(l, r);
    self.master.process(cl + dl, cr + dr)
  }

  /// Compressor gain reduction in dB (<= 0), for metering.
  pub fn reduction(&self) -> f32 { self.compressor.reduction() }
}
