use std::sync::Arc;

use super::biquad::{BiquadFilter, FilterKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Oversample {
  None,
  X2,
  X4,
}

impl Oversample {
  pub fn factor(self) -> usize {
    match self { Oversample::None => 1, Oversample::X2 => 2, Oversample::X4 => 4 }
  }
}

/// Map `x` through a transfer curve spanning [-1, 1], interpolating linearly
/// between points and holding the end values outside the span.
#[inline]
pub fn shape(curve: &[f32], x: f32) -> f32 {
  let n = curve.len();
  if n == 0 { return x; }
  if n == 1 { return curve[0]; }
  let v = (n - 1) as f32 * 0.5 * (x + 1.0);
  if v <= 0.0 { return curve[0]; }
  if v >= (n - 1) as f32 { return curve[n - 1]; }
  let k = v.floor() as usize;
  let f = v - k as f32;
  curve[k] + (curve[k + 1] - curve[k]) * f
}

/// Nonlinear transfer stage. With no curve installed it is a passthrough.
pub struct WaveShaper {
  sr: f32,
  curve: Option<Arc<[f32]>>,
  oversample: Oversample,
  prev: [f32; 2],
  // two cascaded low-passes at the oversampled rate
  aa: [BiquadFilter; 2],
}

impl WaveShaper {
  pub fn new(sr: f32) -> Self {
    Self {
      sr,
      curve: None,
      oversample: Oversample::None,
      prev: [0.0; 2],
      aa: Self::anti_alias(sr, 1),
    }
  }

  fn anti_alias(sr: f32, factor: usize) -> [BiquadFilter; 2] {
    let rate = sr * factor as f32;
    let cutoff = 0.45 * sr;
    [
      BiquadFilter::new(FilterKind::LowPass, rate, cutoff, 0.541),
      BiquadFilter::new(FilterKind::LowPass, rate, cutoff, 1.307),
    ]
  }

  pub fn curve(&self) -> Option<&Arc<[f32]>> { self.curve.as_ref() }
  pub fn oversample(&self) -> Oversample { self.oversample }

  pub fn set_curve(&mut self, curve: Option<Arc<[f32]>>) {
    if curve.is_none() { self.prev = [0.0; 2]; }
    self.curve = curve;
  }

  pub fn set_oversample(&mut self, os: Oversample) {
    if os != self.oversample {
      self.oversample = os;
      self.aa = Self::anti_alias(self.sr, os.factor());
      self.prev = [0.0; 2];
    }
  }

  #[inline]
  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let Some(curve) = self.curve.as_ref() else { return (l, r) };
    let factor = self.oversample.factor();
    if factor == 1 {
      return (shape(curve, l), shape(curve, r));
    }
    let input = [l, r];
    let mut out = [0.0f32; 2];
    for ch in 0..2 {
      let (p, x) = (self.prev[ch], input[ch]);
      let mut y = 0.0;
      for k in 1..=factor {
        let xi = p + (x - p) * (k as f32 / factor as f32);
        y = shape(curve, xi);
        y = self.aa[0].process_channel(ch, y);
        y = self.aa[1].process_channel(ch, y);
      }
      out[ch] = y;
      self.prev[ch] = x;
    }
    (out[0], out[1])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn linear_curve(n: usize) -> Arc<[f32]> {
    (0..n).map(|i| i as f32 * 2.0 / (n - 1) as f32 - 1.0).collect::<Vec<_>>().into()
  }

  #[test]
  fn test_no_curve_passes_through() {
    let mut w = WaveShaper::new(48_000.0);
    w.set_oversample(Oversample::X4);
    assert_eq!(w.process(0.3, -0.9), (0.3, -0.9));
  }

  #[test]
  fn test_shape_interpolates_and_clamps() {
    let c = [-1.0, 0.0, 0.5];
    assert_eq!(shape(&c, -1.0), -1.0);
    assert_eq!(shape(&c, 0.0), 0.0);
    assert!((shape(&c, 0.5) - 0.25).abs() < 1e-6);
    assert_eq!(shape(&c, 3.0), 0.5);
    assert_eq!(shape(&c, -3.0), -1.0);
  }

  #[test]
  fn test_identity_curve_with_oversampling_settles_on_dc() {
    let mut w = WaveShaper::new(48_000.0);
    w.set_curve(Some(linear_curve(1025)));
    w.set_oversample(Oversample::X4);
    let mut y = (0.0, 0.0);
    for _ in 0..2048 { y = w.process(0.5, -0.25); }
    assert!((y.0 - 0.5).abs() < 1e-3, "{:?}", y);
    assert!((y.1 + 0.25).abs() < 1e-3, "{:?}", y);
  }
}
