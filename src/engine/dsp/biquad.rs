use std::f64::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
  LowShelf,
  Peaking,
  HighShelf,
  LowPass,
}

/// Stereo second-order filter with the platform biquad's coefficient formulas
/// (RBJ cookbook, shelf slope fixed at 1). Coefficients recompute lazily.
pub struct BiquadFilter {
  kind: FilterKind,
  sr: f64,
  frequency: f32,
  q: f32,
  gain_db: f32,
  dirty: bool,
  b0: f64, b1: f64, b2: f64, a1: f64, a2: f64,
  // transposed direct form II state, per channel
  z1: [f64; 2],
  z2: [f64; 2],
}

impl BiquadFilter {
  pub fn new(kind: FilterKind, sr: f32, frequency: f32, q: f32) -> Self {
    let mut f = Self {
      kind,
      sr: sr as f64,
      frequency,
      q,
      gain_db: 0.0,
      dirty: true,
      b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0,
      z1: [0.0; 2],
      z2: [0.0; 2],
    };
    f.update_coefficients();
    f
  }

  pub fn kind(&self) -> FilterKind { self.kind }
  pub fn frequency(&self) -> f32 { self.frequency }
  pub fn q(&self) -> f32 { self.q }
  pub fn gain(&self) -> f32 { self.gain_db }

  pub fn set_frequency(&mut self, hz: f32) {
    if hz != self.frequency { self.frequency = hz; self.dirty = true; }
  }
  pub fn set_q(&mut self, q: f32) {
    if q != self.q { self.q = q; self.dirty = true; }
  }
  pub fn set_gain(&mut self, db: f32) {
    if db != self.gain_db { self.gain_db = db; self.dirty = true; }
  }

  fn update_coefficients(&mut self) {
    self.dirty = false;
    let nyquist = self.sr * 0.5;
    let f0 = (self.frequency as f64).clamp(1.0, nyquist * 0.999);
    let w0 = 2.0 * PI * f0 / self.sr;
    let (sin_w0, cos_w0) = w0.sin_cos();
    let a = 10f64.powf(self.gain_db as f64 / 40.0);
    let q = (self.q as f64).max(1e-4);

    let (b0, b1, b2, a0, a1, a2) = match self.kind {
      FilterKind::LowShelf => {
        let alpha = sin_w0 / 2.0 * 2f64.sqrt();
        let k = 2.0 * alpha * a.sqrt();
        (
          a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
          2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
          a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
          (a + 1.0) + (a - 1.0) * cos_w0 + k,
          -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
          (a + 1.0) + (a - 1.0) * cos_w0 - k,
        )
      }
      FilterKind::HighShelf => {
        let alpha = sin_w0 / 2.0 * 2f64.sqrt();
        let k = 2.0 * alpha * a.sqrt();
        (
          a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
          -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
          a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
          (a + 1.0) - (a - 1.0) * cos_w0 + k,
          2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
          (a + 1.0) - (a - 1.0) * cos_w0 - k,
        )
      }
      FilterKind::Peaking => {
        let alpha = sin_w0 / (2.0 * q);
        (
          1.0 + alpha * a,
          -2.0 * cos_w0,
          1.0 - alpha * a,
          1.0 + alpha / a,
          -2.0 * cos_w0,
          1.0 - alpha / a,
        )
      }
      FilterKind::LowPass => {
        let alpha = sin_w0 / (2.0 * q);
        (
          (1.0 - cos_w0) / 2.0,
          1.0 - cos_w0,
          (1.0 - cos_w0) / 2.0,
          1.0 + alpha,
          -2.0 * cos_w0,
          1.0 - alpha,
        )
      }
    };

    self.b0 = b0 / a0;
    self.b1 = b1 / a0;
    self.b2 = b2 / a0;
    self.a1 = a1 / a0;
    self.a2 = a2 / a0;
  }

  #[inline]
  fn tick(&mut self, ch: usize, x: f64) -> f64 {
    let y = self.b0 * x + self.z1[ch];
    self.z1[ch] = self.b1 * x - self.a1 * y + self.z2[ch];
    self.z2[ch] = self.b2 * x - self.a2 * y;
    y
  }

  #[inline]
  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    if self.dirty { self.update_coefficients(); }
    (self.tick(0, l as f64) as f32, self.tick(1, r as f64) as f32)
  }

  /// Single channel variant, used where a filter runs on one lane only.
  #[inline]
  pub fn process_channel(&mut self, ch: usize, x: f32) -> f32 {
    if self.dirty { self.update_coefficients(); }
    self.tick(ch.min(1), x as f64) as f32
  }

  pub fn reset(&mut self) {
    self.z1 = [0.0; 2];
    self.z2 = [0.0; 2];
  }
}
