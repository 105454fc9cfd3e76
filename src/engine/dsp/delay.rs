// Intentionally not Clone; stage state moves into the audio callback.
pub struct DelayLine {
  buf_l: Vec<f32>,
  buf_r: Vec<f32>,
  wr: usize,
  len: usize,
  sr: f32,
  time_s: f32,
  delay_samp: f32,
}

impl DelayLine {
  /// `max_s` bounds the delay time; the buffer never grows after construction.
  pub fn new(max_s: f32, sr: f32) -> Self {
    let len = ((max_s * sr).ceil().max(64.0)) as usize + 2;
    Self {
      buf_l: vec![0.0; len],
      buf_r: vec![0.0; len],
      wr: 0,
      len,
      sr,
      time_s: 0.0,
      delay_samp: 0.0,
    }
  }

  pub fn delay_time(&self) -> f32 { self.time_s }

  pub fn set_delay_time(&mut self, seconds: f32) {
    let max_samp = (self.len - 2) as f32;
    self.delay_samp = (seconds * self.sr).clamp(0.0, max_samp);
    self.time_s = self.delay_samp / self.sr;
  }

  #[inline]
  fn wrap(len: usize, i: i64) -> usize { let m = len as i64; let mut k = i % m; if k < 0 { k += m; } k as usize }
  #[inline]
  fn lerp(buf: &[f32], idx: f32, len: usize) -> f32 {
    let i0 = idx.floor() as i64;
    let frac = idx - i0 as f32;
    let s0 = buf[Self::wrap(len, i0)];
    let s1 = buf[Self::wrap(len, i0 + 1)];
    s0 + (s1 - s0) * frac
  }

  #[inline]
  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    // write first so a zero delay passes straight through
    self.buf_l[self.wr] = l;
    self.buf_r[self.wr] = r;
    let rd = self.wr as f32 - self.delay_samp;
    let yl = Self::lerp(&self.buf_l, rd, self.len);
    let yr = Self::lerp(&self.buf_r, rd, self.len);
    self.wr += 1; if self.wr >= self.len { self.wr = 0; }
    (yl, yr)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_impulse_arrives_after_delay() {
    let sr = 48_000.0;
    let mut d = DelayLine::new(1.0, sr);
    d.set_delay_time(0.015);
    assert!((d.delay_time() - 0.015).abs() < 1e-6);
    let mut hit = None;
    for i in 0..2000 {
      let x = if i == 0 { 1.0 } else { 0.0 };
      let (l, r) = d.process(x, -x);
      if l.abs() > 0.5 { hit = Some(i); assert!((r + 1.0).abs() < 1e-3); }
    }
    assert_eq!(hit, Some(720), "15 ms at 48 kHz is 720 samples");
  }

  #[test]
  fn test_zero_delay_is_passthrough() {
    let mut d = DelayLine::new(0.1, 44_100.0);
    d.set_delay_time(0.0);
    assert_eq!(d.process(0.25, -0.5), (0.25, -0.5));
  }

  #[test]
  fn test_delay_clamped_to_buffer() {
    let mut d = DelayLine::new(0.01, 1000.0);
    d.set_delay_time(5.0);
    assert!(d.delay_time() <= 0.064 + 1e-6);
  }
}
