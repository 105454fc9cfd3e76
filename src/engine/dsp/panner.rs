use std::f32::consts::FRAC_PI_2;

/// Equal-power stereo panner with the platform's stereo-input law: panning
/// left folds the right channel into the left, and vice versa.
pub struct StereoPanner {
  pan: f32,
  gain_l: f32,
  gain_r: f32,
}

impl StereoPanner {
  pub fn new(pan: f32) -> Self {
    let mut p = Self { pan: 0.0, gain_l: 1.0, gain_r: 0.0 };
    p.set_pan(pan);
    p
  }

  pub fn pan(&self) -> f32 { self.pan }

  pub fn set_pan(&mut self, pan: f32) {
    self.pan = pan.clamp(-1.0, 1.0);
    // x in [0,1]: for pan <= 0 it is pan + 1, otherwise pan
    let x = if self.pan <= 0.0 { self.pan + 1.0 } else { self.pan };
    self.gain_l = (x * FRAC_PI_2).cos();
    self.gain_r = (x * FRAC_PI_2).sin();
  }

  #[inline]
  pub fn process(&self, l: f32, r: f32) -> (f32, f32) {
    if self.pan <= 0.0 {
      (l + r * self.gain_l, r * self.gain_r)
    } else {
      (l * self.gain_l, r + l * self.gain_r)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_center_is_identity() {
    let p = StereoPanner::new(0.0);
    let (l, r) = p.process(0.3, -0.7);
    assert!((l - 0.3).abs() < 1e-6 && (r + 0.7).abs() < 1e-6);
  }

  #[test]
  fn test_hard_left_folds_right_channel() {
    let p = StereoPanner::new(-1.0);
    let (l, r) = p.process(0.25, 0.5);
    assert!((l - 0.75).abs() < 1e-6, "{l}");
    assert!(r.abs() < 1e-6, "{r}");
  }

  #[test]
  fn test_partial_pan_moves_energy() {
    let left = StereoPanner::new(-0.8);
    let (l, r) = left.process(1.0, 1.0);
    assert!(l > 1.0 && r < 0.5, "({l}, {r})");
    let right = StereoPanner::new(0.8);
    let (l2, r2) = right.process(1.0, 1.0);
    assert!((l2 - r).abs() < 1e-6 && (r2 - l).abs() < 1e-6, "pan law should mirror");
  }
}
