/// Plain gain stage. Values are snapped, never ramped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gain {
  value: f32,
}

impl Gain {
  pub fn new(value: f32) -> Self { Self { value } }
  pub fn value(&self) -> f32 { self.value }
  pub fn set(&mut self, value: f32) { self.value = value; }

  #[inline]
  pub fn process(&self, l: f32, r: f32) -> (f32, f32) { (l * self.value, r * self.value) }
}

impl Default for Gain {
  fn default() -> Self { Self::new(1.0) }
}
