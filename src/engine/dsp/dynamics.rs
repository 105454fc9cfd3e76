// Feed-forward dynamics: a soft-knee compressor and a downward-expanding gate.
// Both detect on the stereo-linked peak and smooth the gain in the dB domain.

const FLOOR_DB: f32 = -120.0;
const GATE_FLOOR_DB: f32 = -100.0;

#[inline]
fn lin_to_db(x: f32) -> f32 {
  if x <= 1e-6 { FLOOR_DB } else { (20.0 * x.log10()).max(FLOOR_DB) }
}

#[inline]
fn db_to_lin(db: f32) -> f32 { 10f32.powf(db / 20.0) }

/// One-pole coefficient for a time constant in seconds. Zero or less is instant.
#[inline]
fn time_coef(seconds: f32, sr: f32) -> f32 {
  if seconds <= 0.0 { 0.0 } else { (-1.0 / (seconds * sr)).exp() }
}

/// Attack/release smoother over a gain value in dB.
struct GainSmoother {
  sr: f32,
  attack: f32,
  release: f32,
  attack_coef: f32,
  release_coef: f32,
  value_db: f32,
}

impl GainSmoother {
  fn new(sr: f32, attack: f32, release: f32) -> Self {
    Self {
      sr,
      attack,
      release,
      attack_coef: time_coef(attack, sr),
      release_coef: time_coef(release, sr),
      value_db: 0.0,
    }
  }

  fn set_attack(&mut self, s: f32) { self.attack = s; self.attack_coef = time_coef(s, self.sr); }
  fn set_release(&mut self, s: f32) { self.release = s; self.release_coef = time_coef(s, self.sr); }

  #[inline]
  fn next(&mut self, target_db: f32, attacking: bool) -> f32 {
    let c = if attacking { self.attack_coef } else { self.release_coef };
    self.value_db = c * self.value_db + (1.0 - c) * target_db;
    self.value_db
  }
}

/// Dynamics compressor modelled on the platform node: threshold, knee, ratio,
/// attack and release, with the current gain reduction exposed for metering.
pub struct Compressor {
  threshold: f32,
  knee: f32,
  ratio: f32,
  smoother: GainSmoother,
}

impl Compressor {
  pub fn new(sr: f32) -> Self {
    // platform defaults
    Self { threshold: -24.0, knee: 30.0, ratio: 12.0, smoother: GainSmoother::new(sr, 0.003, 0.25) }
  }

  pub fn threshold(&self) -> f32 { self.threshold }
  pub fn knee(&self) -> f32 { self.knee }
  pub fn ratio(&self) -> f32 { self.ratio }
  pub fn attack(&self) -> f32 { self.smoother.attack }
  pub fn release(&self) -> f32 { self.smoother.release }

  pub fn set_threshold(&mut self, db: f32) { self.threshold = db.clamp(-100.0, 0.0); }
  pub fn set_knee(&mut self, db: f32) { self.knee = db.clamp(0.0, 40.0); }
  pub fn set_ratio(&mut self, r: f32) { self.ratio = r.clamp(1.0, 20.0); }
  pub fn set_attack(&mut self, s: f32) { self.smoother.set_attack(s.clamp(0.0, 1.0)); }
  pub fn set_release(&mut self, s: f32) { self.smoother.set_release(s.clamp(0.0, 1.0)); }

  /// Current gain reduction in dB, always <= 0.
  pub fn reduction(&self) -> f32 { self.smoother.value_db.min(0.0) }

  /// Static curve: gain change in dB for a given input level.
  pub fn compute_gain(&self, input_db: f32) -> f32 {
    let slope = 1.0 / self.ratio - 1.0;
    let half = self.knee * 0.5;
    if self.knee > 0.0 && input_db > self.threshold - half && input_db < self.threshold + half {
      let over = input_db - self.threshold + half;
      slope * over * over / (2.0 * self.knee)
    } else if input_db >= self.threshold + half {
      slope * (input_db - self.threshold)
    } else {
      0.0
    }
  }

  #[inline]
  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let level = lin_to_db(l.abs().max(r.abs()));
    let target = self.compute_gain(level);
    // more reduction than now means attack
    let attacking = target < self.smoother.value_db;
    let g = db_to_lin(self.smoother.next(target, attacking));
    (l * g, r * g)
  }
}

/// Downward expander used as the noise gate. Below threshold the level falls
/// `ratio - 1` dB per dB, down to a -100 dB floor.
pub struct NoiseGate {
  threshold: f32,
  knee: f32,
  ratio: f32,
  smoother: GainSmoother,
}

impl NoiseGate {
  pub fn new(sr: f32) -> Self {
    Self { threshold: -100.0, knee: 0.0, ratio: 20.0, smoother: GainSmoother::new(sr, 0.0, 0.2) }
  }

  pub fn threshold(&self) -> f32 { self.threshold }
  pub fn knee(&self) -> f32 { self.knee }
  pub fn ratio(&self) -> f32 { self.ratio }
  pub fn attack(&self) -> f32 { self.smoother.attack }
  pub fn release(&self) -> f32 { self.smoother.release }

  pub fn set_threshold(&mut self, db: f32) { self.threshold = db.clamp(-100.0, 0.0); }
  pub fn set_knee(&mut self, db: f32) { self.knee = db.clamp(0.0, 40.0); }
  pub fn set_ratio(&mut self, r: f32) { self.ratio = r.clamp(1.0, 20.0); }
  pub fn set_attack(&mut self, s: f32) { self.smoother.set_attack(s.clamp(0.0, 1.0)); }
  pub fn set_release(&mut self, s: f32) { self.smoother.set_release(s.clamp(0.0, 1.0)); }

  /// Current attenuation in dB, <= 0.
  pub fn attenuation(&self) -> f32 { self.smoother.value_db.min(0.0) }

  pub fn compute_gain(&self, input_db: f32) -> f32 {
    let slope = self.ratio - 1.0;
    let half = self.knee * 0.5;
    let g = if self.knee > 0.0 && input_db > self.threshold - half && input_db < self.threshold + half {
      let under = input_db - self.threshold - half;
      -slope * under * under / (2.0 * self.knee)
    } else if input_db <= self.threshold - half {
      slope * (input_db - self.threshold)
    } else {
      0.0
    };
    g.max(GATE_FLOOR_DB)
  }

  #[inline]
  pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
    let level = lin_to_db(l.abs().max(r.abs()));
    let target = self.compute_gain(level);
    // opening the gate is the attack phase
    let attacking = target > self.smoother.value_db;
    let g = db_to_lin(self.smoother.next(target, attacking));
    (l * g, r * g)
  }
}
