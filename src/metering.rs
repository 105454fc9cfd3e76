use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use crate::engine::state::SharedF32;

/// Max gain reduction a meter displays, in dB.
pub const METER_RANGE_DB: f32 = 30.0;

/// Periodic task that copies the compressor's gain reduction into the
/// published meter value once per display tick. Cancelling pins the meter to 0.
pub struct MeteringSampler {
  cancel: Option<Sender<()>>,
  join: Option<JoinHandle<()>>,
  published: SharedF32,
}

impl MeteringSampler {
  pub fn start(source: SharedF32, published: SharedF32, interval: Duration) -> Self {
    let (cancel_tx, cancel_rx) = bounded::<()>(1);
    let out = published.clone();
    let join = thread::Builder::new()
      .name("booth-meter".into())
      .spawn(move || {
        let ticker = tick(interval);
        loop {
          select! {
            recv(ticker) -> _ => out.set(source.get().min(0.0)),
            recv(cancel_rx) -> _ => break,
          }
        }
        out.set(0.0);
      })
      .map_err(|e| log::warn!("metering thread failed to start: {e}"))
      .ok();
    Self { cancel: Some(cancel_tx), join, published }
  }

  /// Idempotent. Blocks until the task has exited.
  pub fn cancel(&mut self) {
    if let Some(tx) = self.cancel.take() {
      let _ = tx.send(());
    }
    if let Some(j) = self.join.take() {
      let _ = j.join();
    }
    self.published.set(0.0);
  }
}

impl Drop for MeteringSampler {
  fn drop(&mut self) { self.cancel(); }
}

/// Fraction of the meter to fill for a reduction value (dB, <= 0).
pub fn meter_fill(reduction_db: f32) -> f32 {
  (reduction_db.abs() / METER_RANGE_DB).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Instant;

  fn wait_for(published: &SharedF32, want: f32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
      if published.get() == want { return true; }
      thread::sleep(Duration::from_millis(2));
    }
    false
  }

  #[test]
  fn test_samples_then_pins_to_zero() {
    let source = SharedF32::new(-6.5);
    let published = SharedF32::new(0.0);
    let mut sampler = MeteringSampler::start(source.clone(), published.clone(), Duration::from_millis(5));
    assert!(wait_for(&published, -6.5), "meter never sampled");
    source.set(-12.0);
    assert!(wait_for(&published, -12.0));
    sampler.cancel();
    assert_eq!(published.get(), 0.0);
    sampler.cancel();
    source.set(-3.0);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(published.get(), 0.0, "no sampling after cancel");
  }

  #[test]
  fn test_meter_fill() {
    assert_eq!(meter_fill(0.0), 0.0);
    assert_eq!(meter_fill(-15.0), 0.5);
    assert_eq!(meter_fill(-45.0), 1.0);
  }
}
