use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Lock-free f32 shared between the render thread and readers.
#[derive(Clone, Debug, Default)]
pub struct SharedF32(Arc<AtomicU32>);

impl SharedF32 {
    pub fn new(v: f32) -> Self {
        Self(Arc::new(AtomicU32::new(v.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// Frames rendered since the engine started; the processing context's time base.
#[derive(Clone, Debug, Default)]
pub struct FrameClock(Arc<AtomicU64>);

impl FrameClock {
    pub fn now(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn advance(&self, frames: u64) {
        self.0.fetch_add(frames, Ordering::AcqRel);
    }
}
