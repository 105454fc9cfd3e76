//! Device-free platform for lifecycle tests: capture feeds are ring buffers the
//! test writes into, and the output is rendered by hand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapProd, HeapRb};

use crate::engine::audio::Engine;
use crate::engine::capture::{CaptureConstraints, MediaStream, MediaTrack, OutputDevice, Platform, TrackHandle};
use crate::error::{CaptureError, SessionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureFailure {
  PermissionDenied,
  Device,
}

struct CountingTrack(Arc<AtomicUsize>);

impl TrackHandle for CountingTrack {
  fn stop(&mut self) { self.0.fetch_add(1, Ordering::SeqCst); }
}

type SharedEngine = Arc<Mutex<Option<Engine>>>;

/// Test-side view of an opened output.
#[derive(Clone)]
pub struct OutputHandle(SharedEngine);

impl OutputHandle {
  /// Render `frames` stereo frames; `None` once the output was closed.
  pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
    let mut guard = self.0.lock().ok()?;
    let engine = guard.as_mut()?;
    let mut out = vec![0.0; frames * 2];
    engine.process(&mut out, 2);
    Some(out)
  }

  pub fn with_engine<R>(&self, f: impl FnOnce(&Engine) -> R) -> Option<R> {
    let guard = self.0.lock().ok()?;
    guard.as_ref().map(f)
  }

  pub fn is_closed(&self) -> bool {
    self.0.lock().map(|g| g.is_none()).unwrap_or(true)
  }
}

struct ManualDevice(SharedEngine);

impl OutputDevice for ManualDevice {
  fn close(&mut self) {
    if let Ok(mut g) = self.0.lock() {
      g.take();
    }
  }
}

pub struct FakePlatform {
  pub supported: bool,
  pub capture_failure: Option<CaptureFailure>,
  pub with_audio: bool,
  pub with_video: bool,
  pub fail_output: bool,
  pub track_stops: Arc<AtomicUsize>,
  pub requests: Vec<CaptureConstraints>,
  pub feeds: Vec<HeapProd<f32>>,
  pub outputs: Vec<OutputHandle>,
}

impl Default for FakePlatform {
  fn default() -> Self {
    Self {
      supported: true,
      capture_failure: None,
      with_audio: true,
      with_video: true,
      fail_output: false,
      track_stops: Arc::new(AtomicUsize::new(0)),
      requests: Vec::new(),
      feeds: Vec::new(),
      outputs: Vec::new(),
    }
  }
}

impl FakePlatform {
  pub fn stops(&self) -> usize { self.track_stops.load(Ordering::SeqCst) }

  pub fn output(&self) -> Option<&OutputHandle> { self.outputs.last() }

  /// Push interleaved stereo into the latest capture feed.
  pub fn feed(&mut self, samples: &[f32]) -> usize {
    self.feeds.last_mut().map(|p| p.push_slice(samples)).unwrap_or(0)
  }
}

impl Platform for FakePlatform {
  fn supports_display_capture(&self) -> bool { self.supported }

  fn get_display_media(&mut self, constraints: &CaptureConstraints) -> Result<MediaStream, CaptureError> {
    self.requests.push(constraints.clone());
    match self.capture_failure {
      Some(CaptureFailure::PermissionDenied) => return Err(CaptureError::PermissionDenied("user dismissed picker".into())),
      Some(CaptureFailure::Device) => return Err(CaptureError::Device("gone".into())),
      None => {}
    }
    let mut tracks = Vec::new();
    if self.with_video {
      tracks.push(MediaTrack::video("screen", Box::new(CountingTrack(self.track_stops.clone()))));
    }
    if self.with_audio {
      let (prod, cons) = HeapRb::<f32>::new(1 << 16).split();
      self.feeds.push(prod);
      tracks.push(MediaTrack::audio("tab audio", cons, Box::new(CountingTrack(self.track_stops.clone()))));
    }
    Ok(MediaStream::new(constraints.audio.sample_rate, tracks))
  }

  fn open_output(&mut self, _sample_rate: u32, engine: Engine) -> Result<Box<dyn OutputDevice>, SessionError> {
    if self.fail_output {
      return Err(SessionError::Output("device busy".into()));
    }
    let shared: SharedEngine = Arc::new(Mutex::new(Some(engine)));
    self.outputs.push(OutputHandle(shared.clone()));
    Ok(Box::new(ManualDevice(shared)))
  }
}
