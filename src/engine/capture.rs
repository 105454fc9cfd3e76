use ringbuf::HeapCons;

use crate::error::{CaptureError, SessionError};

use super::audio::Engine;

/// Interleaved stereo samples flowing from the capture callback to the render callback.
pub type AudioSource = HeapCons<f32>;

/// What a capture request asks the platform for.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConstraints {
  /// Display capture always yields video on some hosts; it is discarded.
  pub video: bool,
  pub audio: AudioConstraints,
}

/// Platform voice enhancement is always off: the chain does its own processing.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioConstraints {
  pub sample_rate: u32,
  pub echo_cancellation: bool,
  pub noise_suppression: bool,
  pub auto_gain_control: bool,
}

impl CaptureConstraints {
  pub fn for_processing(sample_rate: u32) -> Self {
    Self {
      video: true,
      audio: AudioConstraints {
        sample_rate,
        echo_cancellation: false,
        noise_suppression: false,
        auto_gain_control: false,
      },
    }
  }
}

impl Default for CaptureConstraints {
  fn default() -> Self { Self::for_processing(48_000) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
  Audio,
  Video,
}

/// The platform resource behind a track (an input stream, a video grabber).
pub trait TrackHandle {
  fn stop(&mut self);
}

pub struct MediaTrack {
  kind: TrackKind,
  label: String,
  live: bool,
  handle: Option<Box<dyn TrackHandle>>,
  source: Option<AudioSource>,
}

impl MediaTrack {
  pub fn audio(label: impl Into<String>, source: AudioSource, handle: Box<dyn TrackHandle>) -> Self {
    Self { kind: TrackKind::Audio, label: label.into(), live: true, handle: Some(handle), source: Some(source) }
  }

  pub fn video(label: impl Into<String>, handle: Box<dyn TrackHandle>) -> Self {
    Self { kind: TrackKind::Video, label: label.into(), live: true, handle: Some(handle), source: None }
  }

  pub fn kind(&self) -> TrackKind { self.kind }
  pub fn label(&self) -> &str { &self.label }
  pub fn is_live(&self) -> bool { self.live }

  /// Idempotent; releases the platform resource.
  pub fn stop(&mut self) {
    if let Some(mut h) = self.handle.take() {
      h.stop();
    }
    self.live = false;
  }
}

/// Result of a capture request: a bag of tracks sharing one sample rate.
pub struct MediaStream {
  sample_rate: u32,
  tracks: Vec<MediaTrack>,
}

impl MediaStream {
  pub fn new(sample_rate: u32, tracks: Vec<MediaTrack>) -> Self {
    Self { sample_rate, tracks }
  }

  pub fn sample_rate(&self) -> u32 { self.sample_rate }
  pub fn tracks(&self) -> &[MediaTrack] { &self.tracks }

  pub fn has_live_audio(&self) -> bool {
    self.tracks.iter().any(|t| t.kind == TrackKind::Audio && t.live)
  }

  pub fn stop_video_tracks(&mut self) {
    for t in self.tracks.iter_mut().filter(|t| t.kind == TrackKind::Video) {
      t.stop();
    }
  }

  pub fn stop_all(&mut self) {
    for t in self.tracks.iter_mut() {
      t.stop();
    }
  }

  /// Sample feed of the first live audio track. Can be taken once.
  pub fn take_audio_source(&mut self) -> Option<AudioSource> {
    self.tracks
      .iter_mut()
      .filter(|t| t.kind == TrackKind::Audio && t.live)
      .find_map(|t| t.source.take())
  }
}

/// A running device output. Dropping it also stops rendering.
pub trait OutputDevice {
  fn close(&mut self);
}

/// Host services the session needs: display/tab capture and a device output.
pub trait Platform {
  fn supports_display_capture(&self) -> bool;

  /// May block while the user grants capture permission.
  fn get_display_media(&mut self, constraints: &CaptureConstraints) -> Result<MediaStream, CaptureError>;

  /// Start rendering `engine` to the device. The engine moves to the realtime thread.
  fn open_output(&mut self, sample_rate: u32, engine: Engine) -> Result<Box<dyn OutputDevice>, SessionError>;
}
