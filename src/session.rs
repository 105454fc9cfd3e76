use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::analysis::spawn_analyser;
use crate::config::BoothConfig;
use crate::engine::audio::ProcessingContext;
use crate::engine::capture::{CaptureConstraints, MediaStream, Platform};
use crate::engine::graph::SignalGraph;
use crate::engine::params::StageParams;
use crate::engine::state::SharedF32;
use crate::error::{CaptureError, SessionError};
use crate::metering::MeteringSampler;
use crate::recorder::{RecordedBlob, Recorder, RecorderState};
use crate::settings::AudioSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Starting,
  Active,
  Stopping,
}

#[derive(Debug)]
pub enum RecordingToggle {
  Started,
  Stopped(RecordedBlob),
}

/// Everything owned by a running session, released together on stop.
struct LiveSession {
  stream: MediaStream,
  context: ProcessingContext,
  recorder: Recorder,
  meter: MeteringSampler,
  spectrum: Receiver<Vec<f32>>,
  started_at: Instant,
  recording_latched: bool,
}

/// Owns the capture stream, the processing context and the session-scoped
/// tasks. At most one session is live at a time.
pub struct SessionController<P: Platform> {
  platform: P,
  sample_rate: u32,
  meter_interval: Duration,
  state: SessionState,
  live: Option<LiveSession>,
  gain_reduction: SharedF32,
}

impl<P: Platform> SessionController<P> {
  pub fn new(platform: P, config: &BoothConfig) -> Self {
    Self {
      platform,
      sample_rate: config.sample_rate,
      meter_interval: config.meter_interval(),
      state: SessionState::Idle,
      live: None,
      gain_reduction: SharedF32::new(0.0),
    }
  }

  pub fn state(&self) -> SessionState { self.state }
  pub fn is_active(&self) -> bool { self.state == SessionState::Active }
  pub fn platform(&self) -> &P { &self.platform }
  pub fn platform_mut(&mut self) -> &mut P { &mut self.platform }

  /// Acquire capture, build the graph configured with `initial`, and start
  /// rendering. Any failure releases what was acquired and leaves the
  /// controller idle.
  pub fn start(&mut self, initial: &StageParams) -> Result<(), SessionError> {
    if self.state != SessionState::Idle {
      return Err(SessionError::AlreadyActive);
    }
    self.state = SessionState::Starting;
    match self.open(initial) {
      Ok(live) => {
        log::info!("session started at {} Hz", live.context.sample_rate());
        self.live = Some(live);
        self.state = SessionState::Active;
        Ok(())
      }
      Err(e) => {
        log::warn!("session start failed: {e}");
        self.gain_reduction.set(0.0);
        self.state = SessionState::Idle;
        Err(e)
      }
    }
  }

  fn open(&mut self, initial: &StageParams) -> Result<LiveSession, SessionError> {
    if !self.platform.supports_display_capture() {
      return Err(CaptureError::Unsupported.into());
    }
    let constraints = CaptureConstraints::for_processing(self.sample_rate);
    let mut stream = self.platform.get_display_media(&constraints)?;
    let sr = stream.sample_rate();

    let (mut graph, source) = match SignalGraph::build(&mut stream, sr as f32) {
      Ok(built) => built,
      Err(e) => {
        stream.stop_all();
        return Err(e.into());
      }
    };
    graph.apply(initial);

    let (mut context, mut engine) = ProcessingContext::new(sr, graph, source);
    let recorder = Recorder::new(sr);
    engine.set_record_tap(recorder.tap());
    let (windows, spectrum) = spawn_analyser(sr as f32);
    engine.set_spectrum_sender(windows);
    context.schedule(initial.clone());

    match self.platform.open_output(sr, engine) {
      Ok(output) => context.attach_output(output),
      Err(e) => {
        stream.stop_all();
        context.close();
        return Err(e);
      }
    }

    let meter = MeteringSampler::start(context.reduction_meter(), self.gain_reduction.clone(), self.meter_interval);
    Ok(LiveSession {
      stream,
      context,
      recorder,
      meter,
      spectrum,
      started_at: Instant::now(),
      recording_latched: false,
    })
  }

  /// Push the parameters for `settings` into the live graph. No-op when idle.
  pub fn apply(&mut self, settings: &AudioSettings, bypassed: bool, is_paid: bool) -> bool {
    if self.state != SessionState::Active {
      return false;
    }
    match self.live.as_mut() {
      Some(live) => live.context.schedule(StageParams::resolve(settings, bypassed, is_paid)),
      None => false,
    }
  }

  /// Last snapshot applied to the live graph.
  pub fn applied(&self) -> Option<&StageParams> {
    self.live.as_ref().and_then(|l| l.context.applied())
  }

  /// Tear the session down. Safe to call in any state; returns the take if a
  /// recording was still running.
  pub fn stop(&mut self) -> Option<RecordedBlob> {
    let Some(mut live) = self.live.take() else {
      self.state = SessionState::Idle;
      return None;
    };
    self.state = SessionState::Stopping;

    let mut blob = None;
    if live.recorder.state() == RecorderState::Recording {
      match live.recorder.stop() {
        Ok(b) => blob = Some(b),
        Err(e) => log::warn!("recording lost while stopping: {e}"),
      }
    }
    live.stream.stop_all();
    live.context.close();
    live.meter.cancel();
    drop(live);

    self.gain_reduction.set(0.0);
    self.state = SessionState::Idle;
    log::info!("session stopped");
    blob
  }

  /// Start or finish the session's single recording.
  pub fn toggle_recording(&mut self) -> Result<RecordingToggle, SessionError> {
    let live = match self.live.as_mut() {
      Some(l) if self.state == SessionState::Active => l,
      _ => return Err(SessionError::NotActive),
    };
    if live.recording_latched {
      return Err(SessionError::RecordingLatched);
    }
    match live.recorder.state() {
      RecorderState::Inactive => {
        live.recorder.start()?;
        Ok(RecordingToggle::Started)
      }
      RecorderState::Recording => {
        live.recording_latched = true;
        Ok(RecordingToggle::Stopped(live.recorder.stop()?))
      }
    }
  }

  pub fn is_recording(&self) -> bool {
    self.live.as_ref().is_some_and(|l| l.recorder.state() == RecorderState::Recording)
  }

  /// False once this session's take has been stopped.
  pub fn can_record(&self) -> bool {
    self.is_active() && self.live.as_ref().is_some_and(|l| !l.recording_latched)
  }

  pub fn elapsed(&self) -> Duration {
    self.live.as_ref().map(|l| l.started_at.elapsed()).unwrap_or_default()
  }

  /// Published compressor gain reduction in dB; 0 when no session is active.
  pub fn gain_reduction(&self) -> f32 {
    if self.is_active() { self.gain_reduction.get() } else { 0.0 }
  }

  /// Spectrum frames for a visualizer while a session runs.
  pub fn spectrum_frames(&self) -> Option<&Receiver<Vec<f32>>> {
    self.live.as_ref().map(|l| &l.spectrum)
  }

  /// Graph time in seconds.
  pub fn current_time(&self) -> f64 {
    self.live.as_ref().map(|l| l.context.current_time()).unwrap_or(0.0)
  }
}

impl<P: Platform> Drop for SessionController<P> {
  fn drop(&mut self) {
    self.stop();
  }
}

/// `mm:ss`
pub fn format_duration(d: Duration) -> String {
  let secs = d.as_secs();
  format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{CaptureFailure, FakePlatform};

  fn controller(platform: FakePlatform) -> SessionController<FakePlatform> {
    let cfg = BoothConfig { meter_interval_ms: 2, ..Default::default() };
    SessionController::new(platform, &cfg)
  }

  fn initial() -> StageParams {
    StageParams::resolve(&AudioSettings::default(), false, false)
  }

  #[test]
  fn test_start_requests_processing_constraints_and_drops_video() {
    let mut s = controller(FakePlatform::default());
    s.start(&initial()).unwrap();
    assert_eq!(s.state(), SessionState::Active);
    let req = &s.platform().requests[0];
    assert!(req.video);
    assert!(!req.audio.echo_cancellation && !req.audio.noise_suppression && !req.audio.auto_gain_control);
    assert_eq!(s.platform().stops(), 1, "video track stopped right away");
    assert!(matches!(s.start(&initial()), Err(SessionError::AlreadyActive)));
  }

  #[test]
  fn test_settings_reach_the_graph() {
    let mut s = controller(FakePlatform::default());
    s.start(&initial()).unwrap();
    let settings = AudioSettings { bass_gain: 6.0, compressor_ratio: 4.0, compressor_threshold: -24.0, ..Default::default() };
    assert!(s.apply(&settings, false, false));
    let out = s.platform().output().unwrap().clone();
    out.render(128).unwrap();
    let (bass, ratio, threshold, doubler, reverb) = out
      .with_engine(|e| {
        let g = e.graph();
        (g.bass.gain(), g.compressor.ratio(), g.compressor.threshold(), g.doubler_wet.value(), g.reverb_wet.value())
      })
      .unwrap();
    assert_eq!(bass, 6.0);
    assert_eq!(ratio, 4.0);
    assert_eq!(threshold, -24.0);
    assert_eq!(doubler, 0.0, "premium stages silent on the free tier");
    assert_eq!(reverb, 0.0);

    assert!(s.apply(&settings, true, false));
    out.render(128).unwrap();
    let (bass, ratio, threshold) = out
      .with_engine(|e| (e.graph().bass.gain(), e.graph().compressor.ratio(), e.graph().compressor.threshold()))
      .unwrap();
    assert_eq!((bass, ratio, threshold), (0.0, 1.0, 0.0), "bypass neutralizes the chain");
  }

  #[test]
  fn test_stop_is_idempotent_and_releases_everything() {
    let mut s = controller(FakePlatform::default());
    s.start(&initial()).unwrap();
    let out = s.platform().output().unwrap().clone();
    assert!(s.stop().is_none());
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.platform().stops(), 2, "video then audio");
    assert!(out.is_closed());
    assert_eq!(s.gain_reduction(), 0.0);
    assert!(s.applied().is_none());
    assert!(s.stop().is_none());
    assert_eq!(s.platform().stops(), 2);
    assert!(!s.apply(&AudioSettings::default(), false, false));
  }

  #[test]
  fn test_start_failures_unwind_to_idle() {
    let mut s = controller(FakePlatform { supported: false, ..Default::default() });
    assert!(matches!(s.start(&initial()), Err(SessionError::Capture(CaptureError::Unsupported))));
    assert_eq!(s.state(), SessionState::Idle);

    let mut s = controller(FakePlatform { capture_failure: Some(CaptureFailure::PermissionDenied), ..Default::default() });
    assert!(matches!(s.start(&initial()), Err(SessionError::Capture(CaptureError::PermissionDenied(_)))));
    assert_eq!(s.state(), SessionState::Idle);

    let mut s = controller(FakePlatform { fail_output: true, ..Default::default() });
    assert!(matches!(s.start(&initial()), Err(SessionError::Output(_))));
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.platform().stops(), 2, "captured tracks released");
    s.platform_mut().fail_output = false;
    s.start(&initial()).unwrap();
    assert!(s.is_active());
  }

  #[test]
  fn test_no_audio_track() {
    let mut s = controller(FakePlatform { with_audio: false, ..Default::default() });
    let err = s.start(&initial()).unwrap_err();
    assert_eq!(err.to_string(), "No audio track captured. Please share a source with audio.");
    assert_eq!(s.state(), SessionState::Idle);
    assert_eq!(s.platform().stops(), 1);
  }

  #[test]
  fn test_recording_latches_after_one_take() {
    let mut s = controller(FakePlatform::default());
    assert!(matches!(s.toggle_recording(), Err(SessionError::NotActive)));
    s.start(&initial()).unwrap();
    assert!(matches!(s.toggle_recording().unwrap(), RecordingToggle::Started));
    assert!(s.is_recording());
    s.platform_mut().feed(&vec![0.25; 960]);
    s.platform().output().unwrap().render(480).unwrap();
    let blob = match s.toggle_recording().unwrap() {
      RecordingToggle::Stopped(b) => b,
      other => panic!("expected a take, got {other:?}"),
    };
    assert_eq!(blob.frames, 480);
    assert!(!s.can_record());
    assert!(matches!(s.toggle_recording(), Err(SessionError::RecordingLatched)));

    s.stop();
    s.start(&initial()).unwrap();
    assert!(s.can_record(), "a new session may record again");
  }

  #[test]
  fn test_stop_finalizes_running_take() {
    let mut s = controller(FakePlatform::default());
    s.start(&initial()).unwrap();
    s.toggle_recording().unwrap();
    s.platform().output().unwrap().render(256).unwrap();
    let blob = s.stop().unwrap();
    assert_eq!(blob.frames, 256);
    assert_eq!(blob.mime_type, "audio/wav");
  }

  #[test]
  fn test_capture_backlog_does_not_delay_monitoring() {
    let mut s = controller(FakePlatform::default());
    s.start(&StageParams::resolve(&AudioSettings::default(), true, false)).unwrap();
    let out = s.platform().output().unwrap().clone();
    s.platform_mut().feed(&vec![0.0; 4800 * 2]);
    let mut heard = None;
    for n in 0..20 {
      let mut input = vec![0.0; 256];
      if n == 10 {
        input[0] = 1.0;
        input[1] = 1.0;
      }
      s.platform_mut().feed(&input);
      let rendered = out.render(128).unwrap();
      if heard.is_none() {
        heard = rendered.chunks(2).position(|f| f[0].abs() > 0.1).map(|i| n * 128 + i);
      }
    }
    let heard = heard.expect("impulse reached the output");
    assert!(heard - 1280 <= 256, "latency {} frames", heard - 1280);
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_secs(0)), "00:00");
    assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
    assert_eq!(format_duration(Duration::from_secs(6001)), "100:01");
  }
}
