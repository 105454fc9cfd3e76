use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BoothConfig;
use crate::engine::capture::Platform;
use crate::engine::params::StageParams;
use crate::entitlement::{EntitlementProvider, RedirectMarker, StoredEntitlement};
use crate::error::{BoothError, ExternalServiceError, PersistenceError, PresetError};
use crate::presets::{PresetLibrary, UserPreset};
use crate::recorder::RecordedBlob;
use crate::services::{CheckoutService, HttpServices, SettingsGenerator};
use crate::session::{format_duration, RecordingToggle, SessionController, SessionState};
use crate::settings::{AudioSettings, SettingsField};
use crate::store::{FileStore, KeyValueStore, HAS_VISITED_KEY};

/// Everything the booth talks to besides the audio platform.
pub struct Collaborators {
  pub store: Arc<dyn KeyValueStore>,
  pub generator: Box<dyn SettingsGenerator>,
  pub checkout: Box<dyn CheckoutService>,
  pub entitlement: Box<dyn EntitlementProvider>,
}

impl Collaborators {
  /// File-backed storage under the data dir and the HTTP backend.
  pub fn from_config(config: &BoothConfig) -> Result<Self, BoothError> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.data_root())?);
    let http = HttpServices::new(&config.service_base_url)?;
    Ok(Self::with_store(store, Box::new(http.clone()), Box::new(http)))
  }

  /// Entitlement read from `store`.
  pub fn with_store(
    store: Arc<dyn KeyValueStore>,
    generator: Box<dyn SettingsGenerator>,
    checkout: Box<dyn CheckoutService>,
  ) -> Self {
    let entitlement = Box::new(StoredEntitlement::load(store.clone()));
    Self { store, generator, checkout, entitlement }
  }
}

/// The vocal booth: current settings, bypass and entitlement, the live
/// session, presets and the last finished recording. Every change is pushed
/// into the running graph.
pub struct Booth<P: Platform> {
  session: SessionController<P>,
  settings: AudioSettings,
  bypassed: bool,
  store: Arc<dyn KeyValueStore>,
  generator: Box<dyn SettingsGenerator>,
  checkout: Box<dyn CheckoutService>,
  entitlement: Box<dyn EntitlementProvider>,
  presets: PresetLibrary,
  recording: Option<RecordedBlob>,
  welcome_pending: bool,
}

impl<P: Platform> Booth<P> {
  pub fn new(platform: P, config: &BoothConfig, collab: Collaborators) -> Self {
    let Collaborators { store, generator, checkout, entitlement } = collab;
    let presets = PresetLibrary::load(store.as_ref());
    let welcome_pending = match store.get(HAS_VISITED_KEY) {
      Ok(v) => v.is_none(),
      Err(e) => {
        log::warn!("could not read first-visit flag: {e}");
        false
      }
    };
    Self {
      session: SessionController::new(platform, config),
      settings: AudioSettings::default(),
      bypassed: false,
      store,
      generator,
      checkout,
      entitlement,
      presets,
      recording: None,
      welcome_pending,
    }
  }

  pub fn session(&self) -> &SessionController<P> { &self.session }
  pub fn session_mut(&mut self) -> &mut SessionController<P> { &mut self.session }
  pub fn settings(&self) -> &AudioSettings { &self.settings }
  pub fn is_bypassed(&self) -> bool { self.bypassed }
  pub fn is_paid(&self) -> bool { self.entitlement.is_paid() }
  pub fn is_processing(&self) -> bool { self.session.state() == SessionState::Active }
  pub fn is_recording(&self) -> bool { self.session.is_recording() }
  pub fn can_record(&self) -> bool { self.session.can_record() }

  fn stage_params(&self) -> StageParams {
    StageParams::resolve(&self.settings, self.bypassed, self.is_paid())
  }

  fn reapply(&mut self) {
    let paid = self.is_paid();
    if self.session.apply(&self.settings, self.bypassed, paid) {
      log::debug!("parameters pushed (bypassed={}, paid={paid})", self.bypassed);
    }
  }

  // lifecycle

  /// Start a session. The previous session's take is discarded.
  pub fn start(&mut self) -> Result<(), BoothError> {
    let params = self.stage_params();
    self.session.start(&params)?;
    self.recording = None;
    Ok(())
  }

  /// Stop processing. A recording still running is finalized and kept.
  pub fn stop(&mut self) {
    if let Some(blob) = self.session.stop() {
      self.recording = Some(blob);
    }
  }

  pub fn toggle_processing(&mut self) -> Result<(), BoothError> {
    if self.session.state() == SessionState::Idle {
      self.start()
    } else {
      self.stop();
      Ok(())
    }
  }

  /// Returns whether a take is now running.
  pub fn toggle_recording(&mut self) -> Result<bool, BoothError> {
    match self.session.toggle_recording()? {
      RecordingToggle::Started => {
        self.recording = None;
        Ok(true)
      }
      RecordingToggle::Stopped(blob) => {
        self.recording = Some(blob);
        Ok(false)
      }
    }
  }

  pub fn gain_reduction(&self) -> f32 { self.session.gain_reduction() }
  pub fn elapsed(&self) -> Duration { self.session.elapsed() }
  pub fn elapsed_display(&self) -> String { format_duration(self.elapsed()) }

  // settings

  pub fn set_field(&mut self, field: SettingsField, value: f32) {
    self.settings.set(field, value);
    self.reapply();
  }

  pub fn set_settings(&mut self, settings: AudioSettings) {
    self.settings = settings.clamped();
    self.reapply();
  }

  pub fn reset_settings(&mut self) {
    self.set_settings(AudioSettings::default());
  }

  pub fn set_bypassed(&mut self, bypassed: bool) {
    self.bypassed = bypassed;
    self.reapply();
  }

  /// Ask the generator for settings matching `prompt`. On any failure the
  /// current settings are left alone.
  pub fn generate(&mut self, prompt: &str) -> Result<AudioSettings, BoothError> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
      return Err(BoothError::EmptyPrompt);
    }
    let value = self.generator.generate(prompt)?;
    let settings = AudioSettings::parse_external(&value).map_err(|e| {
      log::warn!("generator response rejected: {e}");
      ExternalServiceError::InvalidResponse
    })?;
    log::info!("applied generated settings for {prompt:?}");
    self.set_settings(settings);
    Ok(self.settings)
  }

  /// Current settings as pretty-printed JSON.
  pub fn copy_settings(&self) -> String { self.settings.to_pretty_json() }

  pub fn paste_settings(&mut self, text: &str) -> Result<(), BoothError> {
    if text.trim().is_empty() {
      return Err(BoothError::EmptyClipboard);
    }
    let settings = AudioSettings::from_clipboard_text(text).map_err(BoothError::InvalidPaste)?;
    self.set_settings(settings);
    Ok(())
  }

  // presets

  pub fn presets(&self) -> &[UserPreset] { self.presets.list() }

  pub fn save_preset(&mut self, name: &str) -> Result<(), BoothError> {
    self.presets.save(name, self.settings, self.store.as_ref())?;
    Ok(())
  }

  pub fn load_preset(&mut self, name: &str) -> Result<(), BoothError> {
    let settings = self
      .presets
      .get(name)
      .map(|p| p.settings)
      .ok_or_else(|| PresetError::NotFound(name.to_string()))?;
    self.set_settings(settings);
    Ok(())
  }

  pub fn delete_preset(&mut self, name: &str) -> Result<(), BoothError> {
    self.presets.delete(name, self.store.as_ref())?;
    Ok(())
  }

  // entitlement

  /// Open a checkout; returns the session id to redirect to.
  pub fn upgrade(&mut self) -> Result<String, BoothError> {
    let session = self.checkout.create_checkout_session()?;
    session
      .session_id
      .filter(|id| !id.is_empty())
      .ok_or(BoothError::MissingCheckoutSession)
  }

  /// Act on the URL the checkout redirected back to.
  pub fn handle_redirect(&mut self, url: &str) -> Result<Option<RedirectMarker>, BoothError> {
    match RedirectMarker::from_url(url) {
      Some(RedirectMarker::PaymentSuccess) => {
        let persisted = self.entitlement.on_upgrade_confirmed();
        self.reapply();
        persisted.map_err(BoothError::UpgradeNotPersisted)?;
        Ok(Some(RedirectMarker::PaymentSuccess))
      }
      Some(RedirectMarker::PaymentCancel) => Err(BoothError::PaymentCancelled),
      None => Ok(None),
    }
  }

  // first run

  pub fn needs_welcome(&self) -> bool { self.welcome_pending }

  pub fn dismiss_welcome(&mut self) -> Result<(), PersistenceError> {
    self.welcome_pending = false;
    self.store.set(HAS_VISITED_KEY, "true")
  }

  // recordings

  pub fn last_recording(&self) -> Option<&RecordedBlob> { self.recording.as_ref() }

  pub fn take_recording(&mut self) -> Option<RecordedBlob> { self.recording.take() }

  /// Write the last take into `dir`; the take is released once saved.
  pub fn save_recording(&mut self, dir: &Path) -> Result<PathBuf, BoothError> {
    let blob = self.recording.as_ref().ok_or(BoothError::NoRecording)?;
    let path = blob.save_to(dir).map_err(PersistenceError::from)?;
    self.recording = None;
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::CheckoutSession;
  use crate::store::MemoryStore;
  use crate::testing::FakePlatform;
  use serde_json::{json, Value};

  struct CannedGenerator(Option<Value>);

  impl SettingsGenerator for CannedGenerator {
    fn generate(&self, _prompt: &str) -> Result<Value, ExternalServiceError> {
      self.0.clone().ok_or_else(|| ExternalServiceError::Service("model overloaded".into()))
    }
  }

  struct CannedCheckout(Option<&'static str>);

  impl CheckoutService for CannedCheckout {
    fn create_checkout_session(&self) -> Result<CheckoutSession, ExternalServiceError> {
      Ok(CheckoutSession { session_id: self.0.map(str::to_string) })
    }
  }

  fn booth_with(store: Arc<MemoryStore>, generated: Option<Value>) -> Booth<FakePlatform> {
    let cfg = BoothConfig { meter_interval_ms: 2, ..Default::default() };
    let collab = Collaborators::with_store(
      store,
      Box::new(CannedGenerator(generated)),
      Box::new(CannedCheckout(Some("cs_1"))),
    );
    Booth::new(FakePlatform::default(), &cfg, collab)
  }

  fn booth() -> Booth<FakePlatform> { booth_with(Arc::new(MemoryStore::new()), None) }

  fn graph_reading(b: &Booth<FakePlatform>) -> (f32, f32, f32, f32) {
    let out = b.session().platform().output().unwrap();
    out.render(64).unwrap();
    out
      .with_engine(|e| {
        let g = e.graph();
        (g.bass.gain(), g.compressor.ratio(), g.compressor.threshold(), g.reverb_wet.value())
      })
      .unwrap()
  }

  #[test]
  fn test_live_session_follows_settings_bypass_and_upgrade() {
    let mut b = booth();
    b.toggle_processing().unwrap();
    assert!(b.is_processing());
    b.set_field(SettingsField::BassGain, 6.0);
    b.set_field(SettingsField::CompressorRatio, 4.0);
    b.set_field(SettingsField::CompressorThreshold, -24.0);
    assert_eq!(graph_reading(&b), (6.0, 4.0, -24.0, 0.0));

    b.set_bypassed(true);
    assert_eq!(graph_reading(&b), (0.0, 1.0, 0.0, 0.0));
    b.set_bypassed(false);

    assert_eq!(b.handle_redirect("https://booth.app/?payment_success=true").unwrap(), Some(RedirectMarker::PaymentSuccess));
    assert!(b.is_paid());
    let (_, _, _, reverb) = graph_reading(&b);
    assert!((reverb - 0.1).abs() < 1e-6, "premium reverb now audible: {reverb}");

    b.toggle_processing().unwrap();
    assert!(!b.is_processing());
    assert_eq!(b.gain_reduction(), 0.0);
    assert_eq!(b.elapsed(), Duration::ZERO);
  }

  #[test]
  fn test_settings_changes_while_idle_are_kept() {
    let mut b = booth();
    b.set_field(SettingsField::Reverb, 7.0);
    assert_eq!(b.settings().reverb, 1.0, "clamped");
    b.start().unwrap();
    let applied = b.session().applied().unwrap();
    assert_eq!(applied.reverb.wet, 0.0, "free tier");
    b.reset_settings();
    assert_eq!(*b.settings(), AudioSettings::default());
  }

  #[test]
  fn test_generate() {
    let mut b = booth();
    assert!(matches!(b.generate("   "), Err(BoothError::EmptyPrompt)));
    let err = b.generate("Radio DJ").unwrap_err();
    assert_eq!(err.to_string(), "model overloaded");

    let mut generated = serde_json::to_value(AudioSettings { treble_gain: 3.0, ..Default::default() }).unwrap();
    let mut b = booth_with(Arc::new(MemoryStore::new()), Some(generated.clone()));
    assert_eq!(b.generate("Clear & Bright").unwrap().treble_gain, 3.0);

    generated.as_object_mut().unwrap().remove("saturation");
    let mut b = booth_with(Arc::new(MemoryStore::new()), Some(generated));
    let err = b.generate("Clear & Bright").unwrap_err();
    assert_eq!(err.to_string(), "Server returned an invalid or incomplete response format.");
    assert_eq!(*b.settings(), AudioSettings::default(), "settings untouched");
  }

  #[test]
  fn test_copy_paste() {
    let mut b = booth();
    b.set_field(SettingsField::MidGain, -4.0);
    let copied = b.copy_settings();
    assert!(copied.contains("\"midGain\": -4.0"), "{copied}");

    let mut other = booth();
    assert!(matches!(other.paste_settings("  "), Err(BoothError::EmptyClipboard)));
    let err = other.paste_settings("{\"midGain\": 1}").unwrap_err();
    assert_eq!(err.to_string(), "Failed to paste: Invalid data in clipboard.");
    assert_eq!(*other.settings(), AudioSettings::default());
    other.paste_settings(&copied).unwrap();
    assert_eq!(other.settings(), b.settings());

    let loud = copied.replace("-4.0", "400.0");
    other.paste_settings(&loud).unwrap();
    assert_eq!(other.settings().mid_gain, 20.0);
  }

  #[test]
  fn test_presets_round_trip_through_store() {
    let store = Arc::new(MemoryStore::new());
    let mut b = booth_with(store.clone(), None);
    b.set_field(SettingsField::Saturation, 0.4);
    b.save_preset(" Grit ").unwrap();
    assert_eq!(b.save_preset("grit").unwrap_err().to_string(), "A preset with this name already exists.");
    assert_eq!(b.save_preset("").unwrap_err().to_string(), "Preset name cannot be empty.");
    b.reset_settings();

    let mut fresh = booth_with(store, None);
    assert_eq!(fresh.presets().len(), 1);
    fresh.load_preset("Grit").unwrap();
    assert_eq!(fresh.settings().saturation, 0.4);
    fresh.delete_preset("Grit").unwrap();
    assert!(fresh.presets().is_empty());
    assert!(fresh.load_preset("Grit").is_err());
  }

  #[test]
  fn test_upgrade_and_redirects() {
    let mut b = booth();
    assert_eq!(b.upgrade().unwrap(), "cs_1");
    assert_eq!(b.handle_redirect("https://booth.app/").unwrap(), None);
    let err = b.handle_redirect("https://booth.app/?payment_cancel=true").unwrap_err();
    assert_eq!(err.to_string(), "Payment was cancelled. You can try again anytime.");
    assert!(!b.is_paid());

    let store = Arc::new(MemoryStore::new());
    store.set_fail_writes(true);
    let cfg = BoothConfig::default();
    let collab = Collaborators::with_store(
      store,
      Box::new(CannedGenerator(None)),
      Box::new(CannedCheckout(None)),
    );
    let mut b = Booth::new(FakePlatform::default(), &cfg, collab);
    assert!(matches!(b.upgrade(), Err(BoothError::MissingCheckoutSession)));
    let err = b.handle_redirect("https://booth.app/?payment_success=1").unwrap_err();
    assert_eq!(err.to_string(), "Upgrade successful, but failed to save status. Please refresh.");
    assert!(b.is_paid(), "unlocked for this run anyway");
  }

  #[test]
  fn test_welcome_shown_once() {
    let store = Arc::new(MemoryStore::new());
    let mut b = booth_with(store.clone(), None);
    assert!(b.needs_welcome());
    b.dismiss_welcome().unwrap();
    assert!(!b.needs_welcome());
    assert!(!booth_with(store, None).needs_welcome());
  }

  #[test]
  fn test_recording_kept_after_stop_and_saved() {
    let mut b = booth();
    assert!(matches!(b.toggle_recording(), Err(BoothError::Session(_))));
    b.start().unwrap();
    assert!(b.toggle_recording().unwrap());
    b.session().platform().output().unwrap().render(480).unwrap();
    b.stop();
    assert_eq!(b.last_recording().unwrap().frames, 480);

    let dir = tempfile::tempdir().unwrap();
    let path = b.save_recording(dir.path()).unwrap();
    assert!(path.exists());
    assert!(matches!(b.save_recording(dir.path()), Err(BoothError::NoRecording)));
  }

  #[test]
  fn test_new_session_discards_previous_take() {
    let mut b = booth();
    b.start().unwrap();
    b.toggle_recording().unwrap();
    b.session().platform().output().unwrap().render(64).unwrap();
    b.toggle_recording().unwrap();
    assert!(b.last_recording().is_some());
    b.stop();
    assert!(b.last_recording().is_some(), "kept until the next session");

    b.start().unwrap();
    assert!(b.last_recording().is_none());
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(b.save_recording(dir.path()), Err(BoothError::NoRecording)));
  }
}
