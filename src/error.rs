use thiserror::Error;

/// Failures while acquiring the capture stream. Terminal for the start attempt.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Screen/Tab Capture API not supported.")]
    Unsupported,
    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("No audio track captured. Please share a source with audio.")]
    NoAudioTrack,
    #[error("capture device error: {0}")]
    Device(String),
}

/// A settings record coming from outside (generator, clipboard, storage) failed the structural check.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("settings must be a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` is not a number")]
    NotNumeric(&'static str),
    #[error("nothing to parse")]
    Empty,
    #[error("malformed JSON: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ExternalServiceError {
    /// Message reported by the service itself, surfaced verbatim.
    #[error("{0}")]
    Service(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("Server returned an invalid or incomplete response format.")]
    InvalidResponse,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a processing session is already running")]
    AlreadyActive,
    #[error("no processing session is running")]
    NotActive,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("output device error: {0}")]
    Output(String),
    #[error("recording already stopped for this session; start a new session to record again")]
    RecordingLatched,
    #[error("recorder is not running")]
    NotRecording,
    #[error("recorder is already running")]
    AlreadyRecording,
    #[error("could not finalize recording: {0}")]
    Finalize(String),
}

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Preset name cannot be empty.")]
    EmptyName,
    #[error("A preset with this name already exists.")]
    Duplicate(String),
    #[error("no preset named `{0}`")]
    NotFound(String),
    #[error("Could not save preset. Storage might be full. ({0})")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Everything the booth controller can surface to its front end.
#[derive(Debug, Error)]
pub enum BoothError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Service(#[from] ExternalServiceError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error("Please enter a description for the sound you want.")]
    EmptyPrompt,
    #[error("Clipboard is empty.")]
    EmptyClipboard,
    #[error("Failed to paste: Invalid data in clipboard.")]
    InvalidPaste(#[source] ValidationError),
    #[error("Could not create payment session.")]
    MissingCheckoutSession,
    #[error("Upgrade successful, but failed to save status. Please refresh.")]
    UpgradeNotPersisted(#[source] PersistenceError),
    #[error("Payment was cancelled. You can try again anytime.")]
    PaymentCancelled,
    #[error("no recording available")]
    NoRecording,
}
