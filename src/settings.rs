use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// The flat parameter record that fully determines the effect chain.
///
/// Field values are always kept inside [`SettingsField::range`]; anything
/// arriving from outside goes through [`AudioSettings::parse_external`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    pub bass_gain: f32,
    pub mid_gain: f32,
    pub treble_gain: f32,
    pub compressor_threshold: f32,
    pub compressor_ratio: f32,
    pub reverb: f32,
    pub noise_gate_threshold: f32,
    pub deesser_frequency: f32,
    pub deesser_cut: f32,
    pub saturation: f32,
    pub stereo_width: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            bass_gain: 0.0,
            mid_gain: 0.0,
            treble_gain: 0.0,
            compressor_threshold: -24.0,
            compressor_ratio: 4.0,
            reverb: 0.1,
            noise_gate_threshold: -70.0,
            deesser_frequency: 8000.0,
            deesser_cut: -20.0,
            saturation: 0.0,
            stereo_width: 0.0,
        }
    }
}

/// One named slot of [`AudioSettings`]; what a slider edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    BassGain,
    MidGain,
    TrebleGain,
    CompressorThreshold,
    CompressorRatio,
    Reverb,
    NoiseGateThreshold,
    DeesserFrequency,
    DeesserCut,
    Saturation,
    StereoWidth,
}

impl SettingsField {
    pub const ALL: [SettingsField; 11] = [
        SettingsField::BassGain,
        SettingsField::MidGain,
        SettingsField::TrebleGain,
        SettingsField::CompressorThreshold,
        SettingsField::CompressorRatio,
        SettingsField::Reverb,
        SettingsField::NoiseGateThreshold,
        SettingsField::DeesserFrequency,
        SettingsField::DeesserCut,
        SettingsField::Saturation,
        SettingsField::StereoWidth,
    ];

    /// Wire name, as used in JSON records.
    pub fn key(self) -> &'static str {
        match self {
            SettingsField::BassGain => "bassGain",
            SettingsField::MidGain => "midGain",
            SettingsField::TrebleGain => "trebleGain",
            SettingsField::CompressorThreshold => "compressorThreshold",
            SettingsField::CompressorRatio => "compressorRatio",
            SettingsField::Reverb => "reverb",
            SettingsField::NoiseGateThreshold => "noiseGateThreshold",
            SettingsField::DeesserFrequency => "deesserFrequency",
            SettingsField::DeesserCut => "deesserCut",
            SettingsField::Saturation => "saturation",
            SettingsField::StereoWidth => "stereoWidth",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Inclusive valid range.
    pub fn range(self) -> (f32, f32) {
        match self {
            SettingsField::BassGain | SettingsField::MidGain | SettingsField::TrebleGain => (-20.0, 20.0),
            SettingsField::CompressorThreshold => (-60.0, 0.0),
            SettingsField::CompressorRatio => (1.0, 20.0),
            SettingsField::Reverb | SettingsField::Saturation | SettingsField::StereoWidth => (0.0, 1.0),
            SettingsField::NoiseGateThreshold => (-100.0, 0.0),
            SettingsField::DeesserFrequency => (2000.0, 12000.0),
            SettingsField::DeesserCut => (-40.0, 0.0),
        }
    }

    /// Slider step size in the field's own unit.
    pub fn step(self) -> f32 {
        match self {
            SettingsField::CompressorRatio => 0.1,
            SettingsField::Reverb | SettingsField::Saturation | SettingsField::StereoWidth => 0.01,
            SettingsField::DeesserFrequency => 100.0,
            _ => 1.0,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SettingsField::CompressorRatio => ":1",
            SettingsField::Reverb | SettingsField::Saturation | SettingsField::StereoWidth => "",
            SettingsField::DeesserFrequency => "Hz",
            _ => "dB",
        }
    }

    /// Clamp `value` into range. NaN falls back to the field's default.
    pub fn clamp(self, value: f32) -> f32 {
        if value.is_nan() {
            return AudioSettings::default().get(self);
        }
        let (lo, hi) = self.range();
        value.clamp(lo, hi)
    }
}

impl AudioSettings {
    pub fn get(&self, field: SettingsField) -> f32 {
        match field {
            SettingsField::BassGain => self.bass_gain,
            SettingsField::MidGain => self.mid_gain,
            SettingsField::TrebleGain => self.treble_gain,
            SettingsField::CompressorThreshold => self.compressor_threshold,
            SettingsField::CompressorRatio => self.compressor_ratio,
            SettingsField::Reverb => self.reverb,
            SettingsField::NoiseGateThreshold => self.noise_gate_threshold,
            SettingsField::DeesserFrequency => self.deesser_frequency,
            SettingsField::DeesserCut => self.deesser_cut,
            SettingsField::Saturation => self.saturation,
            SettingsField::StereoWidth => self.stereo_width,
        }
    }

    fn slot(&mut self, field: SettingsField) -> &mut f32 {
        match field {
            SettingsField::BassGain => &mut self.bass_gain,
            SettingsField::MidGain => &mut self.mid_gain,
            SettingsField::TrebleGain => &mut self.treble_gain,
            SettingsField::CompressorThreshold => &mut self.compressor_threshold,
            SettingsField::CompressorRatio => &mut self.compressor_ratio,
            SettingsField::Reverb => &mut self.reverb,
            SettingsField::NoiseGateThreshold => &mut self.noise_gate_threshold,
            SettingsField::DeesserFrequency => &mut self.deesser_frequency,
            SettingsField::DeesserCut => &mut self.deesser_cut,
            SettingsField::Saturation => &mut self.saturation,
            SettingsField::StereoWidth => &mut self.stereo_width,
        }
    }

    /// Set one field, clamped into its range.
    pub fn set(&mut self, field: SettingsField, value: f32) {
        *self.slot(field) = field.clamp(value);
    }

    pub fn clamped(&self) -> Self {
        let mut out = *self;
        for field in SettingsField::ALL {
            out.set(field, self.get(field));
        }
        out
    }

    /// Structural check: an object carrying all eleven fields as numbers.
    /// Extra keys are ignored. The result is not clamped.
    pub fn validate(value: &Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;
        let mut out = Self::default();
        for field in SettingsField::ALL {
            let raw = obj.get(field.key()).ok_or(ValidationError::MissingField(field.key()))?;
            let n = raw.as_f64().ok_or(ValidationError::NotNumeric(field.key()))?;
            *out.slot(field) = n as f32;
        }
        Ok(out)
    }

    /// Validate then clamp; the only way untrusted records enter the app.
    pub fn parse_external(value: &Value) -> Result<Self, ValidationError> {
        Self::validate(value).map(|s| s.clamped())
    }

    /// Parse pasted text into a clamped record.
    pub fn from_clipboard_text(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::Empty);
        }
        let value: Value = serde_json::from_str(text).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::parse_external(&value)
    }

    pub fn to_pretty_json(&self) -> String {
        // Plain struct of f32 fields: serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
