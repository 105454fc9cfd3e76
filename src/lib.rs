pub mod engine {
  pub mod audio;
  pub mod capture;
  pub mod dsp;
  pub mod graph;
  pub mod messages;
  pub mod params;
  pub mod state;
}
pub mod analysis;
pub mod booth;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod metering;
pub mod presets;
pub mod recorder;
pub mod services;
pub mod session;
pub mod settings;
pub mod store;

#[cfg(test)]
mod testing;

pub use booth::{Booth, Collaborators};
pub use config::BoothConfig;
pub use error::BoothError;
pub use settings::{AudioSettings, SettingsField};
