use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use booth_lib::booth::{Booth, Collaborators};
use booth_lib::config::BoothConfig;
use booth_lib::engine::audio::CpalPlatform;
use booth_lib::metering::meter_fill;
use booth_lib::presets::PRESET_PROMPTS;
use booth_lib::settings::AudioSettings;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "tha-booth")]
#[command(about = "Live vocal processing for captured tab audio", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/tha-booth/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, process and play back live
    Run {
        /// Settings JSON file to start from
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Saved preset to start from
        #[arg(short, long)]
        preset: Option<String>,

        /// Describe the sound and let the generator pick settings
        #[arg(long)]
        prompt: Option<String>,

        /// Start with every effect bypassed
        #[arg(long)]
        bypass: bool,

        /// How long to run, in seconds
        #[arg(long, default_value = "60")]
        seconds: u64,

        /// Record the processed output for the whole run
        #[arg(short, long)]
        record: bool,

        /// Where to save the recording (default: documents dir)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// List saved presets
    Presets,
    /// Save a settings file as a named preset
    SavePreset {
        name: String,
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
    /// Delete a saved preset
    DeletePreset { name: String },
    /// Print the quick-pick prompts
    Prompts,
    /// Open a premium checkout and print its session id
    Upgrade,
    /// Handle the URL a checkout redirected back to
    Redirect { url: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn read_settings(path: &Path) -> Result<AudioSettings> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    AudioSettings::parse_external(&value).with_context(|| format!("invalid settings in {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(cli.log_level))
        .try_init();

    let config = BoothConfig::resolve(cli.config.as_deref())?;
    let collab = Collaborators::from_config(&config)?;
    let mut booth = Booth::new(CpalPlatform::new(&config), &config, collab);

    if booth.needs_welcome() {
        println!("Welcome to Tha Booth: share a tab with audio and shape it live.");
        if let Err(e) = booth.dismiss_welcome() {
            log::warn!("could not remember first visit: {e}");
        }
    }

    match cli.command {
        Commands::Run { settings, preset, prompt, bypass, seconds, record, out_dir } => {
            if let Some(path) = settings {
                booth.set_settings(read_settings(&path)?);
            }
            if let Some(name) = preset {
                booth.load_preset(&name)?;
            }
            if let Some(prompt) = prompt {
                booth.generate(&prompt)?;
            }
            booth.set_bypassed(bypass);
            if !booth.is_paid() {
                log::info!("free tier: reverb, width and saturation stay off");
            }

            booth.start()?;
            if record {
                booth.toggle_recording()?;
            }
            let deadline = Instant::now() + Duration::from_secs(seconds);
            let mut next_report = Instant::now();
            while Instant::now() < deadline {
                if Instant::now() >= next_report {
                    let gr = booth.gain_reduction();
                    log::info!(
                        "{} gain reduction {:.1} dB ({:.0}%)",
                        booth.elapsed_display(),
                        gr,
                        meter_fill(gr) * 100.0
                    );
                    next_report += Duration::from_secs(1);
                }
                thread::sleep(Duration::from_millis(50));
            }
            booth.stop();

            if booth.last_recording().is_some() {
                let dir = out_dir.unwrap_or_else(|| config.recordings_root());
                let path = booth.save_recording(&dir)?;
                println!("{}", path.display());
            }
        }
        Commands::Presets => {
            for p in booth.presets() {
                println!("{}", p.name);
            }
        }
        Commands::SavePreset { name, settings } => {
            if let Some(path) = settings {
                booth.set_settings(read_settings(&path)?);
            }
            booth.save_preset(&name)?;
        }
        Commands::DeletePreset { name } => booth.delete_preset(&name)?,
        Commands::Prompts => {
            for p in PRESET_PROMPTS {
                println!("{p}");
            }
        }
        Commands::Upgrade => println!("{}", booth.upgrade()?),
        Commands::Redirect { url } => match booth.handle_redirect(&url)? {
            Some(_) => println!("Upgrade successful! All premium features are now unlocked."),
            None => println!("no payment status in URL"),
        },
    }
    Ok(())
}
