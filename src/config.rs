//! Configuration loading using Figment.
//!
//! Configuration is built from two layers, later layers overriding earlier:
//! 1. Built-in defaults ([`AppConfig::default`])
//! 2. `config/wavegen.toml` (or the file passed with `--config`), if present
//!
//! Every key is optional in the file; a missing file yields the defaults.
//!
//! # Example
//! ```no_run
//! use wavegen_daq::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Output channel: {}", config.output.channel);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::app::{PanelSettings, ParameterForm};
use crate::error::{DaqError, Result};
use crate::hardware::{MockDaq, MockMode, PhysicalChannel};
use crate::logging::{parse_log_level, OutputFormat};
use crate::monitor::MonitorConfig;
use crate::validation::validate;
use crate::waveform::Shape;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/wavegen.toml";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Analog output settings
    pub output: OutputConfig,
    /// Analog input settings
    pub input: InputConfig,
    /// Monitor loop settings
    pub monitor: MonitorSettings,
    /// Initial waveform parameters
    pub waveform: WaveformConfig,
    /// Simulated card used when no hardware is attached
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Waveform Generator".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
        }
    }
}

/// Analog output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Physical output channel, e.g. `Dev1/ao0`
    pub channel: String,
    /// Output sample rate in S/s
    pub sample_rate: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channel: "Dev1/ao0".to_string(),
            sample_rate: 1000,
        }
    }
}

/// Analog input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Physical input channel, e.g. `Dev1/ai0`
    pub channel: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            channel: "Dev1/ai0".to_string(),
        }
    }
}

/// Monitor loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Samples per batch
    pub num_samples: usize,
    /// Input sample rate in S/s
    pub sample_rate: u32,
    /// Delay between batches in milliseconds
    pub interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            num_samples: defaults.num_samples,
            sample_rate: defaults.sample_rate,
            interval_ms: defaults.interval.as_millis() as u64,
        }
    }
}

impl From<&MonitorSettings> for MonitorConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            num_samples: settings.num_samples,
            sample_rate: settings.sample_rate,
            interval: Duration::from_millis(settings.interval_ms),
        }
    }
}

/// Initial waveform parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfig {
    /// Waveform shape
    pub shape: Shape,
    /// Frequency in Hz
    pub frequency: f64,
    /// Amplitude in volts
    pub amplitude: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            shape: Shape::Sine,
            frequency: 1.0,
            amplitude: 1.0,
            duration: 1.0,
        }
    }
}

/// Simulated card configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Device name the simulated card answers to
    pub device: String,
    /// Timing mode
    pub mode: MockMode,
    /// Peak noise added to input reads, in volts
    pub noise_volts: f64,
    /// Noise seed; random when absent
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            device: "Dev1".to_string(),
            mode: MockMode::Realistic,
            noise_volts: 0.01,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`]
    pub fn load() -> std::result::Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; the defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::result::Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        parse_log_level(&self.application.log_level)?;

        self.output_channel()?;
        self.input_channel()?;

        if self.output.sample_rate == 0 {
            return Err(DaqError::Configuration(
                "output.sample_rate must be positive".to_string(),
            ));
        }
        if self.monitor.num_samples == 0 {
            return Err(DaqError::Configuration(
                "monitor.num_samples must be positive".to_string(),
            ));
        }
        if self.monitor.sample_rate == 0 {
            return Err(DaqError::Configuration(
                "monitor.sample_rate must be positive".to_string(),
            ));
        }
        let noise = self.simulation.noise_volts;
        if noise.is_nan() || noise < 0.0 {
            return Err(DaqError::Configuration(format!(
                "simulation.noise_volts must not be negative, got {noise}"
            )));
        }

        let w = &self.waveform;
        validate(w.frequency, w.amplitude, w.duration, self.output.sample_rate)
            .map_err(|e| DaqError::Configuration(format!("waveform: {e}")))?;

        Ok(())
    }

    /// Parsed output channel
    pub fn output_channel(&self) -> Result<PhysicalChannel> {
        parse_channel("output.channel", &self.output.channel)
    }

    /// Parsed input channel
    pub fn input_channel(&self) -> Result<PhysicalChannel> {
        parse_channel("input.channel", &self.input.channel)
    }

    /// Settings for the control panel
    pub fn panel_settings(&self) -> Result<PanelSettings> {
        let w = &self.waveform;
        Ok(PanelSettings {
            output_channel: self.output_channel()?,
            input_channel: self.input_channel()?,
            output_sample_rate: self.output.sample_rate,
            monitor: MonitorConfig::from(&self.monitor),
            initial_form: ParameterForm {
                shape: w.shape,
                frequency: w.frequency.to_string(),
                amplitude: w.amplitude.to_string(),
                duration: w.duration.to_string(),
            },
        })
    }

    /// Simulated card described by the `simulation` section
    pub fn mock_daq(&self) -> MockDaq {
        let s = &self.simulation;
        MockDaq::builder(&s.device)
            .mode(s.mode)
            .noise_volts(s.noise_volts)
            .seed_opt(s.seed)
            .build()
    }
}

fn parse_channel(key: &str, value: &str) -> Result<PhysicalChannel> {
    value
        .parse()
        .map_err(|e| DaqError::Configuration(format!("{key}: {e}")))
}
