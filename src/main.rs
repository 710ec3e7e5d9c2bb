//! CLI entry point for the waveform generator.
//!
//! Provides commands for:
//! - Previewing a waveform (validation plus a summary of the generated samples)
//! - Running output and live monitoring against the simulated card
//!
//! # Usage
//!
//! Preview a 5 Hz triangle:
//! ```bash
//! wavegen preview --shape triangle --frequency 5
//! ```
//!
//! Stream the configured waveform and monitor the input for ten seconds:
//! ```bash
//! wavegen run --config config/wavegen.toml --seconds 10
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use wavegen_daq::app::{preview_title, ControlPanel};
use wavegen_daq::config::{AppConfig, DEFAULT_CONFIG_PATH};
use wavegen_daq::logging::{self, TracingConfig};
use wavegen_daq::presentation::{PresentationSink, TracingSink};
use wavegen_daq::waveform::{generate, Shape, WaveformRequest};

#[derive(Parser)]
#[command(name = "wavegen")]
#[command(about = "Periodic waveform output and live input monitoring for a DAQ card", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate parameters and summarize the generated waveform
    Preview {
        /// Waveform shape
        #[arg(long, value_enum, default_value_t = Shape::Sine)]
        shape: Shape,

        /// Frequency in Hz
        #[arg(long, default_value_t = 1.0)]
        frequency: f64,

        /// Peak amplitude in volts
        #[arg(long, default_value_t = 1.0)]
        amplitude: f64,

        /// Duration in seconds
        #[arg(long, default_value_t = 1.0)]
        duration: f64,

        /// Sample rate in S/s
        #[arg(long, default_value_t = 1000)]
        sample_rate: u32,
    },

    /// Stream the configured waveform and monitor the input channel
    Run {
        /// Configuration file (TOML). Defaults to config/wavegen.toml if present
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Preview {
            shape,
            frequency,
            amplitude,
            duration,
            sample_rate,
        } => preview(shape, frequency, amplitude, duration, sample_rate),
        Commands::Run { config, seconds } => run(config, seconds).await,
    }
}

fn preview(
    shape: Shape,
    frequency: f64,
    amplitude: f64,
    duration: f64,
    sample_rate: u32,
) -> Result<()> {
    logging::init(TracingConfig::default())?;

    let request = WaveformRequest::new(shape, frequency, amplitude, duration, sample_rate)
        .context("Invalid waveform parameters")?;
    let waveform = generate(&request)?;

    let title = preview_title(shape);
    TracingSink.render_preview(&waveform.times, &waveform.amplitudes, &title);

    println!("{title}");
    println!("   Samples:     {}", waveform.len());
    println!("   Sample rate: {sample_rate} S/s");
    println!("   Duration:    {duration} s");
    if let Some((min, max)) = waveform.peak_to_peak() {
        println!("   Range:       {min:.4} V .. {max:.4} V");
    }
    Ok(())
}

async fn run(config_path: Option<PathBuf>, seconds: Option<u64>) -> Result<()> {
    let config = match &config_path {
        Some(path) if !path.exists() => bail!("Config file not found: {}", path.display()),
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load_from(DEFAULT_CONFIG_PATH),
    }
    .context("Failed to load configuration")?;
    config.validate()?;

    logging::init_from_config(&config)?;
    info!(name = %config.application.name, "Starting");

    let hardware = Arc::new(config.mock_daq());
    let sink = Arc::new(TracingSink);
    let mut panel = ControlPanel::new(hardware, sink, config.panel_settings()?);

    let started = panel
        .on_start_output()
        .and_then(|_| panel.on_start_monitoring());
    if let Err(e) = started {
        if let Err(cleanup) = panel.shutdown() {
            warn!(error = %cleanup, "Cleanup after failed start also failed");
        }
        return Err(e.into());
    }

    let waited = wait_for_stop(seconds).await;

    // Tasks are released even if waiting for the stop signal failed
    if let Some(report) = panel.on_stop_monitoring() {
        info!(iterations = report.iterations, outcome = ?report.outcome, "Monitor finished");
    }
    let stopped = panel.on_stop_output();
    let shut_down = panel.shutdown();

    waited.context("Failed to wait for Ctrl+C")?;
    stopped?;
    shut_down?;
    Ok(())
}

async fn wait_for_stop(seconds: Option<u64>) -> std::io::Result<()> {
    match seconds {
        Some(secs) => {
            info!(seconds = secs, "Running, press Ctrl+C to stop early");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => Ok(()),
                result = signal::ctrl_c() => result,
            }
        }
        None => {
            info!("Running, press Ctrl+C to stop");
            signal::ctrl_c().await
        }
    }
}
