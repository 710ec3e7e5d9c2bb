//! # Waveform Generator Core Library
//!
//! This crate generates periodic analog waveforms, streams them to the analog
//! output of a data-acquisition card, and monitors an analog input of the same
//! card in the background. The binary (`main.rs`) drives it from the command
//! line against a simulated card; a GUI front-end would drive the same
//! [`ControlPanel`] through a [`PresentationSink`] of its own.
//!
//! ## Crate Structure
//!
//! - **`waveform`**: Pure waveform math. Maps a validated [`WaveformRequest`] to
//!   a time grid plus amplitudes for sine, square, triangle and sawtooth shapes.
//! - **`validation`**: Positivity and Nyquist checks on waveform parameters, and
//!   the buffer-size rule `floor(duration × sample_rate)`.
//! - **`hardware`**: The [`DaqHardware`] capability trait (task-oriented analog
//!   I/O) and [`MockDaq`], a simulated card with loopback and error injection.
//! - **`session`**: [`AcquisitionSession`], owning at most one output and one
//!   input task with "configured before used" ordering.
//! - **`monitor`**: [`MonitorLoop`], one cancellable background thread reading
//!   fixed batches and forwarding them to the presentation sink.
//! - **`presentation`**: The [`PresentationSink`] trait plus logging and
//!   recording implementations.
//! - **`app`**: [`ControlPanel`], turning operator intents into component calls.
//! - **`config`**: Figment-based configuration with built-in defaults.
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`error`**: The crate-wide [`DaqError`] enum.
//!
//! [`WaveformRequest`]: waveform::WaveformRequest
//! [`DaqHardware`]: hardware::DaqHardware
//! [`MockDaq`]: hardware::MockDaq
//! [`AcquisitionSession`]: session::AcquisitionSession
//! [`MonitorLoop`]: monitor::MonitorLoop
//! [`PresentationSink`]: presentation::PresentationSink
//! [`ControlPanel`]: app::ControlPanel

pub mod app;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod monitor;
pub mod presentation;
pub mod session;
pub mod validation;
pub mod waveform;

pub use error::{DaqError, ParameterError, Result};
