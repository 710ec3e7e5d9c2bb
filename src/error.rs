//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it gives one consistent way to report the
//! failures that can happen between a parameter edit and a voltage on the wire.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidParameter`**: a waveform parameter failed validation (or could not be
//!   parsed at all). Carries the first violated constraint as a [`ParameterError`].
//! - **`InvalidRequest`**: the parameters are individually valid but the request
//!   cannot be acted on, e.g. a duration/sample-rate pair that yields zero samples.
//! - **`NotConfigured`**: a task was used before `configure_output`/`configure_input`.
//! - **`Hardware`**: a call into the [`DaqHardware`](crate::hardware::DaqHardware)
//!   capability failed. Propagated as-is, never retried.
//! - **`Configuration`**: semantic errors in the loaded configuration.
//! - **`Io`**: operating-system failures such as spawning the monitor thread.

use thiserror::Error;

use crate::hardware::{HardwareError, TaskKind};

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, DaqError>;

/// Errors produced by the waveform engine, the acquisition session and the monitor loop.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A waveform parameter failed validation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ParameterError),

    /// The request is well-formed but cannot be executed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The task required by the operation has not been configured.
    #[error("{} task not initialized", .0.description())]
    NotConfigured(TaskKind),

    /// The hardware capability reported a failure.
    #[error("Hardware failure: {0}")]
    Hardware(#[from] HardwareError),

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// True if the error stems from user-supplied parameters rather than hardware.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidParameter(_) | Self::InvalidRequest(_))
    }
}

/// The first violated waveform-parameter constraint.
///
/// Variants are listed in the order the validator checks them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A text field could not be parsed as a number.
    #[error("{field} must be a number, got '{value}'")]
    NotANumber {
        /// Human-readable field name
        field: &'static str,
        /// The raw text that failed to parse
        value: String,
    },

    /// Frequency is zero, negative or NaN.
    #[error("Frequency must be positive")]
    FrequencyNotPositive,

    /// Amplitude is zero, negative or NaN.
    #[error("Amplitude must be positive")]
    AmplitudeNotPositive,

    /// Duration is zero, negative or NaN.
    #[error("Duration must be positive")]
    DurationNotPositive,

    /// Sample rate is zero.
    #[error("Sample rate must be positive")]
    SampleRateNotPositive,

    /// frequency × 2 exceeds the sample rate.
    #[error("Sample rate must be at least twice the frequency (Nyquist criterion)")]
    NyquistViolation {
        /// Requested frequency in Hz
        frequency: f64,
        /// Requested sample rate in S/s
        sample_rate: u32,
    },
}
