//! Hardware capability for a DAQ card's analog I/O.
//!
//! The vendor driver is treated as an opaque capability with a fixed,
//! task-oriented interface: open a task bound to a physical channel, configure
//! its sample clock, write or read samples, then stop and close it.
//!
//! # Implementations
//!
//! - [`MockDaq`] - Simulated card with loopback, seeded noise and error injection
//!
//! # Example
//!
//! ```
//! use wavegen_daq::hardware::{DaqHardware, MockDaq, PhysicalChannel, SampleClock};
//!
//! # fn main() -> anyhow::Result<()> {
//! let daq = MockDaq::new("Dev1");
//! let channel: PhysicalChannel = "Dev1/ao0".parse()?;
//!
//! let task = daq.open_output_task(&channel)?;
//! daq.configure_clock(task, &SampleClock::continuous(1000.0, 4))?;
//! daq.write(task, &[0.0, 1.0, 0.0, -1.0], true)?;
//! daq.stop(task)?;
//! daq.close(task)?;
//! # Ok(())
//! # }
//! ```

pub mod mock;

pub use mock::{MockDaq, MockDaqBuilder, MockMode};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for hardware operations.
pub type HwResult<T> = std::result::Result<T, HardwareError>;

/// Failure reported by the hardware capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct HardwareError {
    /// Capability operation that failed (e.g. `"read"`)
    pub operation: &'static str,
    /// Driver-supplied description
    pub message: String,
}

impl HardwareError {
    /// Create a new hardware error for `operation`.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Opaque handle to a task opened on the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Direction of an analog task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Analog output (AO)
    Output,
    /// Analog input (AI)
    Input,
}

impl TaskKind {
    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Output => "Analog output",
            Self::Input => "Analog input",
        }
    }
}

/// Sample clock timing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Regenerate the buffer until the task is stopped
    Continuous,
    /// Acquire or generate exactly `samples_per_channel` samples
    Finite,
}

/// Sample clock configuration for one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleClock {
    /// Sample rate in Hz
    pub rate: f64,
    /// Timing mode
    pub mode: SampleMode,
    /// Buffer size (continuous) or acquisition length (finite)
    pub samples_per_channel: usize,
}

impl SampleClock {
    /// Continuous clock regenerating a buffer of `samples_per_channel`.
    pub fn continuous(rate: f64, samples_per_channel: usize) -> Self {
        Self {
            rate,
            mode: SampleMode::Continuous,
            samples_per_channel,
        }
    }

    /// Finite clock acquiring exactly `samples_per_channel`.
    pub fn finite(rate: f64, samples_per_channel: usize) -> Self {
        Self {
            rate,
            mode: SampleMode::Finite,
            samples_per_channel,
        }
    }

    /// Wall-clock time covered by one buffer.
    pub fn buffer_duration(&self) -> std::time::Duration {
        if self.rate > 0.0 {
            std::time::Duration::from_secs_f64(self.samples_per_channel as f64 / self.rate)
        } else {
            std::time::Duration::ZERO
        }
    }
}

/// Physical channel identifier of the form `"<device>/<channel>"`, e.g. `Dev1/ao0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhysicalChannel {
    device: String,
    channel: String,
}

impl PhysicalChannel {
    /// Device part (`Dev1`).
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Channel part (`ao0`).
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Channel index when the channel part is `<prefix><n>`, e.g. `ai3` with prefix `ai`.
    pub fn index_with_prefix(&self, prefix: &str) -> Option<u32> {
        self.channel
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse().ok())
    }
}

/// A channel string that is not of the form `"<device>/<channel>"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Channel '{0}' must have the form <device>/<channel>")]
pub struct InvalidChannel(pub String);

impl FromStr for PhysicalChannel {
    type Err = InvalidChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, channel) = s
            .split_once('/')
            .ok_or_else(|| InvalidChannel(s.to_string()))?;
        if device.is_empty() || channel.is_empty() || channel.contains('/') {
            return Err(InvalidChannel(s.to_string()));
        }
        Ok(Self {
            device: device.to_string(),
            channel: channel.to_string(),
        })
    }
}

impl TryFrom<String> for PhysicalChannel {
    type Error = InvalidChannel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PhysicalChannel> for String {
    fn from(value: PhysicalChannel) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PhysicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.channel)
    }
}

/// Task-oriented analog I/O capability of a DAQ card.
///
/// All methods are synchronous. [`read`](Self::read) blocks for the whole
/// acquisition and must only be called off the UI thread.
pub trait DaqHardware: Send + Sync {
    /// Open an analog output task bound to `channel`.
    fn open_output_task(&self, channel: &PhysicalChannel) -> HwResult<TaskHandle>;

    /// Open an analog input task bound to `channel`.
    fn open_input_task(&self, channel: &PhysicalChannel) -> HwResult<TaskHandle>;

    /// Configure the sample clock of `task`.
    fn configure_clock(&self, task: TaskHandle, clock: &SampleClock) -> HwResult<()>;

    /// Write `samples` to an output task, starting it immediately if `auto_start`.
    ///
    /// Returns the number of samples accepted.
    fn write(&self, task: TaskHandle, samples: &[f64], auto_start: bool) -> HwResult<usize>;

    /// Acquire `num_samples` samples from an input task, blocking until done.
    fn read(&self, task: TaskHandle, num_samples: usize) -> HwResult<Vec<f64>>;

    /// Stop a running task. Stopping an idle task is not an error.
    fn stop(&self, task: TaskHandle) -> HwResult<()>;

    /// Release a task. The handle is invalid afterwards.
    fn close(&self, task: TaskHandle) -> HwResult<()>;
}
