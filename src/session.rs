//! Acquisition session over a [`DaqHardware`] card.
//!
//! The session owns at most one analog output task and one analog input task.
//! Each kind follows the same lifecycle:
//!
//! ```text
//! Unconfigured --configure_*--> Configured --stop--> Unconfigured
//!                                   |  ^
//!                                   +--+ configure_* (release, then reopen)
//! ```
//!
//! ## Concurrency
//!
//! Both task handles live behind a single [`parking_lot::Mutex`]. A read holds
//! the lock for the whole blocking acquisition, so a foreground `stop` or
//! reconfiguration waits for an in-flight read to finish instead of closing
//! the task underneath it. Share the session between the foreground and the
//! monitor worker as `Arc<AcquisitionSession>`.
//!
//! ## Teardown
//!
//! Tasks are released by [`AcquisitionSession::stop`], which is idempotent.
//! [`with_session`] runs a closure and always calls `stop` afterwards.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{DaqError, Result};
use crate::hardware::{DaqHardware, HwResult, PhysicalChannel, SampleClock, TaskHandle, TaskKind};
use crate::waveform::linspace;

/// Lifecycle state of one task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No task is open
    Unconfigured,
    /// A task is open and bound to a channel
    Configured,
}

/// One batch of samples acquired by [`AcquisitionSession::read`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorBatch {
    /// Sample instants relative to the start of the batch, in seconds
    pub times: Vec<f64>,
    /// Measured voltages
    pub samples: Vec<f64>,
}

impl MonitorBatch {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the batch holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone)]
struct OpenTask {
    handle: TaskHandle,
    channel: PhysicalChannel,
}

#[derive(Debug, Default)]
struct Tasks {
    output: Option<OpenTask>,
    input: Option<OpenTask>,
}

impl Tasks {
    fn slot(&mut self, kind: TaskKind) -> &mut Option<OpenTask> {
        match kind {
            TaskKind::Output => &mut self.output,
            TaskKind::Input => &mut self.input,
        }
    }
}

/// Owns the analog output and input tasks of one card.
pub struct AcquisitionSession {
    hardware: Arc<dyn DaqHardware>,
    tasks: Mutex<Tasks>,
}

impl AcquisitionSession {
    /// Create a session with no open tasks.
    pub fn new(hardware: Arc<dyn DaqHardware>) -> Self {
        Self {
            hardware,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Open the analog output task on `channel`, releasing any previous one.
    pub fn configure_output(&self, channel: &PhysicalChannel) -> Result<()> {
        self.configure(TaskKind::Output, channel)
    }

    /// Open the analog input task on `channel`, releasing any previous one.
    pub fn configure_input(&self, channel: &PhysicalChannel) -> Result<()> {
        self.configure(TaskKind::Input, channel)
    }

    fn configure(&self, kind: TaskKind, channel: &PhysicalChannel) -> Result<()> {
        let mut tasks = self.tasks.lock();

        if let Some(previous) = tasks.slot(kind).take() {
            if let Err(e) = release(self.hardware.as_ref(), &previous) {
                warn!(
                    task = %previous.handle,
                    channel = %previous.channel,
                    error = %e,
                    "Failed to release previous task, continuing"
                );
            }
        }

        let handle = match kind {
            TaskKind::Output => self.hardware.open_output_task(channel)?,
            TaskKind::Input => self.hardware.open_input_task(channel)?,
        };

        info!(task = %handle, %channel, "{} task configured", kind.description());
        *tasks.slot(kind) = Some(OpenTask {
            handle,
            channel: channel.clone(),
        });
        Ok(())
    }

    /// Stream `samples` continuously on the output task at `sample_rate`.
    ///
    /// The buffer is regenerated by the card until the output is stopped.
    /// Returns the number of samples written.
    pub fn write(&self, samples: &[f64], sample_rate: u32) -> Result<usize> {
        if samples.is_empty() {
            return Err(DaqError::InvalidRequest("no samples to write".to_string()));
        }
        if sample_rate == 0 {
            return Err(DaqError::InvalidRequest(
                "sample rate must be positive".to_string(),
            ));
        }

        let tasks = self.tasks.lock();
        let task = tasks
            .output
            .as_ref()
            .ok_or(DaqError::NotConfigured(TaskKind::Output))?;

        let clock = SampleClock::continuous(f64::from(sample_rate), samples.len());
        self.hardware.configure_clock(task.handle, &clock)?;
        let written = self.hardware.write(task.handle, samples, true)?;

        debug!(task = %task.handle, written, sample_rate, "Output started");
        Ok(written)
    }

    /// Acquire `num_samples` from the input task at `sample_rate`.
    ///
    /// Blocks for the duration of the acquisition (`num_samples / sample_rate`
    /// seconds on real hardware) while holding the session lock.
    pub fn read(&self, num_samples: usize, sample_rate: u32) -> Result<MonitorBatch> {
        if num_samples == 0 || sample_rate == 0 {
            return Err(DaqError::InvalidRequest(format!(
                "cannot read {num_samples} samples at {sample_rate} S/s"
            )));
        }

        let tasks = self.tasks.lock();
        let task = tasks
            .input
            .as_ref()
            .ok_or(DaqError::NotConfigured(TaskKind::Input))?;

        let rate = f64::from(sample_rate);
        self.hardware
            .configure_clock(task.handle, &SampleClock::finite(rate, num_samples))?;
        let samples = self.hardware.read(task.handle, num_samples)?;

        let times = linspace(0.0, num_samples as f64 / rate, samples.len());
        Ok(MonitorBatch { times, samples })
    }

    /// Halt the output task without releasing it. No-op when unconfigured.
    pub fn stop_output(&self) -> Result<()> {
        let tasks = self.tasks.lock();
        if let Some(task) = tasks.output.as_ref() {
            self.hardware.stop(task.handle)?;
            info!(task = %task.handle, "Output stopped");
        }
        Ok(())
    }

    /// Release both tasks.
    ///
    /// Idempotent: calling it with no open tasks succeeds. Every release is
    /// attempted; the first hardware error encountered is returned.
    pub fn stop(&self) -> Result<()> {
        let (output, input) = {
            let mut tasks = self.tasks.lock();
            (tasks.output.take(), tasks.input.take())
        };

        let mut first_error = None;
        for task in output.iter().chain(input.iter()) {
            match release(self.hardware.as_ref(), task) {
                Ok(()) => debug!(task = %task.handle, "Task released"),
                Err(e) => {
                    warn!(task = %task.handle, error = %e, "Failed to release task");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// State of the output task.
    pub fn output_state(&self) -> TaskState {
        state_of(&self.tasks.lock().output)
    }

    /// State of the input task.
    pub fn input_state(&self) -> TaskState {
        state_of(&self.tasks.lock().input)
    }
}

impl std::fmt::Debug for AcquisitionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("tasks", &*self.tasks.lock())
            .finish_non_exhaustive()
    }
}

fn state_of(slot: &Option<OpenTask>) -> TaskState {
    match slot {
        Some(_) => TaskState::Configured,
        None => TaskState::Unconfigured,
    }
}

/// Stop then close a task, attempting both. Returns the first failure.
fn release(hardware: &dyn DaqHardware, task: &OpenTask) -> HwResult<()> {
    let stopped = hardware.stop(task.handle);
    let closed = hardware.close(task.handle);
    stopped.and(closed)
}

struct StopOnDrop<'a>(&'a AcquisitionSession);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            warn!(error = %e, "Session teardown reported an error");
        }
    }
}

/// Run `f` with a fresh session, releasing every task afterwards.
///
/// Teardown runs on normal return, early return through `?` inside `f`, and
/// unwinding.
pub fn with_session<T>(
    hardware: Arc<dyn DaqHardware>,
    f: impl FnOnce(&AcquisitionSession) -> T,
) -> T {
    let session = AcquisitionSession::new(hardware);
    let _guard = StopOnDrop(&session);
    f(&session)
}
