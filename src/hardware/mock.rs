//! Mock DAQ card implementing [`DaqHardware`].
//!
//! Simulates a single multifunction card (NI-style naming, `Dev1/ao0`,
//! `Dev1/ai0`) for tests and for running the application without hardware:
//!
//! - Per-device channel validation (`ao0..aoN` outputs, `ai0..aiN` inputs)
//! - Channel reservation: a channel can belong to one open task at a time
//! - Loopback: input reads sample whatever output buffer is currently running
//! - Seeded uniform noise on input reads
//! - Instant or realistic timing (reads block for `num_samples / rate`)
//! - Error injection: fail every read after the first N
//! - Bookkeeping used by tests (closed handles, concurrent reads)
//!
//! # Example
//!
//! ```
//! use wavegen_daq::hardware::{MockDaq, MockMode};
//!
//! let daq = MockDaq::builder("Dev1")
//!     .mode(MockMode::Realistic)
//!     .noise_volts(0.01)
//!     .seed(42)
//!     .build();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    DaqHardware, HardwareError, HwResult, PhysicalChannel, SampleClock, SampleMode, TaskHandle,
    TaskKind,
};

/// Full-scale output range of the simulated card (±10 V).
pub const OUTPUT_RANGE_VOLTS: f64 = 10.0;

/// Timing behaviour of the mock card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Reads return immediately - for unit tests
    #[default]
    Instant,
    /// Reads block for the acquisition time, like real hardware
    Realistic,
}

#[derive(Debug)]
struct MockTask {
    kind: TaskKind,
    channel: PhysicalChannel,
    clock: Option<SampleClock>,
    running: bool,
    buffer: Vec<f64>,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    tasks: HashMap<TaskHandle, MockTask>,
    closed: Vec<TaskHandle>,
    /// Seconds of simulated signal already consumed by loopback reads
    loopback_time: f64,
}

/// Builder for [`MockDaq`].
#[derive(Debug, Clone)]
pub struct MockDaqBuilder {
    device: String,
    mode: MockMode,
    noise_volts: f64,
    seed: Option<u64>,
    fail_reads_after: Option<u64>,
    ao_channels: u32,
    ai_channels: u32,
}

impl MockDaqBuilder {
    /// Timing mode (default: instant).
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    /// Peak amplitude of uniform noise added to input reads (default: 0).
    pub fn noise_volts(mut self, noise_volts: f64) -> Self {
        self.noise_volts = noise_volts.max(0.0);
        self
    }

    /// Seed the noise generator for reproducible reads.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Seed the noise generator, or draw from the OS when `None`.
    pub fn seed_opt(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Fail every read after `count` successful reads.
    pub fn fail_reads_after(mut self, count: u64) -> Self {
        self.fail_reads_after = Some(count);
        self
    }

    /// Number of analog output / input channels (default: 2 / 16).
    pub fn channels(mut self, ao_channels: u32, ai_channels: u32) -> Self {
        self.ao_channels = ao_channels;
        self.ai_channels = ai_channels;
        self
    }

    /// Build the mock card.
    pub fn build(self) -> MockDaq {
        let rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        debug!(
            device = %self.device,
            mode = ?self.mode,
            noise_volts = self.noise_volts,
            "Created mock DAQ card"
        );

        MockDaq {
            device: self.device,
            mode: self.mode,
            noise_volts: self.noise_volts,
            fail_reads_after: self.fail_reads_after,
            ao_channels: self.ao_channels,
            ai_channels: self.ai_channels,
            state: Mutex::new(MockState::default()),
            rng: Mutex::new(rng),
            reads_completed: AtomicU64::new(0),
            reads_in_flight: AtomicUsize::new(0),
            max_concurrent_reads: AtomicUsize::new(0),
        }
    }
}

/// Simulated multifunction DAQ card.
pub struct MockDaq {
    device: String,
    mode: MockMode,
    noise_volts: f64,
    fail_reads_after: Option<u64>,
    ao_channels: u32,
    ai_channels: u32,
    state: Mutex<MockState>,
    rng: Mutex<ChaCha8Rng>,
    reads_completed: AtomicU64,
    reads_in_flight: AtomicUsize,
    max_concurrent_reads: AtomicUsize,
}

impl MockDaq {
    /// Mock card named `device` with default settings.
    pub fn new(device: &str) -> Self {
        Self::builder(device).build()
    }

    /// Start building a mock card named `device`.
    pub fn builder(device: &str) -> MockDaqBuilder {
        MockDaqBuilder {
            device: device.to_string(),
            mode: MockMode::Instant,
            noise_volts: 0.0,
            seed: None,
            fail_reads_after: None,
            ao_channels: 2,
            ai_channels: 16,
        }
    }

    /// Device name (`Dev1`).
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Number of currently open tasks.
    pub fn open_task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Handles that have been closed, in closing order.
    pub fn closed_handles(&self) -> Vec<TaskHandle> {
        self.state.lock().closed.clone()
    }

    /// Whether `task` is open and running.
    pub fn is_running(&self, task: TaskHandle) -> bool {
        self.state
            .lock()
            .tasks
            .get(&task)
            .is_some_and(|t| t.running)
    }

    /// Last clock configured on `task`.
    pub fn clock(&self, task: TaskHandle) -> Option<SampleClock> {
        self.state.lock().tasks.get(&task).and_then(|t| t.clock)
    }

    /// Channel `task` is bound to.
    pub fn channel(&self, task: TaskHandle) -> Option<PhysicalChannel> {
        self.state
            .lock()
            .tasks
            .get(&task)
            .map(|t| t.channel.clone())
    }

    /// Samples last written to `task`.
    pub fn output_buffer(&self, task: TaskHandle) -> Option<Vec<f64>> {
        self.state.lock().tasks.get(&task).map(|t| t.buffer.clone())
    }

    /// Number of reads that returned data.
    pub fn reads_completed(&self) -> u64 {
        self.reads_completed.load(Ordering::SeqCst)
    }

    /// Highest number of reads ever observed running at the same time.
    pub fn max_concurrent_reads(&self) -> usize {
        self.max_concurrent_reads.load(Ordering::SeqCst)
    }

    fn open_task(&self, kind: TaskKind, channel: &PhysicalChannel) -> HwResult<TaskHandle> {
        let operation = match kind {
            TaskKind::Output => "open_output_task",
            TaskKind::Input => "open_input_task",
        };

        if channel.device() != self.device {
            return Err(HardwareError::new(
                operation,
                format!("device '{}' not found", channel.device()),
            ));
        }

        let (prefix, n_channels) = match kind {
            TaskKind::Output => ("ao", self.ao_channels),
            TaskKind::Input => ("ai", self.ai_channels),
        };
        match channel.index_with_prefix(prefix) {
            Some(index) if index < n_channels => {}
            _ => {
                return Err(HardwareError::new(
                    operation,
                    format!(
                        "'{}' is not a valid {} channel (expected {}0..{}{})",
                        channel,
                        kind.description().to_lowercase(),
                        prefix,
                        prefix,
                        n_channels.saturating_sub(1)
                    ),
                ))
            }
        }

        let mut state = self.state.lock();
        if state.tasks.values().any(|t| &t.channel == channel) {
            return Err(HardwareError::new(
                operation,
                format!("resource '{channel}' is reserved by another task"),
            ));
        }

        state.next_handle += 1;
        let handle = TaskHandle(state.next_handle);
        state.tasks.insert(
            handle,
            MockTask {
                kind,
                channel: channel.clone(),
                clock: None,
                running: false,
                buffer: Vec::new(),
            },
        );

        debug!(%handle, %channel, ?kind, "Opened mock task");
        Ok(handle)
    }

    fn noise(&self, n: usize) -> Vec<f64> {
        if self.noise_volts <= 0.0 {
            return vec![0.0; n];
        }
        let mut rng = self.rng.lock();
        (0..n)
            .map(|_| rng.gen_range(-self.noise_volts..self.noise_volts))
            .collect()
    }
}

fn invalid_handle(operation: &'static str, task: TaskHandle) -> HardwareError {
    HardwareError::new(operation, format!("invalid task handle {task}"))
}

impl DaqHardware for MockDaq {
    fn open_output_task(&self, channel: &PhysicalChannel) -> HwResult<TaskHandle> {
        self.open_task(TaskKind::Output, channel)
    }

    fn open_input_task(&self, channel: &PhysicalChannel) -> HwResult<TaskHandle> {
        self.open_task(TaskKind::Input, channel)
    }

    fn configure_clock(&self, task: TaskHandle, clock: &SampleClock) -> HwResult<()> {
        if clock.rate.is_nan() || clock.rate <= 0.0 || clock.samples_per_channel == 0 {
            return Err(HardwareError::new(
                "configure_clock",
                format!(
                    "invalid timing: {} Hz, {} samples per channel",
                    clock.rate, clock.samples_per_channel
                ),
            ));
        }

        let mut state = self.state.lock();
        let entry = state
            .tasks
            .get_mut(&task)
            .ok_or_else(|| invalid_handle("configure_clock", task))?;
        entry.clock = Some(*clock);

        trace!(%task, rate = clock.rate, mode = ?clock.mode, "Configured mock sample clock");
        Ok(())
    }

    fn write(&self, task: TaskHandle, samples: &[f64], auto_start: bool) -> HwResult<usize> {
        if samples.is_empty() {
            return Err(HardwareError::new("write", "no samples to write"));
        }
        if let Some(v) = samples.iter().find(|v| v.abs() > OUTPUT_RANGE_VOLTS) {
            return Err(HardwareError::new(
                "write",
                format!("sample {v} V outside ±{OUTPUT_RANGE_VOLTS} V output range"),
            ));
        }

        let mut state = self.state.lock();
        let entry = state
            .tasks
            .get_mut(&task)
            .ok_or_else(|| invalid_handle("write", task))?;
        if entry.kind != TaskKind::Output {
            return Err(HardwareError::new("write", format!("{task} is not an output task")));
        }
        if entry.clock.is_none() {
            return Err(HardwareError::new("write", "sample clock not configured"));
        }

        entry.buffer = samples.to_vec();
        entry.running = auto_start;

        debug!(%task, samples = samples.len(), auto_start, "Wrote mock output buffer");
        Ok(samples.len())
    }

    fn read(&self, task: TaskHandle, num_samples: usize) -> HwResult<Vec<f64>> {
        if let Some(limit) = self.fail_reads_after {
            if self.reads_completed.load(Ordering::SeqCst) >= limit {
                return Err(HardwareError::new(
                    "read",
                    format!("injected failure after {limit} reads"),
                ));
            }
        }

        // Snapshot the loopback source so the state lock is not held while sleeping
        let (clock, loopback, start_time) = {
            let mut state = self.state.lock();
            let entry = state
                .tasks
                .get_mut(&task)
                .ok_or_else(|| invalid_handle("read", task))?;
            if entry.kind != TaskKind::Input {
                return Err(HardwareError::new("read", format!("{task} is not an input task")));
            }
            let clock = entry
                .clock
                .ok_or_else(|| HardwareError::new("read", "sample clock not configured"))?;
            if clock.mode == SampleMode::Finite && num_samples > clock.samples_per_channel {
                return Err(HardwareError::new(
                    "read",
                    format!(
                        "requested {num_samples} samples but the finite acquisition holds {}",
                        clock.samples_per_channel
                    ),
                ));
            }
            entry.running = true;

            let loopback = state
                .tasks
                .values()
                .find(|t| t.kind == TaskKind::Output && t.running && !t.buffer.is_empty())
                .and_then(|t| t.clock.map(|c| (t.buffer.clone(), c.rate)));
            let start_time = state.loopback_time;
            state.loopback_time += num_samples as f64 / clock.rate;
            (clock, loopback, start_time)
        };

        let in_flight = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_reads.fetch_max(in_flight, Ordering::SeqCst);

        if self.mode == MockMode::Realistic {
            thread::sleep(SampleClock::finite(clock.rate, num_samples).buffer_duration());
        }

        let mut samples = self.noise(num_samples);
        if let Some((buffer, output_rate)) = loopback {
            for (i, sample) in samples.iter_mut().enumerate() {
                let t = start_time + i as f64 / clock.rate;
                let index = (t * output_rate).round() as usize % buffer.len();
                *sample += buffer[index];
            }
        }

        self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.reads_completed.fetch_add(1, Ordering::SeqCst);

        if let Some(entry) = self.state.lock().tasks.get_mut(&task) {
            entry.running = false;
        }

        trace!(%task, num_samples, "Completed mock read");
        Ok(samples)
    }

    fn stop(&self, task: TaskHandle) -> HwResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .tasks
            .get_mut(&task)
            .ok_or_else(|| invalid_handle("stop", task))?;
        entry.running = false;
        debug!(%task, "Stopped mock task");
        Ok(())
    }

    fn close(&self, task: TaskHandle) -> HwResult<()> {
        let mut state = self.state.lock();
        state
            .tasks
            .remove(&task)
            .ok_or_else(|| invalid_handle("close", task))?;
        state.closed.push(task);
        debug!(%task, "Closed mock task");
        Ok(())
    }
}

impl std::fmt::Debug for MockDaq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDaq")
            .field("device", &self.device)
            .field("mode", &self.mode)
            .field("noise_volts", &self.noise_volts)
            .field("open_tasks", &self.open_task_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(s: &str) -> PhysicalChannel {
        s.parse().unwrap()
    }

    #[test]
    fn test_channel_validation() {
        let daq = MockDaq::new("Dev1");
        assert!(daq.open_output_task(&ch("Dev1/ao0")).is_ok());
        assert!(daq.open_output_task(&ch("Dev1/ao1")).is_ok());

        // Wrong device, wrong direction, out of range
        assert!(daq.open_output_task(&ch("Dev2/ao0")).is_err());
        assert!(daq.open_output_task(&ch("Dev1/ai0")).is_err());
        assert!(daq.open_output_task(&ch("Dev1/ao2")).is_err());
        assert!(daq.open_input_task(&ch("Dev1/ao0")).is_err());
        assert!(daq.open_input_task(&ch("Dev1/ai15")).is_ok());
    }

    #[test]
    fn test_custom_channel_count() {
        let daq = MockDaq::builder("PXI1Slot2").channels(4, 2).build();
        assert_eq!(daq.device(), "PXI1Slot2");
        assert!(daq.open_output_task(&ch("PXI1Slot2/ao3")).is_ok());
        assert!(daq.open_input_task(&ch("PXI1Slot2/ai1")).is_ok());
        assert!(daq.open_input_task(&ch("PXI1Slot2/ai2")).is_err());
    }

    #[test]
    fn test_channel_reservation() {
        let daq = MockDaq::new("Dev1");
        let first = daq.open_input_task(&ch("Dev1/ai0")).unwrap();
        let err = daq.open_input_task(&ch("Dev1/ai0")).unwrap_err();
        assert!(err.message.contains("reserved"));

        daq.close(first).unwrap();
        assert!(daq.open_input_task(&ch("Dev1/ai0")).is_ok());
    }

    #[test]
    fn test_write_requires_clock() {
        let daq = MockDaq::new("Dev1");
        let task = daq.open_output_task(&ch("Dev1/ao0")).unwrap();
        assert!(daq.write(task, &[0.0, 1.0], true).is_err());

        daq.configure_clock(task, &SampleClock::continuous(1000.0, 2))
            .unwrap();
        assert_eq!(daq.write(task, &[0.0, 1.0], true).unwrap(), 2);
        assert!(daq.is_running(task));

        daq.stop(task).unwrap();
        assert!(!daq.is_running(task));
    }

    #[test]
    fn test_write_rejects_out_of_range() {
        let daq = MockDaq::new("Dev1");
        let task = daq.open_output_task(&ch("Dev1/ao0")).unwrap();
        daq.configure_clock(task, &SampleClock::continuous(1000.0, 2))
            .unwrap();
        assert!(daq.write(task, &[0.0, 10.5], true).is_err());
        assert!(daq.write(task, &[], true).is_err());
    }

    #[test]
    fn test_read_loops_back_output() {
        let daq = MockDaq::new("Dev1");
        let ao = daq.open_output_task(&ch("Dev1/ao0")).unwrap();
        daq.configure_clock(ao, &SampleClock::continuous(4.0, 4))
            .unwrap();
        daq.write(ao, &[0.0, 1.0, 0.0, -1.0], true).unwrap();

        let ai = daq.open_input_task(&ch("Dev1/ai0")).unwrap();
        daq.configure_clock(ai, &SampleClock::finite(4.0, 8)).unwrap();
        let samples = daq.read(ai, 8).unwrap();
        assert_eq!(samples, vec![0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0]);

        // Stopped output reads back as silence
        daq.stop(ao).unwrap();
        let samples = daq.read(ai, 8).unwrap();
        assert!(samples.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_noise_is_bounded_and_seeded() {
        let make = || {
            let daq = MockDaq::builder("Dev1").noise_volts(0.05).seed(7).build();
            let ai = daq.open_input_task(&ch("Dev1/ai0")).unwrap();
            daq.configure_clock(ai, &SampleClock::finite(1000.0, 100))
                .unwrap();
            daq.read(ai, 100).unwrap()
        };
        let a = make();
        let b = make();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.abs() <= 0.05));
    }

    #[test]
    fn test_injected_read_failure() {
        let daq = MockDaq::builder("Dev1").fail_reads_after(2).build();
        let ai = daq.open_input_task(&ch("Dev1/ai0")).unwrap();
        daq.configure_clock(ai, &SampleClock::finite(1000.0, 10))
            .unwrap();

        assert!(daq.read(ai, 10).is_ok());
        assert!(daq.read(ai, 10).is_ok());
        let err = daq.read(ai, 10).unwrap_err();
        assert_eq!(err.operation, "read");
        assert_eq!(daq.reads_completed(), 2);
    }

    #[test]
    fn test_close_twice_is_error() {
        let daq = MockDaq::new("Dev1");
        let task = daq.open_output_task(&ch("Dev1/ao0")).unwrap();
        daq.close(task).unwrap();
        assert!(daq.close(task).is_err());
        assert!(daq.stop(task).is_err());
        assert_eq!(daq.closed_handles(), vec![task]);
        assert_eq!(daq.open_task_count(), 0);
    }

    #[test]
    fn test_realistic_read_blocks() {
        let daq = MockDaq::builder("Dev1").mode(MockMode::Realistic).build();
        let ai = daq.open_input_task(&ch("Dev1/ai0")).unwrap();
        daq.configure_clock(ai, &SampleClock::finite(1000.0, 50))
            .unwrap();

        let start = std::time::Instant::now();
        daq.read(ai, 50).unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(50));
    }
}
