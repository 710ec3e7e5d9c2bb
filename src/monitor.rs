//! Background monitor loop.
//!
//! One dedicated thread repeatedly reads a fixed-size batch from the
//! [`AcquisitionSession`] and pushes it to the [`PresentationSink`]:
//!
//! ```text
//! loop {
//!     cancelled?      -> exit (Cancelled)
//!     session.read()  -> error: log, report, exit (Failed)
//!     sink.render_monitor_frame()
//!     wait interval on the cancel channel -> signalled: exit (Cancelled)
//! }
//! ```
//!
//! Reads never overlap: there is at most one worker, and [`MonitorLoop::start`]
//! stops and joins the previous one before spawning. Cancellation is checked
//! between iterations, so [`MonitorLoop::stop`] may wait for up to one read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{DaqError, Result};
use crate::presentation::PresentationSink;
use crate::session::AcquisitionSession;

/// Batch size and cadence of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Samples acquired per iteration
    pub num_samples: usize,
    /// Input sample rate in S/s
    pub sample_rate: u32,
    /// Delay between iterations
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            num_samples: 1000,
            sample_rate: 1000,
            interval: Duration::from_millis(100),
        }
    }
}

/// Why the worker exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    /// Stopped on request
    Cancelled,
    /// A read failed; carries the error message
    Failed(String),
}

/// Summary returned when a worker is joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    /// Batches successfully rendered
    pub iterations: u64,
    /// Exit reason
    pub outcome: MonitorExit,
}

struct Worker {
    cancel: mpsc::Sender<()>,
    handle: JoinHandle<MonitorReport>,
}

/// Cancellable background reader feeding the live plot.
pub struct MonitorLoop {
    session: Arc<AcquisitionSession>,
    sink: Arc<dyn PresentationSink>,
    config: MonitorConfig,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl MonitorLoop {
    /// Create an idle loop. Nothing runs until [`start`](Self::start).
    pub fn new(
        session: Arc<AcquisitionSession>,
        sink: Arc<dyn PresentationSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            session,
            sink,
            config,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. The input task must already be configured.
    ///
    /// A previous worker, if any, is stopped and joined first.
    pub fn start(&self) -> Result<()> {
        if self.config.num_samples == 0 || self.config.sample_rate == 0 {
            return Err(DaqError::InvalidRequest(format!(
                "monitor batch of {} samples at {} S/s",
                self.config.num_samples, self.config.sample_rate
            )));
        }

        if let Some(report) = self.stop() {
            debug!(iterations = report.iterations, "Replaced previous monitor worker");
        }

        let (cancel, cancelled) = mpsc::channel();
        let session = Arc::clone(&self.session);
        let sink = Arc::clone(&self.sink);
        let running = Arc::clone(&self.running);
        let config = self.config;

        self.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("monitor-loop".to_string())
            .spawn(move || {
                let report = run(&session, sink.as_ref(), &config, &cancelled);
                running.store(false, Ordering::SeqCst);
                report
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        *self.worker.lock() = Some(Worker { cancel, handle });
        info!(
            num_samples = config.num_samples,
            sample_rate = config.sample_rate,
            interval_ms = config.interval.as_millis() as u64,
            "Monitoring started"
        );
        Ok(())
    }

    /// Signal cancellation and join the worker.
    ///
    /// Returns `None` if no worker was started since the last stop.
    pub fn stop(&self) -> Option<MonitorReport> {
        let worker = self.worker.lock().take()?;

        // The worker may have exited on its own already; a closed channel is fine
        let _ = worker.cancel.send(());

        match worker.handle.join() {
            Ok(report) => {
                info!(iterations = report.iterations, outcome = ?report.outcome, "Monitoring stopped");
                Some(report)
            }
            Err(e) => {
                error!("Monitor thread panicked: {:?}", e);
                self.running.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    /// True while the worker is iterating.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for MonitorLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    session: &AcquisitionSession,
    sink: &dyn PresentationSink,
    config: &MonitorConfig,
    cancelled: &mpsc::Receiver<()>,
) -> MonitorReport {
    let mut iterations = 0;

    let outcome = loop {
        match cancelled.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break MonitorExit::Cancelled,
            Err(TryRecvError::Empty) => {}
        }

        match session.read(config.num_samples, config.sample_rate) {
            Ok(batch) => {
                sink.render_monitor_frame(&batch.times, &batch.samples);
                iterations += 1;
            }
            Err(e) => {
                error!(error = %e, iterations, "Monitor read failed, stopping");
                sink.report_error(&format!("Monitoring error: {e}"));
                break MonitorExit::Failed(e.to_string());
            }
        }

        match cancelled.recv_timeout(config.interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break MonitorExit::Cancelled,
            Err(RecvTimeoutError::Timeout) => {}
        }
    };

    debug!(iterations, "Monitor thread exiting");
    MonitorReport {
        iterations,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockDaq;
    use crate::presentation::RecordingSink;
    use std::time::Instant;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            num_samples: 50,
            sample_rate: 1000,
            interval: Duration::from_millis(5),
        }
    }

    fn setup(daq: MockDaq) -> (Arc<AcquisitionSession>, Arc<RecordingSink>) {
        let session = Arc::new(AcquisitionSession::new(Arc::new(daq)));
        session
            .configure_input(&"Dev1/ai0".parse().unwrap())
            .unwrap();
        (session, Arc::new(RecordingSink::new()))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.num_samples, 1000);
        assert_eq!(config.sample_rate, 1000);
        assert_eq!(config.interval, Duration::from_millis(100));
    }

    #[test]
    fn test_start_and_stop() {
        let (session, sink) = setup(MockDaq::new("Dev1"));
        let monitor = MonitorLoop::new(session, sink.clone(), fast_config());

        assert!(monitor.stop().is_none());
        monitor.start().unwrap();
        assert!(monitor.is_running());

        wait_for(|| sink.frame_count() >= 3);
        let report = monitor.stop().unwrap();
        assert_eq!(report.outcome, MonitorExit::Cancelled);
        assert!(report.iterations >= 3);
        assert!(!monitor.is_running());

        let frame = &sink.frames()[0];
        assert_eq!(frame.samples.len(), 50);
        assert_eq!(frame.times.len(), 50);
    }

    #[test]
    fn test_stop_during_wait_is_prompt() {
        let (session, sink) = setup(MockDaq::new("Dev1"));
        let config = MonitorConfig {
            interval: Duration::from_secs(30),
            ..fast_config()
        };
        let monitor = MonitorLoop::new(session, sink.clone(), config);
        monitor.start().unwrap();
        wait_for(|| sink.frame_count() >= 1);

        let start = Instant::now();
        let report = monitor.stop().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn test_read_failure_ends_loop() {
        let (session, sink) = setup(MockDaq::builder("Dev1").fail_reads_after(2).build());
        let monitor = MonitorLoop::new(session, sink.clone(), fast_config());
        monitor.start().unwrap();

        wait_for(|| !monitor.is_running());
        assert_eq!(sink.frame_count(), 2);
        assert_eq!(sink.errors().len(), 1);
        assert!(sink.errors()[0].contains("injected failure"));

        let report = monitor.stop().unwrap();
        assert_eq!(report.iterations, 2);
        assert!(matches!(report.outcome, MonitorExit::Failed(_)));
    }

    #[test]
    fn test_unconfigured_input_reports_error() {
        let session = Arc::new(AcquisitionSession::new(Arc::new(MockDaq::new("Dev1"))));
        let sink = Arc::new(RecordingSink::new());
        let monitor = MonitorLoop::new(session, sink.clone(), fast_config());
        monitor.start().unwrap();

        wait_for(|| !monitor.is_running());
        assert_eq!(
            sink.errors(),
            vec!["Monitoring error: Analog input task not initialized".to_string()]
        );
    }

    #[test]
    fn test_restart_replaces_worker() {
        let (session, sink) = setup(MockDaq::new("Dev1"));
        let monitor = MonitorLoop::new(session, sink.clone(), fast_config());
        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(monitor.stop().is_some());
        assert!(monitor.stop().is_none());
    }

    #[test]
    fn test_rejects_empty_batch() {
        let (session, sink) = setup(MockDaq::new("Dev1"));
        let config = MonitorConfig {
            num_samples: 0,
            ..fast_config()
        };
        let monitor = MonitorLoop::new(session, sink, config);
        assert!(matches!(monitor.start(), Err(DaqError::InvalidRequest(_))));
        assert!(!monitor.is_running());
    }
}
