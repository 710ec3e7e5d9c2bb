//! Presentation sinks.
//!
//! The control panel and the monitor loop never draw anything themselves; they
//! push data to a [`PresentationSink`]. A GUI would implement the trait with
//! plot widgets and a message box. This crate ships two implementations:
//!
//! - [`TracingSink`] - summarizes every frame as a structured log event
//! - [`RecordingSink`] - keeps everything in memory for assertions in tests
//!
//! Sinks are called from the monitor worker thread as well as the foreground,
//! so they must be `Send + Sync`.

use parking_lot::Mutex;
use tracing::{error, info};

/// Receiver for everything the operator gets to see.
pub trait PresentationSink: Send + Sync {
    /// Replace the preview plot with a generated waveform.
    fn render_preview(&self, times: &[f64], amplitudes: &[f64], title: &str);

    /// Replace the live plot with the latest acquired batch.
    fn render_monitor_frame(&self, times: &[f64], samples: &[f64]);

    /// Show an error to the operator.
    fn report_error(&self, message: &str);
}

fn extent(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Sink that logs a one-line summary of each frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn render_preview(&self, times: &[f64], amplitudes: &[f64], title: &str) {
        let (min, max) = extent(amplitudes);
        let span = times.last().copied().unwrap_or_default();
        info!(title, samples = amplitudes.len(), span_s = span, min, max, "Preview");
    }

    fn render_monitor_frame(&self, times: &[f64], samples: &[f64]) {
        let (min, max) = extent(samples);
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };
        let span = times.last().copied().unwrap_or_default();
        info!(samples = samples.len(), span_s = span, min, max, mean, "Monitor frame");
    }

    fn report_error(&self, message: &str) {
        error!("{message}");
    }
}

/// A preview captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    /// Plot title
    pub title: String,
    /// Time axis
    pub times: Vec<f64>,
    /// Amplitude axis
    pub amplitudes: Vec<f64>,
}

/// A monitor frame captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Time axis
    pub times: Vec<f64>,
    /// Measured samples
    pub samples: Vec<f64>,
}

/// Sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    previews: Mutex<Vec<Preview>>,
    frames: Mutex<Vec<Frame>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All previews rendered so far.
    pub fn previews(&self) -> Vec<Preview> {
        self.previews.lock().clone()
    }

    /// Most recent preview.
    pub fn last_preview(&self) -> Option<Preview> {
        self.previews.lock().last().cloned()
    }

    /// All monitor frames rendered so far.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    /// Number of monitor frames rendered so far.
    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// All reported errors.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn render_preview(&self, times: &[f64], amplitudes: &[f64], title: &str) {
        self.previews.lock().push(Preview {
            title: title.to_string(),
            times: times.to_vec(),
            amplitudes: amplitudes.to_vec(),
        });
    }

    fn render_monitor_frame(&self, times: &[f64], samples: &[f64]) {
        self.frames.lock().push(Frame {
            times: times.to_vec(),
            samples: samples.to_vec(),
        });
    }

    fn report_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}
