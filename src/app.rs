//! The control panel: user intents in, component calls out.
//!
//! [`ControlPanel`] is what a window's buttons and text fields talk to. It
//! holds the raw parameter form, the shared [`AcquisitionSession`] and the
//! [`MonitorLoop`], and pushes everything visible to a [`PresentationSink`].
//!
//! | Intent                  | Effect                                                    |
//! |-------------------------|-----------------------------------------------------------|
//! | `on_parameter_changed`  | update the form, re-render the preview if the form is valid |
//! | `on_start_output`       | validate, generate, reconfigure the output task, write    |
//! | `on_stop_output`        | halt the output task                                      |
//! | `on_start_monitoring`   | configure the input task, start the monitor loop          |
//! | `on_stop_monitoring`    | stop and join the monitor loop                            |
//! | `shutdown`              | stop monitoring, release every task                       |
//!
//! Explicit actions report failures through
//! [`PresentationSink::report_error`] and return them. Preview rendering is
//! best-effort: an invalid in-progress edit renders nothing and reports
//! nothing.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{DaqError, ParameterError, Result};
use crate::hardware::{DaqHardware, PhysicalChannel};
use crate::monitor::{MonitorConfig, MonitorLoop, MonitorReport};
use crate::presentation::PresentationSink;
use crate::session::AcquisitionSession;
use crate::waveform::{generate, Shape, Waveform, WaveformRequest};

/// A single edit to the parameter form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterEdit {
    /// Shape selector changed
    Shape(Shape),
    /// Frequency text field changed
    Frequency(String),
    /// Amplitude text field changed
    Amplitude(String),
    /// Duration text field changed
    Duration(String),
}

/// The operator's parameter form, holding text exactly as typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterForm {
    /// Selected shape
    pub shape: Shape,
    /// Frequency in Hz, as typed
    pub frequency: String,
    /// Amplitude in volts, as typed
    pub amplitude: String,
    /// Duration in seconds, as typed
    pub duration: String,
}

impl Default for ParameterForm {
    fn default() -> Self {
        Self {
            shape: Shape::Sine,
            frequency: "1.0".to_string(),
            amplitude: "1.0".to_string(),
            duration: "1.0".to_string(),
        }
    }
}

impl ParameterForm {
    /// Apply one edit.
    pub fn apply(&mut self, edit: ParameterEdit) {
        match edit {
            ParameterEdit::Shape(shape) => self.shape = shape,
            ParameterEdit::Frequency(text) => self.frequency = text,
            ParameterEdit::Amplitude(text) => self.amplitude = text,
            ParameterEdit::Duration(text) => self.duration = text,
        }
    }

    /// Parse and validate the form into a request at `sample_rate`.
    pub fn request(&self, sample_rate: u32) -> Result<WaveformRequest> {
        let frequency = parse_field("Frequency", &self.frequency)?;
        let amplitude = parse_field("Amplitude", &self.amplitude)?;
        let duration = parse_field("Duration", &self.duration)?;
        WaveformRequest::new(self.shape, frequency, amplitude, duration, sample_rate)
    }
}

fn parse_field(field: &'static str, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        DaqError::InvalidParameter(ParameterError::NotANumber {
            field,
            value: text.to_string(),
        })
    })
}

/// Channels and rates the panel drives.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSettings {
    /// Analog output channel
    pub output_channel: PhysicalChannel,
    /// Analog input channel
    pub input_channel: PhysicalChannel,
    /// Output (and preview) sample rate in S/s
    pub output_sample_rate: u32,
    /// Monitor batch size and cadence
    pub monitor: MonitorConfig,
    /// Form contents at startup
    pub initial_form: ParameterForm,
}

/// Title of the preview plot for `shape`, e.g. `"Sine Wave Preview"`.
pub fn preview_title(shape: Shape) -> String {
    format!("{} Wave Preview", shape.label())
}

/// Controller behind the operator's window.
pub struct ControlPanel {
    settings: PanelSettings,
    form: ParameterForm,
    session: Arc<AcquisitionSession>,
    monitor: MonitorLoop,
    sink: Arc<dyn PresentationSink>,
}

impl ControlPanel {
    /// Build the panel and render the initial preview.
    pub fn new(
        hardware: Arc<dyn DaqHardware>,
        sink: Arc<dyn PresentationSink>,
        settings: PanelSettings,
    ) -> Self {
        let session = Arc::new(AcquisitionSession::new(hardware));
        let monitor = MonitorLoop::new(Arc::clone(&session), Arc::clone(&sink), settings.monitor);
        let panel = Self {
            form: settings.initial_form.clone(),
            settings,
            session,
            monitor,
            sink,
        };
        panel.refresh_preview();
        panel
    }

    /// Current form contents.
    pub fn form(&self) -> &ParameterForm {
        &self.form
    }

    /// Shared acquisition session.
    pub fn session(&self) -> &Arc<AcquisitionSession> {
        &self.session
    }

    /// True while the monitor loop is iterating.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Waveform described by the current form at the output sample rate.
    pub fn preview(&self) -> Result<Waveform> {
        let request = self.form.request(self.settings.output_sample_rate)?;
        generate(&request)
    }

    /// Apply an edit and re-render the preview when the form is valid.
    pub fn on_parameter_changed(&mut self, edit: ParameterEdit) {
        self.form.apply(edit);
        self.refresh_preview();
    }

    fn refresh_preview(&self) {
        match self.preview() {
            Ok(waveform) => self.sink.render_preview(
                &waveform.times,
                &waveform.amplitudes,
                &preview_title(waveform.shape),
            ),
            Err(e) => debug!(error = %e, "Skipping preview of incomplete parameters"),
        }
    }

    /// Validate the form and stream the waveform on the output channel.
    ///
    /// The output task is reconfigured on every call, once the waveform has
    /// been generated; a rejected request leaves the running output alone.
    /// Returns the number of samples written.
    pub fn on_start_output(&mut self) -> Result<usize> {
        let result = self.start_output();
        self.reported(result)
    }

    fn start_output(&self) -> Result<usize> {
        let request = self.form.request(self.settings.output_sample_rate)?;
        let waveform = generate(&request)?;
        self.session.configure_output(&self.settings.output_channel)?;
        let written = self
            .session
            .write(&waveform.amplitudes, request.sample_rate())?;

        info!(
            shape = %request.shape(),
            frequency = request.frequency(),
            amplitude = request.amplitude(),
            channel = %self.settings.output_channel,
            samples = written,
            "Output started"
        );
        Ok(written)
    }

    /// Halt the running output.
    pub fn on_stop_output(&mut self) -> Result<()> {
        let result = self.session.stop_output();
        self.reported(result)
    }

    /// Configure the input channel and start the monitor loop.
    pub fn on_start_monitoring(&mut self) -> Result<()> {
        let result = self
            .session
            .configure_input(&self.settings.input_channel)
            .and_then(|()| self.monitor.start());
        self.reported(result)
    }

    /// Stop the monitor loop. Returns its report if it was running.
    pub fn on_stop_monitoring(&mut self) -> Option<MonitorReport> {
        self.monitor.stop()
    }

    /// Stop monitoring and release every task.
    pub fn shutdown(&mut self) -> Result<()> {
        self.monitor.stop();
        let result = self.session.stop();
        info!("Control panel shut down");
        result
    }

    fn reported<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_user_error() {
                info!(error = %e, "Rejected operator request");
            } else {
                error!(error = %e, "Operation failed");
            }
            self.sink.report_error(&e.to_string());
        }
        result
    }
}

impl Drop for ControlPanel {
    fn drop(&mut self) {
        // Runs after an explicit shutdown too; both steps are idempotent
        self.monitor.stop();
        if let Err(e) = self.session.stop() {
            warn!(error = %e, "Failed to release tasks on drop");
        }
    }
}
