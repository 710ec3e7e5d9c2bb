//! End-to-end tests driving the control panel like an operator would.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use wavegen_daq::app::{ControlPanel, ParameterEdit};
use wavegen_daq::config::AppConfig;
use wavegen_daq::hardware::{MockDaq, TaskHandle};
use wavegen_daq::presentation::RecordingSink;
use wavegen_daq::session::TaskState;
use wavegen_daq::waveform::Shape;

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.monitor.num_samples = 250;
    config.monitor.interval_ms = 5;
    config
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_operator_session() {
    let config = fast_config();
    let daq = Arc::new(MockDaq::new("Dev1"));
    let sink = Arc::new(RecordingSink::new());
    let mut panel = ControlPanel::new(daq.clone(), sink.clone(), config.panel_settings().unwrap());

    // Typing "5" then "50" into the frequency field: both valid, two more previews
    panel.on_parameter_changed(ParameterEdit::Frequency("5".into()));
    panel.on_parameter_changed(ParameterEdit::Frequency("50".into()));
    panel.on_parameter_changed(ParameterEdit::Shape(Shape::Triangle));
    assert_eq!(sink.previews().len(), 4);
    assert_eq!(sink.last_preview().unwrap().title, "Triangle Wave Preview");

    assert_eq!(panel.on_start_output().unwrap(), 1000);
    assert!(daq.is_running(TaskHandle(1)));

    panel.on_start_monitoring().unwrap();
    wait_for(|| sink.frame_count() >= 2);

    // Loopback: the monitored signal is the generated triangle
    let preview = sink.last_preview().unwrap();
    let frame = &sink.frames()[0];
    assert_eq!(frame.samples.len(), 250);
    assert_eq!(&frame.samples[..], &preview.amplitudes[..250]);

    let report = panel.on_stop_monitoring().unwrap();
    assert!(report.iterations >= 2);

    panel.on_stop_output().unwrap();
    assert!(!daq.is_running(TaskHandle(1)));
    assert_eq!(panel.session().output_state(), TaskState::Configured);

    panel.shutdown().unwrap();
    assert_eq!(daq.open_task_count(), 0);
    assert!(sink.errors().is_empty());
}

#[test]
fn test_invalid_channel_is_reported() {
    let mut config = fast_config();
    config.output.channel = "Dev2/ao0".to_string();
    let daq = Arc::new(MockDaq::new("Dev1"));
    let sink = Arc::new(RecordingSink::new());
    let mut panel = ControlPanel::new(daq, sink.clone(), config.panel_settings().unwrap());

    assert!(panel.on_start_output().is_err());
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.errors()[0].contains("Dev2"));
    assert_eq!(panel.session().output_state(), TaskState::Unconfigured);
}

#[test]
fn test_nyquist_violation_blocks_output() {
    let daq = Arc::new(MockDaq::new("Dev1"));
    let sink = Arc::new(RecordingSink::new());
    let mut panel = ControlPanel::new(daq.clone(), sink.clone(), fast_config().panel_settings().unwrap());

    panel.on_parameter_changed(ParameterEdit::Frequency("600".into()));
    assert_eq!(sink.previews().len(), 1);

    assert!(panel.on_start_output().is_err());
    assert!(sink.errors()[0].contains("Nyquist"));
    assert_eq!(daq.open_task_count(), 0);
}

#[test]
fn test_monitor_failure_surfaces_once() {
    let daq = Arc::new(MockDaq::builder("Dev1").fail_reads_after(1).build());
    let sink = Arc::new(RecordingSink::new());
    let mut panel = ControlPanel::new(daq, sink.clone(), fast_config().panel_settings().unwrap());

    panel.on_start_monitoring().unwrap();
    wait_for(|| !panel.is_monitoring());

    assert_eq!(sink.frame_count(), 1);
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.errors()[0].starts_with("Monitoring error:"));
    panel.shutdown().unwrap();
}
