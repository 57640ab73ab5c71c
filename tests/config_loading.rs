//! Integration tests for loading configuration files into a session.

use std::io::Write;

use quick_daq::config::{DaqConfig, MAX_PREFIX_LEN};
use quick_daq::provider::{Operation, SampleClock};
use quick_daq::{IoMode, QuickDaqError, SamplingMode, Session, SimulatedProvider, Status, TriggerEdge};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

const BENCH_RIG: &str = r#"
device_prefix = "Dev"

[analog_in]
min = -5.0
max = 5.0
terminal_config = "rse"

[timing]
sampling_mode = "hw_clocked"
sampling_rate = 250.0
samples_per_channel = 1
trigger_edge = "falling"

[io]
timeout = "2s"

[[simulation.devices]]
id = 1
product_type = "PXIe-6341"
serial = 123456
analog_in = 4
analog_out = 2
loopback = true

[[simulation.devices]]
id = 4
counter_in = 4
"#;

#[test]
fn test_config_file_drives_the_session() {
    let file = write_config(BENCH_RIG);
    let config = DaqConfig::load_from(file.path()).expect("load");
    config.validate().expect("valid");

    assert_eq!(config.device_prefix, "Dev");
    assert_eq!(config.timing.sampling_rate, 250.0);
    assert_eq!(config.io.timeout, std::time::Duration::from_secs(2));
    // untouched sections keep their defaults
    assert_eq!(config.analog_out.max, 10.0);

    let provider = SimulatedProvider::from_config(&config);
    assert_eq!(provider.device_count(), 2);

    let mut session = Session::new(provider.clone(), config);
    session.initialize().expect("initialize");
    assert_eq!(session.status(), Status::Initialized);

    let catalog = session.catalog().expect("catalog");
    assert_eq!(catalog.len(), 2);
    let dev1 = catalog.device(1).expect("Dev1");
    assert_eq!(dev1.name(), "Dev1");
    assert_eq!(dev1.product_type(), "PXIe-6341");
    assert_eq!(dev1.serial(), 123456);
    assert!(dev1.is_simulated());
    assert_eq!(dev1.channel_count(IoMode::AnalogIn), 4);
    assert_eq!(catalog.device(4).expect("Dev4").channel_count(IoMode::CounterAngleIn), 4);
    assert!(catalog.device(2).is_none());
}

#[test]
fn test_timing_section_feeds_sample_clock() {
    let file = write_config(BENCH_RIG);
    let config = DaqConfig::load_from(file.path()).expect("load");
    let provider = SimulatedProvider::from_config(&config);
    let mut session = Session::new(provider.clone(), config);
    session.initialize().expect("initialize");
    session.set_active_edge_falling();

    session.set_pin_mode(1, IoMode::AnalogIn, 0).expect("bind");
    session.configure_sampling_from_config().expect("configure");
    assert_eq!(session.status(), Status::Ready);
    assert_eq!(session.sampling_mode(), SamplingMode::HwClocked);
    assert_eq!(session.trigger_edge(), TriggerEdge::Falling);

    let ai = session.tasks().singleton(IoMode::AnalogIn).expect("AI task");
    let clock: SampleClock = provider
        .task_clock(session.tasks()[ai].handle())
        .expect("clock configured");
    assert_eq!(clock.rate, 250.0);
    assert_eq!(clock.edge, TriggerEdge::Falling);
    assert_eq!(clock.mode, SamplingMode::HwClocked);
    assert_eq!(provider.calls(Operation::SetLateErrorsToWarnings), 1);
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = DaqConfig::load_from(dir.path().join("absent.toml")).expect("load");
    assert_eq!(config, DaqConfig::default());
    config.validate().expect("defaults are valid");
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let file = write_config("device_prefix = [1, 2");
    let err = DaqConfig::load_from(file.path()).expect_err("malformed");
    assert!(matches!(err, QuickDaqError::Config(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_overlong_prefix_rejected() {
    let prefix = "X".repeat(MAX_PREFIX_LEN + 1);
    let file = write_config(&format!("device_prefix = \"{prefix}\"\n"));
    let config = DaqConfig::load_from(file.path()).expect("load");
    let err = config.validate().expect_err("prefix too long");
    assert!(err.to_string().contains("device_prefix"));
}

#[test]
fn test_duplicate_simulated_ids_rejected() {
    let file = write_config(
        r#"
[[simulation.devices]]
id = 2
analog_in = 1

[[simulation.devices]]
id = 2
analog_out = 1
"#,
    );
    let config = DaqConfig::load_from(file.path()).expect("load");
    let err = config.validate().expect_err("duplicate id");
    assert!(err.to_string().contains("Duplicate simulated device id: 2"));
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let file = write_config(BENCH_RIG);
    let config = DaqConfig::load_from(file.path()).expect("load");
    let rendered = config.to_toml().expect("render");

    let again = write_config(&rendered);
    assert_eq!(DaqConfig::load_from(again.path()).expect("reload"), config);
}
