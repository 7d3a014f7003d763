//! Config Integration Tests
//!
//! Loads real files from disk and checks that what comes out is usable by the
//! pipeline: queue settings build, overrides stack on top of file values, and
//! typos surface as warnings instead of silently falling back to defaults.

use netlamp::config::validation::validate_unknown_keys;
use netlamp::config::{ConfigError, ConfigOverrides, ConfigSource, LampConfig, LogFormat};
use netlamp::pipeline::{OverflowPolicy, QueueSettings};
use std::time::Duration;

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn full_file_loads_and_builds_queue_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "netlamp.toml",
        r#"
[capture]
interface = "enp3s0"
promiscuous = false
read_timeout_ms = 100

[serial]
device = "/dev/ttyACM0"
baud_rate = 115200

[queue]
capacity = 200
overflow_threshold = 120
overflow_policy = "drop_newest"

[pacing]
interval_ms = 80

[logging]
level = "netlamp=debug"
format = "json"
"#,
    );

    let (config, source) = LampConfig::load(Some(&path)).unwrap();
    assert_eq!(source, ConfigSource::CliPath(path));
    assert_eq!(config.require_interface().unwrap(), "enp3s0");
    assert!(!config.capture.promiscuous);
    assert_eq!(config.serial.baud_rate, 115_200);
    assert_eq!(config.pacing.interval(), Duration::from_millis(80));
    assert_eq!(config.logging.format, LogFormat::Json);

    let queue = QueueSettings::from_config(&config.queue).unwrap();
    assert_eq!(queue.capacity(), 200);
    assert_eq!(queue.overflow_threshold(), 120);
    assert_eq!(queue.policy(), OverflowPolicy::DropNewest);
}

#[test]
fn overrides_stack_on_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "lamp.toml",
        "[capture]\ninterface = \"eth0\"\n\n[pacing]\ninterval_ms = 300\n",
    );

    let (mut config, _) = LampConfig::load(Some(&path)).unwrap();
    config.apply_overrides(ConfigOverrides {
        serial_device: Some("COM3".into()),
        overflow_policy: Some(OverflowPolicy::BlockProducer),
        ..ConfigOverrides::default()
    });

    assert_eq!(config.require_interface().unwrap(), "eth0");
    assert_eq!(config.require_serial_device().unwrap(), "COM3");
    assert_eq!(config.pacing.interval_ms, 300);
    assert_eq!(config.queue.overflow_policy, OverflowPolicy::BlockProducer);
}

#[test]
fn invalid_ranges_are_rejected_with_every_problem_listed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "bad.toml",
        "[queue]\ncapacity = 0\n\n[pacing]\ninterval_ms = 0\n\n[serial]\nbaud_rate = 0\n",
    );

    let err = LampConfig::load(Some(&path)).unwrap_err();
    let ConfigError::Validation(problems) = err else {
        panic!("expected a validation error, got {err}");
    };
    assert!(problems.iter().any(|p| p.contains("queue.capacity")));
    assert!(problems.iter().any(|p| p.contains("pacing.interval_ms")));
    assert!(problems.iter().any(|p| p.contains("serial.baud_rate")));
}

#[test]
fn typos_warn_but_still_load() {
    let contents = "[queue]\ncapacty = 10\n\n[serial]\nbaud = 9600\n";
    let warnings = validate_unknown_keys(contents);
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .any(|w| w.suggestion.as_deref() == Some("queue.capacity")));

    let config = LampConfig::from_toml_str(contents).unwrap();
    assert_eq!(config.queue.capacity, 100);
}

#[test]
fn default_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netlamp.toml");
    LampConfig::default().save_to_file(&path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(validate_unknown_keys(&written).is_empty());

    let (loaded, _) = LampConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded, LampConfig::default());
}
