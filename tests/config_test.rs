//! Configuration loading tests.

mod common;

use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;
use vigil_lib::core::{Config, ConfigBuilder, MaskSpec, MetricName, VigilError};
use vigil_lib::taxonomy::{BitFlag, SubValue};
use vigil_lib::AgentContext;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.reporter.period, Duration::from_secs(15));
    assert_eq!(config.sink.output, "stdout");
    assert!(!config.debug);
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
reporter:
  period: 2s
  duration_unit: microseconds
  tags:
    region: eu-west
  snapshot_mask: [count, max]
cache:
  initial_capacity: 64
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.reporter.period, Duration::from_secs(2));
    assert_eq!(config.cache.initial_capacity, 64);
    assert_eq!(
        config.reporter.snapshot_mask().unwrap(),
        Some(SubValue::mask_for(&[SubValue::Count, SubValue::Max]))
    );
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, VigilError::Config(_)));
}

#[test]
fn test_invalid_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "reporter:\n  metered_mask: [count, m2]").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_builder_masks() {
    let config = ConfigBuilder::new()
        .metered_mask(MaskSpec::Bits(SubValue::M1.bit() | SubValue::M5.bit()))
        .debug(true)
        .build()
        .unwrap();
    assert_eq!(
        config.reporter.metered_mask().unwrap(),
        Some(SubValue::mask_for(&[SubValue::M1, SubValue::M5]))
    );
    assert!(config.debug);
}

#[test]
fn test_file_output_receives_batches() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("batches.jsonl");
    let config = ConfigBuilder::new()
        .output(out.to_string_lossy().into_owned())
        .tag("host", "h1")
        .build()
        .unwrap();

    let agent = AgentContext::new(config).unwrap();
    let id = agent.registry().identity(MetricName::new("uptime").unwrap());
    agent.registry().gauge(&id).unwrap().set(12.0);
    assert_eq!(agent.shutdown().unwrap(), 1);

    let written = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 1);
    let records: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(records[0]["metric"], "uptime");
    assert_eq!(records[0]["value"], 12);
    assert_eq!(records[0]["tags"]["host"], "h1");
}
