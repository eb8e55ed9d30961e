//! Configuration loading from files and the environment.

use std::io::Write;
use std::path::PathBuf;

use alice_ort::{GraphOptimizationLevel, LoggingLevel, OrtError, RuntimeConfig};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_file_is_loaded() {
    let file = write_config(
        r#"
        library_path = "/opt/alice-ort/lib/libalice_ort.so"
        api_version = 1
        log_id = "vision-service"
        log_level = "error"
        debug_output = true

        [session]
        graph_optimization_level = "enable_extended"
        dml_graph_optimization_level = "enable_basic"
        intra_op_threads = 8
        "#,
    );

    let config = RuntimeConfig::from_file(file.path()).unwrap();
    assert_eq!(
        config.library_path,
        PathBuf::from("/opt/alice-ort/lib/libalice_ort.so")
    );
    assert_eq!(config.log_id, "vision-service");
    assert_eq!(config.log_level, LoggingLevel::Error);
    assert!(config.debug_output);
    assert_eq!(
        config.session.graph_optimization_level,
        GraphOptimizationLevel::EnableExtended
    );
    assert_eq!(
        config.session.dml_graph_optimization_level,
        GraphOptimizationLevel::EnableBasic
    );
    assert_eq!(config.session.intra_op_threads, Some(8));
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = write_config("");
    let config = RuntimeConfig::from_file(file.path()).unwrap();
    assert_eq!(config, RuntimeConfig::default());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    match RuntimeConfig::from_file(&path) {
        Err(OrtError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn test_malformed_file_is_parse_error() {
    let file = write_config("log_level = [");
    assert!(matches!(
        RuntimeConfig::from_file(file.path()),
        Err(OrtError::ConfigParse(_))
    ));
}

#[test]
fn test_invalid_values_are_rejected_after_parse() {
    let file = write_config("library_path = \"\"");
    assert!(matches!(
        RuntimeConfig::from_file(file.path()),
        Err(OrtError::InvalidConfig(_))
    ));
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = RuntimeConfig::default();
    config.log_level = LoggingLevel::Info;
    config.session.intra_op_threads = Some(2);

    let text = toml::to_string(&config).unwrap();
    let file = write_config(&text);
    assert_eq!(RuntimeConfig::from_file(file.path()).unwrap(), config);
}
