//! Loading the runtime library.

use std::io::Write;

use alice_ort::{
    CustomRegistry, OnnxEngine, OnnxEngineFactory, OnnxModel, OnnxValue, OrtError, Runtime,
    RuntimeConfig,
};

#[test]
fn test_missing_library_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        library_path: dir.path().join("libnot_there.so"),
        ..RuntimeConfig::default()
    };
    match Runtime::load(&config) {
        Err(OrtError::LibraryLoad { path, .. }) => assert_eq!(path, config.library_path),
        other => panic!("expected LibraryLoad, got {other:?}"),
    }
}

#[test]
fn test_non_library_file_is_load_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"definitely not a shared object").unwrap();
    file.flush().unwrap();

    let config = RuntimeConfig {
        library_path: file.path().to_path_buf(),
        ..RuntimeConfig::default()
    };
    let err = OnnxEngineFactory::new(config).unwrap_err();
    assert!(matches!(err, OrtError::LibraryLoad { .. }));
    assert!(err.to_string().contains("failed to load runtime library"));
}

#[test]
fn test_invalid_config_is_rejected_before_loading() {
    let config = RuntimeConfig {
        api_version: 3,
        ..RuntimeConfig::default()
    };
    assert!(matches!(
        Runtime::load(&config),
        Err(OrtError::InvalidConfig(_))
    ));
}

#[test]
fn test_thread_safety_of_public_types() {
    fn assert_send<T: Send>() {}
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<Runtime>();
    assert_send_sync::<OnnxEngineFactory>();
    assert_send_sync::<OnnxEngine>();
    assert_send::<OnnxModel>();
    assert_send::<OnnxValue>();
    assert_send::<CustomRegistry>();
}
