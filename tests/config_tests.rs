//! `EngineConfig` file-loading and environment-override tests.

use raveldb::config::EngineConfig;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn from_file_overrides_defaults_for_present_fields() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [execution]
        batch_size = 512
        max_wavefronts = 4

        [join]
        cartesian_fallback_warn_rows = 2000000
        chunk_size = 8192
        "#
    )
    .unwrap();

    let config = EngineConfig::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.execution.batch_size, 512);
    assert_eq!(config.execution.max_wavefronts, 4);
    assert_eq!(config.join.cartesian_fallback_warn_rows, 2_000_000);
    assert_eq!(config.resolved_wavefronts(), 4);
}

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let config = EngineConfig::from_file("/nonexistent/raveldb-does-not-exist.toml").unwrap();
    assert_eq!(config.execution.batch_size, 256);
}

#[test]
fn env_override_takes_priority_over_the_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[execution]\nbatch_size = 512\n\n[join]\ncartesian_fallback_warn_rows = 1000000\n").unwrap();

    std::env::set_var("RAVELDB_EXECUTION__BATCH_SIZE", "1024");
    let config = EngineConfig::from_file(file.path().to_str().unwrap()).unwrap();
    std::env::remove_var("RAVELDB_EXECUTION__BATCH_SIZE");

    assert_eq!(config.execution.batch_size, 1024);
}
