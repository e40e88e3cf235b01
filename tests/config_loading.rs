use std::path::Path;

use psyche_core::config::AppConfig;
use psyche_core::error::PsycheError;
use psyche_test_utils::temp_toml;

#[test]
fn test_load_full_config_from_file() {
    let tmp = temp_toml(
        r#"
[engine]
default_timeout_secs = 5
max_retained_executions = 10
validate_inputs = false
default_max_iterations = 7

[agents]
default_target_language = "he"
embedding_dims = 16
min_confidence = 0.25

[log]
filter = "psyche=debug"

[chains]
dir = "/srv/chains"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.default_timeout_secs, 5);
    assert_eq!(config.engine.default_timeout().as_secs(), 5);
    assert_eq!(config.engine.max_retained_executions, 10);
    assert!(!config.engine.validate_inputs);
    assert_eq!(config.engine.default_max_iterations, 7);
    assert_eq!(config.agents.default_target_language, "he");
    assert_eq!(config.agents.embedding_dims, 16);
    assert_eq!(config.agents.min_confidence, 0.25);
    assert_eq!(config.log.filter, "psyche=debug");
    assert_eq!(
        config.resolve_chain_path(Path::new("assessment.toml")),
        Path::new("/srv/chains/assessment.toml")
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("PSYCHE_TEST_TARGET_LANG", "es");

    let tmp = temp_toml(
        r#"
[agents]
default_target_language = "${PSYCHE_TEST_TARGET_LANG}"
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.agents.default_target_language, "es");

    std::env::remove_var("PSYCHE_TEST_TARGET_LANG");
}

#[test]
fn test_partial_config_uses_defaults() {
    let tmp = temp_toml(
        r#"
[engine]
default_timeout_secs = 12
"#,
    );

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.default_timeout_secs, 12);
    assert_eq!(config.engine.max_retained_executions, 200);
    assert!(config.engine.validate_inputs);
    assert_eq!(config.engine.default_max_iterations, 3);
    assert_eq!(config.agents.default_target_language, "en");
    assert_eq!(config.agents.embedding_dims, 32);
    assert_eq!(config.log.filter, "psyche=info,warn");
    assert!(config.chains.dir.is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PsycheError::ConfigNotFound(_)));
}

#[test]
fn test_unreadable_config_is_io_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(dir.path()).unwrap_err();
    assert!(matches!(err, PsycheError::Io(_)), "{:?}", err);
    assert!(err.to_string().starts_with("I/O error"));
}

#[test]
fn test_malformed_config_is_rejected() {
    let tmp = temp_toml("[engine]\ndefault_timeout_secs = \"soon\"\n");
    assert!(matches!(
        AppConfig::load(tmp.path()),
        Err(PsycheError::Config(_))
    ));
}
