use agent_forge::config::{CandidateStatus, ConfigDiscovery, ForgeConfig};
use agent_forge::env;
use serial_test::serial;
use std::fs;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_config_serialization_roundtrip() {
    let mut original_config = ForgeConfig::default();
    original_config.orchestrator.task_timeout_secs = 42;
    original_config.cache.analysis_ttl_secs = Some(600);

    let toml_str = original_config
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");

    assert!(toml_str.contains("[orchestrator]"), "Should contain orchestrator section");
    assert!(toml_str.contains("task_timeout_secs = 42"));

    let deserialized_config =
        ForgeConfig::from_toml_str(&toml_str).expect("Should be able to deserialize TOML string");
    assert_eq!(original_config, deserialized_config);
}

#[test]
fn test_config_file_operations() {
    let original_config = ForgeConfig::default();
    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");

    original_config
        .to_toml_file(temp_file.path())
        .expect("Should be able to save config to file");
    let loaded_config =
        ForgeConfig::from_toml_file(temp_file.path()).expect("Should be able to load config from file");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let config = ForgeConfig::from_toml_str(
        r#"
        [retry]
        max_retries = 7

        [executor]
        block_severity = 80
        "#,
    )
    .expect("Partial config should parse");

    assert_eq!(config.retry.max_retries, 7);
    assert_eq!(config.executor.block_severity, 80);
    assert_eq!(config.orchestrator, ForgeConfig::default().orchestrator);
    assert_eq!(config.retry.to_policy().max_retries, 7);
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = ForgeConfig::from_toml_str("[orchestrator]\ntask_timeout_secs = \"soon\"\n");
    assert!(result.is_err(), "Wrong value type should fail to parse");
}

#[test]
fn test_discovery_prefers_local_over_user() {
    let workspace = TempDir::new().expect("Should create workspace dir");
    let home = TempDir::new().expect("Should create home dir");

    let user_path = env::user_config_file_path(home.path());
    fs::create_dir_all(user_path.parent().expect("user config has a parent")).expect("Should create user dir");
    fs::write(&user_path, "[orchestrator]\nhistory_limit = 5\n").expect("Should write user config");

    let discovery = ConfigDiscovery::new(Some(workspace.path().to_path_buf()), Some(home.path().to_path_buf()))
        .without_system_config();
    let (config, path) = discovery.discover_config().expect("Discovery should succeed");
    assert_eq!(path.as_deref(), Some(user_path.as_path()));
    assert_eq!(config.orchestrator.history_limit, 5);

    let local_path = env::local_standalone_config_path(workspace.path());
    fs::write(&local_path, "[orchestrator]\nhistory_limit = 9\n").expect("Should write local config");
    let (config, path) = discovery.discover_config().expect("Discovery should succeed");
    assert_eq!(path.as_deref(), Some(local_path.as_path()));
    assert_eq!(config.orchestrator.history_limit, 9);

    let report = discovery.report();
    assert_eq!(report[0], (local_path, CandidateStatus::Found));
}

#[test]
fn test_create_default_user_config() {
    let home = TempDir::new().expect("Should create home dir");
    let discovery = ConfigDiscovery::new(None, Some(home.path().to_path_buf())).without_system_config();

    let path = discovery
        .create_default_user_config()
        .expect("Should create default config");
    assert!(path.is_file());

    let loaded = ForgeConfig::from_toml_file(&path).expect("Default config should load");
    assert_eq!(loaded, ForgeConfig::default());
}

#[test]
#[serial]
fn test_discovery_from_environment_reads_current_dir() {
    let workspace = TempDir::new().expect("Should create workspace dir");
    fs::write(
        env::local_standalone_config_path(workspace.path()),
        "[logging]\nfilter = \"agent_forge=debug\"\n",
    )
    .expect("Should write local config");

    let previous = std::env::current_dir().expect("Should read current dir");
    std::env::set_current_dir(workspace.path()).expect("Should change dir");
    let discovered = ConfigDiscovery::from_environment().without_system_config().discover_config();
    std::env::set_current_dir(previous).expect("Should restore dir");

    let (config, path) = discovered.expect("Discovery should succeed");
    assert!(path.is_some());
    assert_eq!(config.logging.filter, "agent_forge=debug");
}
