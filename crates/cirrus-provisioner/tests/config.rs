use std::collections::HashMap;

use cirrus_provisioner::config::{ENV_MAX_CONCURRENCY, ENV_WAIT_TIMEOUT_SECS};
use cirrus_provisioner::{load_config, save_config, EngineConfig, ProvisionerError, WaitConfig};

fn write(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn defaults_are_valid() {
    let config = EngineConfig::default();
    assert_eq!(config.config_version, 1);
    assert_eq!(config.max_concurrency, 8);
    assert_eq!(config.wait, WaitConfig::default());
    config.validate().unwrap();
}

#[test]
fn loads_current_config_with_partial_wait() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        r#"{ "config_version": 1, "max_concurrency": 3, "wait": { "timeout_secs": 30 } }"#,
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.max_concurrency, 3);
    assert_eq!(config.wait.timeout_secs, 30);
    assert_eq!(config.wait.initial_delay_ms, WaitConfig::default().initial_delay_ms);
}

#[test]
fn migrates_unversioned_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, r#"{ "concurrency": 2, "wait_timeout_secs": 42 }"#);

    let config = load_config(&path).unwrap();
    assert_eq!(config.config_version, 1);
    assert_eq!(config.max_concurrency, 2);
    assert_eq!(config.wait.timeout_secs, 42);
}

#[test]
fn rejects_config_from_newer_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, r#"{ "config_version": 99 }"#);

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ProvisionerError::Config(msg) if msg.contains("newer")));
}

#[test]
fn rejects_version_past_u32_instead_of_wrapping() {
    let dir = tempfile::tempdir().unwrap();
    // 2^32 + 1 would truncate to 1, the current version.
    let path = write(&dir, r#"{ "config_version": 4294967297 }"#);

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ProvisionerError::Config(msg) if msg.contains("out of range")));
}

#[test]
fn rejects_invalid_values_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, r#"{ "config_version": 1, "max_concurrency": 0 }"#);

    assert!(matches!(
        load_config(&path),
        Err(ProvisionerError::Config(_))
    ));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().starts_with("config error: failed to read config"));
}

#[test]
fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let config = EngineConfig {
        config_version: 0,
        max_concurrency: 5,
        wait: WaitConfig {
            timeout_secs: 120,
            ..WaitConfig::default()
        },
    };

    save_config(&path, &config).unwrap();
    let loaded = load_config(&path).unwrap();

    assert_eq!(loaded.config_version, 1);
    assert_eq!(loaded.max_concurrency, 5);
    assert_eq!(loaded.wait.timeout_secs, 120);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn overrides_replace_file_values() {
    let vars: HashMap<&str, &str> = [(ENV_MAX_CONCURRENCY, "16"), (ENV_WAIT_TIMEOUT_SECS, " 5 ")]
        .into_iter()
        .collect();

    let config = EngineConfig::default()
        .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.max_concurrency, 16);
    assert_eq!(config.wait.timeout_secs, 5);
}

#[test]
fn unparseable_override_is_rejected() {
    let err = EngineConfig::default()
        .with_overrides(|key| (key == ENV_MAX_CONCURRENCY).then(|| "lots".to_string()))
        .unwrap_err();

    assert!(err.to_string().contains(ENV_MAX_CONCURRENCY));
}

#[test]
fn zero_override_fails_validation() {
    let err = EngineConfig::default()
        .with_overrides(|key| (key == ENV_MAX_CONCURRENCY).then(|| "0".to_string()))
        .unwrap_err();

    assert!(matches!(err, ProvisionerError::Config(_)));
}

#[test]
fn wait_delays_grow_to_the_cap() {
    let wait = WaitConfig {
        initial_delay_ms: 100,
        max_delay_ms: 350,
        multiplier: 2.0,
        timeout_secs: 10,
    };
    let first = wait.initial_delay();
    let second = wait.next_delay(first);
    let third = wait.next_delay(second);

    assert_eq!(first.as_millis(), 100);
    assert_eq!(second.as_millis(), 200);
    assert_eq!(third.as_millis(), 350);
    assert_eq!(wait.next_delay(third).as_millis(), 350);
}
