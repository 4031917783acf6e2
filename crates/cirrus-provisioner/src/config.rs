use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProvisionerError;
use crate::persistence::write_atomic;
use crate::wait::WaitConfig;

/// Current config version. Bump this when adding fields or changing shape.
/// Each bump requires a corresponding entry in [`migrate`].
const CURRENT_VERSION: u32 = 1;

pub const ENV_MAX_CONCURRENCY: &str = "CIRRUS_MAX_CONCURRENCY";
pub const ENV_WAIT_TIMEOUT_SECS: &str = "CIRRUS_WAIT_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Schema version. Missing or 0 = pre-versioned config.
    #[serde(default)]
    pub config_version: u32,
    /// Upper bound on tasks talking to the cloud at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub wait: WaitConfig,
}

fn default_max_concurrency() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_version: CURRENT_VERSION,
            max_concurrency: default_max_concurrency(),
            wait: WaitConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        if self.max_concurrency == 0 {
            return Err(ProvisionerError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        self.wait.validate()
    }

    /// Apply `CIRRUS_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ProvisionerError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProvisionerError> {
        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = parse_override(ENV_MAX_CONCURRENCY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WAIT_TIMEOUT_SECS) {
            self.wait.timeout_secs = parse_override(ENV_WAIT_TIMEOUT_SECS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ProvisionerError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ProvisionerError::Config(format!("invalid {key}={raw:?}: {e}")))
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ProvisionerError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ProvisionerError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;

    // Parse as raw JSON so we can run migrations before deserializing.
    let json: Value = serde_json::from_str(&contents)?;
    let raw_version = json
        .get("config_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let on_disk_version = u32::try_from(raw_version).map_err(|_| {
        ProvisionerError::Config(format!("config_version {raw_version} is out of range"))
    })?;

    let migrated = migrate(json, on_disk_version)?;
    let config: EngineConfig = serde_json::from_value(migrated)?;
    config.validate()?;
    Ok(config)
}

/// Run sequential migrations from `from_version` up to [`CURRENT_VERSION`].
fn migrate(mut json: Value, from_version: u32) -> Result<Value, ProvisionerError> {
    if from_version > CURRENT_VERSION {
        return Err(ProvisionerError::Config(format!(
            "config_version {from_version} is newer than this build supports ({CURRENT_VERSION})"
        )));
    }

    // v0 → v1: `concurrency` renamed to `max_concurrency`, flat
    // `wait_timeout_secs` moved under `wait`.
    if from_version < 1 {
        let obj = json
            .as_object_mut()
            .ok_or_else(|| ProvisionerError::Config("config is not a JSON object".into()))?;
        if let Some(concurrency) = obj.remove("concurrency") {
            obj.entry("max_concurrency").or_insert(concurrency);
        }
        if let Some(timeout) = obj.remove("wait_timeout_secs") {
            let wait = obj
                .entry("wait")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(wait) = wait.as_object_mut() {
                wait.entry("timeout_secs").or_insert(timeout);
            }
        }
        obj.insert("config_version".to_string(), Value::Number(1.into()));
        tracing::info!("migrated config v0 → v1");
    }

    Ok(json)
}

pub fn save_config(path: &Path, config: &EngineConfig) -> Result<(), ProvisionerError> {
    // Always write the current version, regardless of what was loaded.
    let mut stamped = config.clone();
    stamped.config_version = CURRENT_VERSION;

    let json = serde_json::to_string_pretty(&stamped)?;
    write_atomic(path, json.as_bytes())?;

    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
