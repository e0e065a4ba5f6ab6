// Grader configuration: resource limits for routines and sandboxed block programs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/grader.json";

/// Limits applied to learner routines on the code path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineLimits {
    /// Interpreter operation budget per call; exhausting it fails the case
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_source_bytes: usize,
}

impl Default for RoutineLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
            max_source_bytes: 64 * 1024,
        }
    }
}

/// Limits applied to block programs run inside the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    pub timeout_ms: u64,
    pub max_log_lines: usize,
    pub log_channel_capacity: usize,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_log_lines: 1000,
            log_channel_capacity: 64,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 64 * 1024,
            max_array_size: 10_000,
        }
    }
}

impl SandboxLimits {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    pub routine: RoutineLimits,
    pub sandbox: SandboxLimits,
}

impl GraderConfig {
    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Grader config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: GraderConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `config/grader.json` when present, otherwise defaults; then apply
    /// environment overrides.
    pub fn load_default() -> Result<Self> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let config = if default_path.exists() {
            Self::load(default_path)?
        } else {
            Self::default()
        };
        config.apply_env()
    }

    /// Override limits from `CORRECTOR_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(timeout_ms) = env_u64("CORRECTOR_SANDBOX_TIMEOUT_MS")? {
            self.sandbox.timeout_ms = timeout_ms;
        }
        if let Some(max_operations) = env_u64("CORRECTOR_MAX_OPERATIONS")? {
            self.routine.max_operations = max_operations;
        }
        if let Some(max_log_lines) = env_u64("CORRECTOR_MAX_LOG_LINES")? {
            self.sandbox.max_log_lines = max_log_lines as usize;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_ms == 0 {
            bail!("sandbox.timeout_ms must be greater than zero");
        }
        if self.sandbox.log_channel_capacity == 0 {
            bail!("sandbox.log_channel_capacity must be greater than zero");
        }
        if self.routine.max_operations == 0 {
            bail!("routine.max_operations must be greater than zero");
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{} must be an unsigned integer, got '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GraderConfig::default();
        assert_eq!(config.sandbox.timeout_ms, 5000);
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(5));
        assert_eq!(config.routine.max_operations, 1_000_000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sandbox": {{"timeout_ms": 250}}}}"#).unwrap();

        let config = GraderConfig::load(file.path()).unwrap();
        assert_eq!(config.sandbox.timeout_ms, 250);
        assert_eq!(config.sandbox.max_log_lines, 1000);
        assert_eq!(config.routine, RoutineLimits::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = GraderConfig::load(Path::new("does/not/exist.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sandbox": {{"timeout_ms": 0}}}}"#).unwrap();

        assert!(GraderConfig::load(file.path()).is_err());
    }
}
