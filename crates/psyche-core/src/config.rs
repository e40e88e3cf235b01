use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PsycheError, Result};

/// Top-level Psyche configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for a whole chain execution when the caller gives none.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Executions kept for inspection before the oldest finished ones are evicted.
    #[serde(default = "default_max_retained_executions")]
    pub max_retained_executions: usize,
    /// Call `validate_input` before `process`.
    #[serde(default = "default_validate_inputs")]
    pub validate_inputs: bool,
    /// Iteration bound for LOOP nodes that do not declare one.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_retained_executions: default_max_retained_executions(),
            validate_inputs: default_validate_inputs(),
            default_max_iterations: default_max_iterations(),
        }
    }
}

impl EngineConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Settings passed to the built-in agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_target_language")]
    pub default_target_language: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    /// Framework scores below this confidence are flagged `low_confidence`.
    #[serde(default)]
    pub min_confidence: f64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_target_language: default_target_language(),
            embedding_dims: default_embedding_dims(),
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// Directory relative chain file names are resolved against.
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_timeout_secs() -> u64 { 30 }
fn default_max_retained_executions() -> usize { 200 }
fn default_validate_inputs() -> bool { true }
fn default_max_iterations() -> u32 { 3 }
fn default_target_language() -> String { "en".to_string() }
fn default_embedding_dims() -> usize { 32 }
fn default_log_filter() -> String { "psyche=info,warn".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PsycheError::ConfigNotFound(path.display().to_string()),
            _ => PsycheError::Io(e),
        })?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| PsycheError::Config(e.to_string()))
    }

    /// Resolve a chain file path against `[chains] dir` when it is relative.
    pub fn resolve_chain_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        match self.chains.dir.as_deref() {
            Some(dir) => expand_home(dir).join(path),
            None => path.to_path_buf(),
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(dir: &str) -> PathBuf {
    if let Some(rest) = dir.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_PSYCHE_VAR", "he");
        let result = expand_env_vars("lang = \"${TEST_PSYCHE_VAR}\"");
        assert_eq!(result, "lang = \"he\"");
        std::env::remove_var("TEST_PSYCHE_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_PSYCHE_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_PSYCHE_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.default_timeout_secs, 30);
        assert_eq!(config.engine.max_retained_executions, 200);
        assert!(config.engine.validate_inputs);
        assert_eq!(config.agents.default_target_language, "en");
        assert_eq!(config.log.filter, "psyche=info,warn");
        assert!(config.chains.dir.is_none());
    }

    #[test]
    fn test_resolve_absolute_chain_path() {
        let config = AppConfig::default();
        let p = Path::new("/tmp/does-not-matter.toml");
        assert_eq!(config.resolve_chain_path(p), p.to_path_buf());
    }

    #[test]
    fn test_resolve_relative_chain_path() {
        let mut config = AppConfig::default();
        config.chains.dir = Some("/srv/chains".into());
        let resolved = config.resolve_chain_path(Path::new("missing-assessment.toml"));
        assert_eq!(resolved, PathBuf::from("/srv/chains/missing-assessment.toml"));
    }
}
