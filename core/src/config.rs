//! Layered configuration for the scratchpad
//!
//! Values are resolved in this order (later wins):
//!
//! 1. Built-in defaults
//! 2. `~/.config/scratchpad/config.toml` (if present)
//! 3. `scratchpad.toml` in the working directory, or the file named by
//!    `SCRATCHPAD_CONFIG_PATH` / the builder's `config_path`
//! 4. `SCRATCHPAD_*` environment variables (`SCRATCHPAD_EXECUTION__TIMEOUT_MS=500`)
//! 5. Explicit builder overrides
//!
//! A `.env` file in the working directory is loaded before resolution.
//!
//! # Example
//!
//! ```ignore
//! let config = Config::builder()
//!     .config_path(Some("scratchpad.toml".into()))
//!     .timeout_ms(Some(2_000))
//!     .build()?;
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_STACK_BYTES: usize = 1024 * 1024;
pub const DEFAULT_INSPECT_DEPTH: usize = 3;
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;

const ENV_PREFIX: &str = "SCRATCHPAD";
const CONFIG_PATH_VAR: &str = "SCRATCHPAD_CONFIG_PATH";
const LOCAL_CONFIG_FILE: &str = "scratchpad.toml";

/// Resolved configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub execution: ExecutionSettings,
    pub sandbox: SandboxSettings,
}

/// How a single execution is bounded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSettings {
    /// Wall-clock bound for one run
    pub timeout_ms: u64,

    /// How long to wait for the completion signal once the block settled.
    /// Defaults to `timeout_ms`.
    pub completion_grace_ms: Option<u64>,

    /// Fail the run when the source cannot be annotated instead of
    /// falling back to stack-based line estimates
    pub strict_annotation: bool,
}

/// What the sandbox exposes and how much it may use
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxSettings {
    pub memory_limit_bytes: usize,
    pub max_stack_bytes: usize,
    pub inspect_depth: usize,
    pub max_log_entries: usize,

    /// Copy the host environment into `process.env`
    pub pass_env: bool,

    /// Working directory reported by `process.cwd()`; host cwd when unset
    pub cwd: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution: ExecutionSettings {
                timeout_ms: DEFAULT_TIMEOUT_MS,
                completion_grace_ms: None,
                strict_annotation: false,
            },
            sandbox: SandboxSettings {
                memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
                max_stack_bytes: DEFAULT_MAX_STACK_BYTES,
                inspect_depth: DEFAULT_INSPECT_DEPTH,
                max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
                pass_env: true,
                cwd: None,
            },
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from files and environment with no overrides
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.execution.timeout_ms == 0 {
            bail!("execution.timeout_ms must be greater than zero");
        }
        if self.execution.completion_grace_ms == Some(0) {
            bail!("execution.completion_grace_ms must be greater than zero");
        }
        if self.sandbox.inspect_depth > 16 {
            bail!(
                "sandbox.inspect_depth must be at most 16 (got {})",
                self.sandbox.inspect_depth
            );
        }
        if self.sandbox.max_log_entries == 0 {
            bail!("sandbox.max_log_entries must be greater than zero");
        }
        if self.sandbox.memory_limit_bytes < 1024 * 1024 {
            bail!("sandbox.memory_limit_bytes must be at least 1 MiB");
        }
        Ok(())
    }

    /// Grace period for the completion signal
    pub fn completion_grace_ms(&self) -> u64 {
        self.execution
            .completion_grace_ms
            .unwrap_or(self.execution.timeout_ms)
    }
}

/// Builder collecting explicit overrides before loading
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    timeout_ms: Option<u64>,
    strict_annotation: Option<bool>,
    skip_environment: bool,
}

impl ConfigBuilder {
    /// Config file to read (overrides default search)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn strict_annotation(mut self, strict: Option<bool>) -> Self {
        self.strict_annotation = strict;
        self
    }

    /// Ignore `.env`, `SCRATCHPAD_*` variables and the default file search
    pub fn skip_environment(mut self, skip: bool) -> Self {
        self.skip_environment = skip;
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();

        let mut builder = ::config::Config::builder()
            .set_default("execution.timeout_ms", defaults.execution.timeout_ms as i64)?
            .set_default(
                "execution.strict_annotation",
                defaults.execution.strict_annotation,
            )?
            .set_default(
                "sandbox.memory_limit_bytes",
                defaults.sandbox.memory_limit_bytes as i64,
            )?
            .set_default(
                "sandbox.max_stack_bytes",
                defaults.sandbox.max_stack_bytes as i64,
            )?
            .set_default("sandbox.inspect_depth", defaults.sandbox.inspect_depth as i64)?
            .set_default(
                "sandbox.max_log_entries",
                defaults.sandbox.max_log_entries as i64,
            )?
            .set_default("sandbox.pass_env", defaults.sandbox.pass_env)?;

        if !self.skip_environment {
            dotenvy::dotenv().ok();

            if let Some(dir) = dirs::config_dir() {
                let user_file = dir.join("scratchpad").join("config.toml");
                builder = builder.add_source(::config::File::from(user_file).required(false));
            }
        }

        let explicit_path = self.config_path.clone().or_else(|| {
            if self.skip_environment {
                None
            } else {
                std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from)
            }
        });

        match explicit_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                builder = builder.add_source(::config::File::from(path).required(true));
            }
            None if !self.skip_environment => {
                builder =
                    builder.add_source(::config::File::with_name(LOCAL_CONFIG_FILE).required(false));
            }
            None => {}
        }

        if !self.skip_environment {
            builder = builder.add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder = builder
            .set_override_option("execution.timeout_ms", self.timeout_ms.map(|t| t as i64))?
            .set_override_option("execution.strict_annotation", self.strict_annotation)?;

        let config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.timeout_ms, 10_000);
        assert_eq!(config.completion_grace_ms(), 10_000);
        assert_eq!(config.sandbox.inspect_depth, 3);
    }

    #[test]
    fn test_builder_without_environment_matches_defaults() {
        let config = Config::builder().skip_environment(true).build().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::builder()
            .skip_environment(true)
            .timeout_ms(Some(500))
            .strict_annotation(Some(true))
            .build()
            .unwrap();
        assert_eq!(config.execution.timeout_ms, 500);
        assert!(config.execution.strict_annotation);
    }

    #[test]
    fn test_file_values_are_layered() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[execution]\ntimeout_ms = 1500\ncompletion_grace_ms = 200\n\n[sandbox]\ninspect_depth = 5\npass_env = false"
        )
        .unwrap();

        let config = Config::builder()
            .skip_environment(true)
            .config_path(Some(file.path().to_path_buf()))
            .build()
            .unwrap();

        assert_eq!(config.execution.timeout_ms, 1500);
        assert_eq!(config.completion_grace_ms(), 200);
        assert_eq!(config.sandbox.inspect_depth, 5);
        assert!(!config.sandbox.pass_env);
        assert_eq!(config.sandbox.max_log_entries, DEFAULT_MAX_LOG_ENTRIES);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::builder()
            .skip_environment(true)
            .config_path(Some(PathBuf::from("/definitely/not/here.toml")))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::builder()
            .skip_environment(true)
            .timeout_ms(Some(0))
            .build();
        assert!(result.is_err());
    }
}
