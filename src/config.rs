//! Configuration management for the validation engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (validation.toml)
//! - Environment variables (VALIDATION__*)
//!
//! ## Example config file (validation.toml):
//! ```toml
//! [validation]
//! abort_early = false
//! abort_early_on_each_field = true
//!
//! [compiler]
//! strategy = "auto"
//! specialize = true
//!
//! [recursion]
//! max_depth = 10
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::compile::{CompileOptions, StrategyMode};
use crate::engine::ValidateOptions;
use crate::recursive::DEFAULT_MAX_DEPTH;

/// Main configuration for the validation engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default per-call options
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Validator compilation
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Recursive validation
    #[serde(default)]
    pub recursion: RecursionConfig,
}

/// Default per-call behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Stop at the first field-level error
    #[serde(default = "default_true")]
    pub abort_early: bool,

    /// Stop at the first failing rule within a field
    #[serde(default = "default_true")]
    pub abort_early_on_each_field: bool,
}

/// Compilation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Strategy for every field (auto, skip_aware, fast_separated)
    #[serde(default)]
    pub strategy: StrategyMode,

    /// Use the empty/single-rule shortcuts in auto mode
    #[serde(default = "default_true")]
    pub specialize: bool,
}

/// Recursion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecursionConfig {
    /// Depth limit for fields that do not set their own
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            abort_early: true,
            abort_early_on_each_field: true,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyMode::Auto,
            specialize: true,
        }
    }
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["validation.toml", ".validation.toml", "config/validation.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "validation") {
            let xdg_config = config_dir.config_dir().join("validation.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (VALIDATION__*)
        builder = builder.add_source(
            Environment::with_prefix("VALIDATION")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        tracing::debug!(
            strategy = ?loaded.compiler.strategy,
            max_depth = loaded.recursion.max_depth,
            "loaded engine configuration"
        );
        Ok(loaded)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            strategy: self.compiler.strategy,
            specialize: self.compiler.specialize,
        }
    }

    /// Per-call options seeded from the `[validation]` section
    pub fn validate_options(&self) -> ValidateOptions {
        ValidateOptions::default()
            .abort_early(self.validation.abort_early)
            .abort_early_on_each_field(self.validation.abort_early_on_each_field)
    }
}
