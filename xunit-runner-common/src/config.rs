//! Runner configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use xunit_sdk::metadata::{DiscoveryOptions, MethodDisplay};
use xunit_sdk::ExecutionOptions;

/// File looked up next to the test assembly when no path is given
pub const CONFIG_FILE_NAME: &str = "xunit.runner.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How default test display names are formed
    #[serde(default)]
    pub method_display: MethodDisplay,

    /// Resolve source file and line for discovered tests
    #[serde(default)]
    pub include_source_information: bool,

    /// Cancel the run after the first failure
    #[serde(default)]
    pub stop_on_fail: bool,

    /// Run test collections in parallel
    #[serde(default = "default_true")]
    pub parallelize_test_collections: bool,

    /// Worker thread limit (0 = number of CPUs)
    #[serde(default)]
    pub max_parallel_threads: usize,

    /// Forward diagnostic messages to the reporter
    #[serde(default)]
    pub diagnostic_messages: bool,

    /// Timeout for tests without their own, in milliseconds (0 = none)
    #[serde(default)]
    pub default_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            method_display: MethodDisplay::default(),
            include_source_information: false,
            stop_on_fail: false,
            parallelize_test_collections: default_true(),
            max_parallel_threads: 0,
            diagnostic_messages: false,
            default_timeout_ms: 0,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_owned(),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: RunnerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Load the configuration file sitting next to a test assembly
    pub fn for_assembly(assembly_path: &Path) -> Result<Self> {
        let directory = assembly_path.parent().unwrap_or_else(|| Path::new("."));
        Self::load(Some(&directory.join(CONFIG_FILE_NAME)))
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            stop_on_fail: self.stop_on_fail,
            parallelize_test_collections: self.parallelize_test_collections,
            max_parallel_threads: self.max_parallel_threads,
            default_timeout_ms: self.default_timeout_ms,
        }
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            method_display: self.method_display,
            include_source_information: self.include_source_information,
        }
    }
}

fn default_true() -> bool {
    true
}
