use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Places where the connx executable is looked up, in order.
pub const DEFAULT_RUNTIME_CANDIDATES: [&str; 3] = ["onnx_connx/connx", "./connx", "connx"];

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Runtime executable candidates. Entries with a path separator are checked as file
    /// paths, bare names are searched on `PATH`.
    pub runtime_candidates: Vec<String>,
    /// Log level used by the command line tool.
    pub log_level: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            runtime_candidates: DEFAULT_RUNTIME_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_level: String::from("info"),
        }
    }
}

impl BackendConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the runtime candidates.
    pub fn with_runtime_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime_candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Set the log level.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// The log level as a filter, `Info` if it does not parse.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    /// Saves the configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<(), ConfigError> {
        std::fs::write(file, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Loads the configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self, ConfigError> {
        let file = file.as_ref();
        let content = std::fs::read_to_string(file)
            .map_err(|_| ConfigError::FileNotFound(file.to_path_buf()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Options of a single [`prepare`](crate::Backend::prepare) call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareOptions {
    /// Directory receiving the compiled artifact. It is created if missing and never removed.
    /// A fresh temporary directory owned by the execution target is used when absent.
    #[serde(default)]
    pub out: Option<PathBuf>,
}

impl PrepareOptions {
    /// Compile into a caller-owned directory.
    pub fn with_out(mut self, out: impl Into<PathBuf>) -> Self {
        self.out = Some(out.into());
        self
    }
}
