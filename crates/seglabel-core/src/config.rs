use crate::error::{Result, SeglabelError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

/// Default name of the output attribute that carries the region id
pub const DEFAULT_ID_OUTPUT_FIELD: &str = "region_id";

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for a join run
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub designated_field: ConfigValue<Option<String>>,
    pub region_id_field: ConfigValue<Option<String>>,
    pub id_output_field: ConfigValue<String>,
    pub parallel: ConfigValue<bool>,
    pub threads: ConfigValue<usize>,
}

/// Validated options consumed by the join pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    /// Point-layer field whose value must be unanimous within a region
    pub designated_field: String,

    /// Region-layer field holding the integer region id. When unset the
    /// feature id is used, falling back to the record index.
    pub region_id_field: Option<String>,

    /// Output attribute that carries the original region id
    pub id_output_field: String,

    /// Match points on the rayon thread pool
    pub parallel: bool,

    /// Worker threads for parallel matching, 0 for the rayon default
    pub threads: usize,
}

impl JoinOptions {
    /// Options with defaults for everything except the designated field
    pub fn new(designated_field: impl Into<String>) -> Self {
        Self {
            designated_field: designated_field.into(),
            region_id_field: None,
            id_output_field: DEFAULT_ID_OUTPUT_FIELD.to_string(),
            parallel: false,
            threads: 0,
        }
    }

    pub fn with_region_id_field(mut self, field: impl Into<String>) -> Self {
        self.region_id_field = Some(field.into());
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            designated_field: ConfigValue::new(None, ConfigSource::Default),
            region_id_field: ConfigValue::new(None, ConfigSource::Default),
            id_output_field: ConfigValue::new(
                DEFAULT_ID_OUTPUT_FIELD.to_string(),
                ConfigSource::Default,
            ),
            parallel: ConfigValue::new(false, ConfigSource::Default),
            threads: ConfigValue::new(0, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| SeglabelError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| SeglabelError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(field) = file_config.designated_field {
            self.designated_field.update(Some(field), ConfigSource::File);
        }

        if let Some(field) = file_config.region_id_field {
            self.region_id_field.update(Some(field), ConfigSource::File);
        }

        if let Some(field) = file_config.id_output_field {
            self.id_output_field.update(field, ConfigSource::File);
        }

        if let Some(parallel) = file_config.parallel {
            self.parallel.update(parallel, ConfigSource::File);
        }

        if let Some(threads) = file_config.threads {
            self.threads.update(threads, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // SEGLABEL_PROPERTY
        if let Ok(field) = env::var("SEGLABEL_PROPERTY") {
            if field.trim().is_empty() {
                tracing::warn!("Ignoring empty SEGLABEL_PROPERTY");
            } else {
                self.designated_field.update(Some(field), ConfigSource::Environment);
            }
        }

        // SEGLABEL_REGION_ID_FIELD
        if let Ok(field) = env::var("SEGLABEL_REGION_ID_FIELD") {
            if !field.trim().is_empty() {
                self.region_id_field.update(Some(field), ConfigSource::Environment);
            }
        }

        // SEGLABEL_ID_OUTPUT_FIELD
        if let Ok(field) = env::var("SEGLABEL_ID_OUTPUT_FIELD") {
            if !field.trim().is_empty() {
                self.id_output_field.update(field, ConfigSource::Environment);
            }
        }

        // SEGLABEL_PARALLEL
        if let Ok(parallel_str) = env::var("SEGLABEL_PARALLEL") {
            match parse_bool(&parallel_str) {
                Ok(parallel) => self.parallel.update(parallel, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid SEGLABEL_PARALLEL value '{}': expected true or false",
                    parallel_str
                ),
            }
        }

        // SEGLABEL_THREADS
        if let Ok(threads_str) = env::var("SEGLABEL_THREADS") {
            match threads_str.parse::<usize>() {
                Ok(threads) => self.threads.update(threads, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid SEGLABEL_THREADS value '{}': expected a non-negative integer",
                    threads_str
                ),
            }
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(field) = overrides.designated_field {
            self.designated_field.update(Some(field), ConfigSource::Cli);
        }

        if let Some(field) = overrides.region_id_field {
            self.region_id_field.update(Some(field), ConfigSource::Cli);
        }

        if let Some(field) = overrides.id_output_field {
            self.id_output_field.update(field, ConfigSource::Cli);
        }

        if let Some(parallel) = overrides.parallel {
            self.parallel.update(parallel, ConfigSource::Cli);
        }

        if let Some(threads) = overrides.threads {
            self.threads.update(threads, ConfigSource::Cli);
        }
    }

    /// Validate the layered values into options for a run
    pub fn resolve(&self) -> Result<JoinOptions> {
        let designated_field = self
            .designated_field
            .value
            .clone()
            .ok_or_else(|| SeglabelError::ConfigMissing { key: "designated_field".to_string() })?;

        if designated_field.trim().is_empty() {
            return Err(SeglabelError::ConfigInvalid {
                key: "designated_field".to_string(),
                reason: "field name must not be empty".to_string(),
            });
        }

        if self.id_output_field.value.trim().is_empty() {
            return Err(SeglabelError::ConfigInvalid {
                key: "id_output_field".to_string(),
                reason: "field name must not be empty".to_string(),
            });
        }

        Ok(JoinOptions {
            designated_field,
            region_id_field: self.region_id_field.value.clone(),
            id_output_field: self.id_output_field.value.clone(),
            parallel: self.parallel.value,
            threads: self.threads.value,
        })
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "designated_field".to_string(),
            (
                self.designated_field.value.clone().unwrap_or_else(|| "(unset)".to_string()),
                self.designated_field.source,
            ),
        );

        map.insert(
            "region_id_field".to_string(),
            (
                self.region_id_field.value.clone().unwrap_or_else(|| "(feature id)".to_string()),
                self.region_id_field.source,
            ),
        );

        map.insert(
            "id_output_field".to_string(),
            (self.id_output_field.value.clone(), self.id_output_field.source),
        );

        map.insert(
            "parallel".to_string(),
            (self.parallel.value.to_string(), self.parallel.source),
        );

        map.insert("threads".to_string(), (self.threads.value.to_string(), self.threads.source));

        map
    }
}

impl Default for LayeredConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    designated_field: Option<String>,
    region_id_field: Option<String>,
    id_output_field: Option<String>,
    parallel: Option<bool>,
    threads: Option<usize>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub designated_field: Option<String>,
    pub region_id_field: Option<String>,
    pub id_output_field: Option<String>,
    pub parallel: Option<bool>,
    pub threads: Option<usize>,
}

/// Parse a boolean flag from string
pub fn parse_bool(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(SeglabelError::ConfigInvalid {
            key: "parallel".to_string(),
            reason: format!("Invalid boolean: {}. Use true or false", s),
        }),
    }
}
