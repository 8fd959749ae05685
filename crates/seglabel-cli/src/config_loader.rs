//! Configuration loading utilities for CLI commands

use anyhow::{Context, Result};
use seglabel_core::config::{CliConfigOverrides, LayeredConfig};
use std::path::Path;

/// Load layered configuration: defaults, optional file, environment, CLI
pub fn load_config(config_file: Option<&Path>, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let mut config = LayeredConfig::with_defaults();

    if let Some(path) = config_file {
        config = config
            .load_from_file(path)
            .with_context(|| format!("Failed to load configuration file {}", path.display()))?;
    }

    let mut config = config.load_from_env();
    config.update_from_cli(overrides);

    for (key, (value, source)) in sorted(config.to_inspection_map()) {
        tracing::debug!(key = %key, value = %value, source = ?source, "Resolved configuration");
    }

    Ok(config)
}

fn sorted<V>(map: std::collections::HashMap<String, V>) -> Vec<(String, V)> {
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}
