// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Rewatt.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::path::Path;

use anyhow::{Context, Result};
use rewatt_types::SimulationConfig;
use tracing::{info, warn};

/// Load the TOML configuration, falling back to defaults when no file is
/// given or the given file does not exist. A present-but-invalid file is a
/// hard error; silent defaults would mask operator mistakes.
pub fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    let Some(path) = path else {
        info!("No config file given, using defaults");
        return Ok(SimulationConfig::default().clamped());
    };

    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(SimulationConfig::default().clamped());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SimulationConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config.clamped())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/rewatt.toml"))).unwrap();
        assert_eq!(config.battery.capacity_kwh, 10.0);
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[battery]\ncapacity_kwh = 15.5\n\n[engine]\nspeed = 7200.0\n"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.battery.capacity_kwh, 15.5);
        assert_eq!(config.engine.speed, 7200.0);
        // Untouched sections keep their defaults
        assert_eq!(config.thermal.setpoint_c, 21.0);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "battery = \"not a table\"").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_degenerate_values_are_clamped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nspeed = -10.0\n").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert!(config.engine.speed > 0.0);
        assert!(config.engine.start_paused);
    }
}
