//! Configuration management for the standalone host.
//!
//! Settings are read from INI files with the following precedence (later
//! entries override earlier ones):
//!
//! 1. Built-in defaults
//! 2. System configuration (`/etc/cvproxy/cvproxy.cfg`)
//! 3. User configuration (`~/.config/cvproxy/cvproxy.cfg`)
//! 4. Local configuration (`./cvproxy.cfg`)
//!
//! Each file only needs to mention the values it changes.
//!
//! # Configuration File Format
//!
//! ```ini
//! [units]
//! unit_angstrom = 1.0
//! boltzmann = 0.001987191
//!
//! [simulation]
//! temperature = 300.0
//! timestep = 1.0
//! restart_frequency = 1000
//! seed = 12345
//!
//! [cell]
//! periodic = true
//! a = 40.0
//! b = 40.0
//! c = 40.0
//!
//! [io]
//! output_prefix = run1
//!
//! [logging]
//! level = info
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use cvproxy::settings::SettingsManager;
//!
//! let manager = SettingsManager::load()?;
//! println!("temperature: {} K", manager.simulation().temperature);
//! # Ok::<(), cvproxy::settings::ConfigError>(())
//! ```

use crate::pbc::PeriodicCell;
use configparser::ini::Ini;
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Name of the configuration file looked up in every location
pub const CONFIG_FILE_NAME: &str = "cvproxy.cfg";

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// All settings of the standalone host.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Unit system of the host
    pub units: UnitSettings,
    /// Simulation parameters
    pub simulation: SimulationSettings,
    /// Simulation cell
    pub cell: CellSettings,
    /// File prefixes
    pub io: IoSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Unit system of the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitSettings {
    /// Host length unit expressed in angstrom (default: 1.0)
    pub unit_angstrom: f64,
    /// Boltzmann constant in host energy units per kelvin (default: kcal/mol/K)
    pub boltzmann: f64,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            unit_angstrom: 1.0,
            boltzmann: 0.001987191,
        }
    }
}

/// Simulation parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSettings {
    /// Temperature in K (default: 300.0)
    pub temperature: f64,
    /// Time step in fs (default: 1.0)
    pub timestep: f64,
    /// Steps between restart snapshots; 0 disables them (default: 1000)
    pub restart_frequency: usize,
    /// Seed of the Gaussian random number generator; `None` draws from the OS
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            temperature: 300.0,
            timestep: 1.0,
            restart_frequency: 1000,
            seed: None,
        }
    }
}

/// Simulation cell.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CellSettings {
    /// Whether periodic boundaries are applied (default: false)
    pub periodic: bool,
    /// Edge along x
    pub a: f64,
    /// Edge along y
    pub b: f64,
    /// Edge along z
    pub c: f64,
}

impl CellSettings {
    /// Cell described by these settings.
    pub fn to_cell(&self) -> PeriodicCell {
        if self.periodic {
            PeriodicCell::orthorhombic(self.a, self.b, self.c)
        } else {
            PeriodicCell::Open
        }
    }
}

/// File prefixes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IoSettings {
    /// Prefix of input (restart) files (default: empty)
    pub input_prefix: String,
    /// Prefix of output files (default: "cvproxy")
    pub output_prefix: String,
    /// Prefix of restart files; empty means use `output_prefix`
    pub restart_output_prefix: String,
}

impl Default for IoSettings {
    fn default() -> Self {
        Self {
            input_prefix: String::new(),
            output_prefix: "cvproxy".to_string(),
            restart_output_prefix: String::new(),
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: error, warn, info, debug or trace (default: "info")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Level filter for the logger; unknown names fall back to `Info`.
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.level).unwrap_or(LevelFilter::Info)
    }
}

/// Configuration manager that handles loading and accessing settings.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings: Settings,
    config_source: String,
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::from_settings(Settings::default())
    }
}

impl SettingsManager {
    /// Loads configuration from every available configuration file.
    ///
    /// Files that exist but cannot be parsed are skipped with a warning.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        let mut config_source = "built-in defaults".to_string();

        let candidates = [
            ("system", Self::get_system_config_path()),
            ("user", Self::get_user_config_path()),
            ("local", Some(PathBuf::from(CONFIG_FILE_NAME))),
        ];
        for (kind, path) in candidates {
            let Some(path) = path else { continue };
            if !path.exists() {
                continue;
            }
            let mut candidate = settings.clone();
            match Self::apply_file(&mut candidate, &path) {
                Ok(()) => {
                    settings = candidate;
                    config_source = format!("{} config ({})", kind, path.display());
                    debug!("Loaded {} configuration from: {}", kind, path.display());
                }
                Err(e) => {
                    warn!("Failed to load {} config from {}: {}", kind, path.display(), e);
                }
            }
        }

        info!("Configuration loaded from: {}", config_source);
        Ok(Self {
            settings,
            config_source,
        })
    }

    /// Loads built-in defaults overridden by a single file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        Self::apply_file(&mut settings, path)?;
        info!("Configuration loaded from: {}", path.display());
        Ok(Self {
            settings,
            config_source: path.display().to_string(),
        })
    }

    /// Wraps settings built in code.
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            settings,
            config_source: "built-in defaults".to_string(),
        }
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Gets a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Gets the unit settings.
    pub fn units(&self) -> &UnitSettings {
        &self.settings.units
    }

    /// Gets the simulation settings.
    pub fn simulation(&self) -> &SimulationSettings {
        &self.settings.simulation
    }

    /// Gets the cell settings.
    pub fn cell(&self) -> &CellSettings {
        &self.settings.cell
    }

    /// Gets the file prefix settings.
    pub fn io(&self) -> &IoSettings {
        &self.settings.io
    }

    /// Gets the logging settings.
    pub fn logging(&self) -> &LoggingSettings {
        &self.settings.logging
    }

    /// Overrides `settings` with the values present in one INI file.
    fn apply_file(settings: &mut Settings, path: &Path) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::apply_str(settings, &content)
    }

    /// Overrides `settings` with the values present in INI text.
    pub fn apply_str(settings: &mut Settings, content: &str) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;
        let map = ini.get_map_ref();

        if let Some(section) = map.get("units") {
            set_parsed(section, "unit_angstrom", &mut settings.units.unit_angstrom)?;
            set_parsed(section, "boltzmann", &mut settings.units.boltzmann)?;
            if settings.units.unit_angstrom <= 0.0 {
                return Err(ConfigError::InvalidValue(format!(
                    "unit_angstrom must be positive, got {}",
                    settings.units.unit_angstrom
                )));
            }
        }

        if let Some(section) = map.get("simulation") {
            set_parsed(section, "temperature", &mut settings.simulation.temperature)?;
            set_parsed(section, "timestep", &mut settings.simulation.timestep)?;
            set_parsed(section, "restart_frequency", &mut settings.simulation.restart_frequency)?;
            if let Some(Some(seed)) = section.get("seed") {
                settings.simulation.seed = if seed.trim().is_empty() {
                    None
                } else {
                    Some(seed.trim().parse().map_err(|_| {
                        ConfigError::InvalidValue(format!("Invalid seed: {}", seed))
                    })?)
                };
            }
        }

        if let Some(section) = map.get("cell") {
            set_parsed(section, "periodic", &mut settings.cell.periodic)?;
            set_parsed(section, "a", &mut settings.cell.a)?;
            set_parsed(section, "b", &mut settings.cell.b)?;
            set_parsed(section, "c", &mut settings.cell.c)?;
        }

        if let Some(section) = map.get("io") {
            for (key, target) in [
                ("input_prefix", &mut settings.io.input_prefix),
                ("output_prefix", &mut settings.io.output_prefix),
                ("restart_output_prefix", &mut settings.io.restart_output_prefix),
            ] {
                if let Some(value) = section.get(key) {
                    *target = value.clone().unwrap_or_default().trim().to_string();
                }
            }
        }

        if let Some(section) = map.get("logging") {
            if let Some(Some(level)) = section.get("level") {
                settings.logging.level = level.trim().to_ascii_lowercase();
            }
        }

        Ok(())
    }

    /// Gets the system configuration file path.
    fn get_system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            Some(PathBuf::from("/etc/cvproxy").join(CONFIG_FILE_NAME))
        }
        #[cfg(windows)]
        {
            std::env::var("PROGRAMDATA")
                .ok()
                .map(|pd| PathBuf::from(pd).join("cvproxy").join(CONFIG_FILE_NAME))
        }
    }

    /// Gets the user configuration file path.
    fn get_user_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join(".config")
                    .join("cvproxy")
                    .join(CONFIG_FILE_NAME)
            })
        }
        #[cfg(windows)]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|appdata| PathBuf::from(appdata).join("cvproxy").join(CONFIG_FILE_NAME))
        }
    }
}

/// Parses `key` from `section` into `target` when present and non-empty.
fn set_parsed<T: FromStr>(
    section: &HashMap<String, Option<String>>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(Some(raw)) = section.get(key) {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(());
        }
        *target = raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("Invalid {}: {}", key, raw)))?;
    }
    Ok(())
}

impl SettingsManager {
    /// Writes a commented configuration template with all default values.
    pub fn create_template(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, Self::generate_template_content())?;
        info!("Created settings template at: {}", path.display());
        Ok(())
    }

    /// Generates the content of a configuration template.
    fn generate_template_content() -> String {
        let d = Settings::default();
        format!(
            r#"# cvproxy configuration file
#
# Files are loaded in this order, later files overriding earlier ones:
#
# 1. /etc/cvproxy/cvproxy.cfg
# 2. ~/.config/cvproxy/cvproxy.cfg
# 3. ./cvproxy.cfg
#
# Missing sections or values keep the built-in defaults shown below.

[units]
# Host length unit expressed in angstrom
unit_angstrom = {}
# Boltzmann constant in host energy units per kelvin (kcal/mol/K)
boltzmann = {}

[simulation]
# Temperature (K)
temperature = {}
# Time step (fs)
timestep = {}
# Steps between restart snapshots (0 disables them)
restart_frequency = {}
# Seed of the Gaussian random number generator (empty: random)
seed =

[cell]
# Orthorhombic periodic cell; ignored unless periodic = true
periodic = {}
a = {}
b = {}
c = {}

[io]
input_prefix = {}
output_prefix = {}
# Empty: use output_prefix
restart_output_prefix = {}

[logging]
# error, warn, info, debug or trace
level = {}
"#,
            d.units.unit_angstrom,
            d.units.boltzmann,
            d.simulation.temperature,
            d.simulation.timestep,
            d.simulation.restart_frequency,
            d.cell.periodic,
            d.cell.a,
            d.cell.b,
            d.cell.c,
            d.io.input_prefix,
            d.io.output_prefix,
            d.io.restart_output_prefix,
            d.logging.level,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut settings = Settings::default();
        SettingsManager::apply_str(&mut settings, "[simulation]\ntemperature = 310.5\nseed = 7\n").unwrap();

        assert_eq!(settings.simulation.temperature, 310.5);
        assert_eq!(settings.simulation.seed, Some(7));
        assert_eq!(settings.simulation.timestep, 1.0);
        assert_eq!(settings.io.output_prefix, "cvproxy");
    }

    #[test]
    fn test_cell_settings() {
        let mut settings = Settings::default();
        SettingsManager::apply_str(&mut settings, "[cell]\nperiodic = true\na = 10\nb = 20\nc = 30\n").unwrap();
        assert_eq!(
            settings.cell.to_cell(),
            PeriodicCell::Orthorhombic { a: 10.0, b: 20.0, c: 30.0 }
        );
    }

    #[test]
    fn test_invalid_value_rejected() {
        let mut settings = Settings::default();
        let err = SettingsManager::apply_str(&mut settings, "[simulation]\ntimestep = fast\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        let err = SettingsManager::apply_str(&mut settings, "[units]\nunit_angstrom = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_level_filter() {
        let mut logging = LoggingSettings::default();
        assert_eq!(logging.level_filter(), LevelFilter::Info);
        logging.level = "debug".to_string();
        assert_eq!(logging.level_filter(), LevelFilter::Debug);
        logging.level = "chatty".to_string();
        assert_eq!(logging.level_filter(), LevelFilter::Info);
    }

    #[test]
    fn test_template_round_trips_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        SettingsManager::create_template(&path).unwrap();

        let manager = SettingsManager::load_from(&path).unwrap();
        assert_eq!(manager.settings(), &Settings::default());
    }
}
