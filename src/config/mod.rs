use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use crate::gateway::StickKind;
use crate::models::RadioMode;
use crate::telemetry::LogFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Unable to parse config {path:?}: {source}")]
    Parse { path: PathBuf, source: serde_yml::Error },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn device_port_default() -> String { return "/dev/ttyUSB0".to_string() }
fn device_mode_default() -> RadioMode { return RadioMode::T2 }
fn device_sticks_default() -> Vec<StickKind> { return vec![StickKind::IM871A, StickKind::AMB8465] }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DeviceConfig {
    #[serde(default="device_port_default")]
    pub port: String,
    #[serde(default="device_mode_default")]
    pub mode: RadioMode,
    /// Probe order when opening the port
    #[serde(default="device_sticks_default")]
    pub sticks: Vec<StickKind>,
}

fn registry_path_default() -> PathBuf { return PathBuf::from("meter.dat") }
fn registry_autosave_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RegistryConfig {
    #[serde(default="registry_path_default")]
    pub path: PathBuf,
    #[serde(default="registry_autosave_default")]
    pub autosave: bool,
}

fn logging_data_dir_default() -> PathBuf { return PathBuf::from("data") }
fn logging_format_default() -> LogFormat { return LogFormat::Csv }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct LoggingConfig {
    #[serde(default="logging_data_dir_default")]
    pub data_dir: PathBuf,
    #[serde(default="logging_format_default")]
    pub format: LogFormat,
}

fn acquisition_tick_ms_default() -> u64 { return 500 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AcquisitionConfig {
    /// Delay between two loop iterations, also the key poll timeout
    #[serde(default="acquisition_tick_ms_default")]
    pub tick_ms: u64,
}

fn simulator_interval_s_default() -> u64 { return 60 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SimulatorConfig {
    #[serde(default="simulator_interval_s_default")]
    pub interval_s: u64,
}

fn device_default() -> DeviceConfig { return DeviceConfig { port: device_port_default(), mode: device_mode_default(), sticks: device_sticks_default() }}
fn registry_default() -> RegistryConfig { return RegistryConfig { path: registry_path_default(), autosave: registry_autosave_default() }}
fn logging_default() -> LoggingConfig { return LoggingConfig { data_dir: logging_data_dir_default(), format: logging_format_default() }}
fn acquisition_default() -> AcquisitionConfig { return AcquisitionConfig { tick_ms: acquisition_tick_ms_default() }}
fn simulator_default() -> SimulatorConfig { return SimulatorConfig { interval_s: simulator_interval_s_default() }}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default="device_default")]
    pub device: DeviceConfig,
    #[serde(default="registry_default")]
    pub registry: RegistryConfig,
    #[serde(default="logging_default")]
    pub logging: LoggingConfig,
    #[serde(default="acquisition_default")]
    pub acquisition: AcquisitionConfig,
    #[serde(default="simulator_default")]
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        return Config {
            device: device_default(),
            registry: registry_default(),
            logging: logging_default(),
            acquisition: acquisition_default(),
            simulator: simulator_default(),
        };
    }
}

/// "0" means /dev/ttyUSB0, everything else is taken as a path
pub fn port_from_arg(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit()) {
        return format!("/dev/ttyUSB{}", arg);
    }
    return arg.to_string();
}

impl Config {
    pub fn from_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let c: Config = serde_yml::from_str(contents)
            .map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })?;
        c.validate()?;
        return Ok(c);
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut file = File::open(path).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| ConfigError::Io { path: path.to_path_buf(), source: e })?;
        return Config::from_str(&contents, path);
    }

    /// An explicit path must exist. Otherwise config/wmbus.yaml and wmbus.yaml
    /// are tried and the built in defaults are used if neither is there.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            info!("Using config {:?}", path);
            return Config::from_file(path);
        }

        for candidate in ["config/wmbus.yaml", "wmbus.yaml"] {
            let path = Path::new(candidate);
            if path.exists() {
                info!("Using config {:?}", path);
                return Config::from_file(path);
            }
        }

        debug!("No config file found, using defaults");
        return Ok(Config::default());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.sticks.is_empty() {
            return Err(ConfigError::Invalid("device.sticks must name at least one stick".to_string()));
        }
        if self.acquisition.tick_ms == 0 {
            return Err(ConfigError::Invalid("acquisition.tick_ms must be positive".to_string()));
        }
        if self.simulator.interval_s == 0 {
            return Err(ConfigError::Invalid("simulator.interval_s must be positive".to_string()));
        }
        return Ok(());
    }
}
