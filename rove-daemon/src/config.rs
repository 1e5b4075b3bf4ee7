//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;

use serde::Deserialize;

// Daemon configuration: one TOML document with a table per daemon.
//
// The parser is tolerant: unknown keys are ignored so configs can carry
// deployment-specific annotations.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: Logging,
    pub control_plane: rove_routing::ControlPlaneCfg,
    pub rp_sla: rove_sla::InstanceCfg,
    pub rp_rip1: rove_rip1::InstanceCfg,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub stdout: LoggingStdout,
    pub file: LoggingFile,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    #[default]
    Full,
    Json,
    Pretty,
}

// Configuration errors. The only errors that abort startup.
#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    NotToml(String),
    Parse(String, toml::de::Error),
}

// ===== impl Config =====

impl Config {
    pub const DFLT_FILEPATH: &'static str = "/etc/roved.toml";

    pub fn load(config_file: &str) -> Result<Config, ConfigError> {
        let path = Path::new(config_file);
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            return Err(ConfigError::NotToml(config_file.to_owned()));
        }

        let config_str = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(config_file.to_owned()))?;
        toml::from_str(&config_str)
            .map_err(|error| ConfigError::Parse(config_file.to_owned(), error))
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "roved.log".to_owned(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: Default::default(),
            colors: false,
            show_source: false,
        }
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(path) => {
                write!(f, "configuration file not found: {}", path)
            }
            ConfigError::NotToml(path) => {
                write!(f, "configuration file must be a .toml file: {}", path)
            }
            ConfigError::Parse(path, error) => {
                write!(f, "failed to parse {}: {}", path, error)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ===== tests =====
