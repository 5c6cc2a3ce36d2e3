// src/config.rs

//! Manages gateway configuration: loading, defaults, and validation.

use crate::core::session::SessionConfig;
use crate::core::value::DataType;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use tracing::warn;

/// Settings for the data source the session connects to.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SourceConfig {
    /// The name (program id) of the data source.
    #[serde(default = "default_source_name")]
    pub name: String,
    /// The update interval requested for the subscription group, in milliseconds.
    #[serde(default = "default_update_rate_ms")]
    pub update_rate_ms: u32,
    /// If true, every write is read back and must match before `WRITE_OK` is sent.
    #[serde(default)]
    pub verify_writes: bool,
    /// If true, the subscription group is activated once the startup points are registered.
    #[serde(default = "default_activate_on_start")]
    pub activate_on_start: bool,
}

fn default_source_name() -> String {
    "Matrikon.OPC.Simulation.1".to_string()
}
fn default_update_rate_ms() -> u32 {
    1000
}
fn default_activate_on_start() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            update_rate_ms: default_update_rate_ms(),
            verify_writes: false,
            activate_on_start: default_activate_on_start(),
        }
    }
}

impl SourceConfig {
    /// The session tunables derived from this source configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            update_rate_ms: self.update_rate_ms,
            verify_writes: self.verify_writes,
        }
    }
}

/// A point registered when the gateway starts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PointConfig {
    pub id: String,
    #[serde(default = "default_point_type")]
    pub data_type: DataType,
}

fn default_point_type() -> DataType {
    DataType::Empty
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    7701
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_pool_size")]
    pool_size: usize,
    #[serde(default = "default_max_request_length")]
    max_request_length: usize,
    #[serde(default)]
    source: SourceConfig,
    #[serde(default)]
    points: Vec<PointConfig>,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    7700
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_pool_size() -> usize {
    30
}
fn default_max_request_length() -> usize {
    1024
}

/// The smallest request line limit that still fits a useful request.
const MIN_REQUEST_LENGTH: usize = 16;

/// Represents the final, validated gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// The number of worker threads and the number of concurrently served clients.
    pub pool_size: usize,
    /// The longest request line accepted, in bytes.
    pub max_request_length: usize,
    pub source: SourceConfig,
    pub points: Vec<PointConfig>,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            pool_size: default_pool_size(),
            max_request_length: default_max_request_length(),
            source: SourceConfig::default(),
            points: Vec::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            pool_size: raw_config.pool_size,
            max_request_length: raw_config.max_request_length,
            source: raw_config.source,
            points: raw_config.points,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.pool_size == 0 {
            return Err(anyhow!("pool_size cannot be 0"));
        }
        if self.max_request_length < MIN_REQUEST_LENGTH {
            return Err(anyhow!(
                "max_request_length must be at least {MIN_REQUEST_LENGTH} bytes"
            ));
        }
        if self.source.name.trim().is_empty() {
            return Err(anyhow!("source.name cannot be empty"));
        }
        if self.source.update_rate_ms == 0 {
            return Err(anyhow!("source.update_rate_ms cannot be 0"));
        }

        let mut seen = HashSet::new();
        for (i, point) in self.points.iter().enumerate() {
            if point.id.trim().is_empty() {
                return Err(anyhow!("points[{i}].id cannot be empty"));
            }
            if point.id.contains(crate::core::protocol::request::DELIMITER) {
                return Err(anyhow!(
                    "points[{i}].id '{}' contains the request delimiter",
                    point.id
                ));
            }
            if !seen.insert(point.id.as_str()) {
                return Err(anyhow!("point '{}' is configured more than once", point.id));
            }
        }

        if self.pool_size > 1024 {
            warn!(
                "pool_size of {} is unusually large; each slot is a worker thread.",
                self.pool_size
            );
        }
        if self.metrics.enabled && self.metrics.port == self.port {
            return Err(anyhow!("metrics.port cannot be the same as port"));
        }
        Ok(())
    }
}
