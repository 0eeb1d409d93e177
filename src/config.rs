use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::alert::{Range, Thresholds};
use crate::error::ConfigError;
use crate::series::DEFAULT_CAPACITY;

pub const CONFIG_FILE: &str = "config.json";
pub const CONFIG_ENV: &str = "INCUBATOR_MONITOR_CONFIG";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Obsah `config.json`. Chybějící klíče dostanou výchozí hodnoty,
/// neznámé klíče se ignorují.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub tcp_host: String,
    pub tcp_port: u16,
    pub reconnect_delay_seconds: u64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub min_humid: f64,
    pub max_humid: f64,
    pub series_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tcp_host: "127.0.0.1".to_string(),
            tcp_port: 7878,
            reconnect_delay_seconds: 3,
            min_temp: 24.0,
            max_temp: 30.0,
            min_humid: 50.0,
            max_humid: 70.0,
            series_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl AppConfig {
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tcp_host.trim().is_empty() {
            return Err(ConfigError::Invalid("tcp_host je prázdný".into()));
        }
        if self.tcp_port == 0 {
            return Err(ConfigError::Invalid("tcp_port nesmí být 0".into()));
        }
        // záporné porovnání odmítne i NaN
        if !(self.min_temp <= self.max_temp) {
            return Err(ConfigError::Invalid(format!("min_temp {} > max_temp {}", self.min_temp, self.max_temp)));
        }
        // viz výše, NaN neprojde
        if !(self.min_humid <= self.max_humid) {
            return Err(ConfigError::Invalid(format!("min_humid {} > max_humid {}", self.min_humid, self.max_humid)));
        }
        if self.series_capacity == 0 {
            return Err(ConfigError::Invalid("series_capacity nesmí být 0".into()));
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            host: self.tcp_host.clone(),
            port: self.tcp_port,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_seconds),
            ..StreamConfig::default()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            temperature: Range::new(self.min_temp, self.max_temp),
            humidity: Range::new(self.min_humid, self.max_humid),
        }
    }

    pub fn set_thresholds(&mut self, thresholds: &Thresholds) {
        self.min_temp = thresholds.temperature.min;
        self.max_temp = thresholds.temperature.max;
        self.min_humid = thresholds.humidity.min;
        self.max_humid = thresholds.humidity.max;
    }
}

/// Parametry TCP klienta.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
        }
    }
}

impl StreamConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Načte konfiguraci. Chybějící soubor znamená výchozí hodnoty.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    info!("Načítám konfiguraci z '{}'.", path.display());
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Konfigurační soubor '{}' nenalezen, používám výchozí hodnoty.", path.display());
            return Ok(AppConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    config.validate()?;
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    info!("Konfigurace uložena do '{}'.", path.display());
    Ok(())
}
