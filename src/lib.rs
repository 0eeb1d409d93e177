//! Jádro monitoru inkubátoru: TCP klient pro živá data ze senzoru,
//! klouzavé okno posledních vzorků a vyhodnocení mezí.

pub mod alert;
pub mod config;
pub mod error;
pub mod reading;
pub mod series;
pub mod stream;

pub use alert::{AlertLevel, AlertStatus, Range, Thresholds};
pub use config::{AppConfig, StreamConfig};
pub use error::{ConfigError, StreamError};
pub use reading::SensorReading;
pub use series::{RollingSeries, Sample, DEFAULT_CAPACITY};
pub use stream::{ConnectionState, DisconnectReason, StopHandle, StreamClient, StreamEvent};
