use crate::series::Sample;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Normal,
    Below,
    Above,
    /// Hodnota chybí (`NaN`), nelze rozhodnout.
    Invalid,
}

impl AlertLevel {
    pub fn is_alert(self) -> bool {
        matches!(self, AlertLevel::Below | AlertLevel::Above)
    }

    pub fn is_known(self) -> bool {
        self != AlertLevel::Invalid
    }
}

/// Uzavřený interval `[min, max]`, hranice jsou v pořádku.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn check(&self, value: f64) -> AlertLevel {
        if value.is_nan() {
            AlertLevel::Invalid
        } else if value < self.min {
            AlertLevel::Below
        } else if value > self.max {
            AlertLevel::Above
        } else {
            AlertLevel::Normal
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlertStatus {
    pub temperature: AlertLevel,
    pub humidity: AlertLevel,
}

impl AlertStatus {
    pub fn any_alert(&self) -> bool {
        self.temperature.is_alert() || self.humidity.is_alert()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub temperature: Range,
    pub humidity: Range,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { temperature: Range::new(24.0, 30.0), humidity: Range::new(50.0, 70.0) }
    }
}

impl Thresholds {
    pub fn evaluate(&self, sample: &Sample) -> AlertStatus {
        AlertStatus {
            temperature: self.temperature.check(sample.temperature),
            humidity: self.humidity.check(sample.humidity),
        }
    }
}
