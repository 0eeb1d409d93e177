use std::cmp::Ordering;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::reading::SensorReading;

pub const DEFAULT_CAPACITY: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub time: DateTime<Utc>,
    /// `NaN`, pokud senzor hodnotu neposlal.
    pub temperature: f64,
    pub humidity: f64,
}

/// Klouzavé okno posledních vzorků pro graf.
///
/// Tři paralelní fronty mají vždy stejnou délku; při překročení kapacity
/// se odstraňují nejstarší vzorky v pořadí vložení.
#[derive(Clone, Debug)]
pub struct RollingSeries {
    capacity: usize,
    time: VecDeque<DateTime<Utc>>,
    temperature: VecDeque<f64>,
    humidity: VecDeque<f64>,
}

impl Default for RollingSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingSeries {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            time: VecDeque::with_capacity(capacity + 1),
            temperature: VecDeque::with_capacity(capacity + 1),
            humidity: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn append(&mut self, time: DateTime<Utc>, temperature: f64, humidity: f64) {
        self.time.push_back(time);
        self.temperature.push_back(temperature);
        self.humidity.push_back(humidity);
        while self.time.len() > self.capacity {
            self.time.pop_front();
            self.temperature.pop_front();
            self.humidity.pop_front();
        }
    }

    pub fn append_reading(&mut self, reading: &SensorReading) {
        self.append(
            reading.timestamp,
            reading.temperature_celsius.unwrap_or(f64::NAN),
            reading.humidity_percent.unwrap_or(f64::NAN),
        );
    }

    pub fn clear(&mut self) {
        self.time.clear();
        self.temperature.clear();
        self.humidity.clear();
    }

    pub fn latest(&self) -> Option<Sample> {
        Some(Sample {
            time: *self.time.back()?,
            temperature: *self.temperature.back()?,
            humidity: *self.humidity.back()?,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Vzorky od nejstaršího po nejnovější.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.time
            .iter()
            .zip(self.temperature.iter())
            .zip(self.humidity.iter())
            .map(|((time, temperature), humidity)| Sample { time: *time, temperature: *temperature, humidity: *humidity })
    }

    /// Body `[unix sekundy, °C]` pro graf.
    pub fn temperature_points(&self) -> Vec<[f64; 2]> {
        plot_points(&self.time, &self.temperature)
    }

    pub fn humidity_points(&self) -> Vec<[f64; 2]> {
        plot_points(&self.time, &self.humidity)
    }

    pub fn min_max_temperature(&self) -> Option<(f64, f64)> {
        min_max(&self.temperature)
    }

    pub fn min_max_humidity(&self) -> Option<(f64, f64)> {
        min_max(&self.humidity)
    }
}

fn plot_points(time: &VecDeque<DateTime<Utc>>, values: &VecDeque<f64>) -> Vec<[f64; 2]> {
    time.iter()
        .zip(values.iter())
        .map(|(t, v)| [t.timestamp_millis() as f64 / 1000.0, *v])
        .collect()
}

fn min_max(values: &VecDeque<f64>) -> Option<(f64, f64)> {
    let known = || values.iter().copied().filter(|v| !v.is_nan());
    let min = known().min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))?;
    let max = known().max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))?;
    Some((min, max))
}
