//! Streaming average / max / ramp-up aggregation

use serde::{Deserialize, Serialize};

/// Single-pass aggregate over a timestamped series.
///
/// Only the running sum, count and max are kept, plus the first time a
/// datapoint exceeded `ramp_up_threshold`. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsAggregate {
    ramp_up_threshold: f64,
    start_time: Option<f64>,
    sum: f64,
    count: u64,
    max: f64,
    ramp_up_time: Option<f64>,
}

impl Default for StatisticsAggregate {
    /// An aggregate whose threshold can never be exceeded
    fn default() -> Self {
        Self::new(f64::INFINITY)
    }
}

impl StatisticsAggregate {
    pub fn new(ramp_up_threshold: f64) -> Self {
        Self {
            ramp_up_threshold,
            start_time: None,
            sum: 0.0,
            count: 0,
            max: 0.0,
            ramp_up_time: None,
        }
    }

    /// Record one datapoint
    pub fn add(&mut self, time: f64, value: f64) {
        if self.start_time.is_none() {
            self.start_time = Some(time);
        }
        self.sum += value;
        self.count += 1;
        self.max = self.max.max(value);
        if value > self.ramp_up_threshold {
            // First trigger by timestamp, so a late-inserted earlier sample wins
            self.ramp_up_time = Some(match self.ramp_up_time {
                Some(t) => t.min(time),
                None => time,
            });
        }
    }

    /// Rounded mean, 0 with no samples
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64).round()
        }
    }

    /// Running maximum, 0 with no samples
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Time from the first sample until the threshold was first exceeded,
    /// `f64::INFINITY` if it never was
    pub fn ramp_up_time(&self) -> f64 {
        match (self.start_time, self.ramp_up_time) {
            (Some(start), Some(ramp)) => ramp - start,
            _ => f64::INFINITY,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn ramp_up_threshold(&self) -> f64 {
        self.ramp_up_threshold
    }

    /// Start a new measurement window with the same threshold
    pub fn reset(&mut self) {
        *self = Self::new(self.ramp_up_threshold);
    }
}
