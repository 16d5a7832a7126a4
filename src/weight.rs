//! Metric-to-weight normalization for the heat layer.

use serde::{Deserialize, Serialize};

use crate::{CampusConfig, Metric};

// ---

/// Weight used when a metric is missing or not a finite number.
///
/// Kept above zero so "unknown" renders differently from a measured worst
/// case.
pub const UNKNOWN_WEIGHT: f64 = 0.15;

/// Signal strength clamp range, dBm.
pub const SIGNAL_RANGE: MetricRange = MetricRange {
    min: -120.0,
    max: -50.0,
};

/// Download speed clamp range, Mbps.
pub const SPEED_RANGE: MetricRange = MetricRange {
    min: 0.0,
    max: 100.0,
};

/// Inclusive clamp range mapped linearly onto `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    // ---
    /// Linear position of `raw` inside the range, clamped.
    pub fn scale(&self, raw: f64) -> f64 {
        // ---
        let span = self.max - self.min;
        if span <= 0.0 {
            return if raw >= self.max { 1.0 } else { 0.0 };
        }
        (raw.clamp(self.min, self.max) - self.min) / span
    }
}

#[derive(Debug, Clone)]
pub struct WeightNormalizer {
    signal: MetricRange,
    speed: MetricRange,
    unknown: f64,
}

impl Default for WeightNormalizer {
    fn default() -> Self {
        Self {
            signal: SIGNAL_RANGE,
            speed: SPEED_RANGE,
            unknown: UNKNOWN_WEIGHT,
        }
    }
}

impl WeightNormalizer {
    // ---
    pub fn from_config(campus: &CampusConfig) -> Self {
        Self {
            signal: campus.signal_range,
            speed: campus.speed_range,
            unknown: campus.unknown_weight.clamp(0.0, 1.0),
        }
    }

    /// Map a raw metric to `[0, 1]`. Never fails.
    pub fn to_weight(&self, metric: Metric, raw: Option<f64>) -> f64 {
        // ---
        let Some(raw) = raw.filter(|v| v.is_finite()) else {
            return self.unknown;
        };
        match metric {
            Metric::SignalStrength => self.signal.scale(raw),
            Metric::DownloadSpeed => self.speed.scale(raw),
        }
    }
}
