// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Rewatt.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensor::SensorKind;

/// A single sensor observation.
///
/// `value` is the representative sample; `min`/`max` bracket the source
/// aggregation window when the source delivers pre-aggregated statistics,
/// otherwise they equal `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub kind: SensorKind,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Reading {
    /// Create a plain reading without an aggregation window (min = max = value).
    pub fn point(
        sensor_id: impl Into<String>,
        kind: SensorKind,
        timestamp: DateTime<Utc>,
        value: f64,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind,
            timestamp,
            value,
            min: value,
            max: value,
        }
    }

    /// Create a reading carrying a source aggregation window.
    pub fn aggregated(
        sensor_id: impl Into<String>,
        kind: SensorKind,
        timestamp: DateTime<Utc>,
        value: f64,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind,
            timestamp,
            value,
            min,
            max,
        }
    }
}

/// Inclusive first/last timestamp pair for a series.
///
/// `end` is inclusive when treated as a timestamp and exclusive when used as
/// a scan boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `t` falls inside the range (end inclusive).
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    /// Smallest range covering both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Range duration in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_point_reading_has_degenerate_window() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let r = Reading::point("sensor.grid_power", SensorKind::GridPower, ts, 420.0);
        assert_eq!(r.min, 420.0);
        assert_eq!(r.max, 420.0);
    }

    #[test]
    fn test_time_range_union() {
        let a = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        );
        let b = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        let u = a.union(&b);
        assert_eq!(u.start, a.start);
        assert_eq!(u.end, b.end);
    }

    #[test]
    fn test_time_range_contains_is_end_inclusive() {
        let r = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        assert!(r.contains(r.end));
        assert!(!r.contains(r.end + chrono::Duration::seconds(1)));
    }
}
