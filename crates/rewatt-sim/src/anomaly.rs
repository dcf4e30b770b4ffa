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

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rewatt_core::{PredictionProvider, SensorStore};
use rewatt_types::SensorKind;
use serde::{Deserialize, Serialize};

/// A day whose realized consumption deviates from the prediction by more
/// than the σ threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAnomaly {
    pub date: NaiveDate,
    pub actual_kwh: f64,
    pub predicted_kwh: f64,
    pub residual_kwh: f64,
    pub deviation_sigma: f64,
}

/// Daily grid import (kWh) per calendar day, trapezoidally integrated with
/// the standard 2 h gap guard.
pub fn daily_consumption(store: &SensorStore) -> BTreeMap<NaiveDate, f64> {
    let mut days: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let Some(grid) = store.sensor_of_kind(SensorKind::GridPower) else {
        return days;
    };
    let Some(series) = store.series(&grid.id) else {
        return days;
    };

    for pair in series.windows(2) {
        let dt_secs = (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64;
        if dt_secs <= 0.0 || dt_secs > 2.0 * 3600.0 {
            continue;
        }
        let avg_w = (pair[0].value + pair[1].value) / 2.0;
        if avg_w <= 0.0 {
            continue;
        }
        let kwh = avg_w * dt_secs / 3_600_000.0;
        *days.entry(pair[1].timestamp.date_naive()).or_default() += kwh;
    }
    days
}

/// Predicted daily consumption: the hourly predictor accumulated over the
/// day's 24 hours.
fn predicted_daily_kwh(provider: &dyn PredictionProvider, date: NaiveDate) -> f64 {
    let Some(midnight) = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc()) else {
        return 0.0;
    };
    (0..24)
        .map(|h| provider.power_at(midnight + chrono::Duration::hours(h)) / 1000.0)
        .sum()
}

/// Compare realized daily consumption against the predictor and flag the
/// days whose residual deviates from the mean residual by more than
/// `sigma_threshold` standard deviations.
pub fn detect_anomalies(
    store: &SensorStore,
    provider: &dyn PredictionProvider,
    sigma_threshold: f64,
) -> Vec<DayAnomaly> {
    let actuals = daily_consumption(store);
    if actuals.len() < 2 {
        return Vec::new();
    }

    let residuals: BTreeMap<NaiveDate, (f64, f64, f64)> = actuals
        .into_iter()
        .map(|(date, actual)| {
            let predicted = predicted_daily_kwh(provider, date);
            (date, (actual, predicted, actual - predicted))
        })
        .collect();

    let values: Vec<f64> = residuals.values().map(|(_, _, r)| *r).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return Vec::new();
    }

    residuals
        .into_iter()
        .filter_map(|(date, (actual, predicted, residual))| {
            let deviation = (residual - mean) / std_dev;
            if deviation.abs() > sigma_threshold {
                Some(DayAnomaly {
                    date,
                    actual_kwh: actual,
                    predicted_kwh: predicted,
                    residual_kwh: residual,
                    deviation_sigma: deviation,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rewatt_core::SeasonalProfileProvider;
    use rewatt_types::Reading;

    fn store_with_spike() -> SensorStore {
        let mut store = SensorStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut readings = Vec::new();
        for day in 0..10 {
            for h in 0..24 {
                let ts = t0 + chrono::Duration::days(day) + chrono::Duration::hours(h);
                // Day 5 consumes five times the usual
                let demand = if day == 5 { 5000.0 } else { 1000.0 };
                readings.push(Reading::point("grid_power", SensorKind::GridPower, ts, demand));
            }
        }
        store.add_readings(readings);
        store
    }

    #[test]
    fn test_daily_consumption_integration() {
        let store = store_with_spike();
        let days = daily_consumption(&store);
        let normal_day = days
            .get(&Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap().date_naive())
            .copied()
            .unwrap();
        // 1 kW around the clock: ~24 kWh (edges lose one interval)
        assert!((normal_day - 24.0).abs() < 2.0);
    }

    #[test]
    fn test_spike_day_is_flagged() {
        let store = store_with_spike();
        let provider = SeasonalProfileProvider::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        );
        let anomalies = detect_anomalies(&store, &provider, 2.0);

        assert_eq!(anomalies.len(), 1);
        let spike = &anomalies[0];
        assert_eq!(
            spike.date,
            Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap().date_naive()
        );
        assert!(spike.deviation_sigma > 2.0);
    }

    #[test]
    fn test_uniform_days_have_no_anomalies() {
        let mut store = SensorStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut readings = Vec::new();
        for day in 0..5 {
            for h in 0..24 {
                let ts = t0 + chrono::Duration::days(day) + chrono::Duration::hours(h);
                readings.push(Reading::point("grid_power", SensorKind::GridPower, ts, 800.0));
            }
        }
        store.add_readings(readings);

        let provider = SeasonalProfileProvider::new(t0);
        assert!(detect_anomalies(&store, &provider, 2.0).is_empty());
    }

    #[test]
    fn test_missing_grid_sensor_yields_nothing() {
        let store = SensorStore::new();
        let provider = SeasonalProfileProvider::new(Utc::now());
        assert!(detect_anomalies(&store, &provider, 2.0).is_empty());
    }
}
