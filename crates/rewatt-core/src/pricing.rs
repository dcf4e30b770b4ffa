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

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rewatt_types::SensorKind;
use serde::{Deserialize, Serialize};

use crate::store::SensorStore;

/// Daily arbitrage price gates: charge at or below `low`, discharge at or
/// above `high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayThresholds {
    /// 33rd percentile of the day's spot prices (PLN/kWh)
    pub low: f64,
    /// 67th percentile of the day's spot prices (PLN/kWh)
    pub high: f64,
}

/// P33/P67 of a day's prices with truncating `(n-1)·pct/100` indexing, so
/// ties break toward the lowest index.
pub fn day_thresholds(prices: &[f64]) -> Option<DayThresholds> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let idx33 = ((n - 1) as f64 * 33.0 / 100.0) as usize;
    let idx67 = ((n - 1) as f64 * 67.0 / 100.0) as usize;
    Some(DayThresholds {
        low: sorted[idx33],
        high: sorted[idx67],
    })
}

/// Per-day threshold cache keyed on the UTC date of simulated time.
///
/// Recomputed from the store's spot-price series whenever the simulated day
/// changes; a day without prices yields `None` and the arbitrage and
/// pre-heat policies idle.
#[derive(Debug, Default, Clone)]
pub struct DayPriceCache {
    day: Option<NaiveDate>,
    thresholds: Option<DayThresholds>,
}

impl DayPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thresholds for the day containing `t`.
    pub fn thresholds_for(&mut self, store: &SensorStore, t: DateTime<Utc>) -> Option<DayThresholds> {
        let date = t.date_naive();
        if self.day != Some(date) {
            self.day = Some(date);
            self.thresholds = compute_for_day(store, date);
        }
        self.thresholds
    }

    /// Forget the cached day (used on seek and source switches).
    pub fn reset(&mut self) {
        self.day = None;
        self.thresholds = None;
    }
}

fn compute_for_day(store: &SensorStore, date: NaiveDate) -> Option<DayThresholds> {
    let sensor = store.sensor_of_kind(SensorKind::SpotPrice)?;
    let start = Utc
        .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
        .single()?;
    let end = start + chrono::Duration::days(1);
    let prices: Vec<f64> = store
        .readings_in_range(&sensor.id, start, end)
        .iter()
        .map(|r| r.value)
        .collect();
    day_thresholds(&prices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewatt_types::Reading;

    #[test]
    fn test_thresholds_of_24_hourly_prices() {
        // 0.00 .. 0.23: P33 index = 23*33/100 = 7, P67 index = 23*67/100 = 15
        let prices: Vec<f64> = (0..24).map(|h| f64::from(h) / 100.0).collect();
        let thresholds = day_thresholds(&prices).unwrap();
        assert_eq!(thresholds.low, 0.07);
        assert_eq!(thresholds.high, 0.15);
    }

    #[test]
    fn test_thresholds_tie_break_lowest_index() {
        let prices = vec![0.5, 0.5, 0.5, 0.5];
        let thresholds = day_thresholds(&prices).unwrap();
        assert_eq!(thresholds.low, 0.5);
        assert_eq!(thresholds.high, 0.5);
    }

    #[test]
    fn test_empty_day_has_no_thresholds() {
        assert!(day_thresholds(&[]).is_none());
    }

    #[test]
    fn test_cache_recomputes_on_day_change() {
        let mut store = SensorStore::new();
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let mut readings = Vec::new();
        for h in 0..24 {
            readings.push(Reading::point(
                "spot_price",
                SensorKind::SpotPrice,
                day1 + chrono::Duration::hours(h),
                0.10,
            ));
            readings.push(Reading::point(
                "spot_price",
                SensorKind::SpotPrice,
                day2 + chrono::Duration::hours(h),
                0.90,
            ));
        }
        store.add_readings(readings);

        let mut cache = DayPriceCache::new();
        let first = cache.thresholds_for(&store, day1 + chrono::Duration::hours(6)).unwrap();
        assert_eq!(first.low, 0.10);
        let second = cache.thresholds_for(&store, day2 + chrono::Duration::hours(6)).unwrap();
        assert_eq!(second.high, 0.90);
    }
}
