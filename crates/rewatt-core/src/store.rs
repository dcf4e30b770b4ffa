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

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rewatt_types::{Reading, Sensor, SensorKind, TimeRange};

/// In-memory time-indexed store: one sorted series per sensor.
///
/// Point lookups and range scans are binary searches; the store is immutable
/// once the load phase completes and is then safe behind an `Arc` for
/// concurrent reads. Lookups on unknown sensors return `None`/empty, never
/// an error.
#[derive(Debug, Default)]
pub struct SensorStore {
    sensors: HashMap<String, Sensor>,
    series: HashMap<String, Vec<Reading>>,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor; idempotent on id (the first registration wins).
    pub fn add_sensor(&mut self, sensor: Sensor) {
        self.series.entry(sensor.id.clone()).or_default();
        self.sensors.entry(sensor.id.clone()).or_insert(sensor);
    }

    /// Insert a batch that may span many sensors.
    ///
    /// Each target series stays sorted by timestamp; duplicates at the same
    /// `(sensor_id, timestamp)` collapse with the later insert winning. A
    /// batch that extends the tail monotonically takes the append fast path.
    pub fn add_readings(&mut self, readings: Vec<Reading>) {
        let mut batches: HashMap<String, Vec<Reading>> = HashMap::new();
        for reading in readings {
            self.sensors
                .entry(reading.sensor_id.clone())
                .or_insert_with(|| Sensor::canonical(reading.kind));
            batches
                .entry(reading.sensor_id.clone())
                .or_default()
                .push(reading);
        }

        for (sensor_id, batch) in batches {
            let series = self.series.entry(sensor_id).or_default();
            if is_strict_tail_extension(series, &batch) {
                series.extend(batch);
            } else {
                merge_batch(series, batch);
            }
        }
    }

    /// Last reading with `timestamp <= t`, if any.
    pub fn reading_at(&self, sensor_id: &str, t: DateTime<Utc>) -> Option<&Reading> {
        let series = self.series.get(sensor_id)?;
        let idx = series.partition_point(|r| r.timestamp <= t);
        if idx == 0 { None } else { series.get(idx - 1) }
    }

    /// Readings with `from <= timestamp < to`, in timestamp order.
    pub fn readings_in_range(&self, sensor_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> &[Reading] {
        let Some(series) = self.series.get(sensor_id) else {
            return &[];
        };
        let lower = series.partition_point(|r| r.timestamp < from);
        let upper = series.partition_point(|r| r.timestamp < to);
        &series[lower..upper]
    }

    /// First/last timestamps for one sensor.
    pub fn time_range(&self, sensor_id: &str) -> Option<TimeRange> {
        let series = self.series.get(sensor_id)?;
        let first = series.first()?;
        let last = series.last()?;
        Some(TimeRange::new(first.timestamp, last.timestamp))
    }

    /// Union of every sensor's time range.
    pub fn global_time_range(&self) -> Option<TimeRange> {
        self.series
            .keys()
            .filter_map(|id| self.time_range(id))
            .reduce(|acc, range| acc.union(&range))
    }

    /// Full series slice for cursor-based replay.
    pub fn series(&self, sensor_id: &str) -> Option<&[Reading]> {
        self.series.get(sensor_id).map(Vec::as_slice)
    }

    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    /// First registered sensor of a kind (canonical layouts have one each).
    pub fn sensor_of_kind(&self, kind: SensorKind) -> Option<&Sensor> {
        self.sensors.values().find(|s| s.kind == kind)
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn reading_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }
}

fn is_strict_tail_extension(series: &[Reading], batch: &[Reading]) -> bool {
    let batch_monotonic = batch
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp);
    if !batch_monotonic {
        return false;
    }
    match (series.last(), batch.first()) {
        (Some(tail), Some(head)) => tail.timestamp < head.timestamp,
        (None, Some(_)) => true,
        (_, None) => true,
    }
}

/// Sort-then-merge path: stable sort keeps insertion order among equal
/// timestamps, then the later entry of each run wins.
fn merge_batch(series: &mut Vec<Reading>, batch: Vec<Reading>) {
    series.extend(batch);
    series.sort_by_key(|r| r.timestamp);
    let mut deduped: Vec<Reading> = Vec::with_capacity(series.len());
    for reading in series.drain(..) {
        match deduped.last_mut() {
            Some(prev) if prev.timestamp == reading.timestamp => *prev = reading,
            _ => deduped.push(reading),
        }
    }
    *series = deduped;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn grid(t: DateTime<Utc>, value: f64) -> Reading {
        Reading::point("grid_power", SensorKind::GridPower, t, value)
    }

    #[test]
    fn test_reading_at_returns_greatest_at_or_before() {
        let mut store = SensorStore::new();
        store.add_readings(vec![grid(ts(6, 0), 100.0), grid(ts(7, 0), 200.0)]);

        assert!(store.reading_at("grid_power", ts(5, 59)).is_none());
        assert_eq!(store.reading_at("grid_power", ts(6, 0)).unwrap().value, 100.0);
        assert_eq!(store.reading_at("grid_power", ts(6, 30)).unwrap().value, 100.0);
        assert_eq!(store.reading_at("grid_power", ts(9, 0)).unwrap().value, 200.0);
    }

    #[test]
    fn test_reading_at_is_monotonic() {
        let mut store = SensorStore::new();
        store.add_readings(vec![
            grid(ts(6, 0), 1.0),
            grid(ts(6, 30), 2.0),
            grid(ts(8, 0), 3.0),
        ]);

        let mut previous: Option<DateTime<Utc>> = None;
        for minutes in (0..240).step_by(7) {
            let t = ts(6, 0) + chrono::Duration::minutes(minutes);
            if let Some(reading) = store.reading_at("grid_power", t) {
                if let Some(prev) = previous {
                    assert!(reading.timestamp >= prev);
                }
                previous = Some(reading.timestamp);
            }
        }
    }

    #[test]
    fn test_duplicate_timestamp_last_write_wins() {
        let mut store = SensorStore::new();
        store.add_readings(vec![grid(ts(6, 0), 100.0)]);
        store.add_readings(vec![grid(ts(6, 0), 150.0)]);

        let series = store.series("grid_power").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 150.0);
    }

    #[test]
    fn test_unsorted_batch_is_merged() {
        let mut store = SensorStore::new();
        store.add_readings(vec![
            grid(ts(8, 0), 3.0),
            grid(ts(6, 0), 1.0),
            grid(ts(7, 0), 2.0),
        ]);

        let values: Vec<f64> = store
            .series("grid_power")
            .unwrap()
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_range_scan_is_half_open() {
        let mut store = SensorStore::new();
        store.add_readings(vec![
            grid(ts(6, 0), 1.0),
            grid(ts(7, 0), 2.0),
            grid(ts(8, 0), 3.0),
        ]);

        let hits = store.readings_in_range("grid_power", ts(6, 0), ts(8, 0));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].value, 1.0);
        assert_eq!(hits[1].value, 2.0);
    }

    #[test]
    fn test_unknown_sensor_lookups_are_empty() {
        let store = SensorStore::new();
        assert!(store.reading_at("nope", ts(6, 0)).is_none());
        assert!(store.readings_in_range("nope", ts(6, 0), ts(8, 0)).is_empty());
        assert!(store.time_range("nope").is_none());
        assert!(store.global_time_range().is_none());
    }

    #[test]
    fn test_global_range_spans_sensors() {
        let mut store = SensorStore::new();
        store.add_readings(vec![
            grid(ts(6, 0), 1.0),
            Reading::point("pv_power", SensorKind::PvPower, ts(9, 0), 5.0),
        ]);

        let range = store.global_time_range().unwrap();
        assert_eq!(range.start, ts(6, 0));
        assert_eq!(range.end, ts(9, 0));
    }

    #[test]
    fn test_add_sensor_is_idempotent() {
        let mut store = SensorStore::new();
        store.add_sensor(Sensor::canonical(SensorKind::GridPower));
        store.add_sensor(Sensor {
            display_name: "Other".to_owned(),
            ..Sensor::canonical(SensorKind::GridPower)
        });
        assert_eq!(store.sensor_count(), 1);
        assert_eq!(
            store.sensors().next().unwrap().display_name,
            "Grid power"
        );
    }
}
