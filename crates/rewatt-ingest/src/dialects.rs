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

use std::io::Read;

use chrono::{DateTime, Utc};
use rewatt_types::{Reading, SensorCatalog};
use serde::{Deserialize, Serialize};

use crate::Result;

/// The three source CSV dialects.
///
/// Detected per file from the header row; the parsed readings are
/// indistinguishable afterwards apart from the aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// `entity_id,state,last_changed`: Home-Assistant export, RFC3339 UTC
    HaExport,
    /// `sensor_id,start_time,avg,min_val,max_val`: long-term statistics,
    /// float unix seconds, carries min/max
    LongTermStats,
    /// `sensor_id,value,updated_ts`: recent snapshot, float unix seconds
    RecentSnapshot,
}

impl Dialect {
    /// Match a header row against the known dialects.
    pub fn from_header(header: &csv::StringRecord) -> Option<Dialect> {
        let fields: Vec<&str> = header.iter().map(str::trim).collect();
        match fields.as_slice() {
            ["entity_id", "state", "last_changed"] => Some(Dialect::HaExport),
            ["sensor_id", "start_time", "avg", "min_val", "max_val"] => {
                Some(Dialect::LongTermStats)
            }
            ["sensor_id", "value", "updated_ts"] => Some(Dialect::RecentSnapshot),
            _ => None,
        }
    }

    /// Whether this dialect belongs to the archival or the current partition.
    pub fn is_archival(&self) -> bool {
        !matches!(self, Dialect::RecentSnapshot)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HaExport => write!(f, "ha-export"),
            Self::LongTermStats => write!(f, "long-term-stats"),
            Self::RecentSnapshot => write!(f, "recent-snapshot"),
        }
    }
}

/// Soft-failure counters accumulated while parsing.
///
/// None of these terminate a load; the totals are reported once afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub rows_total: u64,
    pub rows_parsed: u64,
    pub skipped_unknown_entity: u64,
    pub skipped_bad_state: u64,
    pub skipped_bad_row: u64,
}

impl ParseReport {
    pub fn merge(&mut self, other: &ParseReport) {
        self.rows_total += other.rows_total;
        self.rows_parsed += other.rows_parsed;
        self.skipped_unknown_entity += other.skipped_unknown_entity;
        self.skipped_bad_state += other.skipped_bad_state;
        self.skipped_bad_row += other.skipped_bad_row;
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped_unknown_entity + self.skipped_bad_state + self.skipped_bad_row
    }
}

/// Parse one CSV stream of a known dialect into readings.
///
/// Unknown entities, unavailable states and unparseable rows are skipped and
/// counted; only the csv layer's I/O failures surface as errors.
pub fn parse_readings<R: Read>(
    dialect: Dialect,
    input: R,
    catalog: &SensorCatalog,
) -> Result<(Vec<Reading>, ParseReport)> {
    let mut reader = csv::Reader::from_reader(input);
    let mut readings = Vec::new();
    let mut report = ParseReport::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(_) => {
                report.rows_total += 1;
                report.skipped_bad_row += 1;
                continue;
            }
        };
        report.rows_total += 1;

        match parse_row(dialect, &record, catalog) {
            RowOutcome::Reading(reading) => {
                report.rows_parsed += 1;
                readings.push(reading);
            }
            RowOutcome::UnknownEntity => report.skipped_unknown_entity += 1,
            RowOutcome::BadState => report.skipped_bad_state += 1,
            RowOutcome::BadRow => report.skipped_bad_row += 1,
        }
    }

    Ok((readings, report))
}

enum RowOutcome {
    Reading(Reading),
    UnknownEntity,
    BadState,
    BadRow,
}

fn parse_row(dialect: Dialect, record: &csv::StringRecord, catalog: &SensorCatalog) -> RowOutcome {
    let Some(raw_id) = record.get(0).map(str::trim) else {
        return RowOutcome::BadRow;
    };
    let Some(kind) = catalog.resolve(raw_id) else {
        return RowOutcome::UnknownEntity;
    };

    match dialect {
        Dialect::HaExport => {
            let Some(state) = record.get(1).map(str::trim) else {
                return RowOutcome::BadRow;
            };
            // HA writes literal placeholder states for gaps
            if state.eq_ignore_ascii_case("unknown") || state.eq_ignore_ascii_case("unavailable") {
                return RowOutcome::BadState;
            }
            let Ok(value) = state.parse::<f64>() else {
                return RowOutcome::BadState;
            };
            let Some(timestamp) = record
                .get(2)
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                .map(|t| t.with_timezone(&Utc))
            else {
                return RowOutcome::BadRow;
            };
            RowOutcome::Reading(Reading::point(kind.canonical_id(), kind, timestamp, value))
        }
        Dialect::LongTermStats => {
            let Some(timestamp) = record.get(1).and_then(parse_unix_seconds) else {
                return RowOutcome::BadRow;
            };
            let avg = record.get(2).and_then(|s| s.trim().parse::<f64>().ok());
            let min = record.get(3).and_then(|s| s.trim().parse::<f64>().ok());
            let max = record.get(4).and_then(|s| s.trim().parse::<f64>().ok());
            let (Some(avg), Some(min), Some(max)) = (avg, min, max) else {
                return RowOutcome::BadRow;
            };
            RowOutcome::Reading(Reading::aggregated(
                kind.canonical_id(),
                kind,
                timestamp,
                avg,
                min,
                max,
            ))
        }
        Dialect::RecentSnapshot => {
            let Some(value) = record.get(1).and_then(|s| s.trim().parse::<f64>().ok()) else {
                return RowOutcome::BadRow;
            };
            let Some(timestamp) = record.get(2).and_then(parse_unix_seconds) else {
                return RowOutcome::BadRow;
            };
            RowOutcome::Reading(Reading::point(kind.canonical_id(), kind, timestamp, value))
        }
    }
}

/// Float unix seconds (with sub-second fraction) to UTC.
fn parse_unix_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rewatt_types::SensorKind;

    fn catalog() -> SensorCatalog {
        SensorCatalog::with_defaults()
    }

    #[test]
    fn test_dialect_detection() {
        let header = csv::StringRecord::from(vec!["entity_id", "state", "last_changed"]);
        assert_eq!(Dialect::from_header(&header), Some(Dialect::HaExport));

        let header =
            csv::StringRecord::from(vec!["sensor_id", "start_time", "avg", "min_val", "max_val"]);
        assert_eq!(Dialect::from_header(&header), Some(Dialect::LongTermStats));

        let header = csv::StringRecord::from(vec!["sensor_id", "value", "updated_ts"]);
        assert_eq!(Dialect::from_header(&header), Some(Dialect::RecentSnapshot));

        let header = csv::StringRecord::from(vec!["time", "watts"]);
        assert_eq!(Dialect::from_header(&header), None);
    }

    #[test]
    fn test_ha_export_skips_placeholder_states() {
        let data = "entity_id,state,last_changed\n\
                    sensor.grid_power,1200.5,2024-03-01T06:00:00.123456789+00:00\n\
                    sensor.grid_power,unavailable,2024-03-01T06:05:00+00:00\n\
                    sensor.grid_power,unknown,2024-03-01T06:10:00+00:00\n\
                    sensor.grid_power,garbage,2024-03-01T06:15:00+00:00\n";
        let (readings, report) =
            parse_readings(Dialect::HaExport, data.as_bytes(), &catalog()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_id, "grid_power");
        assert_eq!(readings[0].value, 1200.5);
        assert_eq!(report.rows_total, 4);
        assert_eq!(report.skipped_bad_state, 3);
    }

    #[test]
    fn test_long_term_stats_carries_window() {
        let data = "sensor_id,start_time,avg,min_val,max_val\n\
                    sensor.pv_power,1709280000.0,850.0,200.0,2100.0\n";
        let (readings, report) =
            parse_readings(Dialect::LongTermStats, data.as_bytes(), &catalog()).unwrap();
        assert_eq!(report.rows_parsed, 1);
        let r = &readings[0];
        assert_eq!(r.kind, SensorKind::PvPower);
        assert_eq!(r.min, 200.0);
        assert_eq!(r.max, 2100.0);
        assert_eq!(
            r.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_recent_snapshot_fractional_seconds() {
        let data = "sensor_id,value,updated_ts\n\
                    sensor.spot_price,0.42,1709280000.2500000\n";
        let (readings, _) =
            parse_readings(Dialect::RecentSnapshot, data.as_bytes(), &catalog()).unwrap();
        assert_eq!(readings[0].timestamp.timestamp_subsec_millis(), 250);
        assert_eq!(readings[0].min, readings[0].value);
    }

    #[test]
    fn test_unknown_entity_drops_row() {
        let data = "sensor_id,value,updated_ts\n\
                    sensor.washing_machine,1.0,1709280000.0\n\
                    sensor.grid_power,700.0,1709280000.0\n";
        let (readings, report) =
            parse_readings(Dialect::RecentSnapshot, data.as_bytes(), &catalog()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(report.skipped_unknown_entity, 1);
    }

    #[test]
    fn test_report_merge() {
        let mut a = ParseReport {
            rows_total: 10,
            rows_parsed: 8,
            skipped_unknown_entity: 1,
            skipped_bad_state: 1,
            skipped_bad_row: 0,
        };
        let b = ParseReport {
            rows_total: 5,
            rows_parsed: 5,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.rows_total, 15);
        assert_eq!(a.skipped_total(), 2);
    }
}
