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

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rewatt_types::{Reading, Sensor, SensorCatalog, SensorKind, TimeRange};
use tracing::{debug, info, warn};

use crate::dialects::{Dialect, ParseReport, parse_readings};
use crate::{IngestError, Result};

/// Everything a load pass produces.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub readings: Vec<Reading>,
    pub sensors: Vec<Sensor>,
    pub report: ParseReport,
    /// Span of the statistics/export provenance, if any
    pub archival_range: Option<TimeRange>,
    /// Span of the recent-snapshot provenance, if any
    pub current_range: Option<TimeRange>,
}

/// Load every `*.csv` under `dir`.
///
/// Files are processed in file-name order so that the store's
/// last-write-wins dedup is deterministic when the same `(sensor,
/// timestamp)` appears in two files. A file whose header matches no known
/// dialect is a hard error; everything row-level is soft and counted.
pub fn load_dir(dir: &Path, catalog: &SensorCatalog) -> Result<LoadResult> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(IngestError::EmptyDirectory(dir.display().to_string()));
    }

    let mut readings = Vec::new();
    let mut report = ParseReport::default();
    let mut kinds_seen: HashSet<SensorKind> = HashSet::new();
    let mut archival_range: Option<TimeRange> = None;
    let mut current_range: Option<TimeRange> = None;

    for path in &paths {
        let dialect = sniff_dialect(path)?;
        let file = File::open(path)?;
        let (mut file_readings, file_report) =
            parse_readings(dialect, BufReader::new(file), catalog)?;

        debug!(
            "{}: {} rows, {} readings ({} skipped) [{}]",
            path.display(),
            file_report.rows_total,
            file_report.rows_parsed,
            file_report.skipped_total(),
            dialect
        );

        if let Some(span) = span_of(&file_readings) {
            let slot = if dialect.is_archival() {
                &mut archival_range
            } else {
                &mut current_range
            };
            *slot = Some(match slot {
                Some(existing) => existing.union(&span),
                None => span,
            });
        }

        for reading in &file_readings {
            kinds_seen.insert(reading.kind);
        }
        readings.append(&mut file_readings);
        report.merge(&file_report);
    }

    let sensors: Vec<Sensor> = SensorKind::all()
        .iter()
        .filter(|kind| kinds_seen.contains(kind))
        .map(|kind| Sensor::canonical(*kind))
        .collect();

    info!(
        "Loaded {} readings across {} sensors from {} files ({} rows skipped)",
        readings.len(),
        sensors.len(),
        paths.len(),
        report.skipped_total()
    );
    if report.skipped_total() > 0 {
        warn!(
            "Skipped rows: {} unknown entity, {} bad state, {} unparseable",
            report.skipped_unknown_entity, report.skipped_bad_state, report.skipped_bad_row
        );
    }

    Ok(LoadResult {
        readings,
        sensors,
        report,
        archival_range,
        current_range,
    })
}

/// Read just the header row to pick the dialect.
fn sniff_dialect(path: &Path) -> Result<Dialect> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let header = reader.headers()?.clone();
    Dialect::from_header(&header).ok_or_else(|| IngestError::UnknownHeader {
        path: path.display().to_string(),
        header: header.iter().collect::<Vec<_>>().join(","),
    })
}

fn span_of(readings: &[Reading]) -> Option<TimeRange> {
    let first = readings.iter().map(|r| r.timestamp).min()?;
    let last = readings.iter().map(|r| r.timestamp).max()?;
    Some(TimeRange::new(first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_dir_partitions_provenance() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "01_stats.csv",
            "sensor_id,start_time,avg,min_val,max_val\n\
             sensor.grid_power,1709280000.0,500.0,100.0,900.0\n\
             sensor.grid_power,1709283600.0,600.0,200.0,1000.0\n",
        );
        write_file(
            dir.path(),
            "02_recent.csv",
            "sensor_id,value,updated_ts\n\
             sensor.grid_power,700.0,1709290000.0\n",
        );

        let result = load_dir(dir.path(), &SensorCatalog::with_defaults()).unwrap();
        assert_eq!(result.readings.len(), 3);
        assert_eq!(result.sensors.len(), 1);

        let archival = result.archival_range.unwrap();
        let current = result.current_range.unwrap();
        assert!(archival.end < current.start);
    }

    #[test]
    fn test_load_dir_rejects_unknown_header() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bad.csv", "time,watts\n1,2\n");

        let err = load_dir(dir.path(), &SensorCatalog::with_defaults()).unwrap_err();
        assert!(matches!(err, IngestError::UnknownHeader { .. }));
    }

    #[test]
    fn test_load_dir_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dir(dir.path(), &SensorCatalog::with_defaults()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyDirectory(_)));
    }
}
