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

use std::io::Write;

use rewatt_types::Reading;

use crate::Result;

/// Write readings in the snapshot dialect (`sensor_id,value,updated_ts`).
///
/// Rows are sorted by `(sensor_id, timestamp)`, values use the shortest
/// round-trip representation, timestamps carry 7 fractional digits, lines
/// end with LF.
pub fn write_readings<W: Write>(output: W, readings: &[Reading]) -> Result<()> {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by(|a, b| {
        a.sensor_id
            .cmp(&b.sensor_id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["sensor_id", "value", "updated_ts"])?;
    for reading in sorted {
        let seconds = reading.timestamp.timestamp() as f64
            + f64::from(reading.timestamp.timestamp_subsec_nanos()) / 1e9;
        let value = reading.value.to_string();
        let updated_ts = format!("{seconds:.7}");
        writer.write_record([reading.sensor_id.as_str(), value.as_str(), updated_ts.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::{Dialect, parse_readings};
    use chrono::TimeZone;
    use chrono::Utc;
    use rewatt_types::{Reading, SensorCatalog, SensorKind};

    fn sample_readings() -> Vec<Reading> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        vec![
            Reading::point(
                "spot_price",
                SensorKind::SpotPrice,
                t0 + chrono::Duration::hours(1),
                0.425,
            ),
            Reading::point("grid_power", SensorKind::GridPower, t0, 1250.0),
            Reading::point(
                "grid_power",
                SensorKind::GridPower,
                t0 + chrono::Duration::milliseconds(500),
                -300.5,
            ),
        ]
    }

    #[test]
    fn test_output_is_sorted_with_lf_endings() {
        let mut buf = Vec::new();
        write_readings(&mut buf, &sample_readings()).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(!text.contains('\r'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "sensor_id,value,updated_ts");
        assert!(lines[1].starts_with("grid_power,1250,"));
        assert!(lines[2].starts_with("grid_power,-300.5,"));
        assert!(lines[3].starts_with("spot_price,0.425,"));
    }

    #[test]
    fn test_timestamps_have_seven_fraction_digits() {
        let mut buf = Vec::new();
        write_readings(&mut buf, &sample_readings()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        for line in text.lines().skip(1) {
            let ts = line.rsplit(',').next().unwrap();
            let fraction = ts.rsplit('.').next().unwrap();
            assert_eq!(fraction.len(), 7, "line: {line}");
        }
    }

    #[test]
    fn test_round_trip_preserves_readings() {
        let readings = sample_readings();
        let mut buf = Vec::new();
        write_readings(&mut buf, &readings).unwrap();

        let (parsed, report) = parse_readings(
            Dialect::RecentSnapshot,
            buf.as_slice(),
            &SensorCatalog::with_defaults(),
        )
        .unwrap();
        assert_eq!(report.rows_parsed, 3);

        let mut expected = readings;
        expected.sort_by(|a, b| {
            a.sensor_id
                .cmp(&b.sensor_id)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        assert_eq!(parsed, expected);
    }
}
