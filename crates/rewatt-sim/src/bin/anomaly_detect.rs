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

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use comfy_table::{Attribute, Cell, Color, Table, presets::UTF8_FULL};
use rewatt_core::{SeasonalProfileProvider, SensorStore};
use rewatt_ingest::load_dir;
use rewatt_sim::{daily_consumption, detect_anomalies};
use rewatt_types::SensorCatalog;

#[derive(Parser, Debug)]
#[command(name = "anomaly-detect")]
#[command(about = "Flag days whose consumption deviates from the prediction", long_about = None)]
struct Cli {
    /// Directory with the sensor CSV archives
    #[arg(long)]
    input_dir: PathBuf,

    /// Deviation threshold in standard deviations
    #[arg(long, default_value_t = 2.0)]
    sigma: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let load = load_dir(&cli.input_dir, &SensorCatalog::with_defaults())
        .with_context(|| format!("Failed to load CSVs from {}", cli.input_dir.display()))?;
    let mut store = SensorStore::new();
    for sensor in &load.sensors {
        store.add_sensor(sensor.clone());
    }
    store.add_readings(load.readings);

    let Some(range) = store.global_time_range() else {
        bail!("Dataset is empty: nothing to analyze");
    };

    let provider = SeasonalProfileProvider::new(range.start);
    let days = daily_consumption(&store);
    let anomalies = detect_anomalies(&store, &provider, cli.sigma);

    println!(
        "Analyzed {} days, {} anomalies at {:.1}σ",
        days.len(),
        anomalies.len(),
        cli.sigma
    );
    if anomalies.is_empty() {
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Date").add_attribute(Attribute::Bold),
        Cell::new("Actual\n(kWh)").add_attribute(Attribute::Bold),
        Cell::new("Predicted\n(kWh)").add_attribute(Attribute::Bold),
        Cell::new("Residual\n(kWh)").add_attribute(Attribute::Bold),
        Cell::new("Deviation\n(σ)").add_attribute(Attribute::Bold),
    ]);

    for anomaly in &anomalies {
        let sigma_cell = if anomaly.deviation_sigma > 0.0 {
            Cell::new(format!("{:+.2}", anomaly.deviation_sigma)).fg(Color::Red)
        } else {
            Cell::new(format!("{:+.2}", anomaly.deviation_sigma)).fg(Color::Blue)
        };
        table.add_row(vec![
            Cell::new(anomaly.date.to_string()),
            Cell::new(format!("{:.1}", anomaly.actual_kwh)),
            Cell::new(format!("{:.1}", anomaly.predicted_kwh)),
            Cell::new(format!("{:+.1}", anomaly.residual_kwh)),
            sigma_cell,
        ]);
    }

    println!("{table}");
    Ok(())
}
