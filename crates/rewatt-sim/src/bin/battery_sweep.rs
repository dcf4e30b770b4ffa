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
use rewatt_core::SensorStore;
use rewatt_ingest::load_dir;
use rewatt_sim::run_capacity;
use rewatt_types::{BatteryConfig, SensorCatalog, TariffConfig};

#[derive(Parser, Debug)]
#[command(name = "battery-sweep")]
#[command(about = "Replay the archive across a vector of battery capacities", long_about = None)]
struct Cli {
    /// Directory with the sensor CSV archives
    #[arg(long)]
    input_dir: PathBuf,

    /// Capacities to sweep (kWh), comma-separated
    #[arg(long, default_value = "5,10,15,20", value_delimiter = ',')]
    capacities: Vec<f64>,

    /// Battery charge/discharge power limit (W)
    #[arg(long, default_value_t = 5000.0)]
    max_power_w: f64,

    /// SoC floor (%)
    #[arg(long, default_value_t = 10.0)]
    discharge_to_percent: f64,

    /// SoC ceiling (%)
    #[arg(long, default_value_t = 100.0)]
    charge_to_percent: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if cli.capacities.is_empty() {
        bail!("No capacities given");
    }

    let load = load_dir(&cli.input_dir, &SensorCatalog::with_defaults())
        .with_context(|| format!("Failed to load CSVs from {}", cli.input_dir.display()))?;
    let mut store = SensorStore::new();
    for sensor in &load.sensors {
        store.add_sensor(sensor.clone());
    }
    store.add_readings(load.readings);

    if store.is_empty() {
        bail!("Dataset is empty: nothing to sweep");
    }
    let range = store.global_time_range().expect("non-empty store has a range");
    println!(
        "Sweeping {} capacities over {} .. {}",
        cli.capacities.len(),
        range.start,
        range.end
    );

    let tariffs = TariffConfig::default();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Capacity\n(kWh)").add_attribute(Attribute::Bold),
        Cell::new("Strategy").add_attribute(Attribute::Bold),
        Cell::new("Net Cost\n(PLN)").add_attribute(Attribute::Bold),
        Cell::new("Savings vs\nNo Battery").add_attribute(Attribute::Bold),
        Cell::new("Grid Import\n(kWh)").add_attribute(Attribute::Bold),
        Cell::new("Grid Export\n(kWh)").add_attribute(Attribute::Bold),
        Cell::new("Cycles").add_attribute(Attribute::Bold),
        Cell::new("Final SOC\n(%)").add_attribute(Attribute::Bold),
    ]);

    for capacity in &cli.capacities {
        let config = BatteryConfig {
            enabled: true,
            capacity_kwh: *capacity,
            max_power_w: cli.max_power_w,
            discharge_to_percent: cli.discharge_to_percent,
            charge_to_percent: cli.charge_to_percent,
            degradation_cycles: 0.0,
        }
        .clamped();

        let outcomes = run_capacity(&store, &config, &tariffs);
        let baseline_cost = outcomes
            .iter()
            .find(|o| o.strategy_id == "no_battery")
            .map_or(0.0, |o| o.net_cost_pln);

        let best = outcomes
            .iter()
            .map(|o| o.net_cost_pln)
            .fold(f64::INFINITY, f64::min);

        for outcome in &outcomes {
            let savings = baseline_cost - outcome.net_cost_pln;
            let savings_str = if outcome.strategy_id == "no_battery" {
                "-".to_owned()
            } else {
                format!("{savings:.2}")
            };
            let name_cell = if outcome.net_cost_pln <= best && outcome.strategy_id != "no_battery" {
                Cell::new(&outcome.strategy_name)
                    .fg(Color::Green)
                    .add_attribute(Attribute::Bold)
            } else {
                Cell::new(&outcome.strategy_name)
            };

            table.add_row(vec![
                Cell::new(format!("{capacity:.1}")),
                name_cell,
                Cell::new(format!("{:.2}", outcome.net_cost_pln)),
                Cell::new(savings_str),
                Cell::new(format!("{:.1}", outcome.grid_import_kwh)),
                Cell::new(format!("{:.1}", outcome.grid_export_kwh)),
                Cell::new(format!("{:.2}", outcome.cycles)),
                Cell::new(format!("{:.1}", outcome.final_soc_percent)),
            ]);
        }
    }

    println!("{table}");
    Ok(())
}
