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

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use rewatt_ha::HomeAssistantClient;
use rewatt_ingest::write_readings;
use rewatt_types::{Reading, SensorCatalog};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ha-fetch-history")]
#[command(about = "Fetch sensor history from Home Assistant into the snapshot CSV format", long_about = None)]
struct Cli {
    /// Entity ids to fetch, comma-separated
    #[arg(long, value_delimiter = ',')]
    entities: Vec<String>,

    /// How many days of history to fetch
    #[arg(long, default_value_t = 7)]
    days: i64,

    /// Output CSV path
    #[arg(long, default_value = "ha_history.csv")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.entities.is_empty() {
        bail!("No entities given (use --entities sensor.a,sensor.b)");
    }

    let client = HomeAssistantClient::from_env().context("HA client configuration")?;
    let catalog = SensorCatalog::with_defaults();
    let start = Utc::now() - chrono::Duration::days(cli.days.max(1));

    let mut readings: Vec<Reading> = Vec::new();
    for entity in &cli.entities {
        let Some(kind) = catalog.resolve(entity) else {
            warn!("Skipping unknown entity {}", entity);
            continue;
        };
        let points = client
            .get_history(entity, start, None)
            .await
            .with_context(|| format!("Fetching history for {entity}"))?;
        info!("{}: {} points", entity, points.len());
        readings.extend(
            points
                .into_iter()
                .map(|p| Reading::point(kind.canonical_id(), kind, p.timestamp, p.value)),
        );
    }

    if readings.is_empty() {
        bail!("No numeric history fetched for any requested entity");
    }

    let file = File::create(&cli.out)
        .with_context(|| format!("Creating output file {}", cli.out.display()))?;
    write_readings(BufWriter::new(file), &readings)?;
    info!("Wrote {} readings to {}", readings.len(), cli.out.display());

    Ok(())
}
