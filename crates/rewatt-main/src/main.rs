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

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bevy_app::{ScheduleRunnerPlugin, TaskPoolPlugin, prelude::*};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use rewatt_core::{
    Aggregator, CommandSender, CostLedgers, EngineState, EventHub, HubResource,
    PredictionResource, QuerySender, RewattCorePlugin, SeasonalProfileProvider, SensorStore,
    ShadowModels, SourceRanges, StoreResource,
};
use rewatt_ingest::load_dir;
use rewatt_types::{SensorCatalog, SensorKind};

#[derive(Parser, Debug)]
#[command(name = "rewatt")]
#[command(about = "Time-accelerated home-energy replay server", long_about = None)]
struct Cli {
    /// Directory with the sensor CSV archives
    #[arg(long)]
    input_dir: PathBuf,

    /// Directory with the dashboard static files
    #[arg(long, default_value = "./frontend")]
    frontend_dir: PathBuf,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Create tokio runtime for the web server and channels
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    // Run the engine app in a blocking task so tokio keeps serving
    runtime.block_on(async {
        tokio::task::spawn_blocking(move || initialize_and_run(cli))
            .await
            .expect("Engine task panicked")
    })
}

fn initialize_and_run(cli: Cli) -> Result<()> {
    // Initialize tracing with env filter support (RUST_LOG)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let sim_config = config::load_config(cli.config.as_deref())?;

    info!("🚀 Starting Rewatt: home-energy replay engine");
    info!("📋 Configuration Summary:");
    info!(
        "   Battery: {:.1} kWh, {:.0} W, SoC {}%-{}%",
        sim_config.battery.capacity_kwh,
        sim_config.battery.max_power_w,
        sim_config.battery.discharge_to_percent,
        sim_config.battery.charge_to_percent
    );
    info!(
        "   Tariffs: fixed {:.2} PLN/kWh + {:.2} distribution, export coeff {:.2}",
        sim_config.tariffs.fixed_tariff_pln,
        sim_config.tariffs.distribution_fee_pln,
        sim_config.tariffs.export_coefficient
    );
    info!(
        "   Engine: speed {}x, tick {} ms, source {}",
        sim_config.engine.speed, sim_config.engine.tick_interval_ms, sim_config.engine.source
    );

    // Load the archives into the store
    info!("📂 Loading sensor archives from {}", cli.input_dir.display());
    let load = load_dir(&cli.input_dir, &SensorCatalog::with_defaults())
        .with_context(|| format!("Failed to load CSVs from {}", cli.input_dir.display()))?;

    let mut store = SensorStore::new();
    for sensor in &load.sensors {
        store.add_sensor(sensor.clone());
    }
    store.add_readings(load.readings);

    let Some(all) = store.global_time_range() else {
        bail!("Dataset is empty: nothing to simulate");
    };
    info!(
        "🗃️ Store ready: {} sensors, {} readings, {} → {}",
        store.sensor_count(),
        store.reading_count(),
        all.start,
        all.end
    );

    if store.sensor_of_kind(SensorKind::SpotPrice).is_none() {
        warn!("No spot price sensor found: price-dependent ledgers are disabled");
    }

    let ranges = SourceRanges {
        archival: load.archival_range,
        current: load.current_range,
        all,
    };
    let store = Arc::new(store);

    // Channels between the web transports and the engine
    let (command_sender, command_channel) = CommandSender::new();
    let (query_sender, query_channel) = QuerySender::new();
    let hub = EventHub::default();

    // Shadow models, aggregates and the prediction provider
    let engine_state = EngineState::new(&store, &ranges, &sim_config);
    let models = ShadowModels::new(&sim_config);
    let ledgers = CostLedgers::new(sim_config.tariffs.clone());
    let aggregator = Aggregator::new(sim_config.battery.capacity_kwh);
    let predictor = PredictionResource(Arc::new(SeasonalProfileProvider::new(all.start)));

    // Spawn the web server on the tokio runtime
    let web_hub = hub.clone();
    let addr = cli.addr.clone();
    let frontend_dir = cli.frontend_dir.clone();
    tokio::spawn(async move {
        if let Err(e) =
            rewatt_web::start_web_server(&addr, frontend_dir, web_hub, command_sender, query_sender)
                .await
        {
            tracing::error!("❌ Web server failed: {}", e);
        }
    });

    info!("🎮 Starting engine loop...");
    let tick = Duration::from_millis(sim_config.engine.tick_interval_ms);

    let mut app = App::new();
    app
        // Task pools for the headless schedule runner
        .add_plugins(TaskPoolPlugin::default())
        .add_plugins(ScheduleRunnerPlugin::run_loop(tick))
        .add_plugins(RewattCorePlugin)
        .insert_resource(sim_config)
        .insert_resource(StoreResource(store))
        .insert_resource(ranges)
        .insert_resource(engine_state)
        .insert_resource(models)
        .insert_resource(ledgers)
        .insert_resource(aggregator)
        .insert_resource(predictor)
        .insert_resource(HubResource(hub))
        .insert_resource(command_channel)
        .insert_resource(query_channel);

    info!("✅ Engine running");
    app.run();

    Ok(())
}
