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
use std::sync::Arc;
use std::time::{Duration, Instant};

use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use chrono::{DateTime, Utc};
use rewatt_types::{Reading, SensorKind, SimSource, SimulationConfig, TimeRange};
use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::aggregate::{Aggregator, DailyRecord};
use crate::battery::Battery;
use crate::clock::SimClock;
use crate::commands::{
    CommandChannel, ConfigUpdate, QueryChannel, SimCommand, SimStateInfo, SummarySnapshot,
};
use crate::hub::{Envelope, EventHub, event_types};
use crate::ledger::CostLedgers;
use crate::predict::{PredictionProvider, PredictionResource, hour_floor};
use crate::pricing::DayPriceCache;
use crate::store::SensorStore;
use crate::thermal::ThermalShadow;

/// Read-only store handle; the store is immutable once ingest finished.
#[derive(Resource, Debug, Clone)]
pub struct StoreResource(pub Arc<SensorStore>);

/// The streaming hub handle shared with transports.
#[derive(Resource, Debug, Clone)]
pub struct HubResource(pub EventHub);

/// Time-range partitions assigned by ingest provenance.
#[derive(Resource, Debug, Clone)]
pub struct SourceRanges {
    pub archival: Option<TimeRange>,
    pub current: Option<TimeRange>,
    pub all: TimeRange,
}

impl SourceRanges {
    pub fn resolve(&self, source: SimSource) -> TimeRange {
        match source {
            SimSource::Archival => self.archival.unwrap_or(self.all),
            SimSource::Current => self.current.unwrap_or(self.all),
            SimSource::All => self.all,
        }
    }
}

/// The shadow models the engine steps in lockstep each tick.
#[derive(Resource, Debug)]
pub struct ShadowModels {
    pub self_use: Battery,
    pub arbitrage: Battery,
    pub thermal: ThermalShadow,
}

impl ShadowModels {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            self_use: Battery::new(config.battery.clone()),
            arbitrage: Battery::new(config.battery.clone()),
            thermal: ThermalShadow::new(config.thermal.clone()),
        }
    }

    fn clear_interval_state(&mut self) {
        self.self_use.clear_interval_state();
        self.arbitrage.clear_interval_state();
        self.thermal.clear_interval_state();
    }
}

/// Scheduler state owned by the engine systems.
#[derive(Resource, Debug)]
pub struct EngineState {
    pub clock: SimClock,
    pub source: SimSource,
    pub prediction_enabled: bool,
    cursors: HashMap<String, usize>,
    next_prediction_hour: DateTime<Utc>,
    price_cache: DayPriceCache,
    last_spot: Option<f64>,
    summary_last_wall: Option<Instant>,
    summary_last_sim: Option<DateTime<Utc>>,
    shutdown: bool,
}

impl EngineState {
    pub fn new(store: &SensorStore, ranges: &SourceRanges, config: &SimulationConfig) -> Self {
        let source = config.engine.source;
        let range = ranges.resolve(source);
        let clock = SimClock::new(range, config.engine.speed, !config.engine.start_paused);
        let mut state = Self {
            clock,
            source,
            prediction_enabled: false,
            cursors: HashMap::new(),
            next_prediction_hour: range.start,
            price_cache: DayPriceCache::new(),
            last_spot: None,
            summary_last_wall: None,
            summary_last_sim: None,
            shutdown: false,
        };
        state.reposition(store, range.start);
        state
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn state_info(&self) -> SimStateInfo {
        SimStateInfo {
            running: self.clock.is_running(),
            speed: self.clock.speed(),
            sim_time: self.clock.sim_time(),
            source: self.source,
            prediction_enabled: self.prediction_enabled,
            range: self.clock.range(),
        }
    }

    /// Move every cursor to the first reading at or after `t` and realign
    /// the prediction stream to the next hour boundary.
    fn reposition(&mut self, store: &SensorStore, t: DateTime<Utc>) {
        self.cursors.clear();
        for sensor in store.sensors() {
            let idx = store
                .series(&sensor.id)
                .map_or(0, |series| series.partition_point(|r| r.timestamp < t));
            self.cursors.insert(sensor.id.clone(), idx);
        }
        let floor = hour_floor(t);
        self.next_prediction_hour = if floor == t {
            floor
        } else {
            floor + chrono::Duration::hours(1)
        };
        self.price_cache.reset();
        self.last_spot = None;
        self.summary_last_sim = None;
    }
}

/// Core plugin registering the engine systems: one command, then the tick,
/// then pending queries: all serialized on the schedule runner.
pub struct RewattCorePlugin;

impl Plugin for RewattCorePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (command_system, tick_system, query_system).chain(),
        );
    }
}

// ============= Systems (thin wrappers over plain functions) =============

#[allow(clippy::too_many_arguments)]
fn command_system(
    mut state: ResMut<EngineState>,
    mut channel: ResMut<CommandChannel>,
    mut config: ResMut<SimulationConfig>,
    mut models: ResMut<ShadowModels>,
    mut ledgers: ResMut<CostLedgers>,
    mut aggregator: ResMut<Aggregator>,
    store: Res<StoreResource>,
    ranges: Res<SourceRanges>,
    hub: Res<HubResource>,
) {
    if state.shutdown {
        return;
    }
    // At most one command per tick
    match channel.receiver.try_recv() {
        Ok(command) => apply_command(
            &mut state,
            &mut config,
            &mut models,
            &mut ledgers,
            &mut aggregator,
            &store.0,
            &ranges,
            &hub.0,
            command,
        ),
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Disconnected) => {
            info!("Command channel closed, stopping the engine");
            state.shutdown = true;
            state.clock.pause();
            hub.0.close_all();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn tick_system(
    mut state: ResMut<EngineState>,
    store: Res<StoreResource>,
    predictor: Res<PredictionResource>,
    mut models: ResMut<ShadowModels>,
    mut ledgers: ResMut<CostLedgers>,
    mut aggregator: ResMut<Aggregator>,
    hub: Res<HubResource>,
    config: Res<SimulationConfig>,
) {
    if state.shutdown {
        return;
    }
    run_tick(
        &mut state,
        &store.0,
        predictor.0.as_ref(),
        &mut models,
        &mut ledgers,
        &mut aggregator,
        &hub.0,
        &config,
        Instant::now(),
    );
}

fn query_system(
    mut channel: ResMut<QueryChannel>,
    state: Res<EngineState>,
    aggregator: Res<Aggregator>,
    ledgers: Res<CostLedgers>,
    models: Res<ShadowModels>,
) {
    while let Ok(request) = channel.receiver.try_recv() {
        let snapshot = build_snapshot(&state, &aggregator, &ledgers, &models);
        // Receiver may be gone; nothing to do then
        let _ = request.response_tx.send(snapshot);
    }
}

fn build_snapshot(
    state: &EngineState,
    aggregator: &Aggregator,
    ledgers: &CostLedgers,
    models: &ShadowModels,
) -> SummarySnapshot {
    SummarySnapshot {
        state: state.state_info(),
        summary: aggregator.summary(state.clock.sim_time()),
        ledgers: ledgers.snapshot(),
        batteries: vec![
            models.self_use.telemetry("self_consumption"),
            models.arbitrage.telemetry("arbitrage"),
        ],
        thermal: models.thermal.telemetry(),
    }
}

// ============= Command handling =============

#[allow(clippy::too_many_arguments)]
fn apply_command(
    state: &mut EngineState,
    config: &mut SimulationConfig,
    models: &mut ShadowModels,
    ledgers: &mut CostLedgers,
    aggregator: &mut Aggregator,
    store: &SensorStore,
    ranges: &SourceRanges,
    hub: &EventHub,
    command: SimCommand,
) {
    debug!("Command: {:?}", command);
    match command {
        SimCommand::Start => {
            if !state.clock.is_running() {
                state.clock.start();
                broadcast_state(hub, state);
            }
        }
        SimCommand::Pause => {
            if state.clock.is_running() {
                state.clock.pause();
                broadcast_state(hub, state);
            }
        }
        SimCommand::SetSpeed { speed } => {
            if speed <= 0.0 {
                warn!("Rejecting speed {}: pausing instead", speed);
            }
            state.clock.set_speed(speed);
            broadcast_state(hub, state);
        }
        SimCommand::Seek { timestamp } => {
            perform_seek(state, models, aggregator, store, timestamp);
            broadcast_state(hub, state);
        }
        SimCommand::SetSource { source } => {
            if state.source != source {
                state.source = source;
                state.clock.set_range(ranges.resolve(source));
                let position = state.clock.sim_time();
                perform_seek(state, models, aggregator, store, position);
                broadcast_state(hub, state);
            }
        }
        SimCommand::ConfigureBattery(battery) => {
            let battery = battery.clamped();
            config.battery = battery.clone();
            aggregator.set_battery_capacity(battery.capacity_kwh);
            models.self_use.configure(battery.clone());
            models.arbitrage.configure(battery);
            broadcast_state(hub, state);
        }
        SimCommand::SetPrediction { enabled } => {
            if state.prediction_enabled != enabled {
                state.prediction_enabled = enabled;
                // Same hygiene as a seek: no interval may span the switch
                let position = state.clock.sim_time();
                perform_seek(state, models, aggregator, store, position);
                broadcast_state(hub, state);
            }
        }
        SimCommand::UpdateConfig(update) => {
            apply_config_update(config, update);
            ledgers.update_tariffs(config.tariffs.clone());
            models.thermal.configure(config.thermal.clone());
            broadcast_state(hub, state);
        }
    }
}

/// Seek is only legal while paused; a running engine pauses, seeks and
/// resumes. Tick-local state clears, running totals survive.
fn perform_seek(
    state: &mut EngineState,
    models: &mut ShadowModels,
    aggregator: &mut Aggregator,
    store: &SensorStore,
    timestamp: DateTime<Utc>,
) {
    let was_running = state.clock.is_running();
    state.clock.pause();
    state.clock.seek(timestamp);
    state.reposition(store, state.clock.sim_time());
    aggregator.clear_tick_state();
    models.clear_interval_state();
    if was_running {
        state.clock.start();
    }
}

fn apply_config_update(config: &mut SimulationConfig, update: ConfigUpdate) {
    if let Some(v) = update.fixed_tariff_pln {
        config.tariffs.fixed_tariff_pln = v;
    }
    if let Some(v) = update.distribution_fee_pln {
        config.tariffs.distribution_fee_pln = v;
    }
    if let Some(v) = update.export_coefficient {
        config.tariffs.export_coefficient = v;
    }
    if let Some(v) = update.net_metering_ratio {
        config.tariffs.net_metering_ratio = v;
    }
    if let Some(v) = update.preheat_delta_c {
        config.thermal.preheat_delta_c = v;
    }
    if let Some(v) = update.insulation {
        config.thermal.insulation = v;
    }
    config.tariffs = config.tariffs.clone().clamped();
}

// ============= Tick =============

/// One engine step: advance simulated time, emit due readings in global
/// timestamp order, drive the shadow models and aggregates, then throttle a
/// summary broadcast.
#[allow(clippy::too_many_arguments)]
fn run_tick(
    state: &mut EngineState,
    store: &SensorStore,
    predictor: &dyn PredictionProvider,
    models: &mut ShadowModels,
    ledgers: &mut CostLedgers,
    aggregator: &mut Aggregator,
    hub: &EventHub,
    config: &SimulationConfig,
    now: Instant,
) {
    let was_at_end = state.clock.at_end();
    let advanced = state.clock.tick(now);
    if advanced.is_zero() {
        return;
    }
    let sim_time = state.clock.sim_time();

    while let Some(reading) = next_due_reading(state, store, predictor, sim_time) {
        process_reading(
            state, store, predictor, models, ledgers, aggregator, hub, config, &reading,
        );
    }

    if state.clock.at_end() && !was_at_end {
        info!("Reached end of data at {}", sim_time);
        state.clock.pause();
        broadcast_state(hub, state);
    }

    maybe_broadcast_summary(state, models, ledgers, aggregator, hub, now, sim_time);
}

/// Pop the globally earliest due reading across all sensor cursors and the
/// prediction stream. Ties emit in a stable per-sensor order.
fn next_due_reading(
    state: &mut EngineState,
    store: &SensorStore,
    predictor: &dyn PredictionProvider,
    sim_time: DateTime<Utc>,
) -> Option<Reading> {
    let grid_id = store
        .sensor_of_kind(SensorKind::GridPower)
        .map(|s| s.id.clone());

    let mut best: Option<(DateTime<Utc>, String)> = None;
    for sensor in store.sensors() {
        if state.prediction_enabled && Some(&sensor.id) == grid_id.as_ref() {
            // Grid channel is overridden; keep its cursor moving silently
            let idx = state.cursors.entry(sensor.id.clone()).or_default();
            if let Some(series) = store.series(&sensor.id) {
                while *idx < series.len() && series[*idx].timestamp <= sim_time {
                    *idx += 1;
                }
            }
            continue;
        }
        let idx = *state.cursors.get(&sensor.id).unwrap_or(&0);
        let Some(next) = store.series(&sensor.id).and_then(|s| s.get(idx)) else {
            continue;
        };
        if next.timestamp > sim_time {
            continue;
        }
        if best
            .as_ref()
            .is_none_or(|(ts, _)| next.timestamp < *ts)
        {
            best = Some((next.timestamp, sensor.id.clone()));
        }
    }

    // Prediction stream competes for ordering like any other source
    if state.prediction_enabled
        && grid_id.is_some()
        && state.next_prediction_hour <= sim_time
        && best
            .as_ref()
            .is_none_or(|(ts, _)| state.next_prediction_hour <= *ts)
    {
        let hour = state.next_prediction_hour;
        state.next_prediction_hour = hour + chrono::Duration::hours(1);
        let grid_id = grid_id.unwrap_or_else(|| SensorKind::GridPower.canonical_id().to_owned());
        return Some(Reading::point(
            grid_id,
            SensorKind::GridPower,
            hour,
            predictor.power_at(hour),
        ));
    }

    let (_, sensor_id) = best?;
    let idx = state.cursors.entry(sensor_id.clone()).or_default();
    let reading = store.series(&sensor_id)?.get(*idx)?.clone();
    *idx += 1;
    Some(reading)
}

#[derive(Debug, Serialize)]
struct ReadingEvent<'a> {
    sensor_id: &'a str,
    kind: SensorKind,
    timestamp: DateTime<Utc>,
    value: f64,
    unit: &'static str,
}

#[derive(Debug, Serialize)]
struct SummaryUpdate<'a> {
    summary: crate::aggregate::Summary,
    ledgers: crate::ledger::LedgerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    finalized_day: Option<&'a DailyRecord>,
}

#[allow(clippy::too_many_arguments)]
fn process_reading(
    state: &mut EngineState,
    store: &SensorStore,
    predictor: &dyn PredictionProvider,
    models: &mut ShadowModels,
    ledgers: &mut CostLedgers,
    aggregator: &mut Aggregator,
    hub: &EventHub,
    config: &SimulationConfig,
    reading: &Reading,
) {
    let ts = reading.timestamp;
    let thresholds = state.price_cache.thresholds_for(store, ts);
    if reading.kind == SensorKind::SpotPrice {
        state.last_spot = Some(reading.value);
    }
    let cheap = matches!(
        (state.last_spot, thresholds),
        (Some(spot), Some(gates)) if spot <= gates.low
    );

    hub.broadcast(&Envelope::new(
        event_types::SENSOR_READING,
        ReadingEvent {
            sensor_id: &reading.sensor_id,
            kind: reading.kind,
            timestamp: ts,
            value: reading.value,
            unit: reading.kind.unit(),
        },
    ));

    let outcome = aggregator.on_reading(reading, cheap);
    if let Some(flow) = outcome.grid_flow {
        ledgers.record_flow(flow.import_kwh, flow.export_kwh, state.last_spot);
    }
    for day in &outcome.finalized_days {
        broadcast_day_rollover(state, models, ledgers, aggregator, hub, day);
    }

    match reading.kind {
        SensorKind::GridPower => {
            process_grid_reading(state, store, predictor, models, ledgers, aggregator, hub, config, reading);
        }
        SensorKind::OutdoorTemperature => {
            models
                .thermal
                .step(reading.value, state.last_spot, thresholds, ts);
            ledgers.set_thermal_cost(models.thermal.cost_pln());
        }
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn process_grid_reading(
    state: &mut EngineState,
    store: &SensorStore,
    predictor: &dyn PredictionProvider,
    models: &mut ShadowModels,
    ledgers: &mut CostLedgers,
    aggregator: &mut Aggregator,
    hub: &EventHub,
    config: &SimulationConfig,
    reading: &Reading,
) {
    let ts = reading.timestamp;
    let demand = reading.value;
    let thresholds = state.price_cache.thresholds_for(store, ts);

    if config.battery.enabled {
        let step = models.self_use.process(demand, ts);
        aggregator.add_battery_savings(step.discharged_kwh());

        if let (Some(spot), Some(gates)) = (state.last_spot, thresholds) {
            let arb = models
                .arbitrage
                .process_arbitrage(demand, ts, spot, gates.low, gates.high);
            let (import_kwh, export_kwh) = arb.grid_flow_kwh();
            ledgers.record_arbitrage_flow(import_kwh, export_kwh, Some(spot));
        }
        for record in models.arbitrage.take_day_logs() {
            hub.broadcast(&Envelope::new(event_types::ARBITRAGE_DAY_LOG, record));
        }
    }

    // Prediction comparison: in prediction mode the emitted value is the
    // prediction and the stored trace is the actual; otherwise the other
    // way around.
    let (actual, predicted) = if state.prediction_enabled {
        let actual = store
            .sensor_of_kind(SensorKind::GridPower)
            .and_then(|s| store.reading_at(&s.id, ts))
            .map(|r| r.value);
        (actual, demand)
    } else {
        (Some(demand), predictor.power_at(ts))
    };
    if let Some(actual) = actual {
        let temps = store
            .sensor_of_kind(SensorKind::OutdoorTemperature)
            .and_then(|s| store.reading_at(&s.id, ts))
            .map(|r| (r.value, predictor.temperature_at(ts)));
        aggregator.record_prediction_sample(actual, predicted, temps);
    }
}

fn broadcast_day_rollover(
    state: &EngineState,
    models: &ShadowModels,
    ledgers: &CostLedgers,
    aggregator: &Aggregator,
    hub: &EventHub,
    day: &DailyRecord,
) {
    hub.broadcast(&Envelope::new(
        event_types::SUMMARY_UPDATE,
        SummaryUpdate {
            summary: aggregator.summary(state.clock.sim_time()),
            ledgers: ledgers.snapshot(),
            finalized_day: Some(day),
        },
    ));
    hub.broadcast(&Envelope::new(
        event_types::BATTERY_SUMMARY,
        serde_json::json!({
            "self_consumption": models.self_use.histograms(),
            "arbitrage": models.arbitrage.histograms(),
        }),
    ));
}

/// Summary broadcasts are throttled to at most once per simulated
/// quarter-hour *and* once per wall second.
fn maybe_broadcast_summary(
    state: &mut EngineState,
    models: &ShadowModels,
    ledgers: &CostLedgers,
    aggregator: &Aggregator,
    hub: &EventHub,
    now: Instant,
    sim_time: DateTime<Utc>,
) {
    let wall_due = state
        .summary_last_wall
        .is_none_or(|last| now.duration_since(last) >= Duration::from_secs(1));
    let sim_due = state
        .summary_last_sim
        .is_none_or(|last| sim_time - last >= chrono::Duration::minutes(15));
    if !(wall_due && sim_due) {
        return;
    }
    state.summary_last_wall = Some(now);
    state.summary_last_sim = Some(sim_time);

    hub.broadcast(&Envelope::new(
        event_types::SUMMARY_UPDATE,
        SummaryUpdate {
            summary: aggregator.summary(sim_time),
            ledgers: ledgers.snapshot(),
            finalized_day: None,
        },
    ));
    hub.broadcast(&Envelope::new(
        event_types::BATTERY_UPDATE,
        serde_json::json!({
            "batteries": [
                models.self_use.telemetry("self_consumption"),
                models.arbitrage.telemetry("arbitrage"),
            ],
            "thermal": models.thermal.telemetry(),
        }),
    ));

    let (power_mae, temp_mae) = aggregator.prediction_mae();
    if power_mae.is_some() {
        hub.broadcast(&Envelope::new(
            event_types::PREDICTION_COMPARISON,
            serde_json::json!({
                "power_mae_w": power_mae,
                "temp_mae_c": temp_mae,
                "window_len": aggregator.prediction_window_len(),
            }),
        ));
    }
}

fn broadcast_state(hub: &EventHub, state: &EngineState) {
    hub.broadcast(&Envelope::new(event_types::SIM_STATE, state.state_info()));
}
