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

use std::collections::{BTreeMap, HashMap, VecDeque};

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use rewatt_types::{Reading, SensorKind};
use serde::{Deserialize, Serialize};

/// Intervals longer than this are treated as sensor outages and discarded
/// instead of being integrated. A simulation constant, not a tuning knob.
const MAX_INTERVAL_SECS: f64 = 2.0 * 3600.0;

/// Rolling prediction-error window length (grid readings).
const PREDICTION_WINDOW: usize = 48;

/// Running kWh totals for one scope (day, month or lifetime).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub pv_production_kwh: f64,
    pub home_demand_kwh: f64,
    pub self_consumption_kwh: f64,
    pub heat_pump_consumption_kwh: f64,
    pub heat_pump_production_kwh: f64,
    pub battery_savings_kwh: f64,
    pub cheap_export_kwh: f64,
}

/// Accumulated base quantities for one scope; the derived categories are
/// computed on read.
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    import_kwh: f64,
    export_kwh: f64,
    pv_kwh: f64,
    hp_consumption_kwh: f64,
    hp_production_kwh: f64,
    battery_savings_kwh: f64,
    cheap_export_kwh: f64,
}

impl Bucket {
    fn totals(&self) -> CategoryTotals {
        CategoryTotals {
            grid_import_kwh: self.import_kwh,
            grid_export_kwh: self.export_kwh,
            pv_production_kwh: self.pv_kwh,
            home_demand_kwh: (self.import_kwh - self.export_kwh + self.pv_kwh).max(0.0),
            self_consumption_kwh: (self.pv_kwh - self.export_kwh).max(0.0),
            heat_pump_consumption_kwh: self.hp_consumption_kwh,
            heat_pump_production_kwh: self.hp_production_kwh,
            battery_savings_kwh: self.battery_savings_kwh,
            cheap_export_kwh: self.cheap_export_kwh,
        }
    }
}

/// One finalized calendar day, created lazily on its first reading and
/// closed by rollover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub pv_production_kwh: f64,
    pub home_demand_kwh: f64,
    pub self_consumption_kwh: f64,
    pub battery_savings_kwh: f64,
    /// `min(100, (self_consumption + battery_savings) / home_demand * 100)`
    pub off_grid_percent: f64,
    /// `capacity_kwh * 24 / daily_demand_kwh` for a finalized day
    pub battery_autonomy_hours: f64,
}

/// Grid energy of one integrated interval, for the accounting ledgers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridFlow {
    pub import_kwh: f64,
    pub export_kwh: f64,
}

/// What one reading did to the aggregates.
#[derive(Debug, Clone, Default)]
pub struct ReadingOutcome {
    pub grid_flow: Option<GridFlow>,
    pub finalized_days: Vec<DailyRecord>,
}

/// Summary broadcast to subscribers (throttled by the engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub sim_time: DateTime<Utc>,
    pub today: CategoryTotals,
    pub month: CategoryTotals,
    pub total: CategoryTotals,
    /// Lifetime kWh per channel, unsigned
    pub raw_channel_kwh: BTreeMap<String, f64>,
    pub off_grid_percent_today: f64,
    pub battery_autonomy_hours: f64,
    pub prediction_power_mae_w: Option<f64>,
    pub prediction_temp_mae_c: Option<f64>,
}

/// Running energy/cost aggregates over the replayed trace.
///
/// Energy uses trapezoidal integration between consecutive readings of the
/// same channel with a gap guard; day/month buckets reset on UTC rollover
/// detected against simulated time. Intervals that straddle midnight split
/// their energy evenly across the days spanned, one finalized record per
/// day.
#[derive(Resource, Debug)]
pub struct Aggregator {
    last_by_kind: HashMap<SensorKind, (DateTime<Utc>, f64)>,
    raw_kwh: BTreeMap<String, f64>,
    day: Bucket,
    month: Bucket,
    total: Bucket,
    current_day: Option<NaiveDate>,
    current_month: Option<(i32, u32)>,
    battery_capacity_kwh: f64,
    power_errors: VecDeque<f64>,
    temp_errors: VecDeque<f64>,
}

impl Aggregator {
    pub fn new(battery_capacity_kwh: f64) -> Self {
        Self {
            last_by_kind: HashMap::new(),
            raw_kwh: BTreeMap::new(),
            day: Bucket::default(),
            month: Bucket::default(),
            total: Bucket::default(),
            current_day: None,
            current_month: None,
            battery_capacity_kwh,
            power_errors: VecDeque::with_capacity(PREDICTION_WINDOW),
            temp_errors: VecDeque::with_capacity(PREDICTION_WINDOW),
        }
    }

    pub fn set_battery_capacity(&mut self, capacity_kwh: f64) {
        self.battery_capacity_kwh = capacity_kwh;
    }

    /// Feed one replayed reading. `cheap_price` marks intervals whose spot
    /// price sits in the cheap third of the day.
    pub fn on_reading(&mut self, reading: &Reading, cheap_price: bool) -> ReadingOutcome {
        let mut outcome = ReadingOutcome::default();
        let date = reading.timestamp.date_naive();
        let previous = self
            .last_by_kind
            .insert(reading.kind, (reading.timestamp, reading.value));

        let Some((t0, v0)) = previous else {
            outcome.finalized_days = self.roll_to(date);
            return outcome;
        };

        let dt_secs = (reading.timestamp - t0).num_milliseconds() as f64 / 1000.0;
        if dt_secs <= 0.0 || dt_secs > MAX_INTERVAL_SECS || !is_power_channel(reading.kind) {
            outcome.finalized_days = self.roll_to(date);
            return outcome;
        }

        let kwh = (v0 + reading.value) / 2.0 * dt_secs / 3_600_000.0;
        *self.raw_kwh.entry(reading.sensor_id.clone()).or_default() += kwh.abs();

        // Split evenly across every day the interval touches, finalizing
        // each day as it closes (a high-speed tick may straddle several).
        let days = days_spanned(t0.date_naive(), date);
        let portion = kwh / days.len() as f64;
        let mut flow = GridFlow::default();
        for day in days {
            outcome.finalized_days.extend(self.roll_to(day));
            let interval_flow = self.add_energy(reading.kind, portion, cheap_price);
            flow.import_kwh += interval_flow.import_kwh;
            flow.export_kwh += interval_flow.export_kwh;
        }

        if reading.kind == SensorKind::GridPower {
            outcome.grid_flow = Some(flow);
        }
        outcome
    }

    /// Credit energy the self-consumption shadow discharged this interval.
    pub fn add_battery_savings(&mut self, kwh: f64) {
        if kwh <= 0.0 {
            return;
        }
        self.day.battery_savings_kwh += kwh;
        self.month.battery_savings_kwh += kwh;
        self.total.battery_savings_kwh += kwh;
    }

    /// Retain `|actual - predicted|` for the rolling comparison window.
    pub fn record_prediction_sample(
        &mut self,
        actual_power_w: f64,
        predicted_power_w: f64,
        temps: Option<(f64, f64)>,
    ) {
        push_bounded(&mut self.power_errors, (actual_power_w - predicted_power_w).abs());
        if let Some((actual_c, predicted_c)) = temps {
            push_bounded(&mut self.temp_errors, (actual_c - predicted_c).abs());
        }
    }

    /// MAE over the rolling window: (power W, temperature °C).
    pub fn prediction_mae(&self) -> (Option<f64>, Option<f64>) {
        (mean(&self.power_errors), mean(&self.temp_errors))
    }

    pub fn prediction_window_len(&self) -> usize {
        self.power_errors.len()
    }

    /// Per-channel lifetime kWh (unsigned).
    pub fn raw_channel_kwh(&self) -> &BTreeMap<String, f64> {
        &self.raw_kwh
    }

    pub fn summary(&self, sim_time: DateTime<Utc>) -> Summary {
        let today = self.day.totals();
        let (power_mae, temp_mae) = self.prediction_mae();
        Summary {
            sim_time,
            today,
            month: self.month.totals(),
            total: self.total.totals(),
            raw_channel_kwh: self.raw_kwh.clone(),
            off_grid_percent_today: off_grid_percent(&today),
            battery_autonomy_hours: self.running_autonomy_hours(sim_time, &today),
            prediction_power_mae_w: power_mae,
            prediction_temp_mae_c: temp_mae,
        }
    }

    /// Clear tick-local state after a seek or prediction toggle: interval
    /// seeds, the comparison window and the open day snapshot. Month and
    /// lifetime totals survive.
    pub fn clear_tick_state(&mut self) {
        self.last_by_kind.clear();
        self.power_errors.clear();
        self.temp_errors.clear();
        self.day = Bucket::default();
        self.current_day = None;
    }

    /// Normalized projection: equals `capacity * 24 / daily_demand` once the
    /// day is complete.
    fn running_autonomy_hours(&self, sim_time: DateTime<Utc>, today: &CategoryTotals) -> f64 {
        if today.home_demand_kwh <= 0.0 {
            return 0.0;
        }
        let elapsed_hours = f64::from(sim_time.time().num_seconds_from_midnight()) / 3600.0;
        self.battery_capacity_kwh * elapsed_hours / today.home_demand_kwh
    }

    fn add_energy(&mut self, kind: SensorKind, kwh: f64, cheap_price: bool) -> GridFlow {
        let mut flow = GridFlow::default();
        match kind {
            SensorKind::GridPower => {
                if kwh > 0.0 {
                    flow.import_kwh = kwh;
                } else {
                    flow.export_kwh = -kwh;
                }
                for bucket in [&mut self.day, &mut self.month, &mut self.total] {
                    bucket.import_kwh += flow.import_kwh;
                    bucket.export_kwh += flow.export_kwh;
                    if cheap_price {
                        bucket.cheap_export_kwh += flow.export_kwh;
                    }
                }
            }
            SensorKind::PvPower => {
                let kwh = kwh.max(0.0);
                for bucket in [&mut self.day, &mut self.month, &mut self.total] {
                    bucket.pv_kwh += kwh;
                }
            }
            SensorKind::HeatPumpConsumption => {
                let kwh = kwh.max(0.0);
                for bucket in [&mut self.day, &mut self.month, &mut self.total] {
                    bucket.hp_consumption_kwh += kwh;
                }
            }
            SensorKind::HeatPumpProduction => {
                let kwh = kwh.max(0.0);
                for bucket in [&mut self.day, &mut self.month, &mut self.total] {
                    bucket.hp_production_kwh += kwh;
                }
            }
            SensorKind::IndoorTemperature
            | SensorKind::OutdoorTemperature
            | SensorKind::SpotPrice => {}
        }
        flow
    }

    /// Advance the day/month cursors to `date`, finalizing the open day.
    fn roll_to(&mut self, date: NaiveDate) -> Vec<DailyRecord> {
        let mut finalized = Vec::new();
        match self.current_day {
            None => {
                self.current_day = Some(date);
                self.current_month = Some((date.year(), date.month()));
            }
            Some(open) if open != date => {
                finalized.push(self.finalize_day(open));
                self.day = Bucket::default();
                self.current_day = Some(date);

                let month = (date.year(), date.month());
                if self.current_month != Some(month) {
                    self.month = Bucket::default();
                    self.current_month = Some(month);
                }
            }
            Some(_) => {}
        }
        finalized
    }

    fn finalize_day(&self, date: NaiveDate) -> DailyRecord {
        let totals = self.day.totals();
        let autonomy = if totals.home_demand_kwh > 0.0 {
            self.battery_capacity_kwh * 24.0 / totals.home_demand_kwh
        } else {
            0.0
        };
        DailyRecord {
            date,
            grid_import_kwh: totals.grid_import_kwh,
            grid_export_kwh: totals.grid_export_kwh,
            pv_production_kwh: totals.pv_production_kwh,
            home_demand_kwh: totals.home_demand_kwh,
            self_consumption_kwh: totals.self_consumption_kwh,
            battery_savings_kwh: totals.battery_savings_kwh,
            off_grid_percent: off_grid_percent(&totals),
            battery_autonomy_hours: autonomy,
        }
    }
}

fn off_grid_percent(totals: &CategoryTotals) -> f64 {
    if totals.home_demand_kwh <= 0.0 {
        return 0.0;
    }
    ((totals.self_consumption_kwh + totals.battery_savings_kwh) / totals.home_demand_kwh * 100.0)
        .min(100.0)
}

fn is_power_channel(kind: SensorKind) -> bool {
    matches!(
        kind,
        SensorKind::GridPower
            | SensorKind::PvPower
            | SensorKind::HeatPumpConsumption
            | SensorKind::HeatPumpProduction
    )
}

fn days_spanned(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = from.min(to);
    let last = from.max(to);
    while day <= last {
        days.push(day);
        day = day.succ_opt().unwrap_or(last);
        if days.len() > 366 {
            break;
        }
    }
    days
}

fn push_bounded(window: &mut VecDeque<f64>, value: f64) {
    if window.len() == PREDICTION_WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

fn mean(window: &VecDeque<f64>) -> Option<f64> {
    if window.is_empty() {
        None
    } else {
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}
