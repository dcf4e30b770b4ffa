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

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rewatt_types::BatteryConfig;
use serde::{Deserialize, Serialize};

/// Result of one battery interval.
///
/// `battery_power_w` is positive while discharging; `adjusted_grid_w` is
/// what the grid sees after the battery acted (`demand - battery_power`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStep {
    pub battery_power_w: f64,
    pub adjusted_grid_w: f64,
    pub soc_percent: f64,
    /// Length of the integrated interval; zero on the seeding call
    pub interval_secs: f64,
}

impl BatteryStep {
    fn seed(demand_w: f64, soc_percent: f64) -> Self {
        Self {
            battery_power_w: 0.0,
            adjusted_grid_w: demand_w,
            soc_percent,
            interval_secs: 0.0,
        }
    }

    /// Grid energy split for the interval, rectangular in the adjusted power.
    pub fn grid_flow_kwh(&self) -> (f64, f64) {
        let kwh = self.adjusted_grid_w.abs() * self.interval_secs / 3_600_000.0;
        if self.adjusted_grid_w > 0.0 {
            (kwh, 0.0)
        } else {
            (0.0, kwh)
        }
    }

    /// Energy the battery discharged this interval (kWh, zero while charging).
    pub fn discharged_kwh(&self) -> f64 {
        if self.battery_power_w > 0.0 {
            self.battery_power_w * self.interval_secs / 3_600_000.0
        } else {
            0.0
        }
    }
}

/// One finalized arbitrage day: a charge window followed by a same-day
/// discharge window. Days without a complete cycle are not recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageDayRecord {
    pub date: NaiveDate,
    pub charge_start: DateTime<Utc>,
    pub charge_end: DateTime<Utc>,
    pub charge_kwh: f64,
    pub avg_charge_price: f64,
    pub discharge_start: DateTime<Utc>,
    pub discharge_end: DateTime<Utc>,
    pub discharge_kwh: f64,
    pub avg_discharge_price: f64,
    /// Idle stretch between the two windows (minutes)
    pub gap_minutes: i64,
    pub net_earnings_pln: f64,
    pub cycles_delta: f64,
}

/// Telemetry snapshot streamed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    pub strategy: String,
    pub soc_percent: f64,
    pub soc_kwh: f64,
    pub effective_capacity_kwh: f64,
    pub cycles: f64,
    pub total_throughput_kwh: f64,
    pub last_power_w: f64,
}

/// Dwell histograms, all time-weighted in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryHistograms {
    /// Signed power rounded to integer kW -> seconds spent there
    pub time_at_power_secs: BTreeMap<i64, f64>,
    /// SoC decile (0..=10) -> seconds spent there
    pub time_at_soc_secs: BTreeMap<u8, f64>,
    /// "YYYY-MM" -> SoC decile dwell for that calendar month
    pub month_soc_secs: BTreeMap<String, BTreeMap<u8, f64>>,
}

/// Shadow battery: SoC dynamics, power/energy constraints, cycle counting,
/// degradation and dwell histograms. One instance per dispatch strategy; all
/// instances see the same realized demand trace.
///
/// Integration is back-looking: a call at `t` integrates the *previously*
/// stored demand over `t - last_time`, then stores the new demand for the
/// next interval. The very first call only seeds.
#[derive(Debug, Clone)]
pub struct Battery {
    config: BatteryConfig,
    soc_wh: f64,
    total_throughput_wh: f64,
    last: Option<(DateTime<Utc>, f64)>,
    last_power_w: f64,
    histograms: BatteryHistograms,
    arbitrage: ArbitrageTracker,
    day_logs: Vec<ArbitrageDayRecord>,
}

impl Battery {
    /// New battery resting at the SoC floor.
    pub fn new(config: BatteryConfig) -> Self {
        let mut battery = Self {
            config,
            soc_wh: 0.0,
            total_throughput_wh: 0.0,
            last: None,
            last_power_w: 0.0,
            histograms: BatteryHistograms::default(),
            arbitrage: ArbitrageTracker::default(),
            day_logs: Vec::new(),
        };
        battery.soc_wh = battery.floor_wh();
        battery
    }

    /// New battery with an explicit starting SoC (clamped into bounds).
    pub fn with_soc_kwh(config: BatteryConfig, soc_kwh: f64) -> Self {
        let mut battery = Self::new(config);
        battery.soc_wh = soc_kwh * 1000.0;
        battery.clamp_soc();
        battery
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    pub fn nominal_wh(&self) -> f64 {
        self.config.capacity_kwh * 1000.0
    }

    /// Full cycles so far: unsigned throughput over twice the nominal size.
    pub fn cycles(&self) -> f64 {
        let nominal = self.nominal_wh();
        if nominal <= 0.0 {
            return 0.0;
        }
        self.total_throughput_wh / (2.0 * nominal)
    }

    /// Nominal capacity faded linearly to 80% over `degradation_cycles`;
    /// holds at 80% beyond that, and 0 cycles disables fade entirely.
    pub fn effective_capacity_wh(&self) -> f64 {
        let nominal = self.nominal_wh();
        if self.config.degradation_cycles <= 0.0 {
            return nominal;
        }
        let progress = (self.cycles() / self.config.degradation_cycles).min(1.0);
        nominal * (1.0 - 0.20 * progress)
    }

    pub fn floor_wh(&self) -> f64 {
        self.effective_capacity_wh() * self.config.discharge_to_percent / 100.0
    }

    pub fn ceiling_wh(&self) -> f64 {
        self.effective_capacity_wh() * self.config.charge_to_percent / 100.0
    }

    pub fn soc_wh(&self) -> f64 {
        self.soc_wh
    }

    pub fn soc_percent(&self) -> f64 {
        let effective = self.effective_capacity_wh();
        if effective <= 0.0 {
            return 0.0;
        }
        self.soc_wh / effective * 100.0
    }

    pub fn total_throughput_wh(&self) -> f64 {
        self.total_throughput_wh
    }

    pub fn histograms(&self) -> &BatteryHistograms {
        &self.histograms
    }

    pub fn telemetry(&self, strategy: &str) -> BatteryTelemetry {
        BatteryTelemetry {
            strategy: strategy.to_owned(),
            soc_percent: self.soc_percent(),
            soc_kwh: self.soc_wh / 1000.0,
            effective_capacity_kwh: self.effective_capacity_wh() / 1000.0,
            cycles: self.cycles(),
            total_throughput_kwh: self.total_throughput_wh / 1000.0,
            last_power_w: self.last_power_w,
        }
    }

    /// Self-consumption dispatch: charge from export surplus, discharge to
    /// offset grid draw.
    pub fn process(&mut self, demand_w: f64, t: DateTime<Utc>) -> BatteryStep {
        self.clamp_soc();
        let Some((dt_secs, prev_demand)) = self.take_interval(demand_w, t) else {
            return BatteryStep::seed(demand_w, self.soc_percent());
        };

        let power = if prev_demand < 0.0 {
            -prev_demand
                .abs()
                .min(self.config.max_power_w)
                .min(self.charge_headroom_w(dt_secs))
        } else if prev_demand > 0.0 {
            prev_demand
                .min(self.config.max_power_w)
                .min(self.discharge_available_w(dt_secs))
        } else {
            0.0
        };

        self.apply(power, dt_secs, t);
        BatteryStep {
            battery_power_w: power,
            adjusted_grid_w: prev_demand - power,
            soc_percent: self.soc_percent(),
            interval_secs: dt_secs,
        }
    }

    /// Price-gated dispatch: ignores the sign of demand, charges at full
    /// power in the cheap third of the day and discharges at full power in
    /// the expensive third.
    pub fn process_arbitrage(
        &mut self,
        demand_w: f64,
        t: DateTime<Utc>,
        spot: f64,
        low_threshold: f64,
        high_threshold: f64,
    ) -> BatteryStep {
        self.clamp_soc();
        let Some((dt_secs, prev_demand)) = self.take_interval(demand_w, t) else {
            return BatteryStep::seed(demand_w, self.soc_percent());
        };

        let power = if spot <= low_threshold {
            -self.config.max_power_w.min(self.charge_headroom_w(dt_secs))
        } else if spot >= high_threshold {
            self.config
                .max_power_w
                .min(self.discharge_available_w(dt_secs))
        } else {
            0.0
        };

        self.apply(power, dt_secs, t);
        if let Some(record) = self.arbitrage.observe(t, power, dt_secs, spot, self.nominal_wh()) {
            self.day_logs.push(record);
        }

        BatteryStep {
            battery_power_w: power,
            adjusted_grid_w: prev_demand - power,
            soc_percent: self.soc_percent(),
            interval_secs: dt_secs,
        }
    }

    /// Finalized arbitrage day records accumulated since the last drain.
    pub fn take_day_logs(&mut self) -> Vec<ArbitrageDayRecord> {
        std::mem::take(&mut self.day_logs)
    }

    /// Return SoC to the floor, zero the throughput and clear histograms.
    /// Configuration is preserved.
    pub fn reset(&mut self) {
        self.total_throughput_wh = 0.0;
        self.soc_wh = self.floor_wh();
        self.last = None;
        self.last_power_w = 0.0;
        self.histograms = BatteryHistograms::default();
        self.arbitrage = ArbitrageTracker::default();
        self.day_logs.clear();
    }

    /// Drop the interval seed so the next call integrates nothing.
    /// Running totals and SoC survive (used on seek).
    pub fn clear_interval_state(&mut self) {
        self.last = None;
        self.last_power_w = 0.0;
    }

    /// Swap in a new configuration, keeping SoC and history (clamped to the
    /// new bounds on the spot).
    pub fn configure(&mut self, config: BatteryConfig) {
        self.config = config;
        self.clamp_soc();
    }

    fn take_interval(&mut self, demand_w: f64, t: DateTime<Utc>) -> Option<(f64, f64)> {
        let previous = self.last.replace((t, demand_w));
        let (last_time, last_demand) = previous?;
        let dt_secs = (t - last_time).num_milliseconds() as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return None;
        }
        Some((dt_secs, last_demand))
    }

    fn charge_headroom_w(&self, dt_secs: f64) -> f64 {
        ((self.ceiling_wh() - self.soc_wh).max(0.0) * 3600.0 / dt_secs).max(0.0)
    }

    fn discharge_available_w(&self, dt_secs: f64) -> f64 {
        ((self.soc_wh - self.floor_wh()).max(0.0) * 3600.0 / dt_secs).max(0.0)
    }

    fn apply(&mut self, power_w: f64, dt_secs: f64, t: DateTime<Utc>) {
        self.record_dwell(power_w, dt_secs, t);
        let energy_wh = power_w * dt_secs / 3600.0;
        self.soc_wh -= energy_wh;
        self.total_throughput_wh += energy_wh.abs();
        self.last_power_w = power_w;
        self.clamp_soc();
    }

    fn record_dwell(&mut self, power_w: f64, dt_secs: f64, t: DateTime<Utc>) {
        let kw_bucket = (power_w / 1000.0).round() as i64;
        *self
            .histograms
            .time_at_power_secs
            .entry(kw_bucket)
            .or_default() += dt_secs;

        let decile = soc_decile(self.soc_percent());
        *self
            .histograms
            .time_at_soc_secs
            .entry(decile)
            .or_default() += dt_secs;

        let month_key = t.format("%Y-%m").to_string();
        *self
            .histograms
            .month_soc_secs
            .entry(month_key)
            .or_default()
            .entry(decile)
            .or_default() += dt_secs;
    }

    fn clamp_soc(&mut self) {
        let floor = self.floor_wh();
        let ceiling = self.ceiling_wh();
        self.soc_wh = self.soc_wh.clamp(floor, ceiling.max(floor));
    }
}

/// SoC rounded down to its decile bucket (100% lands in bucket 10).
fn soc_decile(soc_percent: f64) -> u8 {
    (soc_percent.clamp(0.0, 100.0) / 10.0).floor() as u8
}

// ============= Arbitrage day ledger =============

#[derive(Debug, Clone, Copy)]
struct ActionWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    energy_wh: f64,
    price_weighted_wh: f64,
}

impl ActionWindow {
    fn open(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: start,
            energy_wh: 0.0,
            price_weighted_wh: 0.0,
        }
    }

    fn extend(&mut self, end: DateTime<Utc>, energy_wh: f64, price: f64) {
        self.end = end;
        self.energy_wh += energy_wh;
        self.price_weighted_wh += energy_wh * price;
    }

    fn avg_price(&self) -> f64 {
        if self.energy_wh <= 0.0 {
            0.0
        } else {
            self.price_weighted_wh / self.energy_wh
        }
    }
}

/// Tracks one day's charge window and the discharge window following it.
#[derive(Debug, Clone, Default)]
struct ArbitrageTracker {
    day: Option<NaiveDate>,
    charge: Option<ActionWindow>,
    discharge: Option<ActionWindow>,
}

impl ArbitrageTracker {
    /// Feed one interval; returns a finalized record when a day with a
    /// complete charge-then-discharge cycle rolls over.
    fn observe(
        &mut self,
        t: DateTime<Utc>,
        power_w: f64,
        dt_secs: f64,
        spot: f64,
        nominal_wh: f64,
    ) -> Option<ArbitrageDayRecord> {
        let date = t.date_naive();
        let mut finished = None;
        if self.day != Some(date) {
            finished = self.finalize(nominal_wh);
            self.day = Some(date);
        }

        let energy_wh = power_w.abs() * dt_secs / 3600.0;
        let interval_start = t - chrono::Duration::milliseconds((dt_secs * 1000.0) as i64);
        if power_w < 0.0 && energy_wh > 0.0 {
            // Charging counts toward the day's charge window until a
            // discharge window has opened.
            if self.discharge.is_none() {
                self.charge
                    .get_or_insert_with(|| ActionWindow::open(interval_start))
                    .extend(t, energy_wh, spot);
            }
        } else if power_w > 0.0 && energy_wh > 0.0 && self.charge.is_some() {
            self.discharge
                .get_or_insert_with(|| ActionWindow::open(interval_start))
                .extend(t, energy_wh, spot);
        }

        finished
    }

    fn finalize(&mut self, nominal_wh: f64) -> Option<ArbitrageDayRecord> {
        let day = self.day.take()?;
        let charge = self.charge.take();
        let discharge = self.discharge.take();
        let (charge, discharge) = charge.zip(discharge)?;
        if charge.energy_wh <= 0.0 || discharge.energy_wh <= 0.0 {
            return None;
        }

        let charge_kwh = charge.energy_wh / 1000.0;
        let discharge_kwh = discharge.energy_wh / 1000.0;
        let net = discharge_kwh * discharge.avg_price() - charge_kwh * charge.avg_price();
        let cycles_delta = if nominal_wh > 0.0 {
            (charge.energy_wh + discharge.energy_wh) / (2.0 * nominal_wh)
        } else {
            0.0
        };

        Some(ArbitrageDayRecord {
            date: day,
            charge_start: charge.start,
            charge_end: charge.end,
            charge_kwh,
            avg_charge_price: charge.avg_price(),
            discharge_start: discharge.start,
            discharge_end: discharge.end,
            discharge_kwh,
            avg_discharge_price: discharge.avg_price(),
            gap_minutes: (discharge.start - charge.end).num_minutes(),
            net_earnings_pln: net,
            cycles_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config_10kwh() -> BatteryConfig {
        BatteryConfig {
            enabled: true,
            capacity_kwh: 10.0,
            max_power_w: 5000.0,
            discharge_to_percent: 10.0,
            charge_to_percent: 100.0,
            degradation_cycles: 0.0,
        }
    }

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(h)
    }

    #[test]
    fn test_export_absorption_scenario() {
        // 10 kWh, floor 10%, max 5 kW, SoC 1 kWh; -2000 W at t=0h,1h,2h
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 1.0);

        let step1 = battery.process(-2000.0, hour(0));
        assert_eq!(step1.battery_power_w, 0.0);

        let step2 = battery.process(-2000.0, hour(1));
        assert_eq!(step2.battery_power_w, -2000.0);
        assert_eq!(step2.adjusted_grid_w, 0.0);
        assert!((step2.soc_percent - 30.0).abs() < 1e-9);

        let step3 = battery.process(-2000.0, hour(2));
        assert!((step3.soc_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_floor_clamp_scenario() {
        // At the floor, demand +5000 W twice: no discharge, SoC unchanged
        let mut battery = Battery::new(config_10kwh());
        assert!((battery.soc_percent() - 10.0).abs() < 1e-9);

        battery.process(5000.0, hour(0));
        let step = battery.process(5000.0, hour(1));
        assert_eq!(step.battery_power_w, 0.0);
        assert_eq!(step.adjusted_grid_w, 5000.0);
        assert!((step.soc_percent - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_arbitrage_charge_scenario() {
        // SoC 1 kWh, demand +1000 W, spot 0.10 <= low 0.20: charge at max
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 1.0);

        battery.process_arbitrage(1000.0, hour(0), 0.10, 0.20, 0.80);
        let step = battery.process_arbitrage(1000.0, hour(1), 0.10, 0.20, 0.80);
        assert_eq!(step.battery_power_w, -5000.0);
        assert_eq!(step.adjusted_grid_w, 6000.0);
        assert!((step.soc_percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_arbitrage_idle_between_thresholds() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 5.0);
        battery.process_arbitrage(1000.0, hour(0), 0.50, 0.20, 0.80);
        let step = battery.process_arbitrage(1000.0, hour(1), 0.50, 0.20, 0.80);
        assert_eq!(step.battery_power_w, 0.0);
        assert!((battery.soc_wh() - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn test_degradation_fade() {
        // 2000 cycles of 4000: effective capacity 10 -> 9 kWh
        let config = BatteryConfig {
            degradation_cycles: 4000.0,
            ..config_10kwh()
        };
        let mut battery = Battery::new(config);
        battery.total_throughput_wh = 2.0 * 2000.0 * 10_000.0;

        assert!((battery.cycles() - 2000.0).abs() < 1e-9);
        assert!((battery.effective_capacity_wh() - 9000.0).abs() < 1e-6);
        assert!((battery.ceiling_wh() - 9000.0).abs() < 1e-6);
    }

    #[test]
    fn test_degraded_ceiling_clamps_soc_next_tick() {
        let config = BatteryConfig {
            degradation_cycles: 100.0,
            ..config_10kwh()
        };
        let mut battery = Battery::with_soc_kwh(config, 10.0);
        // Push throughput past the fade horizon: effective capacity is 8 kWh
        battery.total_throughput_wh = 2.0 * 200.0 * 10_000.0;

        battery.process(0.0, hour(0));
        assert!(battery.soc_wh() <= battery.ceiling_wh() + 1e-9);
        assert!((battery.effective_capacity_wh() - 8000.0).abs() < 1e-6);
    }

    #[test]
    fn test_power_stays_within_limits() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 5.0);
        battery.process(-20_000.0, hour(0));
        let step = battery.process(-20_000.0, hour(1));
        assert!(step.battery_power_w.abs() <= battery.config.max_power_w);

        battery.clear_interval_state();
        battery.process(20_000.0, hour(2));
        let step = battery.process(20_000.0, hour(3));
        assert!(step.battery_power_w.abs() <= battery.config.max_power_w);
    }

    #[test]
    fn test_charge_raises_discharge_lowers_idle_holds() {
        let mut charging = Battery::with_soc_kwh(config_10kwh(), 5.0);
        charging.process(-1000.0, hour(0));
        let step = charging.process(-1000.0, hour(1));
        assert!(step.battery_power_w < 0.0);
        assert!(charging.soc_wh() > 5000.0);

        let mut discharging = Battery::with_soc_kwh(config_10kwh(), 5.0);
        discharging.process(1500.0, hour(0));
        let step = discharging.process(1500.0, hour(1));
        assert!(step.battery_power_w > 0.0);
        assert!(discharging.soc_wh() < 5000.0);

        let mut idle = Battery::with_soc_kwh(config_10kwh(), 5.0);
        idle.process(0.0, hour(0));
        let step = idle.process(0.0, hour(1));
        assert_eq!(step.battery_power_w, 0.0);
        assert!((idle.soc_wh() - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_count_matches_throughput() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 5.0);
        battery.process(-2000.0, hour(0));
        battery.process(2000.0, hour(1)); // integrates 2 kWh charge
        battery.process(0.0, hour(2)); // integrates 2 kWh discharge

        let expected = battery.total_throughput_wh() / (2.0 * battery.nominal_wh());
        assert!((battery.cycles() - expected).abs() < 1e-12);
        assert!((battery.total_throughput_wh() - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_restores_floor_and_clears_history() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 5.0);
        battery.process(-2000.0, hour(0));
        battery.process(-2000.0, hour(1));
        assert!(battery.total_throughput_wh() > 0.0);

        battery.reset();
        assert!((battery.soc_wh() - battery.floor_wh()).abs() < 1e-9);
        assert_eq!(battery.total_throughput_wh(), 0.0);
        assert!(battery.histograms().time_at_power_secs.is_empty());
        assert!(battery.histograms().time_at_soc_secs.is_empty());
        assert!(battery.histograms().month_soc_secs.is_empty());
    }

    #[test]
    fn test_dwell_histograms_accumulate_interval_seconds() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 1.0);
        battery.process(-2000.0, hour(0));
        battery.process(-2000.0, hour(1));
        battery.process(0.0, hour(2));

        // Both integrated intervals used the stored -2000 W demand
        let hist = battery.histograms();
        assert_eq!(hist.time_at_power_secs.get(&-2), Some(&7200.0));
        let total: f64 = hist.time_at_power_secs.values().sum();
        assert_eq!(total, 7200.0);
        let month_total: f64 = hist
            .month_soc_secs
            .get("2024-03")
            .unwrap()
            .values()
            .sum();
        assert_eq!(month_total, 7200.0);
    }

    #[test]
    fn test_arbitrage_day_log_requires_complete_cycle() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 1.0);
        // Day 1: charge in the morning, discharge in the evening
        battery.process_arbitrage(0.0, hour(0), 0.10, 0.20, 0.80);
        battery.process_arbitrage(0.0, hour(1), 0.10, 0.20, 0.80); // charge
        battery.process_arbitrage(0.0, hour(2), 0.10, 0.20, 0.80); // charge
        battery.process_arbitrage(0.0, hour(12), 0.50, 0.20, 0.80); // idle
        battery.process_arbitrage(0.0, hour(19), 0.90, 0.20, 0.80); // discharge
        battery.process_arbitrage(0.0, hour(20), 0.90, 0.20, 0.80); // discharge
        // Day 2 begins: previous day finalizes
        battery.process_arbitrage(0.0, hour(25), 0.50, 0.20, 0.80);

        let logs = battery.take_day_logs();
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.date, hour(0).date_naive());
        assert!(log.charge_kwh > 0.0);
        assert!(log.discharge_kwh > 0.0);
        assert!(log.gap_minutes > 0);
        assert!(log.net_earnings_pln > 0.0);
        assert!(log.cycles_delta > 0.0);
    }

    #[test]
    fn test_arbitrage_day_without_discharge_not_recorded() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 1.0);
        battery.process_arbitrage(0.0, hour(0), 0.10, 0.20, 0.80);
        battery.process_arbitrage(0.0, hour(1), 0.10, 0.20, 0.80); // charge only
        battery.process_arbitrage(0.0, hour(25), 0.50, 0.20, 0.80); // next day

        assert!(battery.take_day_logs().is_empty());
    }

    #[test]
    fn test_first_call_after_seek_clear_integrates_nothing() {
        let mut battery = Battery::with_soc_kwh(config_10kwh(), 5.0);
        battery.process(-2000.0, hour(0));
        battery.process(-2000.0, hour(1));
        let soc = battery.soc_wh();

        battery.clear_interval_state();
        let step = battery.process(-2000.0, hour(10));
        assert_eq!(step.battery_power_w, 0.0);
        assert_eq!(battery.soc_wh(), soc);
    }
}
