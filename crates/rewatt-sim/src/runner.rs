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

use chrono::{DateTime, Utc};
use rewatt_core::{Battery, DayPriceCache, SensorStore};
use rewatt_types::{BatteryConfig, SensorKind, TariffConfig};
use serde::{Deserialize, Serialize};

/// Intervals longer than this are sensor outages; the replay reseeds
/// instead of integrating across them.
const MAX_INTERVAL_SECS: f64 = 2.0 * 3600.0;

/// One strategy's result over the full trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub strategy_id: String,
    pub strategy_name: String,
    pub net_cost_pln: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub cycles: f64,
    pub final_soc_percent: f64,
}

#[derive(Debug, Default)]
struct Trace {
    import_kwh: f64,
    export_kwh: f64,
    cost_pln: f64,
}

impl Trace {
    fn record(&mut self, adjusted_w: f64, dt_secs: f64, price: f64, export_coefficient: f64) {
        let kwh = adjusted_w.abs() * dt_secs / 3_600_000.0;
        if adjusted_w > 0.0 {
            self.import_kwh += kwh;
            self.cost_pln += kwh * price;
        } else {
            self.export_kwh += kwh;
            self.cost_pln -= kwh * price * export_coefficient;
        }
    }
}

/// Replay the whole grid trace against one battery capacity: no-battery
/// baseline, self-consumption and price arbitrage, all over the identical
/// demand/price stream.
pub fn run_capacity(
    store: &SensorStore,
    battery_config: &BatteryConfig,
    tariffs: &TariffConfig,
) -> Vec<StrategyOutcome> {
    let mut baseline = Trace::default();
    let mut self_use_trace = Trace::default();
    let mut arbitrage_trace = Trace::default();
    let mut self_use = Battery::new(battery_config.clone());
    let mut arbitrage = Battery::new(battery_config.clone());
    let mut price_cache = DayPriceCache::new();

    let grid = store.sensor_of_kind(SensorKind::GridPower);
    let price_sensor = store.sensor_of_kind(SensorKind::SpotPrice);
    let series = grid.and_then(|s| store.series(&s.id)).unwrap_or(&[]);

    let mut last: Option<(DateTime<Utc>, f64)> = None;
    for reading in series {
        let ts = reading.timestamp;
        let demand = reading.value;
        let spot = price_sensor
            .and_then(|s| store.reading_at(&s.id, ts))
            .map(|r| r.value);
        let price = spot.unwrap_or(tariffs.fixed_tariff_pln + tariffs.distribution_fee_pln);
        let thresholds = price_cache.thresholds_for(store, ts);

        if let Some((t0, prev_demand)) = last {
            let dt_secs = (ts - t0).num_seconds() as f64;
            if dt_secs <= 0.0 || dt_secs > MAX_INTERVAL_SECS {
                // Outage: reseed all three traces
                self_use.clear_interval_state();
                arbitrage.clear_interval_state();
                last = Some((ts, demand));
                self_use.process(demand, ts);
                arbitrage.process(demand, ts);
                continue;
            }
            baseline.record(prev_demand, dt_secs, price, tariffs.export_coefficient);
        }
        last = Some((ts, demand));

        let step = self_use.process(demand, ts);
        if step.interval_secs > 0.0 {
            self_use_trace.record(
                step.adjusted_grid_w,
                step.interval_secs,
                price,
                tariffs.export_coefficient,
            );
        }

        let arb_step = match (spot, thresholds) {
            (Some(spot), Some(gates)) => {
                arbitrage.process_arbitrage(demand, ts, spot, gates.low, gates.high)
            }
            // No prices: the arbitrage shadow degenerates to idle passthrough
            _ => arbitrage.process(0.0, ts),
        };
        if arb_step.interval_secs > 0.0 {
            let adjusted = demand - arb_step.battery_power_w;
            arbitrage_trace.record(
                adjusted,
                arb_step.interval_secs,
                price,
                tariffs.export_coefficient,
            );
        }
    }

    vec![
        StrategyOutcome {
            strategy_id: "no_battery".to_owned(),
            strategy_name: "No battery".to_owned(),
            net_cost_pln: baseline.cost_pln,
            grid_import_kwh: baseline.import_kwh,
            grid_export_kwh: baseline.export_kwh,
            cycles: 0.0,
            final_soc_percent: 0.0,
        },
        StrategyOutcome {
            strategy_id: "self_consumption".to_owned(),
            strategy_name: "Self-consumption".to_owned(),
            net_cost_pln: self_use_trace.cost_pln,
            grid_import_kwh: self_use_trace.import_kwh,
            grid_export_kwh: self_use_trace.export_kwh,
            cycles: self_use.cycles(),
            final_soc_percent: self_use.soc_percent(),
        },
        StrategyOutcome {
            strategy_id: "arbitrage".to_owned(),
            strategy_name: "Price arbitrage".to_owned(),
            net_cost_pln: arbitrage_trace.cost_pln,
            grid_import_kwh: arbitrage_trace.import_kwh,
            grid_export_kwh: arbitrage_trace.export_kwh,
            cycles: arbitrage.cycles(),
            final_soc_percent: arbitrage.soc_percent(),
        },
    ]
}
