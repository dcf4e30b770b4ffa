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
use rewatt_types::ThermalConfig;
use serde::{Deserialize, Serialize};

use crate::pricing::DayThresholds;

/// Telemetry snapshot of the pre-heat shadow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalTelemetry {
    pub indoor_c: f64,
    pub setpoint_c: f64,
    pub hp_electrical_w: f64,
    pub cost_pln: f64,
    pub energy_kwh: f64,
}

/// First-order lumped building model evaluating the pre-heat strategy:
/// overheat on cheap electricity, coast through expensive hours.
///
/// Heat balance per interval: `ΔT = (hp_thermal - loss) · Δt / thermal_mass`
/// with `hp_thermal = hp_electrical · COP` and
/// `loss = max(0, loss_coeff · (indoor - outdoor))`.
#[derive(Debug, Clone)]
pub struct ThermalShadow {
    config: ThermalConfig,
    indoor_c: f64,
    cost_pln: f64,
    energy_kwh: f64,
    hp_electrical_w: f64,
    last: Option<(DateTime<Utc>, f64)>,
}

impl ThermalShadow {
    pub fn new(config: ThermalConfig) -> Self {
        let indoor_c = config.setpoint_c;
        Self {
            config,
            indoor_c,
            cost_pln: 0.0,
            energy_kwh: 0.0,
            hp_electrical_w: 0.0,
            last: None,
        }
    }

    pub fn indoor_c(&self) -> f64 {
        self.indoor_c
    }

    pub fn cost_pln(&self) -> f64 {
        self.cost_pln
    }

    pub fn energy_kwh(&self) -> f64 {
        self.energy_kwh
    }

    pub fn telemetry(&self) -> ThermalTelemetry {
        ThermalTelemetry {
            indoor_c: self.indoor_c,
            setpoint_c: self.config.setpoint_c,
            hp_electrical_w: self.hp_electrical_w,
            cost_pln: self.cost_pln,
            energy_kwh: self.energy_kwh,
        }
    }

    /// Advance the model to `t` using the outdoor temperature and spot price
    /// seen over the interval that just ended. First call only seeds.
    pub fn step(
        &mut self,
        outdoor_c: f64,
        spot: Option<f64>,
        thresholds: Option<DayThresholds>,
        t: DateTime<Utc>,
    ) {
        let previous = self.last.replace((t, outdoor_c));
        let Some((last_time, last_outdoor)) = previous else {
            return;
        };
        let dt_secs = (t - last_time).num_milliseconds() as f64 / 1000.0;
        if dt_secs <= 0.0 {
            return;
        }

        self.hp_electrical_w = self.heat_pump_power(spot, thresholds);

        let hp_thermal_w = self.hp_electrical_w * self.config.cop;
        let loss_w = (self.config.insulation.loss_coefficient_w_per_c()
            * (self.indoor_c - last_outdoor))
            .max(0.0);
        let delta_t = (hp_thermal_w - loss_w) * dt_secs / self.config.thermal_mass_j;
        self.indoor_c += delta_t;

        let overheat_limit = self.config.setpoint_c + self.config.preheat_delta_c + 2.0;
        self.indoor_c = self.indoor_c.clamp(last_outdoor.min(overheat_limit), overheat_limit);

        let kwh = self.hp_electrical_w * dt_secs / 3_600_000.0;
        self.energy_kwh += kwh;
        if let Some(spot) = spot {
            self.cost_pln += kwh * spot;
        }
    }

    /// Drop the interval seed (seek); accumulated cost survives.
    pub fn clear_interval_state(&mut self) {
        self.last = None;
        self.hp_electrical_w = 0.0;
    }

    pub fn configure(&mut self, config: ThermalConfig) {
        self.config = config;
    }

    /// Policy: cheap-and-cold runs flat out up to the overheat band,
    /// expensive-and-warm coasts, everything else holds the setpoint.
    fn heat_pump_power(&self, spot: Option<f64>, thresholds: Option<DayThresholds>) -> f64 {
        let overheat_target = self.config.setpoint_c + self.config.preheat_delta_c;
        if let (Some(spot), Some(gates)) = (spot, thresholds) {
            if spot <= gates.low && self.indoor_c < overheat_target {
                return self.config.hp_max_power_w;
            }
            if spot >= gates.high && self.indoor_c >= self.config.setpoint_c {
                return 0.0;
            }
        }
        if self.indoor_c < self.config.setpoint_c {
            self.config.hp_max_power_w
        } else {
            0.0
        }
    }
}
