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

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

// ============= Simulation Configuration =============

/// Central configuration resource for a simulation run.
#[derive(Resource, Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub tariffs: TariffConfig,
    #[serde(default)]
    pub thermal: ThermalConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl SimulationConfig {
    /// Clamp degenerate values into the legal domain.
    ///
    /// Keeps the run alive on bad input instead of failing deep inside the
    /// tick loop; callers log what changed.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.battery = self.battery.clamped();
        self.tariffs = self.tariffs.clamped();
        self.engine = self.engine.clamped();
        self
    }
}

/// Time-range partition selected for replay.
///
/// Archives come from two provenances: multi-year statistics exports and a
/// recent live snapshot. The partition is assigned per file at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimSource {
    Archival,
    Current,
    #[default]
    All,
}

impl std::fmt::Display for SimSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archival => write!(f, "archival"),
            Self::Current => write!(f, "current"),
            Self::All => write!(f, "all"),
        }
    }
}

// ============= Battery =============

/// Shadow battery parameters, shared by every dispatch strategy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nominal capacity (kWh)
    #[serde(default = "default_capacity_kwh")]
    pub capacity_kwh: f64,

    /// Maximum charge/discharge power (W)
    #[serde(default = "default_max_power_w")]
    pub max_power_w: f64,

    /// SoC floor as % of effective capacity
    #[serde(default = "default_discharge_to_percent")]
    pub discharge_to_percent: f64,

    /// SoC ceiling as % of effective capacity
    #[serde(default = "default_charge_to_percent")]
    pub charge_to_percent: f64,

    /// Full cycles over which capacity fades linearly to 80%; 0 disables fade
    #[serde(default)]
    pub degradation_cycles: f64,
}

impl BatteryConfig {
    /// Clamp power, capacity and the floor/ceiling pair into a usable state.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        if self.capacity_kwh <= 0.0 {
            self.capacity_kwh = default_capacity_kwh();
        }
        if self.max_power_w <= 0.0 {
            self.max_power_w = default_max_power_w();
        }
        self.discharge_to_percent = self.discharge_to_percent.clamp(0.0, 100.0);
        self.charge_to_percent = self.charge_to_percent.clamp(0.0, 100.0);
        if self.charge_to_percent <= self.discharge_to_percent {
            self.discharge_to_percent = default_discharge_to_percent();
            self.charge_to_percent = default_charge_to_percent();
        }
        if self.degradation_cycles < 0.0 {
            self.degradation_cycles = 0.0;
        }
        self
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_kwh: default_capacity_kwh(),
            max_power_w: default_max_power_w(),
            discharge_to_percent: default_discharge_to_percent(),
            charge_to_percent: default_charge_to_percent(),
            degradation_cycles: 0.0,
        }
    }
}

// ============= Tariffs =============

/// Billing parameters shared by the accounting ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffConfig {
    /// Fixed retail energy tariff (PLN/kWh)
    #[serde(default = "default_fixed_tariff")]
    pub fixed_tariff_pln: f64,

    /// Distribution fee added to every imported kWh (PLN/kWh)
    #[serde(default = "default_distribution_fee")]
    pub distribution_fee_pln: f64,

    /// Export revenue multiplier applied to spot-priced exports (0-1)
    #[serde(default = "default_export_coefficient")]
    pub export_coefficient: f64,

    /// Fraction of exported kWh credited to the net-metering bank
    #[serde(default = "default_net_metering_ratio")]
    pub net_metering_ratio: f64,
}

impl TariffConfig {
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.export_coefficient = self.export_coefficient.clamp(0.0, 1.0);
        self.net_metering_ratio = self.net_metering_ratio.clamp(0.0, 1.0);
        if self.fixed_tariff_pln < 0.0 {
            self.fixed_tariff_pln = default_fixed_tariff();
        }
        if self.distribution_fee_pln < 0.0 {
            self.distribution_fee_pln = default_distribution_fee();
        }
        self
    }
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            fixed_tariff_pln: default_fixed_tariff(),
            distribution_fee_pln: default_distribution_fee(),
            export_coefficient: default_export_coefficient(),
            net_metering_ratio: default_net_metering_ratio(),
        }
    }
}

// ============= Thermal =============

/// Building insulation quality, mapped to a heat-loss coefficient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsulationLevel {
    VeryGood,
    Good,
    #[default]
    Normal,
    Basic,
}

impl InsulationLevel {
    /// Heat loss per degree of indoor/outdoor difference (W/°C).
    pub fn loss_coefficient_w_per_c(&self) -> f64 {
        match self {
            Self::VeryGood => 100.0,
            Self::Good => 150.0,
            Self::Normal => 200.0,
            Self::Basic => 280.0,
        }
    }
}

impl std::fmt::Display for InsulationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryGood => write!(f, "very_good"),
            Self::Good => write!(f, "good"),
            Self::Normal => write!(f, "normal"),
            Self::Basic => write!(f, "basic"),
        }
    }
}

/// First-order thermal shadow parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalConfig {
    /// Comfort setpoint (°C)
    #[serde(default = "default_setpoint")]
    pub setpoint_c: f64,

    /// Allowed overheat above setpoint during cheap hours (°C)
    #[serde(default = "default_preheat_delta")]
    pub preheat_delta_c: f64,

    /// Lumped thermal mass of the building (J/°C)
    #[serde(default = "default_thermal_mass")]
    pub thermal_mass_j: f64,

    #[serde(default)]
    pub insulation: InsulationLevel,

    /// Heat pump coefficient of performance
    #[serde(default = "default_cop")]
    pub cop: f64,

    /// Heat pump maximum electrical draw (W)
    #[serde(default = "default_hp_max_power")]
    pub hp_max_power_w: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            setpoint_c: default_setpoint(),
            preheat_delta_c: default_preheat_delta(),
            thermal_mass_j: default_thermal_mass(),
            insulation: InsulationLevel::default(),
            cop: default_cop(),
            hp_max_power_w: default_hp_max_power(),
        }
    }
}

// ============= Engine =============

/// Replay clock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Simulated seconds per real second (3600 = one hour per second)
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Wall-clock tick interval (ms)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub source: SimSource,

    /// Start the clock paused until a `sim:start` command arrives
    #[serde(default)]
    pub start_paused: bool,
}

impl EngineSettings {
    /// Speed at or below zero means "paused", not "backwards".
    #[must_use]
    pub fn clamped(mut self) -> Self {
        if self.speed <= 0.0 {
            self.speed = default_speed();
            self.start_paused = true;
        }
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = default_tick_interval_ms();
        }
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            tick_interval_ms: default_tick_interval_ms(),
            source: SimSource::default(),
            start_paused: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_capacity_kwh() -> f64 {
    10.0
}

fn default_max_power_w() -> f64 {
    5000.0
}

fn default_discharge_to_percent() -> f64 {
    10.0
}

fn default_charge_to_percent() -> f64 {
    100.0
}

fn default_fixed_tariff() -> f64 {
    0.62
}

fn default_distribution_fee() -> f64 {
    0.31
}

fn default_export_coefficient() -> f64 {
    0.8
}

fn default_net_metering_ratio() -> f64 {
    0.8
}

fn default_setpoint() -> f64 {
    21.0
}

fn default_preheat_delta() -> f64 {
    2.0
}

fn default_thermal_mass() -> f64 {
    40_000_000.0
}

fn default_cop() -> f64 {
    3.5
}

fn default_hp_max_power() -> f64 {
    3000.0
}

fn default_speed() -> f64 {
    3600.0
}

fn default_tick_interval_ms() -> u64 {
    100
}
