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

use serde::{Deserialize, Serialize};

/// Canonical sensor channels known to the engine.
///
/// External source systems use their own opaque entity ids; those ids map
/// into this closed enumeration through a [`SensorCatalog`] built at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Net grid power: positive = import, negative = export (W)
    GridPower,
    /// PV production (W, positive)
    PvPower,
    /// Heat pump electrical consumption (W)
    HeatPumpConsumption,
    /// Heat pump thermal production (W)
    HeatPumpProduction,
    /// Indoor zone temperature (°C)
    IndoorTemperature,
    /// Outdoor temperature (°C)
    OutdoorTemperature,
    /// Day-ahead spot electricity price (PLN/kWh)
    SpotPrice,
}

impl SensorKind {
    /// Stable canonical id used inside the engine and on the wire.
    pub fn canonical_id(&self) -> &'static str {
        match self {
            Self::GridPower => "grid_power",
            Self::PvPower => "pv_power",
            Self::HeatPumpConsumption => "heat_pump_consumption",
            Self::HeatPumpProduction => "heat_pump_production",
            Self::IndoorTemperature => "indoor_temperature",
            Self::OutdoorTemperature => "outdoor_temperature",
            Self::SpotPrice => "spot_price",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::GridPower => "Grid power",
            Self::PvPower => "PV power",
            Self::HeatPumpConsumption => "Heat pump consumption",
            Self::HeatPumpProduction => "Heat pump production",
            Self::IndoorTemperature => "Indoor temperature",
            Self::OutdoorTemperature => "Outdoor temperature",
            Self::SpotPrice => "Spot price",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::GridPower
            | Self::PvPower
            | Self::HeatPumpConsumption
            | Self::HeatPumpProduction => "W",
            Self::IndoorTemperature | Self::OutdoorTemperature => "°C",
            Self::SpotPrice => "PLN/kWh",
        }
    }

    /// All kinds, in a stable order.
    pub fn all() -> &'static [SensorKind] {
        &[
            Self::GridPower,
            Self::PvPower,
            Self::HeatPumpConsumption,
            Self::HeatPumpProduction,
            Self::IndoorTemperature,
            Self::OutdoorTemperature,
            Self::SpotPrice,
        ]
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_id())
    }
}

/// Sensor metadata registered in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub display_name: String,
    pub kind: SensorKind,
    pub unit: String,
}

impl Sensor {
    /// Build the canonical sensor for a kind.
    pub fn canonical(kind: SensorKind) -> Self {
        Self {
            id: kind.canonical_id().to_owned(),
            display_name: kind.display_name().to_owned(),
            kind,
            unit: kind.unit().to_owned(),
        }
    }
}

/// Forward + reverse mapping between external entity ids and canonical kinds.
///
/// Unknown external ids resolve to `None` and the offending rows drop during
/// ingest.
#[derive(Debug, Clone)]
pub struct SensorCatalog {
    reverse: HashMap<String, SensorKind>,
}

impl SensorCatalog {
    /// Empty catalog (canonical ids still resolve).
    pub fn new() -> Self {
        Self {
            reverse: HashMap::new(),
        }
    }

    /// Catalog seeded with the entity ids the supported source systems emit.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        let defaults: &[(&str, SensorKind)] = &[
            ("sensor.grid_power", SensorKind::GridPower),
            ("sensor.power_grid", SensorKind::GridPower),
            ("sensor.pv_power", SensorKind::PvPower),
            ("sensor.solar_power", SensorKind::PvPower),
            ("sensor.heat_pump_power", SensorKind::HeatPumpConsumption),
            ("sensor.heat_pump_consumed", SensorKind::HeatPumpConsumption),
            ("sensor.heat_pump_heat", SensorKind::HeatPumpProduction),
            ("sensor.heat_pump_produced", SensorKind::HeatPumpProduction),
            ("sensor.indoor_temperature", SensorKind::IndoorTemperature),
            ("sensor.zone_living_temperature", SensorKind::IndoorTemperature),
            ("sensor.outdoor_temperature", SensorKind::OutdoorTemperature),
            ("sensor.outside_temperature", SensorKind::OutdoorTemperature),
            ("sensor.spot_price", SensorKind::SpotPrice),
            ("sensor.energy_spot_price", SensorKind::SpotPrice),
        ];
        for (external, kind) in defaults {
            catalog.register(*external, *kind);
        }
        catalog
    }

    /// Map one external entity id onto a canonical kind.
    pub fn register(&mut self, external_id: impl Into<String>, kind: SensorKind) {
        self.reverse.insert(external_id.into(), kind);
    }

    /// Resolve an id: canonical ids always resolve, external ids resolve
    /// when registered.
    pub fn resolve(&self, id: &str) -> Option<SensorKind> {
        if let Some(kind) = self.reverse.get(id) {
            return Some(*kind);
        }
        SensorKind::all()
            .iter()
            .find(|kind| kind.canonical_id() == id)
            .copied()
    }

    /// Number of registered external ids.
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}

impl Default for SensorCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_ids_resolve_without_registration() {
        let catalog = SensorCatalog::new();
        assert_eq!(catalog.resolve("grid_power"), Some(SensorKind::GridPower));
        assert_eq!(catalog.resolve("spot_price"), Some(SensorKind::SpotPrice));
    }

    #[test]
    fn test_external_id_resolution() {
        let catalog = SensorCatalog::with_defaults();
        assert_eq!(
            catalog.resolve("sensor.solar_power"),
            Some(SensorKind::PvPower)
        );
        assert_eq!(catalog.resolve("sensor.unknown_gadget"), None);
    }

    #[test]
    fn test_register_overrides_default() {
        let mut catalog = SensorCatalog::with_defaults();
        catalog.register("sensor.grid_power", SensorKind::PvPower);
        assert_eq!(
            catalog.resolve("sensor.grid_power"),
            Some(SensorKind::PvPower)
        );
    }

    #[test]
    fn test_canonical_sensor_metadata() {
        let s = Sensor::canonical(SensorKind::SpotPrice);
        assert_eq!(s.id, "spot_price");
        assert_eq!(s.unit, "PLN/kWh");
    }
}
