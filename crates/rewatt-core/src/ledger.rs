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
use rewatt_types::TariffConfig;
use serde::{Deserialize, Serialize};

/// Serializable totals across the accounting ladder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub raw_spot_pln: f64,
    pub export_coeff_pln: f64,
    pub arbitrage_pln: f64,
    pub net_metering_pln: f64,
    pub net_metering_bank_kwh: f64,
    pub net_billing_pln: f64,
    pub net_billing_deposit_pln: f64,
    pub thermal_preheat_pln: f64,
}

/// Parallel cost ledgers over the same realized grid trace.
///
/// Every ledger sees identical import/export energy; they differ only in
/// the prices and credit rules applied. The arbitrage ledger is fed from
/// the arbitrage shadow battery's adjusted trace instead.
#[derive(Resource, Debug, Clone)]
pub struct CostLedgers {
    tariffs: TariffConfig,
    raw_spot_pln: f64,
    export_coeff_pln: f64,
    arbitrage_pln: f64,
    net_metering_pln: f64,
    net_metering_bank_kwh: f64,
    net_billing_pln: f64,
    net_billing_deposit_pln: f64,
    thermal_preheat_pln: f64,
}

impl CostLedgers {
    pub fn new(tariffs: TariffConfig) -> Self {
        Self {
            tariffs,
            raw_spot_pln: 0.0,
            export_coeff_pln: 0.0,
            arbitrage_pln: 0.0,
            net_metering_pln: 0.0,
            net_metering_bank_kwh: 0.0,
            net_billing_pln: 0.0,
            net_billing_deposit_pln: 0.0,
            thermal_preheat_pln: 0.0,
        }
    }

    pub fn tariffs(&self) -> &TariffConfig {
        &self.tariffs
    }

    pub fn update_tariffs(&mut self, tariffs: TariffConfig) {
        self.tariffs = tariffs;
    }

    /// Record one interval of the realized (no-battery) grid trace.
    ///
    /// `spot` is `None` when the dataset has no price sensor; the
    /// spot-dependent ledgers then stand still while net metering keeps
    /// accounting at the fixed tariff.
    pub fn record_flow(&mut self, import_kwh: f64, export_kwh: f64, spot: Option<f64>) {
        if let Some(spot) = spot {
            self.raw_spot_pln += import_kwh * spot - export_kwh * spot;
            self.export_coeff_pln +=
                import_kwh * spot - export_kwh * spot * self.tariffs.export_coefficient;

            // Net billing: exports build a currency deposit, imports are
            // billed at the retail tariff and offset down to zero.
            self.net_billing_deposit_pln += export_kwh * spot * self.tariffs.export_coefficient;
        }

        let retail = self.tariffs.fixed_tariff_pln + self.tariffs.distribution_fee_pln;

        let import_charge = import_kwh * retail;
        let offset = import_charge.min(self.net_billing_deposit_pln);
        self.net_billing_deposit_pln -= offset;
        self.net_billing_pln += import_charge - offset;

        // Net metering: exports bank scaled kWh, imports consume the bank
        // first and only the excess pays the retail tariff.
        self.net_metering_bank_kwh += export_kwh * self.tariffs.net_metering_ratio;
        let covered = import_kwh.min(self.net_metering_bank_kwh);
        self.net_metering_bank_kwh -= covered;
        self.net_metering_pln += (import_kwh - covered) * retail;
    }

    /// Record one interval of the arbitrage shadow's adjusted grid trace.
    pub fn record_arbitrage_flow(&mut self, import_kwh: f64, export_kwh: f64, spot: Option<f64>) {
        if let Some(spot) = spot {
            self.arbitrage_pln +=
                import_kwh * spot - export_kwh * spot * self.tariffs.export_coefficient;
        }
    }

    /// Mirror of the thermal shadow's accumulated cost.
    pub fn set_thermal_cost(&mut self, cost_pln: f64) {
        self.thermal_preheat_pln = cost_pln;
    }

    pub fn net_metering_bank_kwh(&self) -> f64 {
        self.net_metering_bank_kwh
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            raw_spot_pln: self.raw_spot_pln,
            export_coeff_pln: self.export_coeff_pln,
            arbitrage_pln: self.arbitrage_pln,
            net_metering_pln: self.net_metering_pln,
            net_metering_bank_kwh: self.net_metering_bank_kwh,
            net_billing_pln: self.net_billing_pln,
            net_billing_deposit_pln: self.net_billing_deposit_pln,
            thermal_preheat_pln: self.thermal_preheat_pln,
        }
    }
}
