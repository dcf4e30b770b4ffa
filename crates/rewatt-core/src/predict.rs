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

use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, DurationRound, Utc};
use parking_lot::Mutex;

/// Hour-indexed consumption/temperature sequences.
///
/// The engine consumes predictions through this capability; the models
/// behind it (neural nets trained offline) are not part of the core. The
/// temperature sequence is the one the power predictions were generated
/// from, so subscribers can compare both consistently.
pub trait PredictionProvider: Send + Sync {
    /// Predicted grid power for the hour containing `t` (W).
    fn power_at(&self, t: DateTime<Utc>) -> f64;

    /// Predicted outdoor temperature for the hour containing `t` (°C).
    fn temperature_at(&self, t: DateTime<Utc>) -> f64;
}

/// Shared provider handle injected into the engine.
#[derive(Resource, Clone)]
pub struct PredictionResource(pub Arc<dyn PredictionProvider>);

impl std::fmt::Debug for PredictionResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionResource").finish_non_exhaustive()
    }
}

/// Floor a timestamp to its hour.
pub fn hour_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(chrono::Duration::hours(1)).unwrap_or(t)
}

/// Deterministic seasonal profile provider.
///
/// Pre-generates one year of hourly outdoor temperature and the household
/// consumption that temperature implies; the sequence extends lazily under
/// a mutex when the scheduler replays past its end, so concurrent readers
/// during extension stay consistent.
pub struct SeasonalProfileProvider {
    origin: DateTime<Utc>,
    sequences: Mutex<Sequences>,
}

#[derive(Debug, Default)]
struct Sequences {
    temps_c: Vec<f64>,
    powers_w: Vec<f64>,
}

/// One year of hourly samples generated per extension step.
const EXTENSION_HOURS: usize = 24 * 365;

impl SeasonalProfileProvider {
    pub fn new(origin: DateTime<Utc>) -> Self {
        let provider = Self {
            origin: hour_floor(origin),
            sequences: Mutex::new(Sequences::default()),
        };
        provider.sequences.lock().extend_to(EXTENSION_HOURS);
        provider
    }

    /// Build a provider over externally supplied hourly sequences (both the
    /// same length); reads past the end extend with the seasonal profile.
    pub fn from_sequences(origin: DateTime<Utc>, temps_c: Vec<f64>, powers_w: Vec<f64>) -> Self {
        let len = temps_c.len().min(powers_w.len());
        let mut temps_c = temps_c;
        let mut powers_w = powers_w;
        temps_c.truncate(len);
        powers_w.truncate(len);
        Self {
            origin: hour_floor(origin),
            sequences: Mutex::new(Sequences { temps_c, powers_w }),
        }
    }

    fn hour_index(&self, t: DateTime<Utc>) -> usize {
        let hours = (hour_floor(t) - self.origin).num_hours();
        usize::try_from(hours).unwrap_or(0)
    }
}

impl PredictionProvider for SeasonalProfileProvider {
    fn power_at(&self, t: DateTime<Utc>) -> f64 {
        let idx = self.hour_index(t);
        let mut sequences = self.sequences.lock();
        sequences.extend_to(idx + 1);
        sequences.powers_w[idx]
    }

    fn temperature_at(&self, t: DateTime<Utc>) -> f64 {
        let idx = self.hour_index(t);
        let mut sequences = self.sequences.lock();
        sequences.extend_to(idx + 1);
        sequences.temps_c[idx]
    }
}

impl Sequences {
    /// Grow both sequences to at least `len`, whole extension chunks at a
    /// time.
    fn extend_to(&mut self, len: usize) {
        while self.temps_c.len() < len {
            let target = self.temps_c.len() + EXTENSION_HOURS;
            for hour in self.temps_c.len()..target {
                let temp = seasonal_temperature(hour);
                self.temps_c.push(temp);
                self.powers_w.push(household_power(temp, hour));
            }
        }
    }
}

/// Annual + diurnal sinusoid with a small deterministic ripple.
fn seasonal_temperature(hour: usize) -> f64 {
    let day_of_year = (hour / 24) % 365;
    let hour_of_day = hour % 24;

    // Coldest around mid-January, warmest mid-July
    let annual_phase = (day_of_year as f64 - 15.0) / 365.0 * std::f64::consts::TAU;
    let annual = 9.0 - 11.0 * annual_phase.cos();

    // Coldest before dawn, warmest mid-afternoon
    let diurnal_phase = (hour_of_day as f64 - 4.0) / 24.0 * std::f64::consts::TAU;
    let diurnal = -3.5 * diurnal_phase.cos();

    let ripple = ((hour as f64 * 0.37).sin() + (hour as f64 * 0.11).cos()) * 0.8;
    annual + diurnal + ripple
}

/// Household grid draw implied by temperature: base load, evening peak and
/// heat-pump demand below the heating threshold.
fn household_power(temp_c: f64, hour: usize) -> f64 {
    let hour_of_day = hour % 24;
    let base = 350.0;
    let evening = if (17..22).contains(&hour_of_day) {
        450.0
    } else {
        0.0
    };
    let heating = if temp_c < 15.0 {
        (15.0 - temp_c) * 160.0
    } else {
        0.0
    };
    base + evening + heating
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_hour_floor() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 7, 42, 13).unwrap();
        assert_eq!(
            hour_floor(t),
            Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_provider_is_deterministic() {
        let a = SeasonalProfileProvider::new(origin());
        let b = SeasonalProfileProvider::new(origin());
        let t = origin() + chrono::Duration::days(40);
        assert_eq!(a.power_at(t), b.power_at(t));
        assert_eq!(a.temperature_at(t), b.temperature_at(t));
    }

    #[test]
    fn test_same_value_within_an_hour() {
        let provider = SeasonalProfileProvider::new(origin());
        let t = origin() + chrono::Duration::days(10);
        assert_eq!(
            provider.power_at(t),
            provider.power_at(t + chrono::Duration::minutes(59))
        );
    }

    #[test]
    fn test_lazy_extension_past_initial_year() {
        let provider = SeasonalProfileProvider::new(origin());
        let far = origin() + chrono::Duration::days(500);
        let power = provider.power_at(far);
        assert!(power > 0.0);
        assert_eq!(provider.power_at(far), power);
    }

    #[test]
    fn test_winter_draws_more_than_summer() {
        let provider = SeasonalProfileProvider::new(origin());
        let january = origin() + chrono::Duration::days(14);
        let july = origin() + chrono::Duration::days(195);
        assert!(provider.power_at(january) > provider.power_at(july));
        assert!(provider.temperature_at(january) < provider.temperature_at(july));
    }

    #[test]
    fn test_from_sequences_serves_supplied_values() {
        let provider =
            SeasonalProfileProvider::from_sequences(origin(), vec![1.0, 2.0], vec![100.0, 200.0]);
        assert_eq!(provider.power_at(origin()), 100.0);
        assert_eq!(
            provider.temperature_at(origin() + chrono::Duration::hours(1)),
            2.0
        );
    }
}
