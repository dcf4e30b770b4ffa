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

use std::time::Instant;

use chrono::{DateTime, Utc};
use rewatt_types::TimeRange;

/// Wall-clock-decoupled simulated clock.
///
/// `speed` is the ratio of simulated to real elapsed time (3600 = one hour
/// of simulation per wall second). The clock never runs past the end of its
/// active range.
#[derive(Debug, Clone)]
pub struct SimClock {
    sim_time: DateTime<Utc>,
    speed: f64,
    running: bool,
    range: TimeRange,
    last_wall: Option<Instant>,
}

impl SimClock {
    pub fn new(range: TimeRange, speed: f64, running: bool) -> Self {
        Self {
            sim_time: range.start,
            speed: speed.max(0.0),
            running,
            range,
            last_wall: None,
        }
    }

    pub fn sim_time(&self) -> DateTime<Utc> {
        self.sim_time
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn at_end(&self) -> bool {
        self.sim_time >= self.range.end
    }

    /// Advance by `real_elapsed · speed`, clamped to the range end.
    /// Returns the simulated time actually gained (zero while paused or on
    /// the seeding call).
    pub fn tick(&mut self, now: Instant) -> chrono::Duration {
        let previous_wall = self.last_wall.replace(now);
        if !self.running {
            return chrono::Duration::zero();
        }
        let Some(previous_wall) = previous_wall else {
            return chrono::Duration::zero();
        };

        let real_elapsed = now.duration_since(previous_wall).as_secs_f64();
        let sim_millis = (real_elapsed * self.speed * 1000.0) as i64;
        let target = (self.sim_time + chrono::Duration::milliseconds(sim_millis)).min(self.range.end);
        let advanced = target - self.sim_time;
        self.sim_time = target;
        advanced
    }

    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            // Forget stale wall time so the resume does not jump
            self.last_wall = None;
        }
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Degenerate speeds pause instead of running backwards.
    pub fn set_speed(&mut self, speed: f64) {
        if speed <= 0.0 {
            self.pause();
        } else {
            self.speed = speed;
        }
    }

    /// Jump to `t`, clamped into the active range.
    pub fn seek(&mut self, t: DateTime<Utc>) {
        self.sim_time = t.clamp(self.range.start, self.range.end);
        self.last_wall = None;
    }

    /// Switch the active range (source change); the current position is
    /// clamped into the new window.
    pub fn set_range(&mut self, range: TimeRange) {
        self.range = range;
        self.sim_time = self.sim_time.clamp(range.start, range.end);
        self.last_wall = None;
    }
}
