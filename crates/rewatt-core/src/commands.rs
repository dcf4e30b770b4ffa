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
use chrono::{DateTime, Utc};
use rewatt_types::{BatteryConfig, InsulationLevel, SimSource, TimeRange};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::aggregate::Summary;
use crate::battery::BatteryTelemetry;
use crate::ledger::LedgerSnapshot;
use crate::thermal::ThermalTelemetry;

/// Commands arriving asynchronously at the engine; processed at most one
/// per tick and idempotent when state already matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SimCommand {
    #[serde(rename = "sim:start")]
    Start,
    #[serde(rename = "sim:pause")]
    Pause,
    #[serde(rename = "sim:set_speed")]
    SetSpeed { speed: f64 },
    #[serde(rename = "sim:seek")]
    Seek { timestamp: DateTime<Utc> },
    #[serde(rename = "sim:set_source")]
    SetSource { source: SimSource },
    #[serde(rename = "battery:config")]
    ConfigureBattery(BatteryConfig),
    #[serde(rename = "sim:set_prediction")]
    SetPrediction { enabled: bool },
    #[serde(rename = "config:update")]
    UpdateConfig(ConfigUpdate),
}

/// Partial global-config update; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_tariff_pln: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_fee_pln: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_metering_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preheat_delta_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulation: Option<InsulationLevel>,
}

/// Simulation clock state as shown to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimStateInfo {
    pub running: bool,
    pub speed: f64,
    pub sim_time: DateTime<Utc>,
    pub source: SimSource,
    pub prediction_enabled: bool,
    pub range: TimeRange,
}

/// Full state answer for the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub state: SimStateInfo,
    pub summary: Summary,
    pub ledgers: LedgerSnapshot,
    pub batteries: Vec<BatteryTelemetry>,
    pub thermal: ThermalTelemetry,
}

// ============= Channels (web -> engine) =============

/// Receiving half of the command channel, owned by the engine.
#[derive(Resource, Debug)]
pub struct CommandChannel {
    pub receiver: mpsc::UnboundedReceiver<SimCommand>,
}

/// Clonable sender handed to transports.
#[derive(Clone)]
pub struct CommandSender {
    sender: mpsc::UnboundedSender<SimCommand>,
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender").finish_non_exhaustive()
    }
}

impl CommandSender {
    /// Create a new sender/receiver pair.
    pub fn new() -> (Self, CommandChannel) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, CommandChannel { receiver })
    }

    pub fn send(&self, command: SimCommand) -> Result<(), CommandError> {
        self.sender
            .send(command)
            .map_err(|_| CommandError::ChannelClosed)
    }
}

#[derive(Debug, Clone)]
pub enum CommandError {
    ChannelClosed,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::ChannelClosed => write!(f, "command channel closed"),
        }
    }
}

impl std::error::Error for CommandError {}

// ============= Query channel (web -> engine -> web) =============

/// One snapshot request with its response slot.
#[derive(Debug)]
pub struct SummaryRequest {
    pub response_tx: oneshot::Sender<SummarySnapshot>,
}

/// Receiving half of the query channel, owned by the engine.
#[derive(Resource, Debug)]
pub struct QueryChannel {
    pub receiver: mpsc::UnboundedReceiver<SummaryRequest>,
}

/// Clonable query handle for web handlers.
#[derive(Clone)]
pub struct QuerySender {
    sender: mpsc::UnboundedSender<SummaryRequest>,
}

impl std::fmt::Debug for QuerySender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySender").finish_non_exhaustive()
    }
}

impl QuerySender {
    /// Create a new sender/receiver pair.
    pub fn new() -> (Self, QueryChannel) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, QueryChannel { receiver })
    }

    /// Ask the engine for a full snapshot.
    pub async fn query_summary(&self) -> Result<SummarySnapshot, QueryError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(SummaryRequest { response_tx })
            .map_err(|_| QueryError::ChannelClosed)?;
        response_rx.await.map_err(|_| QueryError::ResponseDropped)
    }
}

#[derive(Debug)]
pub enum QueryError {
    ChannelClosed,
    ResponseDropped,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "query channel closed"),
            Self::ResponseDropped => write!(f, "engine dropped the query response"),
        }
    }
}

impl std::error::Error for QueryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format_no_payload() {
        let cmd: SimCommand = serde_json::from_str(r#"{"type":"sim:start"}"#).unwrap();
        assert!(matches!(cmd, SimCommand::Start));
    }

    #[test]
    fn test_command_wire_format_with_payload() {
        let cmd: SimCommand =
            serde_json::from_str(r#"{"type":"sim:set_speed","payload":{"speed":7200.0}}"#).unwrap();
        match cmd {
            SimCommand::SetSpeed { speed } => assert_eq!(speed, 7200.0),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_seek_parses_iso8601() {
        let cmd: SimCommand = serde_json::from_str(
            r#"{"type":"sim:seek","payload":{"timestamp":"2024-03-01T06:00:00Z"}}"#,
        )
        .unwrap();
        match cmd {
            SimCommand::Seek { timestamp } => {
                assert_eq!(timestamp.to_rfc3339(), "2024-03-01T06:00:00+00:00");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_battery_config_payload() {
        let cmd: SimCommand = serde_json::from_str(
            r#"{"type":"battery:config","payload":{"enabled":true,"capacity_kwh":15.0,"max_power_w":4000.0,"discharge_to_percent":20.0,"charge_to_percent":90.0,"degradation_cycles":6000.0}}"#,
        )
        .unwrap();
        match cmd {
            SimCommand::ConfigureBattery(config) => {
                assert_eq!(config.capacity_kwh, 15.0);
                assert_eq!(config.degradation_cycles, 6000.0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_update_partial_fields() {
        let cmd: SimCommand = serde_json::from_str(
            r#"{"type":"config:update","payload":{"export_coefficient":0.7,"insulation":"very_good"}}"#,
        )
        .unwrap();
        match cmd {
            SimCommand::UpdateConfig(update) => {
                assert_eq!(update.export_coefficient, Some(0.7));
                assert_eq!(update.insulation, Some(InsulationLevel::VeryGood));
                assert!(update.fixed_tariff_pln.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_channel_round_trip() {
        let (sender, mut channel) = CommandSender::new();
        sender.send(SimCommand::Pause).unwrap();
        let received = channel.receiver.recv().await.unwrap();
        assert!(matches!(received, SimCommand::Pause));
    }
}
