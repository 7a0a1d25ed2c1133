//! Message Handler
//!
//! Turns an inbound `(topic, payload)` into at most one outbound message.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::publisher::{OutboundMessage, Publisher};
use super::topic::{interval_topic, model_receive_topic, InboundTopic};
use crate::config::TransportConfig;
use crate::error::{HadesError, Result};
use crate::fleet::{Decision, FleetOrchestrator};
use crate::validation::DeviceId;

/// Statistics payload: `{"temperature": 21.5}` or a bare number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatisticsPayload {
    Number(f64),
    Text(String),
    Object { temperature: serde_json::Value },
}

/// Parse the measurement out of a statistics payload
pub fn parse_measurement(payload: &[u8]) -> Result<f64> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| HadesError::Validation("statistics payload is not UTF-8".to_string()))?
        .trim();

    let parsed: StatisticsPayload = serde_json::from_str(text)
        .or_else(|_| text.parse::<f64>().map(StatisticsPayload::Number))
        .map_err(|_| HadesError::Validation(format!("unrecognised statistics payload: {}", text)))?;

    let value = match parsed {
        StatisticsPayload::Number(n) => Some(n),
        StatisticsPayload::Text(s) => s.trim().parse().ok(),
        StatisticsPayload::Object { temperature } => match temperature {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        },
    };

    value.ok_or_else(|| {
        HadesError::Validation(format!("statistics payload has no numeric temperature: {}", text))
    })
}

/// Body of an interval reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalReply {
    /// Action index: 0 no-op, 1 decrease, 2 increase
    pub action: u8,
    pub send_interval: u32,
    pub reward: f32,
    pub delta: f64,
}

impl From<&Decision> for IntervalReply {
    fn from(decision: &Decision) -> Self {
        Self {
            action: decision.action.to_index() as u8,
            send_interval: decision.send_interval,
            reward: decision.reward.value(),
            delta: decision.delta,
        }
    }
}

pub struct MessageHandler {
    fleet: Arc<FleetOrchestrator>,
    publisher: Arc<dyn Publisher>,
    transport: TransportConfig,
}

impl MessageHandler {
    pub fn new(
        fleet: Arc<FleetOrchestrator>,
        publisher: Arc<dyn Publisher>,
        transport: TransportConfig,
    ) -> Self {
        Self {
            fleet,
            publisher,
            transport,
        }
    }

    /// Handle one inbound message and build the reply, if any
    ///
    /// Unknown topics yield `Ok(None)`. Invalid device addresses and
    /// payloads are `Validation` errors.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<Option<OutboundMessage>> {
        let Some(inbound) = InboundTopic::parse(&self.transport.topic_prefix, topic) else {
            debug!(topic, "Ignoring unknown topic");
            return Ok(None);
        };

        match inbound {
            InboundTopic::Statistics { net, device } => {
                let measurement = parse_measurement(payload)?;
                let decision = self.fleet.route_observation(&device, measurement).await?;

                let body = serde_json::to_vec(&IntervalReply::from(&decision))?;
                let reply_topic = interval_topic(
                    &self.transport.reply_prefix,
                    &self.transport.topic_prefix,
                    &net,
                    &device,
                );
                Ok(Some(OutboundMessage::new(reply_topic, body)))
            }
            InboundTopic::ModelRequest { net, device } => {
                let id = DeviceId::parse(&device)?;
                match self.fleet.model_for(&id)? {
                    Some(model) => {
                        let reply_topic = model_receive_topic(
                            &self.transport.reply_prefix,
                            &self.transport.topic_prefix,
                            &net,
                            &device,
                        );
                        debug!(topic = %reply_topic, bytes = model.len(), "Publishing model");
                        Ok(Some(OutboundMessage::new(reply_topic, model)))
                    }
                    None => {
                        info!(device = %id, "No model for node");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Ordering key for a topic: the canonical device id when the device
    /// segment parses, the raw segment otherwise, empty for unknown topics
    pub fn lane(&self, topic: &str) -> String {
        match InboundTopic::parse(&self.transport.topic_prefix, topic) {
            Some(inbound) => DeviceId::parse(inbound.device())
                .map(|id| id.as_str().to_string())
                .unwrap_or_else(|_| inbound.device().to_string()),
            None => String::new(),
        }
    }

    /// Handle and publish; failures are logged and dropped
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) {
        match self.handle(topic, payload).await {
            Ok(Some(message)) => {
                if let Err(e) = self.publisher.publish(message).await {
                    warn!(topic, error = %e, "Failed to publish reply");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(topic, error = %e, "Dropped message"),
        }
    }
}
