//! Topic layout
//!
//! Inbound:
//! - `<prefix>/<net>/<mac>/statistics`
//! - `<prefix>/<net>/<mac>/model/request`
//!
//! Outbound:
//! - `<reply>/<net>/<mac>/<prefix>/interval`
//! - `<reply>/<net>/<mac>/<prefix>/model/receive`

/// A recognised inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    Statistics { net: String, device: String },
    ModelRequest { net: String, device: String },
}

impl InboundTopic {
    /// Parse a topic under `prefix`; `None` for anything unrecognised
    pub fn parse(prefix: &str, topic: &str) -> Option<Self> {
        let segments: Vec<&str> = topic.split('/').collect();

        match segments.as_slice() {
            [p, net, device, "statistics"] if *p == prefix && !net.is_empty() => {
                Some(InboundTopic::Statistics {
                    net: net.to_string(),
                    device: device.to_string(),
                })
            }
            [p, net, device, "model", "request"] if *p == prefix && !net.is_empty() => {
                Some(InboundTopic::ModelRequest {
                    net: net.to_string(),
                    device: device.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Device segment exactly as it appeared in the topic
    pub fn device(&self) -> &str {
        match self {
            InboundTopic::Statistics { device, .. } | InboundTopic::ModelRequest { device, .. } => {
                device
            }
        }
    }
}

pub fn interval_topic(reply_prefix: &str, topic_prefix: &str, net: &str, device: &str) -> String {
    format!("{}/{}/{}/{}/interval", reply_prefix, net, device, topic_prefix)
}

pub fn model_receive_topic(
    reply_prefix: &str,
    topic_prefix: &str,
    net: &str,
    device: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/model/receive",
        reply_prefix, net, device, topic_prefix
    )
}
