use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;

/// A message ready to go out on the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Payload as text when it is UTF-8, otherwise a byte count
    pub fn display_payload(&self) -> String {
        match std::str::from_utf8(&self.payload) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<{} bytes>", self.payload.len()),
        }
    }
}

/// Outbound side of the broker
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> Result<()>;
}

/// Writes `<topic> <payload>` lines to stdout
pub struct StdoutPublisher {
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        let line = format!("{} {}\n", message.topic, message.display_payload());
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
