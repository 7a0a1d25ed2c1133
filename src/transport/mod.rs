//! Broker-facing message handling
//!
//! Topic parsing, payload decoding and the outbound publisher seam. The
//! broker client itself is not part of this crate.

pub mod handler;
pub mod publisher;
pub mod topic;

pub use handler::{parse_measurement, IntervalReply, MessageHandler};
pub use publisher::{OutboundMessage, Publisher, StdoutPublisher};
pub use topic::InboundTopic;
