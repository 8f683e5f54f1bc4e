//! Telemetry channel between the inference engine and the benchmark
//! monitor: two MQTT topics, JSON payloads, a bounded consumer-side queue.

mod consumer;
mod message;
mod producer;

use std::collections::VecDeque;

use anyhow::Result;
use thiserror::Error;

pub use consumer::TelemetryConsumer;
pub use message::{
    StatusPayload, TelemetryMessage, TelemetryTopic, TimingPayload, DATA_TOPIC, STATUS_TOPIC,
};
pub use producer::TelemetryProducer;

/// Consumer-side queue depth. A full queue blocks the delivery thread
/// rather than dropping messages.
pub const QUEUE_CAPACITY: usize = 5;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Broker connect failed. Fatal, never retried.
    #[error("telemetry connect failure: {0}")]
    ConnectionFailure(String),

    /// Payload did not match the fixed schema for its topic.
    #[error("malformed payload on '{topic}': {reason}")]
    MalformedPayload { topic: String, reason: String },

    /// Message arrived on a topic outside the experiment's contract.
    #[error("unknown telemetry topic '{0}'")]
    UnknownTopic(String),
}

/// MQTT broker endpoint for one experiment.
#[derive(Clone, Debug)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
        }
    }
}

/// Non-blocking source of telemetry messages.
///
/// `consume` dequeues at most one message; `Ok(None)` means the queue is
/// currently empty, which is not an error.
pub trait TelemetrySource {
    fn consume(&mut self) -> Result<Option<TelemetryMessage>>;
}

/// Publishing end of the telemetry channel.
pub trait TelemetrySink {
    fn produce(&mut self, message: &TelemetryMessage) -> Result<()>;
}

/// In-memory sink for tests and dry runs: appends in publish order.
impl TelemetrySink for Vec<TelemetryMessage> {
    fn produce(&mut self, message: &TelemetryMessage) -> Result<()> {
        self.push(*message);
        Ok(())
    }
}

/// In-memory source for tests and dry runs: pops in FIFO order.
impl TelemetrySource for VecDeque<TelemetryMessage> {
    fn consume(&mut self) -> Result<Option<TelemetryMessage>> {
        Ok(self.pop_front())
    }
}
