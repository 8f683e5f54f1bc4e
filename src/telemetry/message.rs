use serde::{Deserialize, Serialize};

use crate::detect::StageTimings;

use super::TelemetryError;

/// Topic carrying engine liveness transitions.
pub const STATUS_TOPIC: &str = "inferenceEngine/status";
/// Topic carrying per-image stage timings.
pub const DATA_TOPIC: &str = "inferenceEngine/data";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryTopic {
    Status,
    Data,
}

impl TelemetryTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryTopic::Status => STATUS_TOPIC,
            TelemetryTopic::Data => DATA_TOPIC,
        }
    }

    pub fn parse(topic: &str) -> Result<Self, TelemetryError> {
        match topic {
            STATUS_TOPIC => Ok(TelemetryTopic::Status),
            DATA_TOPIC => Ok(TelemetryTopic::Data),
            other => Err(TelemetryError::UnknownTopic(other.to_string())),
        }
    }
}

/// `{"active": <bool>}` on the status topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusPayload {
    pub active: bool,
}

/// Stage timings on the data topic, all non-negative milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingPayload {
    pub pre_processing_time: u64,
    pub inference_time: u64,
    pub post_processing_time: u64,
}

impl From<StageTimings> for TimingPayload {
    fn from(timings: StageTimings) -> Self {
        Self {
            pre_processing_time: timings.pre_ms,
            inference_time: timings.inf_ms,
            post_processing_time: timings.post_ms,
        }
    }
}

/// One decoded telemetry message: topic plus validated payload.
///
/// The schema is fixed; unknown or missing fields fail at decode time
/// instead of downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryMessage {
    Status(StatusPayload),
    Data(TimingPayload),
}

impl TelemetryMessage {
    pub fn status(active: bool) -> Self {
        TelemetryMessage::Status(StatusPayload { active })
    }

    pub fn data(timings: StageTimings) -> Self {
        TelemetryMessage::Data(timings.into())
    }

    pub fn topic(&self) -> TelemetryTopic {
        match self {
            TelemetryMessage::Status(_) => TelemetryTopic::Status,
            TelemetryMessage::Data(_) => TelemetryTopic::Data,
        }
    }

    /// Serialize to `(topic, json)` for publishing.
    pub fn encode(&self) -> Result<(&'static str, Vec<u8>), TelemetryError> {
        let json = match self {
            TelemetryMessage::Status(payload) => serde_json::to_vec(payload),
            TelemetryMessage::Data(payload) => serde_json::to_vec(payload),
        }
        .map_err(|e| TelemetryError::MalformedPayload {
            topic: self.topic().as_str().to_string(),
            reason: e.to_string(),
        })?;
        Ok((self.topic().as_str(), json))
    }

    /// Decode a wire message, validating topic and payload schema.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, TelemetryError> {
        let malformed = |e: serde_json::Error| TelemetryError::MalformedPayload {
            topic: topic.to_string(),
            reason: e.to_string(),
        };
        match TelemetryTopic::parse(topic)? {
            TelemetryTopic::Status => serde_json::from_slice(payload)
                .map(TelemetryMessage::Status)
                .map_err(malformed),
            TelemetryTopic::Data => serde_json::from_slice(payload)
                .map(TelemetryMessage::Data)
                .map_err(malformed),
        }
    }
}
