use serde::{Deserialize, Serialize};

use crate::game::state::Uid;
use crate::util::vec3::Vec3;

/// Label of the data channel every peer pair opens
pub const DATA_CHANNEL_LABEL: &str = "gameData";

/// Messages exchanged directly between peers.
///
/// On the wire this is `{"type": "...", "data": ...}` with type one of
/// `position`, `noise`, `ai-position`. Nothing is acknowledged or resent;
/// receivers apply the latest message they see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum PeerMessage {
    /// Sender's avatar pose, sent every frame
    Position(PositionData),
    /// Sender made a noise
    Noise(NoiseData),
    /// AI position relayed by the host while hunting
    AiPosition(Vec3),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionData {
    pub position: Vec3,
    pub rotation: Rotation,
}

/// Only yaw is shared
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseData {
    pub from: Uid,
}

impl PeerMessage {
    pub fn position(position: Vec3, yaw: f32) -> Self {
        PeerMessage::Position(PositionData {
            position,
            rotation: Rotation { y: yaw },
        })
    }

    pub fn noise(from: impl Into<Uid>) -> Self {
        PeerMessage::Noise(NoiseData { from: from.into() })
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Position(_) => "position",
            PeerMessage::Noise(_) => "noise",
            PeerMessage::AiPosition(_) => "ai-position",
        }
    }
}

/// Serialize a message for a data channel
pub fn encode(message: &PeerMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Parse a message received on a data channel
pub fn decode(text: &str) -> Result<PeerMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}
