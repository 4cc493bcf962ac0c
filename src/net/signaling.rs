use serde::{Deserialize, Serialize};

use crate::game::state::Uid;

/// Which side of the negotiation a description belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description, opaque apart from its kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

/// Either `{sdp}` or `{candidate}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalPayload {
    Sdp { sdp: SessionDescription },
    Candidate { candidate: IceCandidate },
}

/// One negotiation message addressed to a single peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub from: Uid,
    pub to: Uid,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl Signal {
    pub fn sdp(from: &str, to: &str, sdp: SessionDescription) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            payload: SignalPayload::Sdp { sdp },
        }
    }

    pub fn candidate(from: &str, to: &str, candidate: IceCandidate) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            payload: SignalPayload::Candidate { candidate },
        }
    }
}

/// The lower-sorting uid of a pair opens the connection
pub fn is_offerer(local: &str, remote: &str) -> bool {
    local < remote
}
