// Wire Protocol
//
// This module implements the tagged JSON frames exchanged between the gateway
// and its clients.
//
// Frame flow:
// 1. Server sends "your_id" once, immediately after the WebSocket handshake
// 2. Client sends "location" whenever it has a new coordinate sample
// 3. Server pushes "users" (the full presence set) after every change

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::PresenceSnapshot;

/// Largest inbound text frame the gateway will try to parse.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Frames sent by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// A coordinate sample from the reporting client.
    #[serde(rename = "location")]
    Location { lat: f64, lng: f64 },
}

/// Frames sent by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Informs a client of its own assigned id.
    #[serde(rename = "your_id")]
    YourId { id: String },

    /// The full current presence set.
    #[serde(rename = "users")]
    Users { users: Vec<ParticipantEntry> },
}

/// Public view of one participant inside a "users" frame.
///
/// `lat`/`lng` are omitted while a participant has not reported yet; a reader
/// treats their absence as "position unknown".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl ServerFrame {
    /// Build a "users" frame from a registry snapshot.
    pub fn users(snapshot: &PresenceSnapshot) -> Self {
        let users = snapshot
            .participants
            .iter()
            .map(|p| ParticipantEntry {
                id: p.id.clone(),
                lat: p.position.map(|pos| pos.lat),
                lng: p.position.map(|pos| pos.lng),
            })
            .collect();
        Self::Users { users }
    }
}

impl ClientFrame {
    /// Decode one inbound text frame.
    ///
    /// A malformed or oversized frame is an error for the caller to drop; it
    /// must never tear down the connection it arrived on.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(FrameError::Oversized { len: text.len() });
        }
        serde_json::from_str(text).map_err(FrameError::Malformed)
    }
}

/// Inbound frame rejection.
#[derive(Debug)]
pub enum FrameError {
    /// Frame exceeds `MAX_FRAME_BYTES`.
    Oversized { len: usize },
    /// Frame is not valid JSON, or not a known message shape.
    Malformed(serde_json::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized { len } => {
                write!(f, "frame too large: {} bytes (max {})", len, MAX_FRAME_BYTES)
            }
            Self::Malformed(err) => write!(f, "malformed frame: {}", err),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Oversized { .. } => None,
            Self::Malformed(err) => Some(err),
        }
    }
}
