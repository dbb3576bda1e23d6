//! Protocol Messages
//!
//! Wire format for peer-authority communication over WebSocket.
//! Control messages are JSON text frames for debugging ease; moves travel
//! as fixed-size bincode binary frames since they are sent every tick.
//!
//! ```text
//! client -> server   binary  Move          15 bytes
//! server -> client   binary  RelayedMove   19 bytes (actor id + Move)
//! both directions    text    tagged JSON   ClientMessage / ServerMessage
//! ```

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::quantize::Route;
use crate::core::vec3::Vec3;
use crate::game::moves::Move;
use crate::game::state::{ActorId, MoveState, MovementActor};
use crate::game::tick::Dispatch;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Control messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for an actor in the world.
    Join {
        /// Display name, for logs only
        name: String,
    },

    /// Give the actor back.
    Leave,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// An actor as seen by a joining peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    /// Actor id
    pub actor: ActorId,
    /// Feet position
    pub position: Vec3,
    /// Current route
    pub route: Route,
    /// Current state
    pub state: MoveState,
    /// Packed yaw
    pub yaw: u8,
    /// Health
    pub health: i32,
    /// Endurance
    pub endurance: i32,
}

impl PeerSnapshot {
    /// Snapshot an actor.
    pub fn of(actor: &MovementActor) -> Self {
        Self {
            actor: actor.id,
            position: actor.position(),
            route: actor.route,
            state: actor.state,
            yaw: actor.yaw_byte(),
            health: actor.health.current(),
            endurance: actor.endurance.current(),
        }
    }
}

/// Control messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted; the receiver now owns `actor`.
    Welcome {
        /// Actor assigned to the receiver
        actor: ActorId,
        /// Where it spawned
        position: Vec3,
        /// Its route
        route: Route,
        /// Every other actor already in the world
        peers: Vec<PeerSnapshot>,
    },

    /// Another actor joined.
    Spawned {
        /// The new actor
        actor: ActorId,
        /// Where it spawned
        position: Vec3,
        /// Facing (packed)
        yaw: u8,
    },

    /// An actor left.
    Despawned {
        /// The actor removed
        actor: ActorId,
    },

    /// Forced reset for an actor.
    Reset {
        /// Actor reset
        actor: ActorId,
        /// Position to jump to
        position: Vec3,
        /// New route
        route: Route,
    },

    /// Current vitals of an actor.
    Vitals {
        /// Actor
        actor: ActorId,
        /// Health
        health: i32,
        /// Endurance
        endurance: i32,
    },

    /// Damage dealt to an actor.
    Damage {
        /// Actor hit
        actor: ActorId,
        /// Amount
        amount: i32,
        /// Where it was
        position: Vec3,
        /// Direction of the hit
        normal: Vec3,
    },

    /// Pong response.
    Pong {
        /// Client clock from the ping
        timestamp: u64,
        /// Server wall clock
        server_time: DateTime<Utc>,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why
        reason: String,
    },
}

impl ServerMessage {
    /// Control message for a dispatch, if it travels as one.
    ///
    /// Moves travel as binary frames and return `None`.
    pub fn from_dispatch(dispatch: &Dispatch) -> Option<Self> {
        match *dispatch {
            Dispatch::Reset { actor, position, route } => Some(ServerMessage::Reset { actor, position, route }),
            Dispatch::Vitals { actor, health, endurance } => {
                Some(ServerMessage::Vitals { actor, health, endurance })
            }
            Dispatch::Damage { actor, amount, position, normal } => {
                Some(ServerMessage::Damage { actor, amount, position, normal })
            }
            Dispatch::SendToServer(_) | Dispatch::RelayMove { .. } => None,
        }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be decoded.
    InvalidMessage,
    /// Already has an actor.
    AlreadyJoined,
    /// Must join first.
    NotJoined,
    /// No free actor slots.
    SessionFull,
}

// =============================================================================
// BINARY FRAMES
// =============================================================================

/// A move relayed by the authority to observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayedMove {
    /// Actor that moved
    pub actor: ActorId,
    /// The move
    pub mv: Move,
}

impl RelayedMove {
    /// Encoded size.
    pub const WIRE_SIZE: usize = 4 + Move::WIRE_SIZE;
}

/// Decode failures. Each one drops the offending message and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Text frame is not a known message.
    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame could not be decoded.
    #[error("Invalid binary frame: {0}")]
    Bincode(#[from] bincode::Error),

    /// Binary frame has the wrong size.
    #[error("Frame is {got} bytes, expected {expected}")]
    FrameSize {
        /// Expected size
        expected: usize,
        /// Received size
        got: usize,
    },

    /// State byte outside the known states.
    #[error("Unknown move state {0}")]
    UnknownState(u8),

    /// Position is NaN or infinite.
    #[error("Non-finite position")]
    NonFinite,
}

/// Encode a move for the binary channel.
pub fn encode_move(mv: &Move) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(mv)?)
}

/// Decode and validate a move frame.
pub fn decode_move(data: &[u8]) -> Result<Move, ProtocolError> {
    validate_move_bytes(data, 0, Move::WIRE_SIZE)?;
    let mv: Move = bincode::deserialize(data)?;
    if !mv.is_finite() {
        return Err(ProtocolError::NonFinite);
    }
    Ok(mv)
}

/// Encode a relayed move.
pub fn encode_relay(relay: &RelayedMove) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(relay)?)
}

/// Decode and validate a relayed move.
pub fn decode_relay(data: &[u8]) -> Result<RelayedMove, ProtocolError> {
    validate_move_bytes(data, 4, RelayedMove::WIRE_SIZE)?;
    let relay: RelayedMove = bincode::deserialize(data)?;
    if !relay.mv.is_finite() {
        return Err(ProtocolError::NonFinite);
    }
    Ok(relay)
}

/// Size check plus the state byte, which sits right after the route byte.
fn validate_move_bytes(data: &[u8], offset: usize, expected: usize) -> Result<(), ProtocolError> {
    if data.len() != expected {
        return Err(ProtocolError::FrameSize { expected, got: data.len() });
    }
    let state = data[offset + 1];
    if state >= MoveState::COUNT {
        return Err(ProtocolError::UnknownState(state));
    }
    Ok(())
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_move() -> Move {
        Move::new(Route(7), MoveState::Crawling, Vec3::new(1.5, -2.0, 30.25), 191)
    }

    #[test]
    fn test_client_message_json() {
        let msg = ClientMessage::Join { name: "ada".to_string() };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"join""#));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);

        assert_eq!(ClientMessage::from_json(r#"{"type":"leave"}"#).unwrap(), ClientMessage::Leave);
    }

    #[test]
    fn test_server_message_json() {
        let msg = ServerMessage::Reset {
            actor: ActorId(4),
            position: Vec3::new(1.0, 0.0, -1.0),
            route: Route(2),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"reset""#));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_unknown_json_is_error() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"teleport"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_move_frame() {
        let mv = sample_move();
        let bytes = encode_move(&mv).unwrap();
        assert_eq!(bytes.len(), Move::WIRE_SIZE);
        assert_eq!(bytes[0], 7);
        assert_eq!(bytes[1], MoveState::Crawling as u8);
        assert_eq!(decode_move(&bytes).unwrap(), mv);
    }

    #[test]
    fn test_unknown_state_rejected() {
        let mut bytes = encode_move(&sample_move()).unwrap();
        bytes[1] = 9;
        assert!(matches!(decode_move(&bytes), Err(ProtocolError::UnknownState(9))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mv = Move::new(Route(0), MoveState::Idle, Vec3::new(0.0, f32::INFINITY, 0.0), 0);
        let bytes = encode_move(&mv).unwrap();
        assert!(matches!(decode_move(&bytes), Err(ProtocolError::NonFinite)));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let bytes = encode_move(&sample_move()).unwrap();
        assert!(matches!(
            decode_move(&bytes[..10]),
            Err(ProtocolError::FrameSize { expected: 15, got: 10 })
        ));
    }

    #[test]
    fn test_relay_frame() {
        let relay = RelayedMove { actor: ActorId(300), mv: sample_move() };
        let bytes = encode_relay(&relay).unwrap();
        assert_eq!(bytes.len(), RelayedMove::WIRE_SIZE);
        assert_eq!(decode_relay(&bytes).unwrap(), relay);

        let mut bad = bytes.clone();
        bad[5] = 200;
        assert!(matches!(decode_relay(&bad), Err(ProtocolError::UnknownState(200))));
    }

    #[test]
    fn test_dispatch_to_message() {
        let reset = Dispatch::Reset { actor: ActorId(1), position: Vec3::ZERO, route: Route(3) };
        assert!(matches!(
            ServerMessage::from_dispatch(&reset),
            Some(ServerMessage::Reset { route: Route(3), .. })
        ));
        let relay = Dispatch::RelayMove { actor: ActorId(1), mv: sample_move() };
        assert_eq!(ServerMessage::from_dispatch(&relay), None);
    }

    #[test]
    fn test_error_code_names() {
        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::SessionFull,
            message: "no free slots".to_string(),
        });
        assert!(msg.to_json().unwrap().contains("session_full"));
    }
}
