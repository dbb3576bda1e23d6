//! Network Layer
//!
//! WebSocket transport for movement sync.
//! This layer is **non-deterministic** - all movement logic runs through `game/`.

pub mod protocol;
pub mod session;
pub mod server;
pub mod client;

pub use protocol::{ClientMessage, ServerMessage, RelayedMove, ProtocolError};
pub use session::{WorldSession, SessionConfig, SessionError, PeerId};
pub use server::{GameServer, ServerConfig, GameServerError};
pub use client::{ClientPeer, ClientError, run_client};
