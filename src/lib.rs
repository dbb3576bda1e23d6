//! # Move Sync Server
//!
//! Authoritative movement synchronization: owner-side prediction, buffered
//! replay of remote moves, rubberbanding and forced resets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MOVE SYNC SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Value primitives                          │
//! │  ├── vec3.rs     - f32 3D vector, yaw helpers                │
//! │  ├── quantize.rs - Yaw byte packing, Route epoch             │
//! │  └── hash.rs     - State hashing for convergence checks      │
//! │                                                              │
//! │  game/           - Movement core (fixed tick, no I/O)        │
//! │  ├── machine.rs  - MoveState transition table                │
//! │  ├── predictor.rs- Owner-side prediction                     │
//! │  ├── transport.rs- Move / reset receive paths                │
//! │  ├── buffer.rs   - Remote move buffer drain                  │
//! │  ├── authority.rs- Rubberband, reset, fall damage            │
//! │  └── tick.rs     - Fixed-step driver + dispatch outbox       │
//! │                                                              │
//! │  network/        - Transport (non-deterministic)             │
//! │  ├── server.rs   - WebSocket server, simulation task         │
//! │  ├── session.rs  - Connections <-> actors                    │
//! │  ├── client.rs   - Client peer + WebSocket driver            │
//! │  └── protocol.rs - Message types and frame codecs            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Moves are only ever enqueued by the network layer and applied inside
//! the fixed tick, in actor id order. Per-actor ordering is the
//! transport's job; the route epoch takes care of everything sent before
//! a reset.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::{Route, Vec3};
pub use game::input::InputFrame;
pub use game::moves::Move;
pub use game::state::{ActorId, MoveState, MovementActor, PeerRole, WorldState};
pub use game::tick::{tick, Dispatch, TickResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 50;

/// Fixed time step (seconds)
pub const FIXED_DELTA: f32 = 1.0 / TICK_RATE as f32;
