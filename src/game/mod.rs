//! Movement Simulation Module
//!
//! Everything that runs inside the fixed tick. No I/O.
//!
//! ## Module Structure
//!
//! - `config`: Tuning tables and their validation
//! - `collision`: Environment queries and the character controller
//! - `input`: Input frames and press latching
//! - `moves`: The replicated move record
//! - `state`: Move states, actors, world registry
//! - `resource`: Bounded health and endurance
//! - `machine`: Movement state machine
//! - `predictor`: Owner-side prediction
//! - `transport`: Move and reset receive paths
//! - `buffer`: Remote move buffer drain
//! - `authority`: Rubberbanding, resets, fall damage, respawn
//! - `tick`: Fixed-step driver
//! - `events`: Events for cues and telemetry

pub mod config;
pub mod collision;
pub mod input;
pub mod moves;
pub mod state;
pub mod resource;
pub mod machine;
pub mod predictor;
pub mod transport;
pub mod buffer;
pub mod authority;
pub mod tick;
pub mod events;

// Re-export key types
pub use config::{MovementConfig, SyncConfig, Tuning};
pub use collision::{Environment, Terrain};
pub use input::{InputFrame, InputLatch};
pub use moves::Move;
pub use state::{ActorId, MoveState, MovementActor, PeerRole, WorldState};
pub use tick::{tick, Dispatch, TickResult};
pub use events::{Cue, MovementEvent, MovementEventData};
