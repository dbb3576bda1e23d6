//! Core primitives.
//!
//! Value types shared by the simulation and the wire layer. Nothing in
//! here performs I/O or reads the clock.

pub mod vec3;
pub mod quantize;
pub mod hash;

// Re-export core types
pub use vec3::Vec3;
pub use quantize::{Route, yaw_to_byte, byte_to_yaw};
pub use hash::{StateHash, compute_state_hash};
