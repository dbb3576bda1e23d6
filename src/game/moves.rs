//! Move Value Type
//!
//! The per-tick record an owning peer produces and every other peer replays.

use serde::{Serialize, Deserialize};

use crate::core::quantize::{byte_to_yaw, Route};
use crate::core::vec3::Vec3;
use crate::game::state::MoveState;

/// One tick of an actor's movement.
///
/// `position` is the ground truth; replaying peers derive their delta from
/// it against their own current position, never from a transmitted delta.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Epoch the move was produced in
    pub route: Route,
    /// State at the end of the tick
    pub state: MoveState,
    /// Feet position at the end of the tick
    pub position: Vec3,
    /// Packed yaw (0-255 over 0-360°)
    pub yaw: u8,
}

impl Move {
    /// Encoded size on the binary channel.
    pub const WIRE_SIZE: usize = 15;

    /// Create a move.
    pub const fn new(route: Route, state: MoveState, position: Vec3, yaw: u8) -> Self {
        Self { route, state, position, yaw }
    }

    /// Unpacked yaw in degrees.
    #[inline]
    pub fn yaw_degrees(&self) -> f32 {
        byte_to_yaw(self.yaw)
    }

    /// Position contains no NaN or infinity.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
    }
}
