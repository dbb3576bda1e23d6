//! Byte Quantization
//!
//! Compact wire encodings for single-DOF values:
//! - yaw angles packed into one byte (0-255 covering 0-360°)
//! - the wrapping route epoch tag

use serde::{Serialize, Deserialize};
use std::fmt;

/// Full turn in degrees.
pub const FULL_TURN: f32 = 360.0;

/// Largest packed value.
const BYTE_MAX: f32 = 255.0;

/// Pack a yaw angle (degrees, any range) into a byte.
///
/// The angle is wrapped into `[0, 360)` first, then truncated. The
/// quantization step is 360/255 ≈ 1.41°.
#[inline]
pub fn yaw_to_byte(degrees: f32) -> u8 {
    if !degrees.is_finite() {
        return 0;
    }
    let wrapped = degrees.rem_euclid(FULL_TURN);
    (wrapped / FULL_TURN * BYTE_MAX) as u8
}

/// Unpack a yaw byte back to degrees in `[0, 360]`.
#[inline]
pub fn byte_to_yaw(packed: u8) -> f32 {
    packed as f32 / BYTE_MAX * FULL_TURN
}

// =============================================================================
// ROUTE EPOCH
// =============================================================================

/// Per-actor epoch tag carried by every move.
///
/// Incremented by the authority on every forced reset; moves stamped with
/// any other value are stale. Arithmetic wraps at 256, so after 256 resets
/// with a move still in flight from the first epoch the tags would collide.
/// Buffers are bounded far below that, which keeps the window unreachable
/// in practice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(pub u8);

impl Route {
    /// The next epoch (wrapping).
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw byte value.
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<u8> for Route {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

// =============================================================================
// TESTS
// =============================================================================
