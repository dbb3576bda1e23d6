//! Input Capture and Normalization
//!
//! Raw per-tick input for the owning peer. Only the predictor reads it;
//! it never crosses the wire.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Raw input state for a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Strafe axis: -1 (left) to +1 (right)
    pub move_x: f32,

    /// Forward axis: -1 (back) to +1 (forward)
    pub move_y: f32,

    /// Keyboard rotation axis: -1 (left) to +1 (right)
    pub rotate: f32,

    /// Camera yaw in degrees, applied before keyboard rotation
    pub look_yaw: Option<f32>,

    /// Action flags (packed bits):
    /// - Bit 0: Jump pressed
    /// - Bit 1: Crouch toggle pressed
    /// - Bit 2: Crawl toggle pressed
    /// - Bit 3: Run held
    /// - Bit 4: A text field has focus
    pub flags: u8,
}

impl InputFrame {
    /// Jump flag bit
    pub const FLAG_JUMP: u8 = 0x01;

    /// Crouch toggle flag bit
    pub const FLAG_CROUCH: u8 = 0x02;

    /// Crawl toggle flag bit
    pub const FLAG_CRAWL: u8 = 0x04;

    /// Run flag bit
    pub const FLAG_RUN: u8 = 0x08;

    /// UI text focus flag bit
    pub const FLAG_UI_FOCUS: u8 = 0x10;

    /// Flags that are edge-triggered and must survive until the next tick.
    pub const PRESS_FLAGS: u8 = Self::FLAG_JUMP | Self::FLAG_CROUCH | Self::FLAG_CRAWL;

    /// Create a new empty input frame.
    pub const fn new() -> Self {
        Self {
            move_x: 0.0,
            move_y: 0.0,
            rotate: 0.0,
            look_yaw: None,
            flags: 0,
        }
    }

    /// Create input with movement direction.
    pub const fn with_movement(move_x: f32, move_y: f32) -> Self {
        Self {
            move_x,
            move_y,
            rotate: 0.0,
            look_yaw: None,
            flags: 0,
        }
    }

    /// Copy with the given flags set.
    pub const fn with_flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    /// Check if a flag is set.
    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Jump pressed.
    #[inline]
    pub fn jump(&self) -> bool {
        self.has_flag(Self::FLAG_JUMP)
    }

    /// Crouch toggle pressed.
    #[inline]
    pub fn crouch(&self) -> bool {
        self.has_flag(Self::FLAG_CROUCH)
    }

    /// Crawl toggle pressed.
    #[inline]
    pub fn crawl(&self) -> bool {
        self.has_flag(Self::FLAG_CRAWL)
    }

    /// Run held.
    #[inline]
    pub fn run(&self) -> bool {
        self.has_flag(Self::FLAG_RUN)
    }

    /// Copy safe to simulate: everything is zeroed while a text field has
    /// focus, and non-finite axes read as zero.
    pub fn sanitized(&self) -> Self {
        if self.has_flag(Self::FLAG_UI_FOCUS) {
            return Self::new();
        }
        let finite = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Self {
            move_x: finite(self.move_x),
            move_y: finite(self.move_y),
            rotate: finite(self.rotate),
            look_yaw: self.look_yaw.filter(|y| y.is_finite()),
            flags: self.flags,
        }
    }

    /// Movement axes as a unit vector `(x, y, 0)`, or zero without input.
    ///
    /// Analog magnitude is discarded: half a stick walks at full speed.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(self.move_x, self.move_y, 0.0).normalize()
    }

    /// Any movement input at all.
    #[inline]
    pub fn has_movement(&self) -> bool {
        self.move_x != 0.0 || self.move_y != 0.0
    }
}

// =============================================================================
// INPUT LATCH
// =============================================================================

/// Collects input sampled faster than the fixed tick.
///
/// Axes keep the latest sample; press flags are OR-ed so a key pressed and
/// released between two ticks is still seen by the next tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputLatch {
    latest: InputFrame,
    pressed: u8,
}

impl InputLatch {
    /// Create an empty latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample.
    pub fn sample(&mut self, frame: InputFrame) {
        self.pressed |= frame.flags & InputFrame::PRESS_FLAGS;
        self.latest = frame;
    }

    /// Frame for the next tick. Clears the latched presses.
    pub fn take(&mut self) -> InputFrame {
        let mut frame = self.latest;
        frame.flags |= self.pressed;
        self.pressed = 0;
        self.latest.flags &= !InputFrame::PRESS_FLAGS;
        frame
    }
}

// =============================================================================
// TESTS
// =============================================================================
