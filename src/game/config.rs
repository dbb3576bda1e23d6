//! Movement and Sync Tuning
//!
//! Tuning values shared by every peer. The defaults are the production
//! tuning; peers must agree on them or prediction will drift and be
//! corrected by the authority.

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Upper bound for the pending move queue.
pub const MAX_MOVE_BUFFER_LIMIT: usize = 50;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Tuning file could not be read.
    #[error("Failed to read tuning file {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Tuning file is not valid JSON for [`Tuning`].
    #[error("Malformed tuning file {path}: {source}")]
    Parse {
        /// File path
        path: String,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// A value is out of its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

// =============================================================================
// MOVEMENT
// =============================================================================

/// Locomotion tuning used by the state machine and predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Keyboard rotation speed (degrees per second)
    pub rotation_speed: f32,

    /// Walk target speed
    pub walk_speed: f32,
    /// Walk acceleration
    pub walk_acceleration: f32,
    /// Walk deceleration
    pub walk_deceleration: f32,

    /// Run target speed
    pub run_speed: f32,
    /// Step length factor while running (0..1)
    pub run_step_length: f32,
    /// Distance between footstep cues
    pub run_step_interval: f32,

    /// Crouch target speed
    pub crouch_speed: f32,
    /// Crouch acceleration
    pub crouch_acceleration: f32,
    /// Crouch deceleration
    pub crouch_deceleration: f32,

    /// Crawl target speed
    pub crawl_speed: f32,
    /// Crawl acceleration
    pub crawl_acceleration: f32,
    /// Crawl deceleration
    pub crawl_deceleration: f32,

    /// Swim target speed
    pub swim_speed: f32,
    /// Swim acceleration
    pub swim_acceleration: f32,
    /// Swim deceleration
    pub swim_deceleration: f32,
    /// How far below the surface the feet float while swimming
    pub swim_surface_offset: f32,
    /// Fraction of capsule height that must be submerged to swim (0..1)
    pub underwater_threshold: f32,

    /// Initial vertical speed of a jump
    pub jump_speed: f32,

    /// Air control acceleration
    pub airborne_acceleration: f32,
    /// Air control deceleration
    pub airborne_deceleration: f32,

    /// Downward speed that counts as falling (stairs tolerance)
    pub fall_minimum_magnitude: f32,
    /// Downward speed below which landing deals no damage
    pub fall_damage_minimum_magnitude: f32,
    /// Damage per unit of landing speed
    pub fall_damage_multiplier: f32,

    /// Ladder climb speed (no acceleration)
    pub climb_speed: f32,

    /// Gravity along Y (negative is down)
    pub gravity: f32,
    /// Gravity scale applied while airborne
    pub gravity_multiplier: f32,

    /// Standing capsule height
    pub capsule_height: f32,
    /// Standing capsule radius
    pub capsule_radius: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            rotation_speed: 150.0,
            walk_speed: 5.0,
            walk_acceleration: 15.0,
            walk_deceleration: 20.0,
            run_speed: 8.0,
            run_step_length: 0.7,
            run_step_interval: 3.0,
            crouch_speed: 1.5,
            crouch_acceleration: 5.0,
            crouch_deceleration: 10.0,
            crawl_speed: 1.0,
            crawl_acceleration: 5.0,
            crawl_deceleration: 10.0,
            swim_speed: 4.0,
            swim_acceleration: 15.0,
            swim_deceleration: 20.0,
            swim_surface_offset: 0.25,
            underwater_threshold: 0.9,
            jump_speed: 7.0,
            airborne_acceleration: 15.0,
            airborne_deceleration: 20.0,
            fall_minimum_magnitude: 6.0,
            fall_damage_minimum_magnitude: 13.0,
            fall_damage_multiplier: 2.0,
            climb_speed: 3.0,
            gravity: -9.81,
            gravity_multiplier: 2.0,
            capsule_height: 2.0,
            capsule_radius: 0.5,
        }
    }
}

impl MovementConfig {
    /// Copy with fractional fields clamped to `[0, 1]` and sizes kept positive.
    pub fn validated(mut self) -> Self {
        self.run_step_length = self.run_step_length.clamp(0.0, 1.0);
        self.underwater_threshold = self.underwater_threshold.clamp(0.0, 1.0);
        self.capsule_height = self.capsule_height.max(0.1);
        self.capsule_radius = self.capsule_radius.clamp(0.01, self.capsule_height / 2.0);
        self
    }
}

// =============================================================================
// SYNC
// =============================================================================

/// Remote move buffer thresholds and rubberband tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Never drain with fewer than this many moves queued
    pub min_move_buffer: usize,
    /// Combine two moves per tick once this many are queued
    pub combine_moves_after: usize,
    /// Queue capacity; the authority force-resets when reached
    pub max_move_buffer: usize,
    /// Divergence that triggers a forced reset
    pub rubber_distance: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_move_buffer: 2,
            combine_moves_after: 5,
            max_move_buffer: 10,
            rubber_distance: 1.0,
        }
    }
}

/// Clamp that checks the lower bound first, so it never panics when
/// `min > max`.
fn clamp_lower_first(value: usize, min: usize, max: usize) -> usize {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

impl SyncConfig {
    /// Copy with the thresholds clamped into a consistent order.
    ///
    /// Applied in sequence: `min ∈ [1, max]`, then
    /// `combine ∈ [min + 1, max]`, then `max ∈ [combine + 1, 50]`.
    pub fn validated(mut self) -> Self {
        self.min_move_buffer = clamp_lower_first(self.min_move_buffer, 1, self.max_move_buffer);
        self.combine_moves_after = clamp_lower_first(
            self.combine_moves_after,
            self.min_move_buffer + 1,
            self.max_move_buffer,
        );
        self.max_move_buffer = clamp_lower_first(
            self.max_move_buffer,
            self.combine_moves_after + 1,
            MAX_MOVE_BUFFER_LIMIT,
        );
        if !self.rubber_distance.is_finite() || self.rubber_distance <= 0.0 {
            tracing::warn!("rubber_distance {} is not positive, using default", self.rubber_distance);
            self.rubber_distance = SyncConfig::default().rubber_distance;
        }
        self
    }
}

// =============================================================================
// TUNING FILE
// =============================================================================

/// Everything a peer needs to agree on, loadable from one JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Locomotion tuning
    pub movement: MovementConfig,
    /// Buffer tuning
    pub sync: SyncConfig,
    /// Authority recovery interval for endurance (ticks)
    pub recovery_interval_ticks: u32,
    /// Ticks a dead actor waits before the authority respawns it
    pub respawn_ticks: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            movement: MovementConfig::default(),
            sync: SyncConfig::default(),
            // once per second
            recovery_interval_ticks: crate::TICK_RATE,
            respawn_ticks: 10 * crate::TICK_RATE,
        }
    }
}

impl Tuning {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let tuning: Tuning = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(tuning.validated())
    }

    /// Copy with every section validated.
    pub fn validated(self) -> Self {
        Self {
            movement: self.movement.validated(),
            sync: self.sync.validated(),
            recovery_interval_ticks: self.recovery_interval_ticks.max(1),
            respawn_ticks: self.respawn_ticks,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
