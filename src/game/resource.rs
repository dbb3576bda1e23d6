//! Bounded Resources
//!
//! Integer pools kept within `[0, max]` (health, endurance). The maximum and
//! the per-interval recovery come from a [`ResourceRule`], so new pools are
//! composed from a rule rather than a new type hierarchy.

use serde::{Serialize, Deserialize};

use crate::game::state::MoveState;

/// Supplies the bounds and recovery of a [`BoundedResource`].
pub trait ResourceRule {
    /// Current maximum.
    fn max(&self) -> i32;

    /// Change applied on each recovery interval, given the owner's movement state.
    fn recovery_per_tick(&self, state: MoveState) -> i32;
}

/// Health: fixed maximum, no natural recovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthRule {
    /// Maximum health
    pub base: i32,
}

impl Default for HealthRule {
    fn default() -> Self {
        Self { base: 100 }
    }
}

impl ResourceRule for HealthRule {
    fn max(&self) -> i32 {
        self.base
    }

    fn recovery_per_tick(&self, _state: MoveState) -> i32 {
        0
    }
}

/// Endurance: recovers while resting, drains in exhausting states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnduranceRule {
    /// Maximum endurance
    pub base: i32,
    /// Recovery when not in a drain state
    pub recovery: i32,
    /// States that override recovery with their own (negative) rate
    pub drain_states: Vec<(MoveState, i32)>,
}

impl Default for EnduranceRule {
    fn default() -> Self {
        Self {
            base: 10,
            recovery: 1,
            drain_states: vec![(MoveState::Running, -1), (MoveState::Airborne, -1)],
        }
    }
}

impl ResourceRule for EnduranceRule {
    fn max(&self) -> i32 {
        self.base
    }

    fn recovery_per_tick(&self, state: MoveState) -> i32 {
        self.drain_states
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, drain)| *drain)
            .unwrap_or(self.recovery)
    }
}

/// A value clamped to `[0, rule.max()]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundedResource<R: ResourceRule> {
    current: i32,
    rule: R,
}

impl<R: ResourceRule> BoundedResource<R> {
    /// Create at full value.
    pub fn full(rule: R) -> Self {
        let current = rule.max();
        Self { current, rule }
    }

    /// Current value (never above the current maximum).
    #[inline]
    pub fn current(&self) -> i32 {
        self.current.min(self.rule.max())
    }

    /// Current maximum.
    #[inline]
    pub fn max(&self) -> i32 {
        self.rule.max()
    }

    /// Value is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current() == 0
    }

    /// Fraction of the maximum in `[0, 1]`.
    pub fn percent(&self) -> f32 {
        let max = self.max();
        if max == 0 {
            0.0
        } else {
            self.current() as f32 / max as f32
        }
    }

    /// Set a new value, clamped. Returns `true` if this emptied the pool.
    pub fn set(&mut self, value: i32) -> bool {
        let empty_before = self.current == 0;
        self.current = value.clamp(0, self.rule.max().max(0));
        self.current == 0 && !empty_before
    }

    /// Add `delta` (may be negative). Returns `true` if this emptied the pool.
    pub fn add(&mut self, delta: i32) -> bool {
        self.set(self.current().saturating_add(delta))
    }

    /// Refill to the maximum.
    pub fn refill(&mut self) {
        self.current = self.rule.max();
    }

    /// Apply one recovery interval. Nothing recovers while the owner is dead.
    /// Returns `true` if the value changed.
    pub fn recover(&mut self, state: MoveState, owner_alive: bool) -> bool {
        if !owner_alive {
            return false;
        }
        let before = self.current();
        self.add(self.rule.recovery_per_tick(state));
        self.current() != before
    }
}

// =============================================================================
// TESTS
// =============================================================================
