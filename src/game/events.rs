//! Movement Events
//!
//! Events generated during a tick: local cues, resets, damage and sync
//! telemetry. Cues are never replicated; the rest mirror explicit
//! network dispatches.

use serde::{Serialize, Deserialize};

use crate::core::quantize::Route;
use crate::core::vec3::Vec3;
use crate::game::authority::ResetReason;
use crate::game::state::{ActorId, MoveState};

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Resets first, they invalidate everything else for the actor
    Reset = 0,
    /// Deaths and damage
    Vitals = 1,
    /// State transitions
    Transition = 2,
    /// Telemetry
    Telemetry = 3,
    /// Cosmetic cues
    Cue = 4,
    /// Lifecycle and everything else
    Other = 255,
}

/// Local-only audio/visual cue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cue {
    /// A footstep while walking, running, crouching or crawling
    Footstep,
    /// Left the ground from a jump
    Jump,
    /// Touched the ground after being airborne
    Landing,
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MovementEventData {
    /// State machine changed state
    StateChanged { from: MoveState, to: MoveState },

    /// Local cue
    Cue(Cue),

    /// A move with a route other than the actor's current one was dropped
    StaleMoveDiscarded { route: Route, current: Route },

    /// A move was dropped because the buffer was full
    OverflowDropped { queued: usize },

    /// Authority forced the actor to a position and a new route
    ForcedReset { position: Vec3, route: Route, reason: ResetReason },

    /// Health was reduced
    Damaged { amount: i32, health: i32 },

    /// Health reached zero
    Died,

    /// Actor added to the world
    Spawned { position: Vec3 },

    /// Actor removed from the world
    Despawned,
}

/// An event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MovementEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Processing priority
    pub priority: EventPriority,

    /// Actor involved (for tie-breaking)
    pub actor: ActorId,

    /// Event data
    pub data: MovementEventData,
}

impl MovementEvent {
    /// Create an event, deriving the priority from the data.
    pub fn new(tick: u32, actor: ActorId, data: MovementEventData) -> Self {
        let priority = match &data {
            MovementEventData::ForcedReset { .. } => EventPriority::Reset,
            MovementEventData::Damaged { .. } | MovementEventData::Died => EventPriority::Vitals,
            MovementEventData::StateChanged { .. } => EventPriority::Transition,
            MovementEventData::StaleMoveDiscarded { .. }
            | MovementEventData::OverflowDropped { .. } => EventPriority::Telemetry,
            MovementEventData::Cue(_) => EventPriority::Cue,
            MovementEventData::Spawned { .. } | MovementEventData::Despawned => EventPriority::Other,
        };

        Self { tick, priority, actor, data }
    }

    /// Create state changed event.
    pub fn state_changed(tick: u32, actor: ActorId, from: MoveState, to: MoveState) -> Self {
        Self::new(tick, actor, MovementEventData::StateChanged { from, to })
    }

    /// Create cue event.
    pub fn cue(tick: u32, actor: ActorId, cue: Cue) -> Self {
        Self::new(tick, actor, MovementEventData::Cue(cue))
    }

    /// Create forced reset event.
    pub fn forced_reset(
        tick: u32,
        actor: ActorId,
        position: Vec3,
        route: Route,
        reason: ResetReason,
    ) -> Self {
        Self::new(tick, actor, MovementEventData::ForcedReset { position, route, reason })
    }

    /// Create damaged event.
    pub fn damaged(tick: u32, actor: ActorId, amount: i32, health: i32) -> Self {
        Self::new(tick, actor, MovementEventData::Damaged { amount, health })
    }
}

impl PartialEq for MovementEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick
            && self.priority == other.priority
            && self.actor == other.actor
    }
}

impl Eq for MovementEvent {}

impl PartialOrd for MovementEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MovementEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
            .then(self.actor.cmp(&other.actor))
    }
}
