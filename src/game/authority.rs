//! Rubberband and Reset Authority
//!
//! Only the authoritative peer (dedicated server or host) runs these.
//! Prediction may diverge up to `rubber_distance`; past that the authority
//! wins unconditionally with a forced reset, which bumps the actor's route
//! so every move still in flight is discarded.

use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::core::quantize::Route;
use crate::core::vec3::Vec3;
use crate::game::config::MovementConfig;
use crate::game::events::MovementEvent;
use crate::game::state::{ActorId, MoveState, WorldState};
use crate::game::tick::Dispatch;

/// Why an actor was reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetReason {
    /// Replayed position diverged from the claimed one
    Rubberband,
    /// Move buffer filled up
    Overflow,
    /// Explicit placement (spawn, respawn, admin)
    Teleport,
    /// Received from the authority; the cause is not on the wire
    Authority,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResetReason::Rubberband => "rubberband",
            ResetReason::Overflow => "overflow",
            ResetReason::Teleport => "teleport",
            ResetReason::Authority => "authority",
        })
    }
}

// =============================================================================
// RUBBERBANDING
// =============================================================================

/// Simulated and claimed positions are too far apart.
#[inline]
pub fn diverged(simulated: Vec3, claimed: Vec3, rubber_distance: f32) -> bool {
    simulated.distance(claimed) >= rubber_distance
}

/// Compare the actor's replayed position with the position the move
/// claimed. Resets to the replayed position on divergence.
///
/// Returns `true` if a reset happened.
pub fn rubberband_check(world: &mut WorldState, id: ActorId, claimed: Vec3) -> bool {
    let rubber_distance = world.sync.rubber_distance;
    let Some(actor) = world.actors.get_mut(&id) else {
        return false;
    };
    let simulated = actor.position();
    if !diverged(simulated, claimed, rubber_distance) {
        return false;
    }
    actor.stats.rubberbanded += 1;
    force_reset(world, id, simulated, ResetReason::Rubberband).is_some()
}

/// Put an actor at `position` under a new route and drop its buffer.
///
/// Queues a `Reset` dispatch so every peer does the same. Returns the new
/// route, or `None` on a non-authoritative peer or for an unknown actor.
pub fn force_reset(
    world: &mut WorldState,
    id: ActorId,
    position: Vec3,
    reason: ResetReason,
) -> Option<Route> {
    if !world.is_authority() {
        return None;
    }
    let tick = world.tick;
    let env = world.env();
    let actor = world.actors.get_mut(&id)?;

    actor.place(env.as_ref(), position);
    actor.route = actor.route.next();
    actor.pending.clear();
    actor.stats.forced_resets += 1;
    let route = actor.route;

    warn!(
        actor = %id,
        %route,
        %reason,
        x = position.x,
        y = position.y,
        z = position.z,
        "Forced reset"
    );

    world.push_event(MovementEvent::forced_reset(tick, id, position, route, reason));
    world.push_dispatch(Dispatch::Reset { actor: id, position, route });
    Some(route)
}

// =============================================================================
// FALL DAMAGE
// =============================================================================

/// Damage for landing with `last_fall`, if any.
///
/// Only the vertical component counts, so running into a wall never hurts.
/// Rounds half away from zero.
pub fn fall_damage(last_fall: Vec3, config: &MovementConfig) -> Option<i32> {
    let magnitude = last_fall.y.abs();
    if magnitude >= config.fall_damage_minimum_magnitude {
        Some((magnitude * config.fall_damage_multiplier).round() as i32)
    } else {
        None
    }
}

/// Apply fall damage if the actor left `Airborne` this tick.
pub fn apply_fall_damage(world: &mut WorldState, id: ActorId) -> Option<i32> {
    if !world.is_authority() {
        return None;
    }
    let actor = world.get(id)?;
    if actor.last_state != MoveState::Airborne || actor.state == MoveState::Airborne {
        return None;
    }
    let last_fall = actor.last_fall;
    let damage = fall_damage(last_fall, &world.movement)?;
    world.apply_damage(id, damage, -last_fall);
    Some(damage)
}

// =============================================================================
// RESPAWN
// =============================================================================

/// Refill an actor's vitals and place it at `position`.
pub fn respawn(world: &mut WorldState, id: ActorId, position: Vec3) -> bool {
    if !world.is_authority() {
        return false;
    }
    let Some(actor) = world.actors.get_mut(&id) else {
        return false;
    };
    actor.health.refill();
    actor.endurance.refill();
    actor.died_at = None;
    let (health, endurance) = (actor.health.current(), actor.endurance.current());

    force_reset(world, id, position, ResetReason::Teleport);
    world.push_dispatch(Dispatch::Vitals { actor: id, health, endurance });
    info!(actor = %id, "Respawned");
    true
}

/// Respawn every actor that has been dead for `respawn_ticks`.
pub fn respawn_due(world: &mut WorldState) -> Vec<ActorId> {
    let (tick, delay) = (world.tick, world.respawn_ticks);
    let due: Vec<(ActorId, Vec3)> = world
        .actors
        .values()
        .filter(|a| a.died_at.is_some_and(|t| tick >= t.saturating_add(delay)))
        .map(|a| (a.id, a.spawn_point))
        .collect();

    due.into_iter()
        .filter(|&(id, spawn)| respawn(world, id, spawn))
        .map(|(id, _)| id)
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
