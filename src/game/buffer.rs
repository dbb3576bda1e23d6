//! Remote Move Buffer
//!
//! Per-actor FIFO of moves received for actors this peer does not own,
//! drained once per fixed tick:
//!
//! ```text
//! queued < min              -> wait (keep a tick of slack for jitter)
//! queued >= max, authority  -> forced reset (client outpaces the drain)
//! queued >= combine         -> apply the two oldest as one move
//! otherwise                 -> apply one move
//! ```
//!
//! Only one drain happens per tick even when far behind.

use crate::core::vec3::Vec3;
use crate::game::authority::{self, ResetReason};
use crate::game::collision::Environment;
use crate::game::config::SyncConfig;
use crate::game::moves::Move;
use crate::game::state::{ActorId, MovementActor, WorldState};

/// What a drain did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrainOutcome {
    /// Not enough moves queued
    Waiting,
    /// Buffer full on the authority; the caller must reset the actor
    Overflow,
    /// One move applied
    Applied {
        /// Position the move claimed
        claimed: Vec3,
    },
    /// Two moves applied as one
    Combined {
        /// Position the newer move claimed
        claimed: Vec3,
    },
}

/// Move the actor to a move's position through the collider.
///
/// The delta is taken against the actor's current position, so the
/// transmitted position stays the only ground truth.
fn apply_move(actor: &mut MovementActor, env: &dyn Environment, mv: &Move, dt: f32) {
    actor.state = mv.state;
    actor.sync_capsule();
    let delta = mv.position - actor.position();
    actor.yaw = mv.yaw_degrees();
    actor.controller.move_by(env, delta, dt);
}

/// Drain at most one step from an actor's buffer.
pub fn drain(
    actor: &mut MovementActor,
    env: &dyn Environment,
    sync: &SyncConfig,
    authority: bool,
    dt: f32,
) -> DrainOutcome {
    // capsule must match the state before moving, on every peer alike
    actor.sync_capsule();

    if !actor.controller.grounded {
        actor.last_fall = actor.velocity;
    }

    let queued = actor.pending.len();
    if queued == 0 || queued < sync.min_move_buffer {
        return DrainOutcome::Waiting;
    }

    if authority && queued >= sync.max_move_buffer {
        return DrainOutcome::Overflow;
    }

    if queued >= 2 && queued >= sync.combine_moves_after {
        let (Some(first), Some(second)) = (actor.pending.pop_front(), actor.pending.pop_front()) else {
            return DrainOutcome::Waiting;
        };
        apply_move(actor, env, &second, dt);
        // velocity between the two moves, not from the pre-apply position
        actor.velocity = if dt > 0.0 {
            (second.position - first.position) * (1.0 / dt)
        } else {
            Vec3::ZERO
        };
        actor.stats.combined_moves += 1;
        DrainOutcome::Combined { claimed: second.position }
    } else {
        let Some(next) = actor.pending.pop_front() else {
            return DrainOutcome::Waiting;
        };
        apply_move(actor, env, &next, dt);
        actor.velocity = actor.controller.velocity;
        DrainOutcome::Applied { claimed: next.position }
    }
}

/// Drain one remote actor and let the authority react to the outcome.
pub fn step_remote(world: &mut WorldState, id: ActorId) -> DrainOutcome {
    let env = world.env();
    let authority = world.is_authority();
    let dt = world.dt;
    let Some(actor) = world.actors.get_mut(&id) else {
        return DrainOutcome::Waiting;
    };

    let outcome = drain(actor, env.as_ref(), &world.sync, authority, dt);
    match outcome {
        DrainOutcome::Overflow => {
            let position = actor.position();
            authority::force_reset(world, id, position, ResetReason::Overflow);
        }
        DrainOutcome::Applied { claimed } | DrainOutcome::Combined { claimed } if authority => {
            authority::rubberband_check(world, id, claimed);
        }
        _ => {}
    }
    outcome
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    use crate::core::quantize::Route;
    use crate::game::collision::{Aabb, Terrain};
    use crate::game::config::MovementConfig;
    use crate::game::state::MoveState;

    const DT: f32 = 0.02;

    fn actor() -> MovementActor {
        let mut actor = MovementActor::new(ActorId(1), Vec3::ZERO, 0.0, &MovementConfig::default());
        actor.controller.teleport(&Terrain::flat(0.0), Vec3::ZERO);
        actor
    }

    fn walk(z: f32) -> Move {
        Move::new(Route(0), MoveState::Walking, Vec3::new(0.0, 0.0, z), 0)
    }

    fn fill(actor: &mut MovementActor, n: usize) {
        for i in 1..=n {
            actor.pending.push_back(walk(i as f32 * 0.1));
        }
    }

    #[test]
    fn test_waits_below_minimum() {
        let terrain = Terrain::flat(0.0);
        let mut actor = actor();
        fill(&mut actor, 1);
        let outcome = drain(&mut actor, &terrain, &SyncConfig::default(), true, DT);
        assert_eq!(outcome, DrainOutcome::Waiting);
        assert_eq!(actor.queued(), 1);
    }

    #[test]
    fn test_single_drain_below_combine() {
        let terrain = Terrain::flat(0.0);
        let sync = SyncConfig::default();
        for n in sync.min_move_buffer..sync.combine_moves_after {
            let mut actor = actor();
            fill(&mut actor, n);
            let outcome = drain(&mut actor, &terrain, &sync, true, DT);
            assert!(matches!(outcome, DrainOutcome::Applied { .. }));
            assert_eq!(actor.queued(), n - 1);
            assert_eq!(actor.state, MoveState::Walking);
            assert_eq!(actor.stats.combined_moves, 0);
        }
    }

    #[test]
    fn test_combine_applies_newer_position_once() {
        let terrain = Terrain::flat(0.0);
        let mut actor = actor();
        fill(&mut actor, 5);

        let outcome = drain(&mut actor, &terrain, &SyncConfig::default(), false, DT);
        assert_eq!(outcome, DrainOutcome::Combined { claimed: Vec3::new(0.0, 0.0, 0.2) });
        assert_eq!(actor.queued(), 3);
        // lands on B, not A + B
        assert!((actor.position().z - 0.2).abs() < 1e-6);
        // velocity from A to B
        assert!((actor.velocity.z - 0.1 / DT).abs() < 1e-3);
        assert_eq!(actor.stats.combined_moves, 1);
    }

    #[test]
    fn test_overflow_only_on_authority() {
        let terrain = Terrain::flat(0.0);
        let sync = SyncConfig::default();

        let mut server_side = actor();
        fill(&mut server_side, sync.max_move_buffer);
        assert_eq!(drain(&mut server_side, &terrain, &sync, true, DT), DrainOutcome::Overflow);

        let mut client_side = actor();
        fill(&mut client_side, sync.max_move_buffer);
        assert!(matches!(
            drain(&mut client_side, &terrain, &sync, false, DT),
            DrainOutcome::Combined { .. }
        ));
    }

    #[test]
    fn test_capsule_resized_before_move() {
        // low tunnel only a crawler fits through
        let roof = Aabb::new(Vec3::new(-2.0, 0.6, 0.5), Vec3::new(2.0, 3.0, 4.0));
        let terrain = Terrain::flat(0.0).with_solid(roof);
        let mut actor = actor();
        let sync = SyncConfig { min_move_buffer: 1, ..Default::default() };
        actor.pending.push_back(Move::new(Route(0), MoveState::Crawling, Vec3::new(0.0, 0.0, 1.0), 0));

        drain(&mut actor, &terrain, &sync, true, DT);
        assert_eq!(actor.controller.capsule.height, 0.5);
        assert!((actor.position().z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_step_remote_rubberbands_through_wall() {
        let wall = Aabb::new(Vec3::new(-5.0, 0.0, 1.0), Vec3::new(5.0, 3.0, 2.0));
        let env = Arc::new(Terrain::flat(0.0).with_solid(wall));
        let mut world = WorldState::new(
            crate::game::state::PeerRole::DedicatedServer,
            crate::game::config::Tuning::default(),
            env,
        );
        world.spawn(ActorId(1), Vec3::ZERO, 0.0);
        let actor = world.get_mut(ActorId(1)).unwrap();
        // claims to have walked through the wall
        actor.pending.push_back(walk(0.3));
        actor.pending.push_back(walk(2.5));
        actor.pending.push_back(walk(2.6));

        assert!(matches!(step_remote(&mut world, ActorId(1)), DrainOutcome::Applied { .. }));
        assert_eq!(world.get(ActorId(1)).unwrap().route, Route(0));

        step_remote(&mut world, ActorId(1));
        let actor = world.get(ActorId(1)).unwrap();
        assert_eq!(actor.route, Route(1));
        assert!(actor.pending.is_empty());
        assert!(actor.position().z < 1.0);
        assert_eq!(actor.stats.rubberbanded, 1);
    }

    #[test]
    fn test_jittered_stream_never_grows_past_max() {
        let terrain = Terrain::flat(0.0);
        let sync = SyncConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut actor = actor();
        let mut z = 0.0;

        for _ in 0..500 {
            // 0..=2 arrivals per tick, averaging one
            for _ in 0..rng.gen_range(0..=2) {
                z += 0.05;
                if actor.queued() < sync.max_move_buffer {
                    actor.pending.push_back(walk(z));
                }
            }
            drain(&mut actor, &terrain, &sync, false, DT);
            assert!(actor.queued() <= sync.max_move_buffer);
        }
    }

    #[test]
    fn test_drain_to_waiting_terminates_with_short_tail() {
        let terrain = Terrain::flat(0.0);
        let sync = SyncConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut actor = actor();
        let mut z = 0.0;

        for _ in 0..500 {
            for _ in 0..rng.gen_range(0..3) {
                z += 0.08;
                actor.pending.push_back(walk(z));
            }
            if drain(&mut actor, &terrain, &sync, true, DT) == DrainOutcome::Overflow {
                actor.pending.clear();
            }
        }

        // neither Waiting nor Overflow pops, so the loop must stop on them
        let mut drains = 0;
        loop {
            match drain(&mut actor, &terrain, &sync, true, DT) {
                DrainOutcome::Waiting => break,
                DrainOutcome::Overflow => actor.pending.clear(),
                _ => drains += 1,
            }
            assert!(drains <= sync.max_move_buffer);
        }
        assert!(actor.queued() < sync.min_move_buffer);
    }

    proptest! {
        #[test]
        fn prop_combined_delta_is_newer_minus_current(
            start in -5.0f32..5.0,
            a in -0.5f32..0.5,
            b in -0.5f32..0.5,
        ) {
            let terrain = Terrain::flat(-100.0);
            let mut actor = MovementActor::new(
                ActorId(1),
                Vec3::new(start, 0.0, 0.0),
                0.0,
                &MovementConfig::default(),
            );
            let sync = SyncConfig { min_move_buffer: 1, combine_moves_after: 2, max_move_buffer: 10, rubber_distance: 1.0 };
            actor.pending.push_back(Move::new(Route(0), MoveState::Walking, Vec3::new(start + a, 0.0, 0.0), 0));
            actor.pending.push_back(Move::new(Route(0), MoveState::Walking, Vec3::new(start + a + b, 0.0, 0.0), 0));

            drain(&mut actor, &terrain, &sync, false, DT);
            prop_assert!((actor.position().x - (start + a + b)).abs() < 1e-4);
            prop_assert_eq!(actor.queued(), 0);
        }
    }
}
