//! Fixed-Step Movement Tick
//!
//! One call per fixed time step (50 Hz). Owned actors are predicted from
//! input, every other actor drains its move buffer, and the authority
//! settles fall damage, endurance recovery and respawns.
//!
//! Everything that must leave the process is returned as [`Dispatch`]es;
//! the tick itself never touches a socket.

use serde::{Serialize, Deserialize};

use crate::core::quantize::Route;
use crate::core::vec3::Vec3;
use crate::game::authority;
use crate::game::buffer;
use crate::game::events::MovementEvent;
use crate::game::input::InputFrame;
use crate::game::moves::Move;
use crate::game::predictor;
use crate::game::state::{ActorId, PeerRole, WorldState};
use crate::game::transport;

/// A message the transport must deliver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Dispatch {
    /// Client: the local actor's move, to the authority
    SendToServer(Move),
    /// Authority: a move to every peer except its owner
    RelayMove {
        /// Actor that moved
        actor: ActorId,
        /// The move as received
        mv: Move,
    },
    /// Authority: forced reset, to every peer
    Reset {
        /// Actor reset
        actor: ActorId,
        /// Position to jump to
        position: Vec3,
        /// Route from now on
        route: Route,
    },
    /// Authority: current vitals, to every peer
    Vitals {
        /// Actor
        actor: ActorId,
        /// Health
        health: i32,
        /// Endurance
        endurance: i32,
    },
    /// Authority: damage dealt, to every peer
    Damage {
        /// Actor hit
        actor: ActorId,
        /// Damage amount
        amount: i32,
        /// Where the actor was
        position: Vec3,
        /// Direction of the hit
        normal: Vec3,
    },
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick, sorted
    pub events: Vec<MovementEvent>,
    /// Messages to send
    pub dispatches: Vec<Dispatch>,
}

/// Run one fixed tick.
///
/// `input` is only used for the locally owned actor, if there is one.
pub fn tick(world: &mut WorldState, input: &InputFrame) -> TickResult {
    // 0. Advance tick counter
    world.tick += 1;

    // 1. Predict or replay every actor, in id order
    let ids: Vec<ActorId> = world.actors.keys().copied().collect();
    for id in ids {
        if world.owns(id) {
            predict_owned(world, id, input);
        } else {
            buffer::step_remote(world, id);
        }

        // 2. Fall damage when an actor leaves Airborne
        authority::apply_fall_damage(world, id);

        // 3. Transition bookkeeping
        let tick = world.tick;
        let Some(actor) = world.actors.get_mut(&id) else {
            continue;
        };
        let (from, to) = (actor.last_state, actor.state);
        actor.last_state = to;
        if from != to {
            world.push_event(MovementEvent::state_changed(tick, id, from, to));
        }
    }

    if world.is_authority() {
        // 4. Endurance recovery
        if world.tick % world.recovery_interval_ticks == 0 {
            recover_endurance(world);
        }

        // 5. Respawns
        authority::respawn_due(world);
    }

    let mut events = world.take_events();
    events.sort();

    TickResult {
        events,
        dispatches: world.take_dispatches(),
    }
}

/// Predict the local actor and hand its move to the transport.
fn predict_owned(world: &mut WorldState, id: ActorId, input: &InputFrame) {
    let env = world.env();
    let (tick, dt) = (world.tick, world.dt);
    let Some(actor) = world.actors.get_mut(&id) else {
        return;
    };

    let prediction = predictor::predict(actor, env.as_ref(), &world.movement, input, dt);
    for cue in prediction.cues {
        world.push_event(MovementEvent::cue(tick, id, cue));
    }

    match world.role {
        // host: its own server path relays without buffering
        PeerRole::Host => {
            transport::server_receive_move(world, id, prediction.mv);
        }
        PeerRole::Client => world.push_dispatch(Dispatch::SendToServer(prediction.mv)),
        PeerRole::DedicatedServer => {}
    }
}

fn recover_endurance(world: &mut WorldState) {
    let mut changed = Vec::new();
    for actor in world.actors.values_mut() {
        if actor.endurance.recover(actor.state, actor.is_alive()) {
            changed.push(Dispatch::Vitals {
                actor: actor.id,
                health: actor.health.current(),
                endurance: actor.endurance.current(),
            });
        }
    }
    for dispatch in changed {
        world.push_dispatch(dispatch);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::game::collision::{Aabb, Terrain};
    use crate::game::config::Tuning;
    use crate::game::events::MovementEventData;
    use crate::game::state::MoveState;
    use crate::game::transport::{server_receive_move, MoveReceipt};

    fn count_events(events: &[MovementEvent], pred: impl Fn(&MovementEventData) -> bool) -> usize {
        events.iter().filter(|e| pred(&e.data)).count()
    }

    fn world(role: PeerRole, env: Terrain) -> WorldState {
        let mut world = WorldState::new(role, Tuning::default(), Arc::new(env));
        world.spawn(ActorId(1), Vec3::ZERO, 0.0);
        world.take_events();
        world
    }

    fn walk(route: u8, z: f32) -> Move {
        Move::new(Route(route), MoveState::Walking, Vec3::new(0.0, 0.0, z), 0)
    }

    #[test]
    fn test_tick_increments() {
        let mut world = world(PeerRole::DedicatedServer, Terrain::flat(0.0));
        tick(&mut world, &InputFrame::new());
        tick(&mut world, &InputFrame::new());
        assert_eq!(world.tick, 2);
    }

    #[test]
    fn test_burst_overflows_into_one_reset() {
        let mut world = world(PeerRole::DedicatedServer, Terrain::flat(0.0));
        for i in 1..=12 {
            server_receive_move(&mut world, ActorId(1), walk(0, i as f32 * 0.05));
        }
        world.take_dispatches();

        let result = tick(&mut world, &InputFrame::new());
        let resets: Vec<_> = result
            .dispatches
            .iter()
            .filter(|d| matches!(d, Dispatch::Reset { .. }))
            .collect();
        assert_eq!(resets.len(), 1);
        assert!(matches!(resets[0], Dispatch::Reset { route: Route(1), .. }));

        let actor = world.get(ActorId(1)).unwrap();
        assert_eq!(actor.queued(), 0);
        assert_eq!(actor.route, Route(1));
        assert_eq!(actor.position(), Vec3::ZERO);
        assert_eq!(actor.stats.overflow_dropped, 2);

        // in-flight moves of the old route are now stale
        assert_eq!(server_receive_move(&mut world, ActorId(1), walk(0, 0.7)), MoveReceipt::Stale);
        let result = tick(&mut world, &InputFrame::new());
        assert!(result.dispatches.is_empty());
        assert_eq!(world.get(ActorId(1)).unwrap().position(), Vec3::ZERO);
    }

    #[test]
    fn test_remote_fall_damages_once() {
        let mut world = WorldState::new(
            PeerRole::DedicatedServer,
            Tuning::default(),
            Arc::new(Terrain::flat(0.0)),
        );
        world.spawn(ActorId(1), Vec3::new(0.0, 3.0, 0.0), 0.0);

        let mut moves: Vec<Move> = (1..=9)
            .map(|k| Move::new(Route(0), MoveState::Airborne, Vec3::new(0.0, 3.0 - 0.3 * k as f32, 0.0), 0))
            .collect();
        moves.extend((0..4).map(|_| Move::new(Route(0), MoveState::Idle, Vec3::ZERO, 0)));

        let mut moves = moves.into_iter();
        for mv in moves.by_ref().take(2) {
            server_receive_move(&mut world, ActorId(1), mv);
        }

        let mut damage = Vec::new();
        let mut result = tick(&mut world, &InputFrame::new());
        loop {
            damage.extend(result.dispatches.iter().filter_map(|d| match d {
                Dispatch::Damage { amount, .. } => Some(*amount),
                _ => None,
            }));
            let Some(mv) = moves.next() else { break };
            server_receive_move(&mut world, ActorId(1), mv);
            result = tick(&mut world, &InputFrame::new());
        }
        // drain what is left
        for _ in 0..3 {
            let result = tick(&mut world, &InputFrame::new());
            assert!(!result.dispatches.iter().any(|d| matches!(d, Dispatch::Damage { .. })));
        }

        assert_eq!(damage, vec![30]);
        let actor = world.get(ActorId(1)).unwrap();
        assert_eq!(actor.health.current(), 70);
        assert_eq!(actor.state, MoveState::Idle);
        assert_eq!(actor.position(), Vec3::ZERO);
        assert_eq!(actor.stats.forced_resets, 0);
    }

    #[test]
    fn test_stale_route_never_applied() {
        let mut world = world(PeerRole::DedicatedServer, Terrain::flat(0.0));
        authority::force_reset(&mut world, ActorId(1), Vec3::ZERO, authority::ResetReason::Teleport);
        world.take_dispatches();

        for i in 1..=4 {
            server_receive_move(&mut world, ActorId(1), walk(0, i as f32 * 0.1));
        }
        for _ in 0..4 {
            tick(&mut world, &InputFrame::new());
        }
        let actor = world.get(ActorId(1)).unwrap();
        assert_eq!(actor.position(), Vec3::ZERO);
        assert_eq!(actor.stats.stale_discarded, 4);
    }

    #[test]
    fn test_client_sends_own_move() {
        let mut world = world(PeerRole::Client, Terrain::flat(0.0));
        world.set_local_actor(Some(ActorId(1)));

        let result = tick(&mut world, &InputFrame::with_movement(0.0, 1.0));
        assert!(matches!(
            result.dispatches.as_slice(),
            [Dispatch::SendToServer(mv)] if mv.state == MoveState::Walking
        ));
        assert_eq!(
            count_events(&result.events, |d| matches!(d, MovementEventData::StateChanged { .. })),
            1
        );
    }

    #[test]
    fn test_host_relays_own_move() {
        let mut world = world(PeerRole::Host, Terrain::flat(0.0));
        world.set_local_actor(Some(ActorId(1)));

        let result = tick(&mut world, &InputFrame::with_movement(0.0, 1.0));
        assert!(matches!(
            result.dispatches.as_slice(),
            [Dispatch::RelayMove { actor: ActorId(1), .. }]
        ));
        assert_eq!(world.get(ActorId(1)).unwrap().queued(), 0);
    }

    #[test]
    fn test_endurance_recovers_on_interval() {
        let mut world = world(PeerRole::DedicatedServer, Terrain::flat(0.0));
        world.get_mut(ActorId(1)).unwrap().endurance.set(4);
        let interval = world.recovery_interval_ticks;

        let mut vitals = 0;
        for _ in 0..interval * 2 {
            let result = tick(&mut world, &InputFrame::new());
            vitals += result.dispatches.iter().filter(|d| matches!(d, Dispatch::Vitals { .. })).count();
        }
        assert_eq!(world.get(ActorId(1)).unwrap().endurance.current(), 6);
        assert_eq!(vitals, 2);
    }

    #[test]
    fn test_client_does_not_recover_or_damage() {
        let mut world = world(PeerRole::Client, Terrain::flat(0.0));
        world.get_mut(ActorId(1)).unwrap().endurance.set(4);
        for _ in 0..world.recovery_interval_ticks * 2 {
            assert!(tick(&mut world, &InputFrame::new()).dispatches.is_empty());
        }
        assert_eq!(world.get(ActorId(1)).unwrap().endurance.current(), 4);
    }

    #[test]
    fn test_host_predicts_behind_wall() {
        let wall = Aabb::new(Vec3::new(-5.0, 0.0, 1.0), Vec3::new(5.0, 3.0, 2.0));
        let mut world = world(PeerRole::Host, Terrain::flat(0.0).with_solid(wall));
        world.set_local_actor(Some(ActorId(1)));
        for _ in 0..100 {
            tick(&mut world, &InputFrame::with_movement(0.0, 1.0));
        }
        let actor = world.get(ActorId(1)).unwrap();
        assert!(actor.position().z < 1.0);
        assert_eq!(actor.stats.forced_resets, 0);
    }

    #[test]
    fn test_dead_actor_respawns() {
        let mut world = world(PeerRole::DedicatedServer, Terrain::flat(0.0));
        world.apply_damage(ActorId(1), 100, Vec3::UP);
        world.take_dispatches();

        let mut respawned = false;
        for _ in 0..world.respawn_ticks + 1 {
            let result = tick(&mut world, &InputFrame::new());
            respawned |= result.dispatches.iter().any(|d| matches!(d, Dispatch::Reset { .. }));
        }
        assert!(respawned);
        assert!(world.get(ActorId(1)).unwrap().is_alive());
    }
}
