//! Move Transport
//!
//! Receive paths for moves and resets. Nothing here applies a move: moves
//! are only validated and enqueued, then replayed by the buffer drain on
//! the next fixed tick.
//!
//! The transport underneath must be ordered and reliable per actor. Relays
//! are not route-checked on clients because every relay of an old route
//! arrives before the reset that retired it.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::quantize::Route;
use crate::core::vec3::Vec3;
use crate::game::authority::ResetReason;
use crate::game::events::{MovementEvent, MovementEventData};
use crate::game::moves::Move;
use crate::game::state::{ActorId, WorldState};
use crate::game::tick::Dispatch;

/// What happened to a received move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveReceipt {
    /// Enqueued (or, for the host's own actor, relayed only)
    Accepted,
    /// Carried an old route; discarded
    Stale,
    /// Buffer full; discarded
    Dropped,
    /// This peer has no use for it
    Ignored,
    /// No such actor
    UnknownActor,
}

/// Authority receive path for a move from the actor's owner.
///
/// Stale moves are discarded silently (counted and logged at debug level).
/// Current moves are buffered unless the actor is predicted here, and are
/// relayed to observers in every case, even when the buffer is full.
pub fn server_receive_move(world: &mut WorldState, id: ActorId, mv: Move) -> MoveReceipt {
    if !world.is_authority() {
        return MoveReceipt::Ignored;
    }
    let tick = world.tick;
    let owned = world.owns(id);
    let capacity = world.sync.max_move_buffer;
    let Some(actor) = world.actors.get_mut(&id) else {
        return MoveReceipt::UnknownActor;
    };

    if mv.route != actor.route {
        actor.stats.stale_discarded += 1;
        let current = actor.route;
        debug!(actor = %id, route = %mv.route, %current, "Discarded stale move");
        world.push_event(MovementEvent::new(
            tick,
            id,
            MovementEventData::StaleMoveDiscarded { route: mv.route, current },
        ));
        return MoveReceipt::Stale;
    }

    let receipt = if owned {
        MoveReceipt::Accepted
    } else if actor.pending.len() < capacity {
        actor.pending.push_back(mv);
        MoveReceipt::Accepted
    } else {
        actor.stats.overflow_dropped += 1;
        let queued = actor.pending.len();
        debug!(actor = %id, queued, "Move buffer full, dropped move");
        world.push_event(MovementEvent::new(tick, id, MovementEventData::OverflowDropped { queued }));
        MoveReceipt::Dropped
    };

    world.push_dispatch(Dispatch::RelayMove { actor: id, mv });
    receipt
}

/// Client receive path for a move relayed by the authority.
pub fn client_receive_relay(world: &mut WorldState, id: ActorId, mv: Move) -> MoveReceipt {
    // a host already buffered it on the server path
    if world.is_authority() || world.owns(id) {
        return MoveReceipt::Ignored;
    }
    let tick = world.tick;
    let capacity = world.sync.max_move_buffer;
    let Some(actor) = world.actors.get_mut(&id) else {
        return MoveReceipt::UnknownActor;
    };

    if actor.pending.len() < capacity {
        actor.pending.push_back(mv);
        MoveReceipt::Accepted
    } else {
        actor.stats.overflow_dropped += 1;
        let queued = actor.pending.len();
        debug!(actor = %id, queued, "Relay buffer full, dropped move");
        world.push_event(MovementEvent::new(tick, id, MovementEventData::OverflowDropped { queued }));
        MoveReceipt::Dropped
    }
}

/// Client receive path for a forced reset: jump to the authority's
/// position, adopt the new route and drop every buffered move.
pub fn apply_reset(world: &mut WorldState, id: ActorId, position: Vec3, route: Route) -> bool {
    if world.is_authority() {
        return false;
    }
    let tick = world.tick;
    let env = world.env();
    let Some(actor) = world.actors.get_mut(&id) else {
        return false;
    };

    actor.place(env.as_ref(), position);
    actor.route = route;
    actor.pending.clear();
    actor.stats.forced_resets += 1;
    debug!(actor = %id, %route, "Applied reset");
    world.push_event(MovementEvent::forced_reset(tick, id, position, route, ResetReason::Authority));
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::game::authority::force_reset;
    use crate::game::collision::Terrain;
    use crate::game::config::Tuning;
    use crate::game::state::{MoveState, PeerRole};

    fn world(role: PeerRole) -> WorldState {
        let mut world = WorldState::new(role, Tuning::default(), Arc::new(Terrain::flat(0.0)));
        world.spawn(ActorId(1), Vec3::ZERO, 0.0);
        world.spawn(ActorId(2), Vec3::new(5.0, 0.0, 0.0), 0.0);
        world.take_events();
        world
    }

    fn mv(route: u8, z: f32) -> Move {
        Move::new(Route(route), MoveState::Walking, Vec3::new(0.0, 0.0, z), 0)
    }

    #[test]
    fn test_server_buffers_and_relays() {
        let mut server = world(PeerRole::DedicatedServer);
        assert_eq!(server_receive_move(&mut server, ActorId(1), mv(0, 0.1)), MoveReceipt::Accepted);
        assert_eq!(server.get(ActorId(1)).unwrap().queued(), 1);
        let dispatches = server.take_dispatches();
        assert!(matches!(dispatches.as_slice(), [Dispatch::RelayMove { actor: ActorId(1), .. }]));
    }

    #[test]
    fn test_moves_from_before_reset_are_discarded() {
        let mut server = world(PeerRole::DedicatedServer);
        force_reset(&mut server, ActorId(1), Vec3::ZERO, ResetReason::Teleport);
        server.take_dispatches();

        assert_eq!(server_receive_move(&mut server, ActorId(1), mv(0, 0.1)), MoveReceipt::Stale);
        let actor = server.get(ActorId(1)).unwrap();
        assert_eq!(actor.queued(), 0);
        assert_eq!(actor.position(), Vec3::ZERO);
        assert_eq!(actor.stats.stale_discarded, 1);
        assert!(server.take_dispatches().is_empty(), "stale moves are not relayed");

        assert_eq!(server_receive_move(&mut server, ActorId(1), mv(1, 0.1)), MoveReceipt::Accepted);
    }

    #[test]
    fn test_full_buffer_drops_but_still_relays() {
        let mut server = world(PeerRole::DedicatedServer);
        let max = server.sync.max_move_buffer;
        for i in 0..max {
            server_receive_move(&mut server, ActorId(1), mv(0, i as f32));
        }
        assert_eq!(server_receive_move(&mut server, ActorId(1), mv(0, 99.0)), MoveReceipt::Dropped);
        assert_eq!(server.get(ActorId(1)).unwrap().queued(), max);
        assert_eq!(server.take_dispatches().len(), max + 1);
    }

    #[test]
    fn test_host_relays_own_moves_without_buffering() {
        let mut host = world(PeerRole::Host);
        host.set_local_actor(Some(ActorId(1)));
        assert_eq!(server_receive_move(&mut host, ActorId(1), mv(0, 0.1)), MoveReceipt::Accepted);
        assert_eq!(host.get(ActorId(1)).unwrap().queued(), 0);
        assert_eq!(host.take_dispatches().len(), 1);
    }

    #[test]
    fn test_client_ignores_own_relays() {
        let mut client = world(PeerRole::Client);
        client.set_local_actor(Some(ActorId(1)));
        assert_eq!(client_receive_relay(&mut client, ActorId(1), mv(0, 0.1)), MoveReceipt::Ignored);
        assert_eq!(client_receive_relay(&mut client, ActorId(2), mv(0, 0.1)), MoveReceipt::Accepted);
        assert_eq!(client_receive_relay(&mut client, ActorId(9), mv(0, 0.1)), MoveReceipt::UnknownActor);
        assert_eq!(client.get(ActorId(2)).unwrap().queued(), 1);
    }

    #[test]
    fn test_client_reset_clears_queue_and_adopts_route() {
        let mut client = world(PeerRole::Client);
        client_receive_relay(&mut client, ActorId(2), mv(0, 0.1));
        client_receive_relay(&mut client, ActorId(2), mv(0, 0.2));

        assert!(apply_reset(&mut client, ActorId(2), Vec3::new(4.0, 0.0, 0.0), Route(1)));
        let actor = client.get(ActorId(2)).unwrap();
        assert_eq!(actor.queued(), 0);
        assert_eq!(actor.route, Route(1));
        assert_eq!(actor.position(), Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_reset_stops_owned_actor() {
        let mut client = world(PeerRole::Client);
        client.set_local_actor(Some(ActorId(1)));
        let actor = client.get_mut(ActorId(1)).unwrap();
        actor.locomotion.move_dir = Vec3::new(0.0, 0.0, 8.0);
        actor.locomotion.horizontal_speed = 8.0;
        actor.velocity = Vec3::new(0.0, 0.0, 8.0);
        actor.controller.velocity = Vec3::new(0.0, 0.0, 8.0);

        assert!(apply_reset(&mut client, ActorId(1), Vec3::new(1.0, 0.0, 1.0), Route(3)));
        let actor = client.get(ActorId(1)).unwrap();
        assert_eq!(actor.locomotion.move_dir, Vec3::ZERO);
        assert_eq!(actor.locomotion.horizontal_speed, 0.0);
        assert_eq!(actor.velocity, Vec3::ZERO);
        assert_eq!(actor.controller.velocity, Vec3::ZERO);
        assert_eq!(actor.current_move().route, Route(3));
    }
}
