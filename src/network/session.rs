//! World Session
//!
//! Server-side glue between connections and the movement world. Owned by
//! the single simulation task: connection tasks only forward [`Inbound`]
//! messages, which are applied at the start of the next tick.
//!
//! Nothing here awaits. Outbound frames go through `try_send`, so a peer
//! whose socket stalls loses frames instead of stalling the tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::vec3::Vec3;
use crate::game::collision::Environment;
use crate::game::config::Tuning;
use crate::game::input::InputFrame;
use crate::game::moves::Move;
use crate::game::state::{ActorId, PeerRole, WorldState};
use crate::game::tick::{tick, Dispatch, TickResult};
use crate::game::transport::{self, MoveReceipt};
use crate::network::protocol::{
    ClientMessage, ErrorCode, PeerSnapshot, RelayedMove, ServerError, ServerMessage,
};

/// Connection identifier.
pub type PeerId = Uuid;

/// Something a connection task hands to the simulation task.
#[derive(Debug)]
pub enum Inbound {
    /// New connection with its outgoing channel.
    Connected {
        /// Connection
        peer: PeerId,
        /// Frames to write to the socket
        sender: mpsc::Sender<Outbound>,
    },
    /// Decoded control message.
    Control {
        /// Connection
        peer: PeerId,
        /// Message
        msg: ClientMessage,
    },
    /// Decoded move frame.
    Move {
        /// Connection
        peer: PeerId,
        /// The move
        mv: Move,
    },
    /// Connection closed.
    Disconnected {
        /// Connection
        peer: PeerId,
    },
}

/// A frame for a connection task to write.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON text frame
    Text(ServerMessage),
    /// Binary relay frame
    Relay(RelayedMove),
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum actors in the world.
    pub max_actors: usize,
    /// Spawn points, used round-robin.
    pub spawn_points: Vec<Vec3>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_actors: 64,
            spawn_points: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 0.0),
                Vec3::new(-4.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 4.0),
            ],
        }
    }
}

/// A connected peer.
#[derive(Debug)]
pub struct SessionPeer {
    /// Actor owned by this connection, once joined
    pub actor: Option<ActorId>,
    /// Display name from the join
    pub name: String,
    /// When the connection arrived
    pub connected_at: DateTime<Utc>,
    /// Message channel to this peer
    pub sender: mpsc::Sender<Outbound>,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No such connection.
    #[error("Unknown peer")]
    UnknownPeer,

    /// No free actor slots.
    #[error("Session is full")]
    SessionFull,

    /// Connection already owns an actor.
    #[error("Already joined")]
    AlreadyJoined,

    /// Connection owns no actor.
    #[error("Not joined")]
    NotJoined,
}

impl SessionError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::UnknownPeer | SessionError::NotJoined => ErrorCode::NotJoined,
            SessionError::SessionFull => ErrorCode::SessionFull,
            SessionError::AlreadyJoined => ErrorCode::AlreadyJoined,
        }
    }
}

/// The authoritative world plus its connections.
pub struct WorldSession {
    world: WorldState,
    config: SessionConfig,
    peers: BTreeMap<PeerId, SessionPeer>,
    next_actor: u32,
    spawns: usize,
}

impl WorldSession {
    /// Create a dedicated-server session.
    pub fn new(config: SessionConfig, tuning: Tuning, env: Arc<dyn Environment>) -> Self {
        Self {
            world: WorldState::new(PeerRole::DedicatedServer, tuning, env),
            config,
            peers: BTreeMap::new(),
            next_actor: 1,
            spawns: 0,
        }
    }

    /// The world.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Actor owned by a connection.
    pub fn actor_of(&self, peer: &PeerId) -> Option<ActorId> {
        self.peers.get(peer).and_then(|p| p.actor)
    }

    /// Register a connection.
    pub fn connect(&mut self, peer: PeerId, sender: mpsc::Sender<Outbound>) {
        self.peers.insert(peer, SessionPeer {
            actor: None,
            name: String::new(),
            connected_at: Utc::now(),
            sender,
        });
    }

    /// Give a connection an actor.
    pub fn join(&mut self, peer: PeerId, name: String) -> Result<ActorId, SessionError> {
        let joined = self.peers.get(&peer).ok_or(SessionError::UnknownPeer)?;
        if joined.actor.is_some() {
            return Err(SessionError::AlreadyJoined);
        }
        if self.world.actors.len() >= self.config.max_actors {
            return Err(SessionError::SessionFull);
        }

        let id = ActorId(self.next_actor);
        self.next_actor += 1;
        let position = self.next_spawn_point();

        let peers: Vec<PeerSnapshot> = self.world.actors.values().map(PeerSnapshot::of).collect();
        let actor = self.world.spawn(id, position, 0.0);
        let (route, yaw) = (actor.route, actor.yaw_byte());

        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.actor = Some(id);
            entry.name = name;
            info!(actor = %id, name = %entry.name, since = %entry.connected_at, "Peer joined");
        }

        self.send_to(&peer, Outbound::Text(ServerMessage::Welcome { actor: id, position, route, peers }));
        self.broadcast_except(&peer, Outbound::Text(ServerMessage::Spawned { actor: id, position, yaw }));
        Ok(id)
    }

    /// Take a connection's actor out of the world.
    pub fn leave(&mut self, peer: PeerId) -> Result<ActorId, SessionError> {
        let entry = self.peers.get_mut(&peer).ok_or(SessionError::UnknownPeer)?;
        let id = entry.actor.take().ok_or(SessionError::NotJoined)?;
        self.world.despawn(id);
        info!(actor = %id, "Peer left");
        self.broadcast_except(&peer, Outbound::Text(ServerMessage::Despawned { actor: id }));
        Ok(id)
    }

    /// Forget a connection, leaving first if joined.
    pub fn disconnect(&mut self, peer: PeerId) {
        if self.actor_of(&peer).is_some() {
            let _ = self.leave(peer);
        }
        if self.peers.remove(&peer).is_some() {
            debug!(%peer, "Peer disconnected");
        }
    }

    /// Apply one inbound message.
    pub fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Connected { peer, sender } => self.connect(peer, sender),
            Inbound::Control { peer, msg } => self.handle_control(peer, msg),
            Inbound::Move { peer, mv } => {
                self.receive_move(peer, mv);
            }
            Inbound::Disconnected { peer } => self.disconnect(peer),
        }
    }

    fn handle_control(&mut self, peer: PeerId, msg: ClientMessage) {
        let result = match msg {
            ClientMessage::Join { name } => self.join(peer, name).map(|_| ()),
            ClientMessage::Leave => self.leave(peer).map(|_| ()),
            ClientMessage::Ping { timestamp } => {
                let pong = ServerMessage::Pong { timestamp, server_time: Utc::now() };
                self.send_to(&peer, Outbound::Text(pong));
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(%peer, error = %e, "Rejected control message");
            let error = ServerMessage::Error(ServerError { code: e.code(), message: e.to_string() });
            self.send_to(&peer, Outbound::Text(error));
        }
    }

    /// Feed a move into the server receive path, attributed to the
    /// connection's own actor whatever it claims.
    pub fn receive_move(&mut self, peer: PeerId, mv: Move) -> MoveReceipt {
        match self.actor_of(&peer) {
            Some(actor) => transport::server_receive_move(&mut self.world, actor, mv),
            None => {
                debug!(%peer, "Move from a peer that has not joined");
                MoveReceipt::Ignored
            }
        }
    }

    /// Run one tick and deliver its dispatches.
    pub fn run_tick(&mut self) -> TickResult {
        let result = tick(&mut self.world, &InputFrame::new());
        for dispatch in &result.dispatches {
            self.deliver(dispatch);
        }
        result
    }

    fn deliver(&self, dispatch: &Dispatch) {
        match *dispatch {
            Dispatch::RelayMove { actor, mv } => {
                let relay = Outbound::Relay(RelayedMove { actor, mv });
                for (id, entry) in &self.peers {
                    if entry.actor.is_some() && entry.actor != Some(actor) {
                        push(id, entry, relay.clone());
                    }
                }
            }
            Dispatch::SendToServer(_) => {}
            _ => {
                if let Some(msg) = ServerMessage::from_dispatch(dispatch) {
                    self.broadcast(Outbound::Text(msg));
                }
            }
        }
    }

    fn next_spawn_point(&mut self) -> Vec3 {
        let points = &self.config.spawn_points;
        let point = if points.is_empty() {
            Vec3::ZERO
        } else {
            points[self.spawns % points.len()]
        };
        self.spawns += 1;
        point
    }

    fn send_to(&self, peer: &PeerId, msg: Outbound) {
        if let Some(entry) = self.peers.get(peer) {
            push(peer, entry, msg);
        }
    }

    /// Send to every joined peer.
    pub fn broadcast(&self, msg: Outbound) {
        for (id, entry) in self.peers.iter().filter(|(_, p)| p.actor.is_some()) {
            push(id, entry, msg.clone());
        }
    }

    fn broadcast_except(&self, except: &PeerId, msg: Outbound) {
        for (id, entry) in &self.peers {
            if id != except && entry.actor.is_some() {
                push(id, entry, msg.clone());
            }
        }
    }
}

/// Queue a frame for a connection without waiting on it.
fn push(peer: &PeerId, entry: &SessionPeer, msg: Outbound) {
    match entry.sender.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(%peer, actor = ?entry.actor, "Outbound queue full, dropping frame");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(%peer, "Outbound queue closed");
        }
    }
}
