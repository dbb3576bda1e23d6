//! Client Peer
//!
//! [`ClientPeer`] is the client side without I/O: it owns a `Client`-role
//! world, applies server messages and produces the moves to send. The
//! [`run_client`] driver wires it to a WebSocket for tools and the demo.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::core::quantize::byte_to_yaw;
use crate::game::collision::Environment;
use crate::game::config::Tuning;
use crate::game::events::MovementEvent;
use crate::game::input::{InputFrame, InputLatch};
use crate::game::moves::Move;
use crate::game::state::{ActorId, PeerRole, WorldState};
use crate::game::tick::{tick, Dispatch, TickResult};
use crate::game::transport::{self, MoveReceipt};
use crate::network::protocol::{
    decode_relay, encode_move, ClientMessage, PeerSnapshot, ProtocolError, RelayedMove, ServerMessage,
};

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not open the WebSocket.
    #[error("Failed to connect: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    /// WebSocket error after connecting.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Undecodable message from the server.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server closed the connection.
    #[error("Connection closed by server")]
    Closed,
}

/// Client-side peer state.
pub struct ClientPeer {
    world: WorldState,
    latch: InputLatch,
    last_rtt_ms: Option<u64>,
}

impl ClientPeer {
    /// Create a peer with an empty world.
    pub fn new(tuning: Tuning, env: Arc<dyn Environment>) -> Self {
        Self {
            world: WorldState::new(PeerRole::Client, tuning, env),
            latch: InputLatch::new(),
            last_rtt_ms: None,
        }
    }

    /// The world as this peer sees it.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Actor owned by this peer, once welcomed.
    pub fn actor(&self) -> Option<ActorId> {
        self.world.local_actor
    }

    /// Round trip of the last ping, if any.
    pub fn last_rtt_ms(&self) -> Option<u64> {
        self.last_rtt_ms
    }

    /// Sample input between ticks. Presses are kept until the next tick.
    pub fn sample_input(&mut self, frame: InputFrame) {
        self.latch.sample(frame);
    }

    /// Run one tick with the latched input. Returns the moves to send.
    pub fn tick(&mut self) -> (TickResult, Vec<Move>) {
        let input = self.latch.take();
        let result = tick(&mut self.world, &input);
        let moves = result
            .dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::SendToServer(mv) => Some(*mv),
                _ => None,
            })
            .collect();
        (result, moves)
    }

    /// Apply a relayed move.
    pub fn handle_relay(&mut self, relay: RelayedMove) -> MoveReceipt {
        transport::client_receive_relay(&mut self.world, relay.actor, relay.mv)
    }

    /// Apply a control message from the server.
    pub fn handle_server(&mut self, msg: ServerMessage, now_ms: u64) {
        match msg {
            ServerMessage::Welcome { actor, position, route, peers } => {
                for peer in &peers {
                    self.spawn_snapshot(peer);
                }
                let own = self.world.spawn(actor, position, 0.0);
                own.route = route;
                self.world.set_local_actor(Some(actor));
                info!(%actor, peers = peers.len(), "Welcomed");
            }
            ServerMessage::Spawned { actor, position, yaw } => {
                self.world.spawn(actor, position, byte_to_yaw(yaw));
            }
            ServerMessage::Despawned { actor } => {
                self.world.despawn(actor);
            }
            ServerMessage::Reset { actor, position, route } => {
                transport::apply_reset(&mut self.world, actor, position, route);
            }
            ServerMessage::Vitals { actor, health, endurance } => {
                self.world.apply_vitals(actor, health, endurance);
            }
            ServerMessage::Damage { actor, amount, .. } => {
                let health = self.world.get(actor).map(|a| a.health.current()).unwrap_or(0);
                let tick = self.world.tick;
                self.world.push_event(MovementEvent::damaged(tick, actor, amount, health));
            }
            ServerMessage::Pong { timestamp, .. } => {
                self.last_rtt_ms = Some(now_ms.saturating_sub(timestamp));
            }
            ServerMessage::Error(error) => {
                warn!(code = ?error.code, "Server error: {}", error.message);
            }
            ServerMessage::Shutdown { reason } => {
                info!("Server shutting down: {}", reason);
            }
        }
    }

    fn spawn_snapshot(&mut self, snapshot: &PeerSnapshot) {
        let actor = self.world.spawn(snapshot.actor, snapshot.position, byte_to_yaw(snapshot.yaw));
        actor.route = snapshot.route;
        actor.state = snapshot.state;
        actor.last_state = snapshot.state;
        actor.sync_capsule();
        self.world.apply_vitals(snapshot.actor, snapshot.health, snapshot.endurance);
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Connect to `url`, join as `name` and run `ticks` fixed ticks after the
/// welcome, feeding `input(tick)` each tick. Returns the final peer state.
pub async fn run_client(
    url: &str,
    name: &str,
    tuning: Tuning,
    env: Arc<dyn Environment>,
    tick_rate: u32,
    ticks: u32,
    mut input: impl FnMut(u32) -> InputFrame,
) -> Result<ClientPeer, ClientError> {
    let (ws_stream, _) = connect_async(url).await.map_err(ClientError::Connect)?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut peer = ClientPeer::new(tuning, env);

    let join = ClientMessage::Join { name: name.to_string() };
    ws_sender.send(Message::Text(join.to_json().map_err(ProtocolError::from)?)).await?;
    let ping = ClientMessage::Ping { timestamp: now_ms() };
    ws_sender.send(Message::Text(ping.to_json().map_err(ProtocolError::from)?)).await?;

    let mut tick_interval = interval(Duration::from_micros(1_000_000 / tick_rate.max(1) as u64));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut played = 0;

    while played < ticks {
        tokio::select! {
            _ = tick_interval.tick() => {
                if peer.actor().is_none() {
                    continue;
                }
                peer.sample_input(input(played));
                let (_, moves) = peer.tick();
                for mv in moves {
                    ws_sender.send(Message::Binary(encode_move(&mv)?)).await?;
                }
                played += 1;
            }
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                        Ok(msg) => peer.handle_server(msg, now_ms()),
                        Err(e) => debug!("Dropped server message: {}", e),
                    },
                    Some(Ok(Message::Binary(data))) => match decode_relay(&data) {
                        Ok(relay) => {
                            peer.handle_relay(relay);
                        }
                        Err(e) => debug!("Dropped relay frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                    Some(Err(e)) => return Err(e.into()),
                    _ => {}
                }
            }
        }
    }

    let leave = ClientMessage::Leave.to_json().map_err(ProtocolError::from)?;
    ws_sender.send(Message::Text(leave)).await?;
    ws_sender.close().await?;
    Ok(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quantize::Route;
    use crate::core::vec3::Vec3;
    use crate::game::collision::Terrain;
    use crate::game::state::MoveState;

    fn peer() -> ClientPeer {
        ClientPeer::new(Tuning::default(), Arc::new(Terrain::flat(0.0)))
    }

    fn welcome(peers: Vec<PeerSnapshot>) -> ServerMessage {
        ServerMessage::Welcome { actor: ActorId(2), position: Vec3::ZERO, route: Route(0), peers }
    }

    #[test]
    fn test_welcome_spawns_world() {
        let mut client = peer();
        let other = PeerSnapshot {
            actor: ActorId(1),
            position: Vec3::new(4.0, 0.0, 0.0),
            route: Route(3),
            state: MoveState::Crouching,
            yaw: 64,
            health: 55,
            endurance: 10,
        };
        client.handle_server(welcome(vec![other]), 0);

        assert_eq!(client.actor(), Some(ActorId(2)));
        let seen = client.world().get(ActorId(1)).unwrap();
        assert_eq!(seen.route, Route(3));
        assert_eq!(seen.controller.capsule.height, 1.0);
        assert_eq!(seen.health.current(), 55);
    }

    #[test]
    fn test_tick_produces_move_after_welcome() {
        let mut client = peer();
        let (_, moves) = client.tick();
        assert!(moves.is_empty());

        client.handle_server(welcome(Vec::new()), 0);
        client.sample_input(InputFrame::with_movement(0.0, 1.0));
        let (_, moves) = client.tick();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].state, MoveState::Walking);
    }

    #[test]
    fn test_reset_adopts_route_for_own_actor() {
        let mut client = peer();
        client.handle_server(welcome(Vec::new()), 0);
        client.handle_server(
            ServerMessage::Reset { actor: ActorId(2), position: Vec3::new(1.0, 0.0, 1.0), route: Route(1) },
            0,
        );
        let (_, moves) = client.tick();
        assert_eq!(moves[0].route, Route(1));
    }

    #[test]
    fn test_relays_replayed_for_others() {
        let mut client = peer();
        client.handle_server(welcome(Vec::new()), 0);
        client.handle_server(ServerMessage::Spawned { actor: ActorId(5), position: Vec3::ZERO, yaw: 0 }, 0);

        for z in [0.1, 0.2] {
            let mv = Move::new(Route(0), MoveState::Walking, Vec3::new(0.0, 0.0, z), 0);
            assert_eq!(client.handle_relay(RelayedMove { actor: ActorId(5), mv }), MoveReceipt::Accepted);
        }
        client.tick();
        let other = client.world().get(ActorId(5)).unwrap();
        assert!((other.position().z - 0.1).abs() < 1e-6);
        assert_eq!(other.state, MoveState::Walking);
    }

    #[test]
    fn test_pong_measures_rtt() {
        let mut client = peer();
        client.handle_server(ServerMessage::Pong { timestamp: 1_000, server_time: chrono::Utc::now() }, 1_035);
        assert_eq!(client.last_rtt_ms(), Some(35));
    }
}
