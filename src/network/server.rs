//! WebSocket Sync Server
//!
//! Async WebSocket server for movement sync. Connection tasks decode
//! frames and forward them over one mpsc channel to the simulation task,
//! which owns the [`WorldSession`] and drains the channel at the start of
//! every fixed tick.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::game::collision::Environment;
use crate::game::config::{ConfigError, Tuning};
use crate::network::protocol::{
    decode_move, encode_relay, ClientMessage, ErrorCode, ServerError, ServerMessage,
};
use crate::network::session::{Inbound, Outbound, SessionConfig, SessionError, WorldSession};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Tick rate for the simulation (Hz).
    pub tick_rate: u32,
    /// Movement and sync tuning shared with clients.
    pub tuning: Tuning,
    /// Session limits and spawn points.
    pub session: SessionConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 256,
            tick_rate: crate::TICK_RATE,
            tuning: Tuning::default(),
            session: SessionConfig::default(),
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Invalid values are logged and replaced by their defaults. Only an
    /// unreadable tuning file is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("MOVE_SYNC_BIND") {
            match parse_var("MOVE_SYNC_BIND", &value, |_: &SocketAddr| true) {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!("{}, using {}", e, config.bind_addr),
            }
        }

        if let Ok(value) = std::env::var("MOVE_SYNC_TICK_RATE") {
            match parse_var("MOVE_SYNC_TICK_RATE", &value, |rate: &u32| (1..=1000).contains(rate)) {
                Ok(rate) => config.tick_rate = rate,
                Err(e) => warn!("{}, using {}", e, config.tick_rate),
            }
        }

        if let Ok(value) = std::env::var("MOVE_SYNC_MAX_CONNECTIONS") {
            match parse_var("MOVE_SYNC_MAX_CONNECTIONS", &value, |max: &usize| *max > 0) {
                Ok(max) => config.max_connections = max,
                Err(e) => warn!("{}, using {}", e, config.max_connections),
            }
        }

        if let Ok(path) = std::env::var("MOVE_SYNC_TUNING") {
            config.tuning = Tuning::from_file(&path)?;
            info!("Loaded tuning from {}", path);
        }

        config.validate();
        Ok(config)
    }

    /// Clamp values the server cannot run with.
    pub fn validate(&mut self) {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            warn!("Tick rate {} out of range, using {}", self.tick_rate, crate::TICK_RATE);
            self.tick_rate = crate::TICK_RATE;
        }
        if self.max_connections == 0 {
            self.max_connections = 1;
        }
        self.tuning = self.tuning.clone().validated();
    }
}

/// Parse one environment value, rejecting it unless `valid` accepts it.
fn parse_var<T: FromStr>(
    field: &'static str,
    value: &str,
    valid: impl Fn(&T) -> bool,
) -> Result<T, ConfigError> {
    match value.trim().parse::<T>() {
        Ok(parsed) if valid(&parsed) => Ok(parsed),
        Ok(_) => Err(ConfigError::Invalid { field, reason: format!("{value:?} is out of range") }),
        Err(_) => Err(ConfigError::Invalid { field, reason: format!("cannot parse {value:?}") }),
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// The sync server.
pub struct GameServer {
    config: ServerConfig,
    env: Arc<dyn Environment>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server over `env`.
    pub fn new(config: ServerConfig, env: Arc<dyn Environment>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            env,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Move sync server {} listening on {} at {} Hz",
            self.config.version,
            listener.local_addr()?,
            self.config.tick_rate
        );

        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(4096);
        let session = WorldSession::new(
            self.config.session.clone(),
            self.config.tuning.clone(),
            Arc::clone(&self.env),
        );
        let simulation = tokio::spawn(Self::run_simulation(
            session,
            inbound_rx,
            self.config.tick_rate,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr, inbound_tx.clone());
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        simulation.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, inbound: mpsc::Sender<Inbound>) {
        let connections = Arc::clone(&self.connections);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let peer = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Outbound>(256);

            if inbound.send(Inbound::Connected { peer, sender: msg_tx.clone() }).await.is_err() {
                connections.fetch_sub(1, Ordering::SeqCst);
                return;
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let frame = match encode_outbound(&msg) {
                        Some(frame) => frame,
                        None => continue,
                    };
                    if ws_sender.send(frame).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming frames
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                                Ok(msg) => {
                                    if inbound.send(Inbound::Control { peer, msg }).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(Outbound::Text(ServerMessage::Error(ServerError {
                                        code: ErrorCode::InvalidMessage,
                                        message: "Invalid message format".to_string(),
                                    }))).await;
                                }
                            },
                            Some(Ok(Message::Binary(data))) => match decode_move(&data) {
                                Ok(mv) => {
                                    if inbound.send(Inbound::Move { peer, mv }).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => debug!("Dropped move frame from {}: {}", addr, e),
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(Outbound::Text(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        })).await;
                        break;
                    }
                }
            }

            let _ = inbound.send(Inbound::Disconnected { peer }).await;
            sender_task.abort();
            connections.fetch_sub(1, Ordering::SeqCst);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Fixed-tick loop. Inbound messages are applied only here, before the
    /// tick, so all actor state is mutated on this one task.
    async fn run_simulation(
        mut session: WorldSession,
        mut inbound: mpsc::Receiver<Inbound>,
        tick_rate: u32,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let tick_duration = Duration::from_micros(1_000_000 / tick_rate.max(1) as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    while let Ok(msg) = inbound.try_recv() {
                        session.handle(msg);
                    }
                    session.run_tick();

                    let world = session.world();
                    if world.tick % tick_rate.max(1) == 0 && !world.actors.is_empty() {
                        let hash = world.compute_hash();
                        debug!(tick = world.tick, actors = world.actors.len(), hash = %hex::encode(&hash[..8]), "World state");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Frame for an outgoing message, or `None` if it cannot be encoded.
fn encode_outbound(msg: &Outbound) -> Option<Message> {
    match msg {
        Outbound::Text(msg) => match msg.to_json() {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                None
            }
        },
        Outbound::Relay(relay) => match encode_relay(relay) {
            Ok(bytes) => Some(Message::Binary(bytes)),
            Err(e) => {
                error!("Failed to encode relay: {}", e);
                None
            }
        },
    }
}
