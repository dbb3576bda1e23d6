//! Move Sync Server
//!
//! `move-sync-server [serve]` runs the authoritative WebSocket server.
//! `move-sync-server demo` runs a server and two scripted clients in one
//! process and reports how far their views of each other drifted.

use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use move_sync::{
    VERSION, TICK_RATE, ActorId, InputFrame, Vec3,
    game::collision::{Aabb, Environment, Terrain},
    network::{run_client, ClientPeer, GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Move Sync Server v{}", VERSION);

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve().await,
        Some("demo") => demo().await,
        Some(other) => anyhow::bail!("unknown command {other:?}, expected `serve` or `demo`"),
    }
}

/// Arena used by both modes: a floor, a wall and a ledge to fall from.
fn arena() -> Arc<dyn Environment> {
    Arc::new(
        Terrain::flat(0.0)
            .with_solid(Aabb::new(Vec3::new(-10.0, 0.0, 12.0), Vec3::new(10.0, 3.0, 13.0)))
            .with_solid(Aabb::new(Vec3::new(6.0, 0.0, -2.0), Vec3::new(9.0, 4.0, 2.0))),
    )
}

async fn serve() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("loading server configuration")?;
    info!("Tick Rate: {} Hz", config.tick_rate);
    let server = GameServer::new(config, arena());
    server.run().await?;
    Ok(())
}

async fn demo() -> anyhow::Result<()> {
    info!("=== Starting Demo ===");
    let config = ServerConfig::default();
    let tuning = config.tuning.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);
    let server = Arc::new(GameServer::new(config, arena()));
    let running = Arc::clone(&server);
    let server_task = tokio::spawn(async move { running.serve(listener).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ticks = 4 * TICK_RATE;
    let walker = run_client(&url, "walker", tuning.clone(), arena(), TICK_RATE, ticks, |t| {
        // walk forward, turn, then stand still so buffers settle
        if t < ticks / 2 {
            InputFrame { rotate: if t % 50 < 10 { 1.0 } else { 0.0 }, ..InputFrame::with_movement(0.0, 1.0) }
        } else {
            InputFrame::new()
        }
    });
    let jumper = run_client(&url, "jumper", tuning, arena(), TICK_RATE, ticks, |t| {
        let frame = InputFrame::with_movement(1.0, 0.0).with_flags(InputFrame::FLAG_RUN);
        match t {
            _ if t >= ticks / 2 => InputFrame::new(),
            _ if t % 40 == 0 => frame.with_flags(InputFrame::FLAG_RUN | InputFrame::FLAG_JUMP),
            _ => frame,
        }
    });

    let (walker, jumper) = tokio::join!(walker, jumper);
    let (walker, jumper) = (walker?, jumper?);
    report("walker", &walker, &jumper);
    report("jumper", &jumper, &walker);

    server.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(1), server_task).await;
    info!("=== Demo Finished ===");
    Ok(())
}

/// Compare how `me` sees itself with how `other` sees it.
fn report(name: &str, me: &ClientPeer, other: &ClientPeer) {
    let Some(id) = me.actor() else {
        info!("{}: never welcomed", name);
        return;
    };
    let Some(own) = me.world().get(id) else {
        return;
    };
    info!(
        "{} {}: at {} state {} route {} health {} resets {} rtt {:?}ms",
        name,
        id,
        own.position(),
        own.state,
        own.route,
        own.health.current(),
        own.stats.forced_resets,
        me.last_rtt_ms(),
    );

    match seen_by(other, id) {
        Some(seen) => info!("{}: observer error {:.4}", name, seen.distance(own.position())),
        None => info!("{}: observer already dropped the actor", name),
    }
    info!("{}: world hash {}", name, hex::encode(&me.world().compute_hash()[..8]));
}

fn seen_by(peer: &ClientPeer, id: ActorId) -> Option<Vec3> {
    peer.world().get(id).map(|a| a.position())
}
