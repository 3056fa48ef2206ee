//! Race Server - authoritative arcade racing simulation
//!
//! Runs one race session at a fixed tick rate:
//! - vehicle control and rapier physics for every racer
//! - AI waypoint pursuit with stuck recovery
//! - countdown, lap timing, results and leaderboard
//! - WebSocket clients drive player cars and receive snapshots and HUD events

mod ai;
mod config;
mod error;
mod hud;
mod lap;
mod net;
mod physics;
mod results;
mod roster;
mod route;
mod session;
mod spawn;
mod state;
mod timing;
mod track;
mod vehicle;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::ai::{AGGRESSIVE, CAUTIOUS};
use crate::config::Config;
use crate::hud::BufferedHud;
use crate::physics::PhysicsWorld;
use crate::roster::Roster;
use crate::session::RaceSession;
use crate::state::{SNAPSHOT_EVERY, SharedGameState};
use crate::track::Track;
use crate::vehicle::{AI_CAR, AI_HATCHBACK};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    info!("Starting Race Server");

    let track = match &config.track_file {
        Some(path) => Track::from_file(path)?,
        None => Track::default_oval(),
    };
    info!(track = %track.name, checkpoints = track.checkpoint_count(), "track loaded");

    // -------------------------------
    // Session + grid
    // -------------------------------
    let mut physics = PhysicsWorld::default();
    let roster = Roster::new(config.skins.clone(), config.rng_seed);
    let mut session = RaceSession::new(track, roster, config.total_laps);

    let mut player_slots = Vec::with_capacity(config.players);
    for _ in 0..config.players {
        player_slots.push(session.spawn_player(&mut physics)?);
    }
    for i in 0..config.ai_racers {
        let (driving, car) = if i % 2 == 0 { (CAUTIOUS, AI_CAR) } else { (AGGRESSIVE, AI_HATCHBACK) };
        session.spawn_ai(&mut physics, driving, car)?;
    }

    let state = Arc::new(Mutex::new(SharedGameState::new(
        player_slots,
        session.track().name.clone(),
    )));

    // -------------------------------
    // WebSocket server
    // -------------------------------
    let net_state = Arc::clone(&state);
    let addr = config.server_addr;
    tokio::spawn(async move {
        if let Err(err) = net::start_websocket_server(addr, net_state).await {
            error!(%err, "websocket server stopped");
        }
    });

    // -------------------------------
    // Fixed-rate tick loop
    // -------------------------------
    let dt = config.tick_delta();
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut hud = BufferedHud::default();
    session.start(&mut hud);
    let mut announced = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut game = state.lock().await;

                for (racer, command) in game.player_inputs() {
                    session.set_player_input(racer, command);
                }

                session.tick(&mut physics, dt, &mut hud);

                game.tick = session.clock().tick();
                game.broadcast_hud(&hud.drain());
                if game.tick % SNAPSHOT_EVERY == 0 {
                    game.broadcast_snapshot(&session.snapshot(&physics));
                }

                if session.is_complete() && !announced {
                    announced = true;
                    info!(
                        results = session.results().len(),
                        laps = session.total_laps(),
                        elapsed = session.clock().now(),
                        "race complete"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
