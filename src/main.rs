use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hush_sync::config::SyncConfig;
use hush_sync::lobby::manager::LobbyClient;
use hush_sync::lobby::player::LocalPlayer;
use hush_sync::metrics::{self, Metrics};
use hush_sync::net::medium::LoopbackMedium;
use hush_sync::sim::bot::WanderBot;
use hush_sync::store::{MemoryStore, RoomStore};
use hush_sync::sync::context::{Services, SessionContext};
use hush_sync::sync::controller::RoomSyncController;
use hush_sync::sync::session::run_session;
use hush_sync::sync::view::LogView;

/// Time for every session to see the waiting room before the host starts
const LOBBY_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Hush Sync simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {} player(s), {} Hz, {:?} threat counting",
        config.sim_players, config.tick_rate, config.threat_counting
    );

    let metrics = Arc::new(Metrics::new());
    if let Some(port) = config.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let store = Arc::new(MemoryStore::new());
    let services = Services::in_process(store.clone(), Arc::new(LoopbackMedium::new()), metrics.clone());
    let lobby = LobbyClient::new(store.clone(), config.max_players);

    let players: Vec<LocalPlayer> = (0..config.sim_players)
        .map(|_| LocalPlayer::anonymous())
        .collect();
    let host = players
        .first()
        .ok_or_else(|| anyhow::anyhow!("no players to simulate"))?;

    let room_id = lobby.create_room(host, &config.sim_room_name)?;
    for player in &players[1..] {
        lobby.join_room(&room_id, player)?;
    }
    for room in lobby.list_rooms()? {
        info!("Open room: {}", room);
    }

    let seed: u64 = rand::random();
    let mut sessions = JoinSet::new();
    for (i, player) in players.iter().enumerate() {
        let ctx = SessionContext::new(player.clone(), room_id.clone(), config.threat_counting);
        let view = Box::new(LogView::new(player.name.clone()));
        let controller = RoomSyncController::attach(ctx, services.clone(), view)?;
        let bot = WanderBot::new(seed.wrapping_add(i as u64));
        sessions.spawn(run_session(
            controller,
            bot,
            config.frame_interval(),
            config.match_timeout(),
        ));
    }

    tokio::time::sleep(LOBBY_GRACE).await;
    lobby.start_game(&room_id, host)?;

    let mut reports = Vec::new();
    loop {
        tokio::select! {
            joined = sessions.join_next() => match joined {
                Some(Ok(report)) => reports.push(report),
                Some(Err(e)) => error!("Session task failed: {}", e),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                sessions.abort_all();
                break;
            }
        }
    }

    for report in &reports {
        info!(
            "{}: {} frame(s), {} snapshot(s), caught={}, timed_out={}",
            report.uid, report.frames, report.snapshots, report.was_caught, report.timed_out
        );
    }
    match store.fetch(&room_id)? {
        Some(room) => info!(
            "Room '{}' ended {:?} with {}/{} caught",
            room.name,
            room.status,
            room.caught_players.len(),
            room.players.len()
        ),
        None => warn!("Room {} no longer exists", room_id),
    }
    info!("Final metrics: {}", metrics.to_json());

    Ok(())
}
