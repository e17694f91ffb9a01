use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use raid_boss_server::battle::{BattleEngineAdapter, SimBattleEngine};
use raid_boss_server::commands::{execute, CommandActor, RaidCommand};
use raid_boss_server::config::{default_config_path, RaidConfig};
use raid_boss_server::constants::TICK_MS;
use raid_boss_server::error::CommandError;
use raid_boss_server::registry::{RaidServices, SessionRegistry};
use raid_boss_server::rewards::{default_reward_path, RewardTable};
use raid_boss_server::session::RaidSession;
use raid_boss_server::types::{PlayerId, Position};
use raid_boss_server::world::{sim_handle, SimWorld, WorldHandle, WorldHost};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
    world: WorldHandle,
    sim: Arc<SimWorld>,
    engine: Arc<SimBattleEngine>,
}

impl AppState {
    fn session(&self) -> Arc<RaidSession> {
        self.registry.get_or_create(&self.world)
    }
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    #[serde(rename = "playerId")]
    player_id: String,
    name: Option<String>,
    #[serde(default)]
    teleport: bool,
}

#[derive(Debug, Deserialize)]
struct DifficultyRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TeleportRequest {
    #[serde(rename = "playerId")]
    player_id: String,
    reply: String,
}

#[derive(Debug, Deserialize)]
struct AttackRequest {
    #[serde(rename = "playerId")]
    player_id: String,
    amount: f64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let config = RaidConfig::load_or_default(&default_config_path());
    let rewards = RewardTable::load_or_default(&default_reward_path());
    let engine = Arc::new(SimBattleEngine::new("builder"));
    let adapter = BattleEngineAdapter::new(vec![
        engine.clone(),
        Arc::new(SimBattleEngine::offline("direct")),
    ]);
    let registry = Arc::new(SessionRegistry::new(RaidServices::new(
        config, adapter, rewards,
    )));

    let sim = Arc::new(SimWorld::new());
    let state = AppState {
        registry,
        world: sim_handle("overworld", sim.clone()),
        sim,
        engine,
    };
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/raid/status", get(status_handler))
        .route("/api/raid/summary", get(summary_handler))
        .route("/api/raid/events", get(events_handler))
        .route("/api/raid/join", post(join_handler))
        .route("/api/raid/teleport", post(teleport_handler))
        .route("/api/raid/attack", post(attack_handler))
        .route("/api/raid/start", post(start_handler))
        .route("/api/raid/cancel", post(cancel_handler))
        .route("/api/raid/stop", post(stop_handler))
        .route("/api/raid/difficulty", post(difficulty_handler))
        .with_state(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(port, "raid server listening");
    axum::serve(listener, app).await
}

fn start_tick_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let now = state.sim.advance(1);
            state.registry.on_world_tick(&state.world, now);
        }
    });
}

fn command_response(result: Result<String, CommandError>) -> (StatusCode, Json<Value>) {
    match result {
        Ok(message) => (StatusCode::OK, Json(json!({ "ok": true, "message": message }))),
        Err(error) => (
            StatusCode::CONFLICT,
            Json(json!({ "ok": false, "message": error.to_string() })),
        ),
    }
}

fn run_admin(state: &AppState, command: RaidCommand) -> (StatusCode, Json<Value>) {
    state.session();
    command_response(execute(
        &state.registry,
        &state.world,
        &CommandActor::admin(None),
        &command,
    ))
}

async fn healthz() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session().status())
}

async fn summary_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.session().last_summary() {
        Some(summary) => (StatusCode::OK, Json(json!(summary))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "message": "No raid has finished yet." })),
        ),
    }
}

async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sim.drain_notifications())
}

async fn join_handler(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> impl IntoResponse {
    let player = PlayerId::new(request.player_id.trim());
    if player.as_str().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "message": "playerId is required" })),
        );
    }
    if state.sim.player_name(&player).is_none() {
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(player.as_str())
            .to_string();
        state.sim.add_player(&player, &name, arrival_point());
        state.engine.set_party(&player, 1);
    }
    state.session();
    command_response(execute(
        &state.registry,
        &state.world,
        &CommandActor::player(player),
        &RaidCommand::Join {
            teleport: request.teleport,
        },
    ))
}

async fn teleport_handler(
    State(state): State<AppState>,
    Json(request): Json<TeleportRequest>,
) -> impl IntoResponse {
    state.session();
    command_response(execute(
        &state.registry,
        &state.world,
        &CommandActor::player(PlayerId::new(request.player_id.trim())),
        &RaidCommand::Teleport {
            reply: request.reply,
        },
    ))
}

async fn attack_handler(
    State(state): State<AppState>,
    Json(request): Json<AttackRequest>,
) -> impl IntoResponse {
    let session = state.session();
    let player = PlayerId::new(request.player_id.trim());
    let Some(boss) = session.boss_entities().first().copied() else {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "ok": false, "message": "No raid boss is present." })),
        );
    };
    let native = state
        .sim
        .entity(boss)
        .map(|info| info.native_health)
        .unwrap_or(1.0);
    match session.on_damage_dealt(&player, boss, request.amount, native) {
        Some(outcome) => {
            if !outcome.victory
                && state
                    .sim
                    .apply_native_damage(boss, outcome.native_damage)
                    .is_none()
            {
                warn!(entity = %boss, "boss vanished before native damage applied");
            }
            (
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "recorded": outcome.recorded,
                    "percentRemaining": outcome.percent_remaining,
                    "victory": outcome.victory,
                })),
            )
        }
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "ok": false, "message": "Target is not the raid boss." })),
        ),
    }
}

async fn start_handler(State(state): State<AppState>) -> impl IntoResponse {
    run_admin(&state, RaidCommand::Start)
}

async fn cancel_handler(State(state): State<AppState>) -> impl IntoResponse {
    run_admin(&state, RaidCommand::Cancel)
}

async fn stop_handler(State(state): State<AppState>) -> impl IntoResponse {
    run_admin(&state, RaidCommand::Stop)
}

async fn difficulty_handler(
    State(state): State<AppState>,
    Json(request): Json<DifficultyRequest>,
) -> impl IntoResponse {
    run_admin(&state, RaidCommand::SetDifficulty { name: request.name })
}

/// Where API-created players appear; outside the enroll radius.
fn arrival_point() -> Position {
    Position {
        x: 24.0,
        y: 80.0,
        z: 24.0,
    }
}
