use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use raid_boss_server::battle::{BattleEngineAdapter, SimBattleEngine};
use raid_boss_server::config::RaidConfig;
use raid_boss_server::constants::TICKS_PER_SECOND;
use raid_boss_server::registry::{RaidServices, SessionRegistry};
use raid_boss_server::rewards::{default_rewards, RewardTable};
use raid_boss_server::rng::Rng;
use raid_boss_server::types::{
    LeaderboardLine, PlayerId, Position, RaidDifficulty, RaidState, RaidSummary,
};
use raid_boss_server::world::{sim_handle, SimWorld, WorldHost};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Encounters to run before exiting.
    #[arg(long, default_value_t = 3)]
    cycles: usize,
    #[arg(long, default_value_t = 6)]
    players: usize,
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long)]
    difficulty: Option<String>,
    /// Seconds between automatic raid starts.
    #[arg(long, default_value_t = 10)]
    interval: i64,
    /// Average damage per attack.
    #[arg(long, default_value_t = 40.0)]
    damage: f64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct EncounterLine {
    cycle: usize,
    seed: u32,
    difficulty: RaidDifficulty,
    victory: bool,
    #[serde(rename = "durationTicks")]
    duration_ticks: u64,
    #[serde(rename = "hpPool")]
    hp_pool: u64,
    #[serde(rename = "accumulatedDamage")]
    accumulated_damage: u64,
    participants: usize,
    #[serde(rename = "finishedTick")]
    finished_tick: u64,
    top: Vec<LeaderboardLine>,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    seed: u32,
    encounters: usize,
    victories: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationTicks")]
    average_duration_ticks: u64,
    #[serde(rename = "damageByPlayer")]
    damage_by_player: BTreeMap<String, i64>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(rand::random::<u32>);
    let difficulty = cli
        .difficulty
        .as_deref()
        .and_then(RaidDifficulty::parse)
        .unwrap_or(RaidDifficulty::Normal);
    let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let lines = run(&cli, seed, difficulty);
    let mut has_anomaly = false;
    for line in &lines {
        has_anomaly |= !line.anomalies.is_empty();
        match serde_json::to_string(line) {
            Ok(text) => println!("{text}"),
            Err(err) => error!(error = %err, "could not serialize encounter line"),
        }
    }

    let summary = build_run_summary(&lines, seed, started_at);
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), error = %err, "summary write failed");
            std::process::exit(2);
        }
    }
    info!(
        encounters = summary.encounters,
        victories = summary.victories,
        anomalies = summary.anomaly_count,
        "simulation finished"
    );
    if has_anomaly {
        std::process::exit(1);
    }
}

fn run(cli: &Cli, seed: u32, difficulty: RaidDifficulty) -> Vec<EncounterLine> {
    let config = RaidConfig {
        auto_start_interval_seconds: cli.interval.max(1),
        reward_seed: Some(seed),
        ..RaidConfig::default()
    };
    let engine = Arc::new(SimBattleEngine::new("builder"));
    let registry = SessionRegistry::new(RaidServices::new(
        config.clone(),
        BattleEngineAdapter::new(vec![engine.clone()]),
        RewardTable::in_memory(default_rewards()),
    ));

    let sim = Arc::new(SimWorld::new());
    let world = sim_handle("simulation", sim.clone());
    let mut rng = Rng::new(seed);
    let center = config.spawn_center.center();
    let players: Vec<PlayerId> = (0..cli.players.max(1))
        .map(|idx| {
            let id = PlayerId::new(format!("sim_{}", idx + 1));
            let offset = rng.next_f64() * 8.0;
            sim.add_player(
                &id,
                &format!("Sim-{:02}", idx + 1),
                Position {
                    x: center.x + offset,
                    y: center.y,
                    z: center.z - offset,
                },
            );
            engine.set_party(&id, 1 + rng.range_u64(0, 5) as usize);
            id
        })
        .collect();

    let session = registry.get_or_create(&world);
    if let Err(err) = session.set_difficulty(difficulty.name()) {
        warn!(error = %err, "difficulty rejected");
    }

    let per_cycle = config.auto_start_interval_ticks()
        + config.waiting_duration_ticks()
        + config.raid_duration_ticks()
        + TICKS_PER_SECOND;
    let tick_limit = per_cycle.saturating_mul(cli.cycles as u64 + 1);
    let mut lines = Vec::new();
    let mut collected = false;

    while lines.len() < cli.cycles {
        let now = sim.advance(1);
        if now > tick_limit {
            warn!(tick = now, "tick safety limit exceeded");
            break;
        }
        registry.on_world_tick(&world, now);

        if session.state() == RaidState::InBattle {
            let boss = session.boss_entities().first().copied();
            for player in &players {
                let Some(boss) = boss else { break };
                if !rng.chance(0.1) {
                    continue;
                }
                let amount = cli.damage * (0.5 + rng.next_f64());
                let native = sim.entity(boss).map(|e| e.native_health).unwrap_or(1.0);
                if let Some(outcome) = session.on_damage_dealt(player, boss, amount, native) {
                    if !outcome.victory {
                        sim.apply_native_damage(boss, outcome.native_damage);
                    }
                }
            }
        }

        if session.state() == RaidState::Completed {
            if !collected {
                if let Some(summary) = session.last_summary() {
                    lines.push(encounter_line(lines.len() + 1, seed, now, summary));
                }
                collected = true;
            }
        } else {
            collected = false;
        }
        sim.drain_notifications();
    }
    lines
}

fn encounter_line(cycle: usize, seed: u32, now: u64, summary: RaidSummary) -> EncounterLine {
    let mut anomalies = Vec::new();
    if summary.victory && summary.accumulated_damage < summary.hp_pool {
        anomalies.push(format!(
            "victory below pool: {}/{}",
            summary.accumulated_damage, summary.hp_pool
        ));
    }
    if !summary.victory && summary.hp_pool > 0 && summary.accumulated_damage >= summary.hp_pool {
        anomalies.push("pool depleted without victory".to_string());
    }
    let ranked_total = summary
        .ranking
        .iter()
        .fold(0u64, |acc, line| acc.saturating_add(line.damage.max(0) as u64));
    if ranked_total > summary.accumulated_damage {
        anomalies.push(format!(
            "ranking exceeds accumulated damage: {ranked_total}"
        ));
    }

    EncounterLine {
        cycle,
        seed,
        difficulty: summary.difficulty,
        victory: summary.victory,
        duration_ticks: summary.duration_ticks,
        hp_pool: summary.hp_pool,
        accumulated_damage: summary.accumulated_damage,
        participants: summary.participants,
        finished_tick: now,
        top: summary.ranking,
        anomalies,
    }
}

fn build_run_summary(lines: &[EncounterLine], seed: u32, started_at: String) -> RunSummary {
    let encounters = lines.len();
    let total_duration: u64 = lines.iter().map(|line| line.duration_ticks).sum();
    let mut damage_by_player = BTreeMap::new();
    for line in lines {
        for entry in &line.top {
            let total = damage_by_player.entry(entry.name.clone()).or_insert(0i64);
            *total = total.saturating_add(entry.damage);
        }
    }
    RunSummary {
        started_at,
        finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        seed,
        encounters,
        victories: lines.iter().filter(|line| line.victory).count(),
        anomaly_count: lines.iter().map(|line| line.anomalies.len()).sum(),
        average_duration_ticks: if encounters == 0 {
            0
        } else {
            total_duration / encounters as u64
        },
        damage_by_player,
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, text)
}
