use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::boss::{self, BossSet};
use crate::constants::{
    format_countdown, is_battle_checkpoint, is_waiting_checkpoint, BOSS_LABEL, TICKS_PER_SECOND,
};
use crate::damage::{DamagePool, DamageTracker, Leaderboard};
use crate::error::CommandError;
use crate::registry::RaidServices;
use crate::rewards::{self, format_line};
use crate::rng::Rng;
use crate::types::{
    BlockPos, DamageOutcome, DeathVerdict, EntityId, PlayerId, Position, RaidDifficulty,
    RaidState, RaidStatusView, RaidSummary,
};
use crate::world::WorldHandle;

pub const RAID_SOON_MESSAGE: &str = "Raid starts soon! Type /joinraid";
pub const RAID_BEGUN_MESSAGE: &str = "The raid boss has appeared! Attack it to join the battle.";
pub const DEFEAT_MESSAGE: &str = "Raid ended — boss survived.";
pub const TOP_PLAYERS_HEADER: &str = "Raid - Top players:";
pub const JOINED_MESSAGE: &str = "You joined the raid!";

struct SessionInner {
    state: RaidState,
    start_tick: u64,
    battle_start_tick: u64,
    players: HashSet<PlayerId>,
    bosses: BossSet,
    last_announced_seconds: Option<u64>,
    difficulty: RaidDifficulty,
    last_boss_percent: f64,
    boss_damage_multiplier: f64,
    rearm_pending: bool,
    attack_cooldowns: HashMap<EntityId, u64>,
    last_summary: Option<RaidSummary>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: RaidState::Idle,
            start_tick: 0,
            battle_start_tick: 0,
            players: HashSet::new(),
            bosses: BossSet::new(),
            last_announced_seconds: None,
            difficulty: RaidDifficulty::Normal,
            last_boss_percent: -1.0,
            boss_damage_multiplier: 1.0,
            rearm_pending: false,
            attack_cooldowns: HashMap::new(),
            last_summary: None,
        }
    }

    fn roster(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.players.iter().cloned().collect();
        players.sort();
        players
    }

    fn primary_boss(&self) -> Option<(EntityId, Arc<DamagePool>)> {
        self.bosses
            .iter()
            .min_by_key(|(id, _)| **id)
            .map(|(id, pool)| (*id, pool.clone()))
    }
}

/// Raid lifecycle for one world. All state writes go through the inner lock;
/// the damage pool itself is atomic so hits are folded in without it.
pub struct RaidSession {
    world: WorldHandle,
    services: Arc<RaidServices>,
    center: BlockPos,
    inner: Mutex<SessionInner>,
    rewards_distributed: AtomicBool,
    tracker: DamageTracker,
    leaderboard: Leaderboard,
    rng: Mutex<Rng>,
}

impl RaidSession {
    pub fn new(world: WorldHandle, services: Arc<RaidServices>) -> Self {
        let center = services.config.spawn_center;
        let rng = services
            .config
            .reward_seed
            .map(Rng::new)
            .unwrap_or_else(Rng::from_entropy);
        Self {
            world,
            services,
            center,
            inner: Mutex::new(SessionInner::new()),
            rewards_distributed: AtomicBool::new(false),
            tracker: DamageTracker::new(),
            leaderboard: Leaderboard::new(),
            rng: Mutex::new(rng),
        }
    }

    pub fn world(&self) -> &WorldHandle {
        &self.world
    }

    pub fn state(&self) -> RaidState {
        self.inner.lock().state
    }

    pub fn roster(&self) -> Vec<PlayerId> {
        self.inner.lock().roster()
    }

    pub fn difficulty(&self) -> RaidDifficulty {
        self.inner.lock().difficulty
    }

    pub fn boss_entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.inner.lock().bosses.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn boss_pool(&self, entity: EntityId) -> Option<Arc<DamagePool>> {
        self.inner.lock().bosses.get(&entity).cloned()
    }

    pub fn boss_damage_multiplier(&self) -> f64 {
        self.inner.lock().boss_damage_multiplier
    }

    pub fn last_boss_percent(&self) -> f64 {
        self.inner.lock().last_boss_percent
    }

    pub fn last_summary(&self) -> Option<RaidSummary> {
        self.inner.lock().last_summary.clone()
    }

    pub fn rewards_distributed(&self) -> bool {
        self.rewards_distributed.load(Ordering::Acquire)
    }

    pub fn tracker(&self) -> &DamageTracker {
        &self.tracker
    }

    pub fn spawn_point(&self) -> Position {
        self.center.center()
    }

    pub fn tick(&self, now: u64) {
        let config = &self.services.config;
        let mut inner = self.inner.lock();
        match inner.state {
            RaidState::Idle => {
                if now % config.auto_start_interval_ticks() == 0 {
                    self.enter_waiting(&mut inner, now);
                }
            }
            RaidState::Waiting => {
                let waited = now.saturating_sub(inner.start_tick);
                let wait = config.waiting_duration_ticks();
                if waited > wait {
                    self.begin_battle(&mut inner, now);
                    return;
                }
                let seconds_left = (wait - waited) / TICKS_PER_SECOND;
                if seconds_left > 0
                    && is_waiting_checkpoint(seconds_left)
                    && inner.last_announced_seconds != Some(seconds_left)
                {
                    inner.last_announced_seconds = Some(seconds_left);
                    self.world.notifier.broadcast(&waiting_countdown(seconds_left));
                }
            }
            RaidState::InBattle => {
                boss::pin_bosses(&self.world, &inner.bosses, self.spawn_point());
                let elapsed = now.saturating_sub(inner.battle_start_tick);
                let duration = config.raid_duration_ticks();
                if elapsed >= duration {
                    info!(world = %self.world.id, "raid timer expired");
                    self.finish_locked(&mut inner, false, now);
                    return;
                }
                let seconds_left = (duration - elapsed) / TICKS_PER_SECOND;
                if is_battle_checkpoint(seconds_left)
                    && inner.last_announced_seconds != Some(seconds_left)
                {
                    inner.last_announced_seconds = Some(seconds_left);
                    let unit = if seconds_left == 1 { "second" } else { "seconds" };
                    self.world
                        .notifier
                        .broadcast(&format!("Raid ends in {seconds_left} {unit}!"));
                }
            }
            RaidState::Completed => {
                let rearm = std::mem::take(&mut inner.rearm_pending);
                self.reset_encounter(&mut inner);
                if rearm {
                    self.enter_waiting(&mut inner, now);
                } else {
                    inner.state = RaidState::Idle;
                    info!(world = %self.world.id, "raid session idle");
                }
            }
        }
    }

    fn enter_waiting(&self, inner: &mut SessionInner, now: u64) {
        inner.players.clear();
        inner.start_tick = now;
        inner.last_announced_seconds = None;
        inner.state = RaidState::Waiting;
        self.rewards_distributed.store(false, Ordering::Release);
        info!(world = %self.world.id, tick = now, "raid waiting");

        self.world.notifier.broadcast(RAID_SOON_MESSAGE);
        let target = self.spawn_point();
        for player in self.world.host.online_players() {
            self.services.teleports.offer(&self.world, &player, target);
        }
    }

    fn begin_battle(&self, inner: &mut SessionInner, now: u64) {
        let config = &self.services.config;
        let nearby = self
            .world
            .host
            .players_near(&self.spawn_point(), config.enroll_radius());
        for player in nearby {
            self.add_player_locked(inner, &player);
        }

        self.leaderboard.reset();
        self.tracker.reset();
        self.rewards_distributed.store(false, Ordering::Release);
        inner.state = RaidState::InBattle;
        inner.start_tick = now;
        inner.battle_start_tick = now;
        inner.last_announced_seconds = None;
        inner.last_summary = None;
        self.spawn_locked(inner);
        info!(world = %self.world.id, tick = now, players = inner.players.len(), "raid battle begins");
        self.world.notifier.broadcast(RAID_BEGUN_MESSAGE);

        let roster = inner.roster();
        if roster.is_empty() || self.start_battle_locked(inner, &roster) {
            return;
        }
        let mut started = 0;
        for player in roster.iter().filter(|p| self.world.host.is_online(p)) {
            if self.start_battle_locked(inner, std::slice::from_ref(player)) {
                started += 1;
            }
        }
        debug!(world = %self.world.id, started, "per-player battle fallback finished");
    }

    fn reset_encounter(&self, inner: &mut SessionInner) {
        inner.players.clear();
        boss::despawn_bosses(&self.world, &mut inner.bosses);
        inner.last_announced_seconds = None;
        inner.last_boss_percent = -1.0;
        inner.boss_damage_multiplier = 1.0;
        inner.attack_cooldowns.clear();
        self.tracker.reset();
        self.leaderboard.reset();
    }

    fn spawn_locked(&self, inner: &mut SessionInner) -> Option<EntityId> {
        let anchor = inner
            .roster()
            .into_iter()
            .find(|player| self.world.host.is_online(player));
        let spawned = boss::spawn_boss(
            &self.world,
            &self.services.config,
            &inner.difficulty.tier(),
            self.spawn_point(),
            anchor.as_ref(),
        )?;
        inner.bosses.insert(spawned.entity, spawned.pool.clone());
        self.report_health(inner, spawned.pool.percent_remaining(), true);
        Some(spawned.entity)
    }

    fn ensure_boss_locked(&self, inner: &mut SessionInner) -> Option<EntityId> {
        if let Some((id, _)) = inner.primary_boss() {
            return Some(id);
        }
        if inner.state != RaidState::InBattle {
            return None;
        }
        self.spawn_locked(inner)
    }

    fn start_battle_locked(&self, inner: &mut SessionInner, players: &[PlayerId]) -> bool {
        let Some(boss) = self.ensure_boss_locked(inner) else {
            warn!(world = %self.world.id, "no raid boss to battle");
            return false;
        };
        self.start_battle_against(boss, players)
    }

    fn start_battle_against(&self, boss: EntityId, players: &[PlayerId]) -> bool {
        match self.services.battle.start(&self.world, boss, players) {
            Ok(_) => true,
            Err(error) => {
                warn!(world = %self.world.id, error = %error, "battle start failed, in-world participation still possible");
                false
            }
        }
    }

    /// Bulk start for the whole roster.
    pub fn start_battle_for_session(&self) -> bool {
        let mut inner = self.inner.lock();
        let roster = inner.roster();
        self.start_battle_locked(&mut inner, &roster)
    }

    pub fn start_battle_for_player(&self, player: &PlayerId) -> bool {
        let mut inner = self.inner.lock();
        self.start_battle_locked(&mut inner, std::slice::from_ref(player))
    }

    fn report_health(&self, inner: &mut SessionInner, percent: f64, force: bool) {
        let threshold = self.services.config.send_threshold();
        let last = inner.last_boss_percent;
        if !force && last >= 0.0 && (last - percent).abs() <= threshold {
            return;
        }
        inner.last_boss_percent = percent;
        for player in inner.roster() {
            if self.world.host.is_online(&player) {
                self.world
                    .notifier
                    .send_health_update(&player, percent, BOSS_LABEL);
            }
        }
    }

    /// Ends the encounter. No-op unless waiting or in battle.
    pub fn finish_raid(&self, victory: bool) {
        let now = self.world.host.game_time();
        let mut inner = self.inner.lock();
        self.finish_locked(&mut inner, victory, now);
    }

    fn finish_locked(&self, inner: &mut SessionInner, victory: bool, now: u64) {
        if !inner.state.is_active() {
            return;
        }
        let roster = inner.roster();
        let online: Vec<PlayerId> = roster
            .iter()
            .filter(|player| self.world.host.is_online(player))
            .cloned()
            .collect();
        self.services.battle.end_battles(&self.world, &online);

        let (hp_pool, accumulated_damage) = inner
            .bosses
            .values()
            .fold((0u64, 0u64), |(hp, acc), pool| {
                (
                    hp.saturating_add(pool.hp_pool()),
                    acc.saturating_add(pool.accumulated()),
                )
            });
        let config = &self.services.config;
        let mut ranking = rewards::rank_rows(
            &self.world,
            self.leaderboard.top(usize::MAX),
            config.leaderboard_top_n(),
        );
        rewards::assign_tiers(
            &mut ranking,
            accumulated_damage,
            config.tier_a_cutoff(),
            config.tier_b_cutoff(),
        );

        if victory {
            self.world.notifier.broadcast(TOP_PLAYERS_HEADER);
            for line in &ranking {
                self.world.notifier.broadcast(&format_line(line));
            }
            self.distribute_locked(&roster);
        } else {
            self.world.notifier.broadcast(DEFEAT_MESSAGE);
        }

        let duration_ticks = if inner.state == RaidState::InBattle {
            now.saturating_sub(inner.battle_start_tick)
        } else {
            0
        };
        inner.last_summary = Some(RaidSummary {
            world: self.world.id.clone(),
            victory,
            duration_ticks,
            hp_pool,
            accumulated_damage,
            participants: roster.len(),
            difficulty: inner.difficulty,
            ranking,
        });

        boss::despawn_bosses(&self.world, &mut inner.bosses);
        inner.state = RaidState::Completed;
        info!(world = %self.world.id, victory, participants = roster.len(), "raid finished");
    }

    fn distribute_locked(&self, roster: &[PlayerId]) -> bool {
        if self
            .rewards_distributed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(world = %self.world.id, "rewards already distributed");
            return false;
        }
        let mut rng = self.rng.lock();
        rewards::distribute_rewards(
            &self.world,
            &self.services.rewards,
            roster,
            &self.tracker,
            &mut rng,
            self.services.config.reward_leaderboard_size(),
        );
        true
    }

    /// Grants rewards to the current roster unless this encounter already
    /// paid out. Returns whether anything was distributed.
    pub fn distribute_rewards(&self) -> bool {
        let roster = self.roster();
        self.distribute_locked(&roster)
    }

    /// Folds one hit on a managed boss into its pool. `native_health` is the
    /// combat engine's own health for the boss; the returned native damage
    /// never takes it below 1.
    pub fn on_damage_dealt(
        &self,
        attacker: &PlayerId,
        target: EntityId,
        amount: f64,
        native_health: f64,
    ) -> Option<DamageOutcome> {
        let (pool, multiplier) = {
            let inner = self.inner.lock();
            let pool = inner.bosses.get(&target)?.clone();
            (pool, inner.difficulty.tier().player_damage_multiplier)
        };

        let recorded = scale_damage(amount, multiplier);
        let hit = pool.apply(recorded);
        if recorded > 0 {
            self.tracker.record(attacker, recorded);
            self.leaderboard.add(attacker, i64::try_from(recorded).unwrap_or(i64::MAX));
        }

        let mut inner = self.inner.lock();
        self.advance_phase(&mut inner, &pool);
        self.report_health(&mut inner, hit.percent_remaining, false);
        if hit.depleted_now {
            info!(world = %self.world.id, entity = %target, accumulated = hit.accumulated, "raid boss pool depleted");
            let now = self.world.host.game_time();
            self.finish_locked(&mut inner, true, now);
        }
        drop(inner);

        Some(DamageOutcome {
            native_damage: clamp_native_damage(amount, native_health),
            recorded,
            percent_remaining: hit.percent_remaining,
            victory: hit.depleted_now,
        })
    }

    fn advance_phase(&self, inner: &mut SessionInner, pool: &DamagePool) {
        let config = &self.services.config;
        if let Some(phase) = pool.advance_phase(&config.phase_thresholds()) {
            inner.boss_damage_multiplier = 1.0 + phase as f64 * config.enrage_step();
            info!(world = %self.world.id, phase, multiplier = inner.boss_damage_multiplier, "raid boss enraged");
            self.world
                .notifier
                .broadcast(&format!("The raid boss grows enraged! (phase {phase})"));
        }
    }

    /// Scales damage dealt by a managed boss. Other entities pass through.
    pub fn on_boss_attack(&self, boss: EntityId, amount: f64) -> f64 {
        let inner = self.inner.lock();
        if !inner.bosses.contains_key(&boss) {
            return amount;
        }
        let enrage = if inner.boss_damage_multiplier > 0.0 {
            inner.boss_damage_multiplier
        } else {
            1.0
        };
        amount * enrage * inner.difficulty.tier().boss_damage_multiplier
    }

    pub fn on_entity_death(&self, entity: EntityId) -> DeathVerdict {
        let mut inner = self.inner.lock();
        let Some(pool) = inner.bosses.get(&entity).cloned() else {
            return DeathVerdict::Ignore;
        };
        if !pool.is_depleted() {
            debug!(world = %self.world.id, entity = %entity, "vetoed native boss death");
            return DeathVerdict::Cancel;
        }
        let now = self.world.host.game_time();
        self.finish_locked(&mut inner, true, now);
        DeathVerdict::Allow
    }

    /// In-world hit on the boss. Starts a battle for roster members near the
    /// boss, or only the attacker when none are in range. Returns whether a
    /// battle was started.
    pub fn on_boss_attacked(&self, attacker: &PlayerId, boss_entity: EntityId) -> bool {
        let config = &self.services.config;
        if !boss::is_raid_boss(&self.world, config, boss_entity) {
            return false;
        }
        let now = self.world.host.game_time();
        let mut inner = self.inner.lock();
        if !inner.state.is_active() {
            return false;
        }
        if let Some(last) = inner.attack_cooldowns.get(&boss_entity) {
            if now.saturating_sub(*last) < config.attack_cooldown_ticks {
                debug!(world = %self.world.id, entity = %boss_entity, "boss attack on cooldown");
                return false;
            }
        }
        inner.attack_cooldowns.insert(boss_entity, now);

        let roster = inner.roster();
        let notice = format!("{} attacked the raid boss", self.world.player_label(attacker));
        for player in roster.iter().filter(|p| self.world.host.is_online(p)) {
            self.world.message(player, &notice);
        }

        let mut subset: Vec<PlayerId> = match self.world.host.entity(boss_entity) {
            Some(info) => roster
                .into_iter()
                .filter(|player| {
                    self.world
                        .host
                        .player_position(player)
                        .map(|pos| pos.within(&info.position, config.attack_proximity_radius()))
                        .unwrap_or(false)
                })
                .collect(),
            None => Vec::new(),
        };
        if subset.is_empty() && self.world.host.is_online(attacker) {
            subset.push(attacker.clone());
        }
        if subset.is_empty() {
            return false;
        }
        drop(inner);
        self.start_battle_against(boss_entity, &subset)
    }

    /// Capture device or projectile landed on a boss: enroll the thrower and,
    /// mid-battle, pull them into a fight.
    pub fn on_projectile_hit(&self, thrower: &PlayerId, target: EntityId) -> bool {
        if !boss::is_raid_boss(&self.world, &self.services.config, target) {
            return false;
        }
        let mut inner = self.inner.lock();
        if !inner.state.is_active() {
            return false;
        }
        if self.add_player_locked(&mut inner, thrower) {
            self.world.message(thrower, JOINED_MESSAGE);
        } else if !inner.players.contains(thrower) {
            return false;
        }
        if inner.state == RaidState::InBattle {
            return self.start_battle_locked(&mut inner, std::slice::from_ref(thrower));
        }
        true
    }

    fn add_player_locked(&self, inner: &mut SessionInner, player: &PlayerId) -> bool {
        if inner.players.contains(player) {
            return false;
        }
        if inner.players.len() >= self.services.config.max_players_per_raid() {
            debug!(world = %self.world.id, player = %player, "raid roster full");
            return false;
        }
        inner.players.insert(player.clone())
    }

    /// Adds `player` to the roster while a raid is waiting or running.
    /// Returns false when already enrolled, full, or no raid is open.
    pub fn join_raid(&self, player: &PlayerId, teleport: bool) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.is_active() || !self.add_player_locked(&mut inner, player) {
            return false;
        }
        info!(world = %self.world.id, player = %player, "player joined raid");

        if teleport {
            match self.world.host.teleport_player(player, self.spawn_point()) {
                Ok(()) => self.world.message(player, "Teleported to raid area."),
                Err(error) => {
                    warn!(world = %self.world.id, player = %player, error = %error, "join teleport failed")
                }
            }
        }
        if inner.state == RaidState::InBattle {
            self.start_battle_locked(&mut inner, std::slice::from_ref(player));
        }
        true
    }

    /// Jumps straight to the battle phase from idle or waiting.
    pub fn force_start(&self) -> Result<String, CommandError> {
        let now = self.world.host.game_time();
        let mut inner = self.inner.lock();
        match inner.state {
            RaidState::InBattle => return Err(CommandError::AlreadyInProgress),
            RaidState::Waiting => {}
            RaidState::Idle | RaidState::Completed => {
                inner.rearm_pending = false;
                self.reset_encounter(&mut inner);
                self.enter_waiting(&mut inner, now);
            }
        }
        self.begin_battle(&mut inner, now);
        Ok("Raid has been started.".to_string())
    }

    pub fn force_cancel(&self) -> Result<String, CommandError> {
        let mut inner = self.inner.lock();
        if inner.state != RaidState::Waiting {
            return Err(CommandError::NothingToCancel);
        }
        inner.players.clear();
        inner.state = RaidState::Completed;
        info!(world = %self.world.id, "upcoming raid cancelled");
        Ok("Upcoming raid cancelled.".to_string())
    }

    /// Aborts a waiting or running raid without rewards and re-arms the
    /// countdown on the next tick.
    pub fn force_stop(&self) -> Result<String, CommandError> {
        let mut inner = self.inner.lock();
        if !inner.state.is_active() {
            return Err(CommandError::NothingToStop);
        }
        let online: Vec<PlayerId> = inner
            .roster()
            .into_iter()
            .filter(|player| self.world.host.is_online(player))
            .collect();
        self.services.battle.end_battles(&self.world, &online);
        boss::despawn_bosses(&self.world, &mut inner.bosses);
        inner.players.clear();
        inner.state = RaidState::Completed;
        inner.rearm_pending = true;
        info!(world = %self.world.id, "raid stopped by admin");
        Ok("Raid has been stopped.".to_string())
    }

    pub fn set_difficulty(&self, name: &str) -> Result<String, CommandError> {
        let difficulty = RaidDifficulty::parse(name).ok_or_else(|| {
            let names: Vec<&str> = RaidDifficulty::ALL.iter().map(|d| d.name()).collect();
            CommandError::InvalidDifficulty(names.join(", "))
        })?;
        self.inner.lock().difficulty = difficulty;
        info!(world = %self.world.id, difficulty = %difficulty, "raid difficulty changed");
        Ok(format!("Raid difficulty set to: {difficulty}"))
    }

    pub fn status(&self) -> RaidStatusView {
        let config = &self.services.config;
        let now = self.world.host.game_time();
        let inner = self.inner.lock();
        let boss_percent = inner
            .primary_boss()
            .map(|(_, pool)| pool.percent_remaining());

        let (seconds_left, message) = match inner.state {
            RaidState::Waiting => {
                let remaining = config
                    .waiting_duration_ticks()
                    .saturating_sub(now.saturating_sub(inner.start_tick));
                let seconds = remaining.div_ceil(TICKS_PER_SECOND);
                (
                    Some(seconds),
                    format!("Raid starts in {}", format_countdown(seconds)),
                )
            }
            RaidState::InBattle => {
                let remaining = config
                    .raid_duration_ticks()
                    .saturating_sub(now.saturating_sub(inner.battle_start_tick));
                let seconds = remaining.div_ceil(TICKS_PER_SECOND);
                let mut text = format!(
                    "Raid in progress — time left: {}",
                    format_countdown(seconds)
                );
                if let Some(percent) = boss_percent {
                    text.push_str(&format!(" (boss at {:.1}%)", percent * 100.0));
                }
                (Some(seconds), text)
            }
            RaidState::Idle | RaidState::Completed => {
                (None, "No raid starting right now.".to_string())
            }
        };

        RaidStatusView {
            world: self.world.id.clone(),
            state: inner.state,
            seconds_left,
            players: inner.players.len(),
            boss_percent,
            difficulty: inner.difficulty,
            boss_damage_multiplier: inner.boss_damage_multiplier,
            message,
        }
    }
}

fn waiting_countdown(seconds_left: u64) -> String {
    if seconds_left % 60 == 0 {
        let minutes = seconds_left / 60;
        let unit = if minutes == 1 { "minute" } else { "minutes" };
        format!("Raid begins in {minutes} {unit}!")
    } else {
        format!("Raid starts in {seconds_left} seconds!")
    }
}

/// `max(0, round(amount × multiplier))`; non-finite input records nothing.
pub fn scale_damage(amount: f64, multiplier: f64) -> u64 {
    let scaled = (amount * multiplier).round();
    if scaled.is_finite() && scaled > 0.0 {
        scaled as u64
    } else {
        0
    }
}

/// Native damage that leaves the engine's own health at 1 or more.
pub fn clamp_native_damage(amount: f64, native_health: f64) -> f64 {
    let headroom = (native_health - 1.0).max(0.0);
    amount.max(0.0).min(headroom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::{BattleEngineAdapter, SimBattleEngine};
    use crate::config::RaidConfig;
    use crate::rewards::{RewardEntry, RewardTable};
    use crate::types::ContributionTier;
    use crate::world::{sim_handle, SimWorld, WorldHost};

    struct Fixture {
        sim: Arc<SimWorld>,
        engine: Arc<SimBattleEngine>,
        session: RaidSession,
    }

    fn fixture(config: RaidConfig) -> Fixture {
        let sim = Arc::new(SimWorld::new());
        let engine = Arc::new(SimBattleEngine::new("builder"));
        let services = RaidServices::new(
            RaidConfig {
                reward_seed: Some(7),
                ..config
            },
            BattleEngineAdapter::new(vec![engine.clone()]),
            RewardTable::in_memory(vec![RewardEntry::new("pixelmon:rare_candy", 2, 1.0)]),
        );
        let session = RaidSession::new(sim_handle("overworld", sim.clone()), Arc::new(services));
        Fixture {
            sim,
            engine,
            session,
        }
    }

    fn near_center() -> Position {
        Position {
            x: 2.0,
            y: 80.0,
            z: 2.0,
        }
    }

    fn add_player(f: &Fixture, id: &str) -> PlayerId {
        let player = PlayerId::new(id);
        f.sim.add_player(&player, id, near_center());
        f.engine.set_party(&player, 1);
        player
    }

    /// Drives the session into battle with a 1000-point pool.
    fn battle_with_pool(f: &Fixture, players: &[&str]) -> (Vec<PlayerId>, EntityId) {
        let ids: Vec<PlayerId> = players.iter().map(|id| add_player(f, id)).collect();
        f.session.force_start().expect("starts");
        let boss = f.session.boss_entities()[0];
        (ids, boss)
    }

    fn pool_1000_config() -> RaidConfig {
        // Sim base health at level 1 is 33.
        RaidConfig {
            boss_level: 1,
            hp_multiplier: 1000.0 / 33.0,
            ..RaidConfig::default()
        }
    }

    #[test]
    fn pool_fixture_is_exactly_one_thousand() {
        let f = fixture(pool_1000_config());
        let (_, boss) = battle_with_pool(&f, &["a"]);
        let pool = f.session.boss_pool(boss).expect("pool");
        assert_eq!(pool.hp_pool(), 1000);
    }

    #[test]
    fn health_bar_is_throttled_by_send_threshold() {
        let f = fixture(pool_1000_config());
        let (ids, boss) = battle_with_pool(&f, &["a"]);
        let a = &ids[0];
        let first = f.sim.health_updates().len();
        assert_eq!(f.session.last_boss_percent(), 1.0);

        f.session.on_damage_dealt(a, boss, 3.0, 500.0);
        assert_eq!(f.sim.health_updates().len(), first);

        f.session.on_damage_dealt(a, boss, 4.0, 500.0);
        let updates = f.sim.health_updates();
        assert_eq!(updates.len(), first + 1);
        assert!((updates[updates.len() - 1].1 - 0.993).abs() < 1e-9);

        let outcome = f
            .session
            .on_damage_dealt(a, boss, 995.0, 500.0)
            .expect("boss hit");
        assert!(outcome.victory);
        assert_eq!(f.session.state(), RaidState::Completed);
        let summary = f.session.last_summary().expect("summary");
        assert!(summary.victory);
        assert_eq!(summary.accumulated_damage, 1002);
    }

    #[test]
    fn victory_fires_once_and_rewards_are_not_repeated() {
        let f = fixture(pool_1000_config());
        let (ids, boss) = battle_with_pool(&f, &["a", "b"]);

        let first = f.session.on_damage_dealt(&ids[0], boss, 600.0, 500.0);
        let pool = f.session.boss_pool(boss).expect("pool");
        let second = f.session.on_damage_dealt(&ids[1], boss, 600.0, 500.0);

        assert_eq!(first.map(|o| o.victory), Some(false));
        assert_eq!(second.map(|o| o.victory), Some(true));
        assert_eq!(pool.accumulated(), 1200);
        assert!(f.session.rewards_distributed());
        assert_eq!(f.sim.inventory(&ids[0]), vec![("pixelmon:rare_candy".to_string(), 2)]);

        assert!(!f.session.distribute_rewards());
        f.session.finish_raid(true);
        assert_eq!(f.sim.inventory(&ids[0]), vec![("pixelmon:rare_candy".to_string(), 2)]);
        let headers = f
            .sim
            .broadcasts()
            .into_iter()
            .filter(|line| line == TOP_PLAYERS_HEADER)
            .count();
        assert_eq!(headers, 1);
    }

    #[test]
    fn enormous_hit_saturates_pool_and_leaderboard() {
        let f = fixture(pool_1000_config());
        let (ids, boss) = battle_with_pool(&f, &["a", "b"]);

        let outcome = f
            .session
            .on_damage_dealt(&ids[0], boss, 1e20, 500.0)
            .expect("boss hit");
        assert!(outcome.victory);
        assert_eq!(outcome.recorded, u64::MAX);
        assert_eq!(f.session.tracker().damage_of(&ids[0]), u64::MAX);

        let broadcasts = f.sim.broadcasts();
        let header = broadcasts
            .iter()
            .position(|line| line == TOP_PLAYERS_HEADER)
            .expect("top players announced");
        assert_eq!(broadcasts[header + 1], format!("#1 a - {} dmg", i64::MAX));
        assert!(broadcasts.iter().all(|line| !line.contains("- -")));

        let summary = f.session.last_summary().expect("summary");
        assert_eq!(summary.accumulated_damage, u64::MAX);
        assert_eq!(summary.ranking[0].damage, i64::MAX);
    }

    #[test]
    fn summary_ranks_players_into_contribution_tiers() {
        let f = fixture(pool_1000_config());
        let (ids, boss) = battle_with_pool(&f, &["a", "b", "c"]);
        f.session.on_damage_dealt(&ids[0], boss, 50.0, 500.0);
        f.session.on_damage_dealt(&ids[1], boss, 150.0, 500.0);
        f.session.on_damage_dealt(&ids[2], boss, 1000.0, 500.0);

        let summary = f.session.last_summary().expect("summary");
        assert_eq!(summary.accumulated_damage, 1200);
        let tiers: Vec<(String, Option<ContributionTier>)> = summary
            .ranking
            .iter()
            .map(|line| (line.name.clone(), line.tier))
            .collect();
        assert_eq!(
            tiers,
            vec![
                ("c".to_string(), Some(ContributionTier::A)),
                ("b".to_string(), Some(ContributionTier::B)),
                ("a".to_string(), Some(ContributionTier::C)),
            ]
        );
    }

    #[test]
    fn native_damage_never_kills_the_boss() {
        assert_eq!(clamp_native_damage(50.0, 20.0), 19.0);
        assert_eq!(clamp_native_damage(5.0, 20.0), 5.0);
        assert_eq!(clamp_native_damage(5.0, 1.0), 0.0);
        assert_eq!(clamp_native_damage(-3.0, 20.0), 0.0);
        assert_eq!(scale_damage(10.0, 0.85), 9);
        assert_eq!(scale_damage(-4.0, 1.0), 0);
        assert_eq!(scale_damage(f64::NAN, 1.0), 0);
    }

    #[test]
    fn death_is_vetoed_until_pool_is_depleted() {
        let f = fixture(pool_1000_config());
        let (_, boss) = battle_with_pool(&f, &["a"]);
        assert_eq!(f.session.on_entity_death(boss), DeathVerdict::Cancel);
        assert_eq!(f.session.on_entity_death(EntityId(9999)), DeathVerdict::Ignore);
        assert_eq!(f.session.state(), RaidState::InBattle);
    }

    #[test]
    fn phases_raise_boss_damage_multiplier() {
        let f = fixture(pool_1000_config());
        let (ids, boss) = battle_with_pool(&f, &["a"]);
        assert_eq!(f.session.on_boss_attack(boss, 10.0), 10.0);

        f.session.on_damage_dealt(&ids[0], boss, 520.0, 500.0);
        assert_eq!(f.session.boss_damage_multiplier(), 1.5);
        assert_eq!(f.session.on_boss_attack(boss, 10.0), 15.0);
        assert_eq!(f.session.on_boss_attack(EntityId(4242), 10.0), 10.0);
        assert!(f
            .sim
            .broadcasts()
            .contains(&"The raid boss grows enraged! (phase 2)".to_string()));
    }

    #[test]
    fn difficulty_scales_player_damage_and_pool() {
        let f = fixture(pool_1000_config());
        f.session.set_difficulty("hard").expect("valid");
        let (ids, boss) = battle_with_pool(&f, &["a"]);
        let pool = f.session.boss_pool(boss).expect("pool");
        assert_eq!(pool.hp_pool(), 1500);

        let outcome = f
            .session
            .on_damage_dealt(&ids[0], boss, 100.0, 500.0)
            .expect("hit");
        assert_eq!(outcome.recorded, 85);
        assert_eq!(
            f.session.set_difficulty("legendary"),
            Err(CommandError::InvalidDifficulty(
                "easy, normal, hard, nightmare".to_string()
            ))
        );
    }

    #[test]
    fn roster_respects_capacity() {
        let f = fixture(RaidConfig {
            max_players_per_raid: 2,
            ..RaidConfig::default()
        });
        f.session.tick(0);
        assert_eq!(f.session.state(), RaidState::Waiting);

        let ids: Vec<PlayerId> = ["a", "b", "c"].iter().map(|id| add_player(&f, id)).collect();
        assert!(f.session.join_raid(&ids[0], false));
        assert!(!f.session.join_raid(&ids[0], false));
        assert!(f.session.join_raid(&ids[1], false));
        assert!(!f.session.join_raid(&ids[2], false));
        assert_eq!(f.session.roster().len(), 2);
    }

    #[test]
    fn join_with_teleport_moves_player_to_spawn() {
        let f = fixture(RaidConfig::default());
        f.session.tick(0);
        let player = PlayerId::new("far");
        f.sim.add_player(
            &player,
            "Far",
            Position {
                x: 300.0,
                y: 70.0,
                z: 300.0,
            },
        );
        assert!(f.session.join_raid(&player, true));
        assert_eq!(
            f.sim.player_position(&player),
            Some(f.session.spawn_point())
        );
        assert!(f
            .sim
            .messages_for(&player)
            .contains(&"Teleported to raid area.".to_string()));
    }

    #[test]
    fn countdown_announcements_are_deduplicated() {
        let f = fixture(RaidConfig {
            waiting_duration_seconds: 70,
            ..RaidConfig::default()
        });
        f.session.tick(0);
        for tick in 181..=200 {
            f.session.tick(tick);
        }
        let minute = f
            .sim
            .broadcasts()
            .into_iter()
            .filter(|line| line == "Raid begins in 1 minute!")
            .count();
        assert_eq!(minute, 1);
    }

    #[test]
    fn stop_while_waiting_completes_without_boss_and_rearms() {
        let f = fixture(RaidConfig::default());
        let a = add_player(&f, "a");
        f.session.tick(0);
        assert!(f.session.join_raid(&a, false));

        assert_eq!(
            f.session.force_stop().as_deref(),
            Ok("Raid has been stopped.")
        );
        assert_eq!(f.session.state(), RaidState::Completed);
        assert!(f.session.roster().is_empty());
        assert!(f.session.boss_entities().is_empty());
        assert!(!f.session.rewards_distributed());
        assert_eq!(f.sim.entity_count(), 0);

        f.session.tick(5);
        assert_eq!(f.session.state(), RaidState::Waiting);
        assert_eq!(f.session.force_stop().map(|_| ()), Ok(()));
        f.session.tick(6);
        f.session.force_cancel().expect("waiting again");
        assert_eq!(f.session.force_stop(), Err(CommandError::NothingToStop));
    }

    #[test]
    fn cancel_only_applies_while_waiting() {
        let f = fixture(RaidConfig::default());
        assert_eq!(f.session.force_cancel(), Err(CommandError::NothingToCancel));
        f.session.tick(0);
        assert!(f.session.force_cancel().is_ok());
        f.session.tick(1);
        assert_eq!(f.session.state(), RaidState::Idle);
    }

    #[test]
    fn force_start_rejects_running_raid() {
        let f = fixture(RaidConfig::default());
        add_player(&f, "a");
        assert!(f.session.force_start().is_ok());
        assert_eq!(f.session.state(), RaidState::InBattle);
        assert_eq!(f.session.force_start(), Err(CommandError::AlreadyInProgress));
        assert_eq!(f.engine.active_count(), 1);
    }

    #[test]
    fn boss_attack_starts_battle_for_nearby_roster_only() {
        let f = fixture(RaidConfig::default());
        let a = PlayerId::new("a");
        let b = PlayerId::new("b");
        f.sim.add_player(&a, "Alpha", near_center());
        f.sim.add_player(
            &b,
            "Bravo",
            Position {
                x: 200.0,
                y: 80.0,
                z: 200.0,
            },
        );
        // No parties yet, so the automatic start finds nobody eligible.
        f.session.force_start().expect("starts");
        assert!(f.session.join_raid(&b, false));
        assert!(f.engine.started().is_empty());
        f.engine.set_party(&a, 1);
        f.engine.set_party(&b, 1);

        let boss = f.session.boss_entities()[0];
        assert!(f.session.on_boss_attacked(&b, boss));
        assert_eq!(f.engine.started(), vec![vec![a.clone()]]);
        assert!(f
            .sim
            .messages_for(&a)
            .contains(&"Bravo attacked the raid boss".to_string()));

        // Cooldown blocks an immediate second trigger.
        assert!(!f.session.on_boss_attacked(&b, boss));

        // Nobody in range: only the attacker is pulled in.
        f.sim.move_player(
            &a,
            Position {
                x: -200.0,
                y: 80.0,
                z: 0.0,
            },
        );
        f.sim.advance(40);
        assert!(f.session.on_boss_attacked(&b, boss));
        assert_eq!(f.engine.started().last(), Some(&vec![b.clone()]));
        assert_eq!(f.session.roster(), vec![a, b]);
    }

    #[test]
    fn projectile_hit_enrolls_thrower_and_starts_battle() {
        let f = fixture(RaidConfig::default());
        add_player(&f, "a");
        f.session.force_start().expect("starts");
        let boss = f.session.boss_entities()[0];

        let thrower = PlayerId::new("thrower");
        f.sim.add_player(
            &thrower,
            "Thrower",
            Position {
                x: 40.0,
                y: 80.0,
                z: 0.0,
            },
        );
        f.engine.set_party(&thrower, 2);
        assert!(f.session.on_projectile_hit(&thrower, boss));
        assert!(f.session.roster().contains(&thrower));
        assert!(f
            .sim
            .messages_for(&thrower)
            .contains(&JOINED_MESSAGE.to_string()));
        assert_eq!(f.engine.started().last(), Some(&vec![thrower.clone()]));

        let rock = f.sim.spawn_creature("geodude", near_center());
        assert!(!f.session.on_projectile_hit(&thrower, rock));
    }

    #[test]
    fn timer_expiry_is_a_defeat() {
        let f = fixture(RaidConfig {
            default_raid_duration_seconds: 10,
            ..RaidConfig::default()
        });
        add_player(&f, "a");
        f.session.force_start().expect("starts");
        for tick in 0..=200 {
            f.session.tick(tick);
        }
        assert_eq!(f.session.state(), RaidState::Completed);
        assert!(f.sim.broadcasts().contains(&"Raid ends in 10 seconds!".to_string()));
        assert!(f.sim.broadcasts().contains(&DEFEAT_MESSAGE.to_string()));
        assert!(!f.session.rewards_distributed());
        assert_eq!(f.engine.active_count(), 0);
        assert_eq!(f.sim.entity_count(), 0);
    }

    #[test]
    fn status_text_follows_state() {
        let f = fixture(RaidConfig::default());
        assert_eq!(f.session.status().message, "No raid starting right now.");
        f.session.tick(0);
        let status = f.session.status();
        assert_eq!(status.state, RaidState::Waiting);
        assert_eq!(status.message, "Raid starts in 30s");

        add_player(&f, "a");
        f.session.force_start().expect("starts");
        let status = f.session.status();
        assert!(status.message.starts_with("Raid in progress — time left: 2m 0s"));
        assert!(status.message.ends_with("(boss at 100.0%)"));
    }
}
