use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::constants::NOTIFICATION_BACKLOG;
use crate::error::WorldError;
use crate::types::{EntityId, PlayerId, Position, WorldId};

/// Creature template the boss manager asks the host to build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BossTemplate {
    pub species: String,
    pub level: u32,
}

/// Host-side creation paths, tried in declaration order by the boss manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnStrategy {
    /// Spawn next to an online anchor player.
    AnchoredToPlayer,
    /// Build the entity straight into the world.
    WorldDirect,
    /// Build a detached entity and add it afterwards.
    EntityFactory,
}

impl SpawnStrategy {
    pub const ORDER: [SpawnStrategy; 3] = [
        Self::AnchoredToPlayer,
        Self::WorldDirect,
        Self::EntityFactory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AnchoredToPlayer => "anchored",
            Self::WorldDirect => "world-direct",
            Self::EntityFactory => "entity-factory",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityInfo {
    pub id: EntityId,
    pub species: String,
    pub position: Position,
    pub boss_marker: bool,
    pub native_health: f64,
}

/// World/entity substrate the raid core drives. Every call may fail; callers
/// treat failures as "skip this step".
pub trait WorldHost: Send + Sync {
    fn game_time(&self) -> u64;
    fn online_players(&self) -> Vec<PlayerId>;
    fn player_name(&self, player: &PlayerId) -> Option<String>;
    fn player_position(&self, player: &PlayerId) -> Option<Position>;
    fn spawn_entity(
        &self,
        template: &BossTemplate,
        position: Position,
        strategy: SpawnStrategy,
        anchor: Option<&PlayerId>,
    ) -> Result<EntityId, WorldError>;
    fn remove_entity(&self, entity: EntityId) -> Result<(), WorldError>;
    fn entity(&self, entity: EntityId) -> Option<EntityInfo>;
    fn set_boss_marker(&self, entity: EntityId, marker: bool) -> Result<(), WorldError>;
    /// Disable AI, zero motion and move the entity to `position`.
    fn pin_entity(&self, entity: EntityId, position: Position) -> Result<(), WorldError>;
    fn teleport_player(&self, player: &PlayerId, position: Position) -> Result<(), WorldError>;
    /// `Ok(false)` means the inventory had no room.
    fn give_item(&self, player: &PlayerId, item: &str, count: u32) -> Result<bool, WorldError>;
    fn drop_item(&self, player: &PlayerId, item: &str, count: u32) -> Result<(), WorldError>;

    fn is_online(&self, player: &PlayerId) -> bool {
        self.online_players().iter().any(|id| id == player)
    }

    fn players_near(&self, point: &Position, radius: f64) -> Vec<PlayerId> {
        self.online_players()
            .into_iter()
            .filter(|id| {
                self.player_position(id)
                    .map(|pos| pos.within(point, radius))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Fire-and-forget client notifications.
pub trait Notifier: Send + Sync {
    fn send_message(&self, player: &PlayerId, text: &str);
    fn send_health_update(&self, player: &PlayerId, fraction: f64, label: &str);
    fn send_reward_summary(&self, player: &PlayerId, lines: &[String]);
    fn broadcast(&self, text: &str);
}

#[derive(Clone)]
pub struct WorldHandle {
    pub id: WorldId,
    pub host: Arc<dyn WorldHost>,
    pub notifier: Arc<dyn Notifier>,
}

impl WorldHandle {
    pub fn new(id: WorldId, host: Arc<dyn WorldHost>, notifier: Arc<dyn Notifier>) -> Self {
        Self { id, host, notifier }
    }

    pub fn player_label(&self, player: &PlayerId) -> String {
        self.host
            .player_name(player)
            .unwrap_or_else(|| player.to_string())
    }

    pub fn message(&self, player: &PlayerId, text: &str) {
        self.notifier.send_message(player, text);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Message {
        player: PlayerId,
        text: String,
    },
    Health {
        player: PlayerId,
        fraction: f64,
        label: String,
    },
    RewardSummary {
        player: PlayerId,
        lines: Vec<String>,
    },
    Broadcast {
        text: String,
    },
}

#[derive(Clone, Debug)]
struct SimPlayer {
    name: String,
    position: Position,
    online: bool,
    inventory: Vec<(String, u32)>,
    inventory_slots: usize,
    dropped: Vec<(String, u32)>,
}

#[derive(Clone, Debug)]
struct SimEntity {
    info: EntityInfo,
    ai_enabled: bool,
}

#[derive(Debug, Default)]
struct SimState {
    tick: u64,
    players: HashMap<PlayerId, SimPlayer>,
    entities: HashMap<EntityId, SimEntity>,
    next_entity_id: u64,
    unavailable_strategies: HashSet<SpawnStrategy>,
    notifications: VecDeque<Notification>,
}

/// In-memory host used by the binaries and tests.
#[derive(Debug, Default)]
pub struct SimWorld {
    state: Mutex<SimState>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: u64) -> u64 {
        let mut state = self.state.lock();
        state.tick += ticks;
        state.tick
    }

    pub fn add_player(&self, id: &PlayerId, name: &str, position: Position) {
        self.state.lock().players.insert(
            id.clone(),
            SimPlayer {
                name: name.to_string(),
                position,
                online: true,
                inventory: Vec::new(),
                inventory_slots: 36,
                dropped: Vec::new(),
            },
        );
    }

    pub fn set_online(&self, id: &PlayerId, online: bool) {
        if let Some(player) = self.state.lock().players.get_mut(id) {
            player.online = online;
        }
    }

    pub fn move_player(&self, id: &PlayerId, position: Position) {
        if let Some(player) = self.state.lock().players.get_mut(id) {
            player.position = position;
        }
    }

    pub fn set_inventory_slots(&self, id: &PlayerId, slots: usize) {
        if let Some(player) = self.state.lock().players.get_mut(id) {
            player.inventory_slots = slots;
        }
    }

    pub fn inventory(&self, id: &PlayerId) -> Vec<(String, u32)> {
        self.state
            .lock()
            .players
            .get(id)
            .map(|player| player.inventory.clone())
            .unwrap_or_default()
    }

    pub fn dropped(&self, id: &PlayerId) -> Vec<(String, u32)> {
        self.state
            .lock()
            .players
            .get(id)
            .map(|player| player.dropped.clone())
            .unwrap_or_default()
    }

    pub fn disable_strategy(&self, strategy: SpawnStrategy) {
        self.state.lock().unavailable_strategies.insert(strategy);
    }

    pub fn spawn_creature(&self, species: &str, position: Position) -> EntityId {
        let mut state = self.state.lock();
        let id = next_entity_id(&mut state);
        state.entities.insert(
            id,
            SimEntity {
                info: EntityInfo {
                    id,
                    species: species.to_string(),
                    position,
                    boss_marker: false,
                    native_health: 100.0,
                },
                ai_enabled: true,
            },
        );
        id
    }

    pub fn entity_count(&self) -> usize {
        self.state.lock().entities.len()
    }

    pub fn is_ai_enabled(&self, entity: EntityId) -> Option<bool> {
        self.state
            .lock()
            .entities
            .get(&entity)
            .map(|entity| entity.ai_enabled)
    }

    /// Applies already-clamped native damage and returns the remaining health.
    pub fn apply_native_damage(&self, entity: EntityId, amount: f64) -> Option<f64> {
        let mut state = self.state.lock();
        let entity = state.entities.get_mut(&entity)?;
        entity.info.native_health = (entity.info.native_health - amount.max(0.0)).max(0.0);
        Some(entity.info.native_health)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().notifications.iter().cloned().collect()
    }

    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.state.lock().notifications.drain(..).collect()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state
            .lock()
            .notifications
            .iter()
            .filter_map(|note| match note {
                Notification::Broadcast { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages_for(&self, player: &PlayerId) -> Vec<String> {
        self.state
            .lock()
            .notifications
            .iter()
            .filter_map(|note| match note {
                Notification::Message { player: to, text } if to == player => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn health_updates(&self) -> Vec<(PlayerId, f64)> {
        self.state
            .lock()
            .notifications
            .iter()
            .filter_map(|note| match note {
                Notification::Health {
                    player, fraction, ..
                } => Some((player.clone(), *fraction)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) {
        let mut state = self.state.lock();
        if state.notifications.len() >= NOTIFICATION_BACKLOG {
            state.notifications.pop_front();
        }
        state.notifications.push_back(notification);
    }
}

fn next_entity_id(state: &mut SimState) -> EntityId {
    state.next_entity_id += 1;
    EntityId(state.next_entity_id)
}

fn sim_base_health(level: u32) -> f64 {
    (level as f64 * 3.0 + 30.0).max(1.0)
}

impl WorldHost for SimWorld {
    fn game_time(&self) -> u64 {
        self.state.lock().tick
    }

    fn online_players(&self) -> Vec<PlayerId> {
        let state = self.state.lock();
        let mut ids: Vec<PlayerId> = state
            .players
            .iter()
            .filter(|(_, player)| player.online)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn player_name(&self, player: &PlayerId) -> Option<String> {
        self.state
            .lock()
            .players
            .get(player)
            .map(|player| player.name.clone())
    }

    fn player_position(&self, player: &PlayerId) -> Option<Position> {
        self.state
            .lock()
            .players
            .get(player)
            .filter(|player| player.online)
            .map(|player| player.position)
    }

    fn spawn_entity(
        &self,
        template: &BossTemplate,
        position: Position,
        strategy: SpawnStrategy,
        anchor: Option<&PlayerId>,
    ) -> Result<EntityId, WorldError> {
        let mut state = self.state.lock();
        if state.unavailable_strategies.contains(&strategy) {
            return Err(WorldError::SpawnUnavailable(strategy.name()));
        }
        if strategy == SpawnStrategy::AnchoredToPlayer && anchor.is_none() {
            return Err(WorldError::Rejected("anchored spawn needs a player".to_string()));
        }
        let id = next_entity_id(&mut state);
        state.entities.insert(
            id,
            SimEntity {
                info: EntityInfo {
                    id,
                    species: template.species.clone(),
                    position,
                    boss_marker: false,
                    native_health: sim_base_health(template.level),
                },
                ai_enabled: true,
            },
        );
        Ok(id)
    }

    fn remove_entity(&self, entity: EntityId) -> Result<(), WorldError> {
        self.state
            .lock()
            .entities
            .remove(&entity)
            .map(|_| ())
            .ok_or(WorldError::EntityNotFound(entity))
    }

    fn entity(&self, entity: EntityId) -> Option<EntityInfo> {
        self.state
            .lock()
            .entities
            .get(&entity)
            .map(|entity| entity.info.clone())
    }

    fn set_boss_marker(&self, entity: EntityId, marker: bool) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        let found = state
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        found.info.boss_marker = marker;
        Ok(())
    }

    fn pin_entity(&self, entity: EntityId, position: Position) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        let found = state
            .entities
            .get_mut(&entity)
            .ok_or(WorldError::EntityNotFound(entity))?;
        found.ai_enabled = false;
        found.info.position = position;
        Ok(())
    }

    fn teleport_player(&self, player: &PlayerId, position: Position) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        match state.players.get_mut(player) {
            Some(found) if found.online => {
                found.position = position;
                Ok(())
            }
            _ => Err(WorldError::PlayerOffline(player.clone())),
        }
    }

    fn give_item(&self, player: &PlayerId, item: &str, count: u32) -> Result<bool, WorldError> {
        let mut state = self.state.lock();
        let found = state
            .players
            .get_mut(player)
            .filter(|found| found.online)
            .ok_or_else(|| WorldError::PlayerOffline(player.clone()))?;
        if let Some(stack) = found.inventory.iter_mut().find(|(name, _)| name == item) {
            stack.1 += count;
            return Ok(true);
        }
        if found.inventory.len() >= found.inventory_slots {
            return Ok(false);
        }
        found.inventory.push((item.to_string(), count));
        Ok(true)
    }

    fn drop_item(&self, player: &PlayerId, item: &str, count: u32) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        let found = state
            .players
            .get_mut(player)
            .ok_or_else(|| WorldError::PlayerOffline(player.clone()))?;
        found.dropped.push((item.to_string(), count));
        Ok(())
    }
}

impl Notifier for SimWorld {
    fn send_message(&self, player: &PlayerId, text: &str) {
        self.push(Notification::Message {
            player: player.clone(),
            text: text.to_string(),
        });
    }

    fn send_health_update(&self, player: &PlayerId, fraction: f64, label: &str) {
        self.push(Notification::Health {
            player: player.clone(),
            fraction,
            label: label.to_string(),
        });
    }

    fn send_reward_summary(&self, player: &PlayerId, lines: &[String]) {
        self.push(Notification::RewardSummary {
            player: player.clone(),
            lines: lines.to_vec(),
        });
    }

    fn broadcast(&self, text: &str) {
        self.push(Notification::Broadcast {
            text: text.to_string(),
        });
    }
}

/// Shares one `SimWorld` as both the substrate and the notifier.
pub fn sim_handle(id: &str, world: Arc<SimWorld>) -> WorldHandle {
    WorldHandle::new(WorldId::new(id), world.clone(), world)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Position {
        Position {
            x: 0.0,
            y: 80.0,
            z: 0.0,
        }
    }

    #[test]
    fn undrained_notifications_keep_only_the_newest() {
        let sim = SimWorld::new();
        for idx in 0..NOTIFICATION_BACKLOG + 3 {
            sim.broadcast(&format!("line {idx}"));
        }
        let broadcasts = sim.broadcasts();
        assert_eq!(broadcasts.len(), NOTIFICATION_BACKLOG);
        assert_eq!(broadcasts[0], "line 3");
        assert_eq!(
            broadcasts.last().map(String::as_str),
            Some(format!("line {}", NOTIFICATION_BACKLOG + 2).as_str())
        );
        assert_eq!(sim.drain_notifications().len(), NOTIFICATION_BACKLOG);
        assert!(sim.notifications().is_empty());
    }

    #[test]
    fn disabled_strategy_is_reported_unavailable() {
        let world = SimWorld::new();
        world.disable_strategy(SpawnStrategy::WorldDirect);
        let template = BossTemplate {
            species: "zacian".to_string(),
            level: 100,
        };
        let result = world.spawn_entity(&template, origin(), SpawnStrategy::WorldDirect, None);
        assert!(matches!(result, Err(WorldError::SpawnUnavailable(_))));
        let id = world
            .spawn_entity(&template, origin(), SpawnStrategy::EntityFactory, None)
            .expect("factory spawn works");
        assert_eq!(world.entity(id).map(|e| e.native_health), Some(330.0));
    }

    #[test]
    fn players_near_skips_offline_and_far_players() {
        let world = SimWorld::new();
        let near = PlayerId::new("near");
        let far = PlayerId::new("far");
        let offline = PlayerId::new("offline");
        world.add_player(&near, "Near", origin());
        world.add_player(
            &far,
            "Far",
            Position {
                x: 50.0,
                y: 80.0,
                z: 0.0,
            },
        );
        world.add_player(&offline, "Offline", origin());
        world.set_online(&offline, false);

        assert_eq!(world.players_near(&origin(), 10.0), vec![near]);
    }

    #[test]
    fn full_inventory_rejects_new_stacks_but_merges_existing() {
        let world = SimWorld::new();
        let player = PlayerId::new("p1");
        world.add_player(&player, "P1", origin());
        world.set_inventory_slots(&player, 1);

        assert_eq!(world.give_item(&player, "candy", 2).ok(), Some(true));
        assert_eq!(world.give_item(&player, "candy", 1).ok(), Some(true));
        assert_eq!(world.give_item(&player, "potion", 1).ok(), Some(false));
        assert_eq!(world.inventory(&player), vec![("candy".to_string(), 3)]);
    }
}
