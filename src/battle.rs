use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::BattleError;
use crate::types::{BattleHandle, EntityId, PlayerId};
use crate::world::WorldHandle;

/// Combat capability offered by the host. Deployments without combat plug in
/// [`UnavailableEngine`] or an empty adapter.
pub trait BattleEngine: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    /// Number of combat-ready creatures the player can field.
    fn party_size(&self, player: &PlayerId) -> usize;
    fn start_battle(
        &self,
        players: &[PlayerId],
        boss: EntityId,
    ) -> Result<BattleHandle, BattleError>;
    fn end_battle(&self, handle: BattleHandle) -> Result<(), BattleError>;
    fn active_battle(&self, player: &PlayerId) -> Option<BattleHandle>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEngine;

impl BattleEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn party_size(&self, _player: &PlayerId) -> usize {
        0
    }

    fn start_battle(
        &self,
        _players: &[PlayerId],
        _boss: EntityId,
    ) -> Result<BattleHandle, BattleError> {
        Err(BattleError::Unavailable(self.name().to_string()))
    }

    fn end_battle(&self, _handle: BattleHandle) -> Result<(), BattleError> {
        Err(BattleError::Unavailable(self.name().to_string()))
    }

    fn active_battle(&self, _player: &PlayerId) -> Option<BattleHandle> {
        None
    }
}

/// Best-effort bridge over an ordered list of engines (structured builder
/// first, direct integration second).
#[derive(Clone, Default)]
pub struct BattleEngineAdapter {
    engines: Vec<Arc<dyn BattleEngine>>,
}

impl BattleEngineAdapter {
    pub fn new(engines: Vec<Arc<dyn BattleEngine>>) -> Self {
        Self { engines }
    }

    pub fn unavailable() -> Self {
        Self::new(vec![Arc::new(UnavailableEngine)])
    }

    pub fn is_available(&self) -> bool {
        self.engines.iter().any(|engine| engine.is_available())
    }

    /// Starts one battle for the online, combat-ready subset of `players`.
    pub fn start(
        &self,
        world: &WorldHandle,
        boss: EntityId,
        players: &[PlayerId],
    ) -> Result<BattleHandle, BattleError> {
        let online: Vec<PlayerId> = players
            .iter()
            .filter(|player| world.host.is_online(player))
            .cloned()
            .collect();
        if online.is_empty() {
            return Err(BattleError::NoOnlinePlayers);
        }

        let mut last_error = BattleError::Unavailable("no battle engine registered".to_string());
        for engine in self.engines.iter().filter(|engine| engine.is_available()) {
            let eligible: Vec<PlayerId> = online
                .iter()
                .filter(|player| {
                    let ready = engine.party_size(player) > 0;
                    if !ready {
                        warn!(world = %world.id, player = %player, engine = engine.name(), "player has no combat-ready party, skipping");
                    }
                    ready
                })
                .cloned()
                .collect();
            if eligible.is_empty() {
                last_error = BattleError::NoEligibleCombatants;
                continue;
            }

            match engine.start_battle(&eligible, boss) {
                Ok(handle) => {
                    debug!(world = %world.id, engine = engine.name(), players = eligible.len(), "raid battle started");
                    return Ok(handle);
                }
                Err(error) => {
                    warn!(world = %world.id, engine = engine.name(), error = %error, "battle engine failed to start raid battle");
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    /// Ends whatever battle each player is in. Returns the number ended.
    pub fn end_battles(&self, world: &WorldHandle, players: &[PlayerId]) -> usize {
        let mut ended = HashSet::new();
        for engine in self.engines.iter().filter(|engine| engine.is_available()) {
            for player in players {
                let Some(handle) = engine.active_battle(player) else {
                    continue;
                };
                if ended.contains(&handle) {
                    continue;
                }
                match engine.end_battle(handle) {
                    Ok(()) => {
                        ended.insert(handle);
                    }
                    Err(error) => {
                        warn!(world = %world.id, player = %player, engine = engine.name(), error = %error, "failed to end raid battle");
                    }
                }
            }
        }
        ended.len()
    }
}

#[derive(Debug, Default)]
struct SimBattleState {
    parties: HashMap<PlayerId, usize>,
    active: HashMap<BattleHandle, Vec<PlayerId>>,
    next_handle: u64,
    rejecting: bool,
    started: Vec<Vec<PlayerId>>,
}

/// In-memory engine for the binaries and tests.
#[derive(Debug)]
pub struct SimBattleEngine {
    name: String,
    available: bool,
    state: Mutex<SimBattleState>,
}

impl SimBattleEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            state: Mutex::new(SimBattleState::default()),
        }
    }

    pub fn offline(name: &str) -> Self {
        Self {
            available: false,
            ..Self::new(name)
        }
    }

    pub fn set_party(&self, player: &PlayerId, size: usize) {
        self.state.lock().parties.insert(player.clone(), size);
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.state.lock().rejecting = rejecting;
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Player lists of every successful start, in order.
    pub fn started(&self) -> Vec<Vec<PlayerId>> {
        self.state.lock().started.clone()
    }
}

impl BattleEngine for SimBattleEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn party_size(&self, player: &PlayerId) -> usize {
        self.state.lock().parties.get(player).copied().unwrap_or(0)
    }

    fn start_battle(
        &self,
        players: &[PlayerId],
        _boss: EntityId,
    ) -> Result<BattleHandle, BattleError> {
        let mut state = self.state.lock();
        if state.rejecting {
            return Err(BattleError::Rejected(format!("{} refused", self.name)));
        }
        let busy = players
            .iter()
            .any(|player| state.active.values().any(|members| members.contains(player)));
        if busy {
            return Err(BattleError::Rejected("player already in battle".to_string()));
        }
        state.next_handle += 1;
        let handle = BattleHandle(state.next_handle);
        state.active.insert(handle, players.to_vec());
        state.started.push(players.to_vec());
        Ok(handle)
    }

    fn end_battle(&self, handle: BattleHandle) -> Result<(), BattleError> {
        self.state
            .lock()
            .active
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| BattleError::Engine(format!("unknown battle {}", handle.0)))
    }

    fn active_battle(&self, player: &PlayerId) -> Option<BattleHandle> {
        self.state
            .lock()
            .active
            .iter()
            .find(|(_, members)| members.contains(player))
            .map(|(handle, _)| *handle)
    }
}
