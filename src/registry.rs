use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::battle::BattleEngineAdapter;
use crate::config::RaidConfig;
use crate::rewards::RewardTable;
use crate::session::RaidSession;
use crate::teleport::TeleportOffers;
use crate::types::WorldId;
use crate::world::WorldHandle;

/// Collaborators shared by every session in the process.
pub struct RaidServices {
    pub config: RaidConfig,
    pub battle: BattleEngineAdapter,
    pub rewards: RewardTable,
    pub teleports: TeleportOffers,
}

impl RaidServices {
    pub fn new(config: RaidConfig, battle: BattleEngineAdapter, rewards: RewardTable) -> Self {
        Self {
            config,
            battle,
            rewards,
            teleports: TeleportOffers::new(),
        }
    }
}

/// One session per world, created on first access.
pub struct SessionRegistry {
    services: Arc<RaidServices>,
    sessions: DashMap<WorldId, Arc<RaidSession>>,
}

impl SessionRegistry {
    pub fn new(services: RaidServices) -> Self {
        Self {
            services: Arc::new(services),
            sessions: DashMap::new(),
        }
    }

    pub fn services(&self) -> &Arc<RaidServices> {
        &self.services
    }

    pub fn get_or_create(&self, world: &WorldHandle) -> Arc<RaidSession> {
        self.sessions
            .entry(world.id.clone())
            .or_insert_with(|| {
                info!(world = %world.id, "creating raid session");
                Arc::new(RaidSession::new(world.clone(), self.services.clone()))
            })
            .clone()
    }

    pub fn get(&self, world: &WorldId) -> Option<Arc<RaidSession>> {
        self.sessions.get(world).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Scheduler entry point: one pass per world per tick.
    pub fn on_world_tick(&self, world: &WorldHandle, now: u64) {
        let session = self.get_or_create(world);
        session.tick(now);
        self.services.teleports.purge_expired(now);
    }
}
