use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RaidConfig;
use crate::damage::DamagePool;
use crate::types::{BossTier, EntityId, PlayerId, Position};
use crate::world::{BossTemplate, SpawnStrategy, WorldHandle};

/// Boss entities owned by one session, keyed by entity handle.
pub type BossSet = HashMap<EntityId, Arc<DamagePool>>;

#[derive(Clone, Debug)]
pub struct SpawnedBoss {
    pub entity: EntityId,
    pub pool: Arc<DamagePool>,
}

/// Base strength used when the host cannot report native health.
fn fallback_base_strength(level: u32) -> f64 {
    level as f64 * 3.0 + 30.0
}

/// Builds the boss at `center`, trying every creation strategy in order.
/// Returns `None` when all of them fail; the caller carries on without a boss.
pub fn spawn_boss(
    world: &WorldHandle,
    config: &RaidConfig,
    tier: &BossTier,
    center: Position,
    anchor: Option<&PlayerId>,
) -> Option<SpawnedBoss> {
    let template = BossTemplate {
        species: config.boss_species().to_string(),
        level: config.boss_level(),
    };

    let mut spawned = None;
    for strategy in SpawnStrategy::ORDER {
        match world.host.spawn_entity(&template, center, strategy, anchor) {
            Ok(id) => {
                debug!(world = %world.id, entity = %id, strategy = strategy.name(), "boss entity created");
                spawned = Some(id);
                break;
            }
            Err(error) => {
                debug!(world = %world.id, strategy = strategy.name(), error = %error, "boss spawn strategy failed");
            }
        }
    }
    let Some(entity) = spawned else {
        warn!(world = %world.id, species = %template.species, "could not spawn raid boss with any strategy");
        return None;
    };

    let base = world
        .host
        .entity(entity)
        .map(|info| info.native_health)
        .filter(|hp| hp.is_finite() && *hp > 0.0)
        .unwrap_or_else(|| fallback_base_strength(template.level));
    let hp_pool = DamagePool::size_for(
        base,
        &[
            config.hp_multiplier(),
            config.pool_multiplier(),
            tier.health_multiplier,
        ],
    );

    if let Err(error) = world.host.set_boss_marker(entity, true) {
        warn!(world = %world.id, entity = %entity, error = %error, "failed to mark raid boss");
    }
    if let Err(error) = world.host.pin_entity(entity, center) {
        warn!(world = %world.id, entity = %entity, error = %error, "failed to pin raid boss");
    }

    info!(world = %world.id, entity = %entity, hp_pool, difficulty = %tier.name, "raid boss spawned");
    Some(SpawnedBoss {
        entity,
        pool: Arc::new(DamagePool::new(hp_pool)),
    })
}

/// Removes every boss in `bosses` from the world and empties the set.
pub fn despawn_bosses(world: &WorldHandle, bosses: &mut BossSet) {
    for (entity, _) in bosses.drain() {
        if let Err(error) = world.host.remove_entity(entity) {
            debug!(world = %world.id, entity = %entity, error = %error, "boss already gone");
        }
    }
}

/// Re-anchors every boss at `center` with AI disabled.
pub fn pin_bosses(world: &WorldHandle, bosses: &BossSet, center: Position) {
    for entity in bosses.keys() {
        if let Err(error) = world.host.pin_entity(*entity, center) {
            debug!(world = %world.id, entity = %entity, error = %error, "could not pin boss");
        }
    }
}

/// Marker flag first, configured species as the fallback.
pub fn is_raid_boss(world: &WorldHandle, config: &RaidConfig, entity: EntityId) -> bool {
    match world.host.entity(entity) {
        Some(info) => {
            info.boss_marker || info.species.eq_ignore_ascii_case(config.boss_species())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RaidDifficulty;
    use crate::world::{sim_handle, SimWorld, WorldHost};

    fn center() -> Position {
        Position {
            x: 0.5,
            y: 80.0,
            z: 0.5,
        }
    }

    #[test]
    fn spawn_sizes_pool_marks_and_pins() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let config = RaidConfig::default();
        let boss = spawn_boss(&world, &config, &RaidDifficulty::Normal.tier(), center(), None)
            .expect("boss spawns");

        assert_eq!(boss.pool.hp_pool(), 3300);
        let info = sim.entity(boss.entity).expect("entity exists");
        assert!(info.boss_marker);
        assert_eq!(info.position, center());
        assert_eq!(sim.is_ai_enabled(boss.entity), Some(false));
    }

    #[test]
    fn spawn_falls_through_strategies_and_fails_soft() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let config = RaidConfig::default();
        let tier = RaidDifficulty::Hard.tier();

        sim.disable_strategy(SpawnStrategy::WorldDirect);
        let boss = spawn_boss(&world, &config, &tier, center(), None);
        assert!(boss.is_some());
        assert_eq!(boss.map(|b| b.pool.hp_pool()), Some(4950));

        sim.disable_strategy(SpawnStrategy::EntityFactory);
        assert!(spawn_boss(&world, &config, &tier, center(), None).is_none());
    }

    #[test]
    fn despawn_tolerates_missing_entities() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let config = RaidConfig::default();
        let boss = spawn_boss(&world, &config, &RaidDifficulty::Normal.tier(), center(), None)
            .expect("boss spawns");

        let mut bosses = BossSet::new();
        bosses.insert(boss.entity, boss.pool.clone());
        bosses.insert(EntityId(999), Arc::new(DamagePool::new(1)));
        despawn_bosses(&world, &mut bosses);

        assert!(bosses.is_empty());
        assert_eq!(sim.entity_count(), 0);
    }

    #[test]
    fn species_match_counts_as_boss_without_marker() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let config = RaidConfig::default();
        let wild = sim.spawn_creature("Zacian", center());
        let other = sim.spawn_creature("pidgey", center());

        assert!(is_raid_boss(&world, &config, wild));
        assert!(!is_raid_boss(&world, &config, other));
        assert!(!is_raid_boss(&world, &config, EntityId(404)));
    }
}
