use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::damage::DamageTracker;
use crate::error::ConfigError;
use crate::rng::Rng;
use crate::types::{ContributionTier, LeaderboardLine, PlayerId};
use crate::world::WorldHandle;

pub const REWARD_FILE_NAME: &str = "raid_rewards.txt";
pub const REWARD_MESSAGE: &str = "You received raid rewards! Check your inventory.";
pub const LEADERBOARD_HEADER: &str = "=== Raid Damage Leaderboard ===";
pub const LEADERBOARD_FOOTER: &str = "===============================";

#[derive(Clone, Debug, PartialEq)]
pub struct RewardEntry {
    pub item: String,
    pub count: u32,
    pub chance: f64,
}

impl RewardEntry {
    pub fn new(item: &str, count: u32, chance: f64) -> Self {
        Self {
            item: item.trim().to_string(),
            count: count.max(1),
            chance: if chance.is_finite() {
                chance.clamp(0.0, 1.0)
            } else {
                1.0
            },
        }
    }

    /// `item[,count[,chance]]`. Unparseable numbers keep their defaults.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.split(',').map(str::trim);
        let item = parts.next().filter(|item| !item.is_empty())?;
        let count = parts
            .next()
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(1)
            .clamp(1, u32::MAX as i64) as u32;
        let chance = parts
            .next()
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(1.0);
        Some(Self::new(item, count, chance))
    }

    pub fn to_line(&self) -> String {
        format!("{},{},{}", self.item, self.count, self.chance)
    }
}

pub fn default_rewards() -> Vec<RewardEntry> {
    vec![
        RewardEntry::new("pixelmon:rare_candy", 2, 0.8),
        RewardEntry::new("pixelmon:xl_exp_candy", 1, 0.4),
    ]
}

/// Ordered reward list backed by a line file. Reads are shared; `reload` and
/// `save` are the only write paths.
#[derive(Debug)]
pub struct RewardTable {
    path: Option<PathBuf>,
    entries: RwLock<Vec<RewardEntry>>,
}

impl RewardTable {
    pub fn in_memory(entries: Vec<RewardEntry>) -> Self {
        Self {
            path: None,
            entries: RwLock::new(entries),
        }
    }

    pub fn load_or_default(path: &Path) -> Self {
        let table = Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(default_rewards()),
        };
        table.reload();
        table
    }

    pub fn entries(&self) -> Vec<RewardEntry> {
        self.entries.read().clone()
    }

    /// Re-reads the backing file. A missing file is recreated from defaults;
    /// an unreadable one leaves the current entries untouched.
    pub fn reload(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        match read_entries(path) {
            Ok(Some(entries)) => {
                info!(path = %path.display(), entries = entries.len(), "loaded raid rewards");
                *self.entries.write() = entries;
            }
            Ok(None) => {
                *self.entries.write() = default_rewards();
                if let Err(error) = self.save() {
                    warn!(error = %error, "could not write default raid rewards");
                }
            }
            Err(error) => {
                warn!(error = %error, "keeping previous raid rewards");
            }
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let mut text = String::new();
        for entry in self.entries.read().iter() {
            text.push_str(&entry.to_line());
            text.push('\n');
        }
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_entries(path: &Path) -> Result<Option<Vec<RewardEntry>>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text.lines().filter_map(RewardEntry::parse_line).collect())),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn default_reward_path() -> PathBuf {
    crate::config::default_config_path()
        .parent()
        .map(|dir| dir.join(REWARD_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(REWARD_FILE_NAME))
}

/// Rolls every entry independently. No cap on the number of entries won.
pub fn roll_rewards(entries: &[RewardEntry], rng: &mut Rng) -> Vec<RewardEntry> {
    entries
        .iter()
        .filter(|entry| rng.chance(entry.chance))
        .cloned()
        .collect()
}

/// Grants loot to every online roster member and broadcasts the damage
/// leaderboard. Returns the number of players that received something.
pub fn distribute_rewards(
    world: &WorldHandle,
    table: &RewardTable,
    roster: &[PlayerId],
    tracker: &DamageTracker,
    rng: &mut Rng,
    leaderboard_size: usize,
) -> usize {
    let entries = table.entries();
    let mut rewarded = 0;

    for player in roster {
        if !world.host.is_online(player) {
            debug!(world = %world.id, player = %player, "offline at reward time, skipping");
            continue;
        }
        let granted = roll_rewards(&entries, rng);
        if granted.is_empty() {
            continue;
        }

        let mut totals: BTreeMap<String, u32> = BTreeMap::new();
        for entry in &granted {
            *totals.entry(entry.item.clone()).or_insert(0) += entry.count;
        }
        for (item, count) in &totals {
            give_or_drop(world, player, item, *count);
        }

        let lines: Vec<String> = totals
            .iter()
            .map(|(item, count)| format!("{count}x {item}"))
            .collect();
        world.message(player, REWARD_MESSAGE);
        world.notifier.send_reward_summary(player, &lines);
        rewarded += 1;
    }

    let board = format_damage_leaderboard(world, tracker, leaderboard_size);
    for line in &board {
        world.notifier.broadcast(line);
    }

    info!(world = %world.id, rewarded, roster = roster.len(), "raid rewards distributed");
    rewarded
}

fn give_or_drop(world: &WorldHandle, player: &PlayerId, item: &str, count: u32) {
    let placed = match world.host.give_item(player, item, count) {
        Ok(placed) => placed,
        Err(error) => {
            warn!(world = %world.id, player = %player, item, error = %error, "give item failed");
            false
        }
    };
    if placed {
        return;
    }
    if let Err(error) = world.host.drop_item(player, item, count) {
        warn!(world = %world.id, player = %player, item, error = %error, "could not drop reward");
    }
}

/// Ranks `(player, damage)` rows, highest first, ties by player id.
pub fn rank_rows(
    world: &WorldHandle,
    mut rows: Vec<(PlayerId, i64)>,
    size: usize,
) -> Vec<LeaderboardLine> {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.into_iter()
        .take(size)
        .enumerate()
        .map(|(index, (player_id, damage))| LeaderboardLine {
            rank: index + 1,
            name: world.player_label(&player_id),
            player_id,
            damage,
            tier: None,
        })
        .collect()
}

/// `share >= tier_a` is A, `share >= tier_b` is B, anything else C.
pub fn contribution_tier(damage: i64, total: u64, tier_a: f64, tier_b: f64) -> ContributionTier {
    if total == 0 || damage <= 0 {
        return ContributionTier::C;
    }
    let share = damage as f64 / total as f64;
    if share >= tier_a {
        ContributionTier::A
    } else if share >= tier_b {
        ContributionTier::B
    } else {
        ContributionTier::C
    }
}

pub fn assign_tiers(lines: &mut [LeaderboardLine], total: u64, tier_a: f64, tier_b: f64) {
    for line in lines {
        line.tier = Some(contribution_tier(line.damage, total, tier_a, tier_b));
    }
}

pub fn format_line(line: &LeaderboardLine) -> String {
    format!("#{} {} - {} dmg", line.rank, line.name, line.damage)
}

/// Header, ranked lines and footer. Empty when nobody dealt damage.
pub fn format_damage_leaderboard(
    world: &WorldHandle,
    tracker: &DamageTracker,
    size: usize,
) -> Vec<String> {
    let rows: Vec<(PlayerId, i64)> = tracker
        .snapshot()
        .into_iter()
        .map(|(player, damage)| (player, i64::try_from(damage).unwrap_or(i64::MAX)))
        .collect();
    if rows.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![LEADERBOARD_HEADER.to_string()];
    lines.extend(rank_rows(world, rows, size).iter().map(format_line));
    lines.push(LEADERBOARD_FOOTER.to_string());
    lines
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::Position;
    use crate::world::{sim_handle, SimWorld};

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!("{}-{}-{}", name, std::process::id(), rand::random::<u32>());
        std::env::temp_dir().join(unique).join(REWARD_FILE_NAME)
    }

    fn origin() -> Position {
        Position {
            x: 0.0,
            y: 80.0,
            z: 0.0,
        }
    }

    #[test]
    fn parse_line_applies_defaults_and_clamps() {
        assert_eq!(
            RewardEntry::parse_line("pixelmon:rare_candy"),
            Some(RewardEntry::new("pixelmon:rare_candy", 1, 1.0))
        );
        assert_eq!(
            RewardEntry::parse_line(" potion , 0 , 7 "),
            Some(RewardEntry::new("potion", 1, 1.0))
        );
        assert_eq!(
            RewardEntry::parse_line("potion,abc,-1"),
            Some(RewardEntry::new("potion", 1, 0.0))
        );
        assert_eq!(RewardEntry::parse_line("   "), None);
        assert_eq!(RewardEntry::parse_line(",2,0.5"), None);
    }

    #[test]
    fn contribution_tier_uses_inclusive_cutoffs() {
        assert_eq!(contribution_tier(25, 100, 0.25, 0.10), ContributionTier::A);
        assert_eq!(contribution_tier(24, 100, 0.25, 0.10), ContributionTier::B);
        assert_eq!(contribution_tier(10, 100, 0.25, 0.10), ContributionTier::B);
        assert_eq!(contribution_tier(9, 100, 0.25, 0.10), ContributionTier::C);
        assert_eq!(contribution_tier(5, 0, 0.25, 0.10), ContributionTier::C);
        assert_eq!(contribution_tier(i64::MAX, u64::MAX, 0.25, 0.10), ContributionTier::A);
    }

    #[test]
    fn missing_reward_file_is_recreated_with_defaults() {
        let path = temp_file("raid-rewards-missing");
        let table = RewardTable::load_or_default(&path);
        assert_eq!(table.entries(), default_rewards());
        let text = fs::read_to_string(&path).expect("file written");
        assert!(text.contains("pixelmon:rare_candy,2,0.8"));

        fs::write(&path, "pixelmon:master_ball,1,1\n\n").expect("overwrite");
        table.reload();
        assert_eq!(
            table.entries(),
            vec![RewardEntry::new("pixelmon:master_ball", 1, 1.0)]
        );

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn full_inventory_drops_rewards() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let player = PlayerId::new("p1");
        sim.add_player(&player, "P1", origin());
        sim.set_inventory_slots(&player, 0);

        let table = RewardTable::in_memory(vec![RewardEntry::new("candy", 2, 1.0)]);
        let tracker = DamageTracker::new();
        let rewarded = distribute_rewards(
            &world,
            &table,
            &[player.clone()],
            &tracker,
            &mut Rng::new(1),
            3,
        );

        assert_eq!(rewarded, 1);
        assert!(sim.inventory(&player).is_empty());
        assert_eq!(sim.dropped(&player), vec![("candy".to_string(), 2)]);
        assert_eq!(sim.messages_for(&player), vec![REWARD_MESSAGE.to_string()]);
        assert!(sim.broadcasts().is_empty());
    }

    #[test]
    fn leaderboard_broadcast_is_top_n_with_frame() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let tracker = DamageTracker::new();
        for (id, damage) in [("a", 10), ("b", 40), ("c", 25), ("d", 5)] {
            let player = PlayerId::new(id);
            sim.add_player(&player, &id.to_uppercase(), origin());
            tracker.record(&player, damage);
        }

        let table = RewardTable::in_memory(Vec::new());
        distribute_rewards(&world, &table, &[], &tracker, &mut Rng::new(1), 3);

        assert_eq!(
            sim.broadcasts(),
            vec![
                LEADERBOARD_HEADER.to_string(),
                "#1 B - 40 dmg".to_string(),
                "#2 C - 25 dmg".to_string(),
                "#3 A - 10 dmg".to_string(),
                LEADERBOARD_FOOTER.to_string(),
            ]
        );
    }

    #[test]
    fn offline_roster_members_get_nothing() {
        let sim = Arc::new(SimWorld::new());
        let world = sim_handle("overworld", sim.clone());
        let player = PlayerId::new("p1");
        sim.add_player(&player, "P1", origin());
        sim.set_online(&player, false);

        let table = RewardTable::in_memory(default_rewards());
        let rewarded = distribute_rewards(
            &world,
            &table,
            &[player.clone()],
            &DamageTracker::new(),
            &mut Rng::new(3),
            3,
        );
        assert_eq!(rewarded, 0);
        assert!(sim.inventory(&player).is_empty());
    }
}
