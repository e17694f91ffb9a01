use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::get_difficulty_multiplier;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub String);

impl WorldId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BattleHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Standing point in the middle of the block.
    pub fn center(&self) -> Position {
        Position {
            x: self.x as f64 + 0.5,
            y: self.y as f64,
            z: self.z as f64 + 0.5,
        }
    }
}

impl Default for BlockPos {
    fn default() -> Self {
        Self { x: 0, y: 80, z: 0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn within(&self, other: &Position, radius: f64) -> bool {
        self.distance_sq(other) <= radius * radius
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidState {
    Idle,
    Waiting,
    InBattle,
    Completed,
}

impl RaidState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Waiting | Self::InBattle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidDifficulty {
    Easy,
    Normal,
    Hard,
    Nightmare,
}

impl RaidDifficulty {
    pub const ALL: [RaidDifficulty; 4] = [Self::Easy, Self::Normal, Self::Hard, Self::Nightmare];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "normal" => Some(Self::Normal),
            "hard" => Some(Self::Hard),
            "nightmare" => Some(Self::Nightmare),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
            Self::Nightmare => "nightmare",
        }
    }

    pub fn tier(self) -> BossTier {
        let (health, player_damage, boss_damage) = get_difficulty_multiplier(self);
        BossTier {
            name: self.name().to_string(),
            health_multiplier: health,
            player_damage_multiplier: player_damage,
            boss_damage_multiplier: boss_damage,
        }
    }
}

impl fmt::Display for RaidDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named multiplier set selected through the difficulty setting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BossTier {
    pub name: String,
    #[serde(rename = "healthMultiplier")]
    pub health_multiplier: f64,
    #[serde(rename = "playerDamageMultiplier")]
    pub player_damage_multiplier: f64,
    #[serde(rename = "bossDamageMultiplier")]
    pub boss_damage_multiplier: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeathVerdict {
    /// Not a managed boss; the host keeps its own rules.
    Ignore,
    /// Host must cancel the death and keep the boss at 1 native HP.
    Cancel,
    Allow,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DamageOutcome {
    /// Damage the host should apply natively after the survival clamp.
    pub native_damage: f64,
    pub recorded: u64,
    pub percent_remaining: f64,
    pub victory: bool,
}

/// Share of the encounter's damage a participant dealt, bucketed by the
/// configured cutoffs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContributionTier {
    A,
    B,
    C,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeaderboardLine {
    pub rank: usize,
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
    pub name: String,
    pub damage: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ContributionTier>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RaidSummary {
    pub world: WorldId,
    pub victory: bool,
    #[serde(rename = "durationTicks")]
    pub duration_ticks: u64,
    #[serde(rename = "hpPool")]
    pub hp_pool: u64,
    #[serde(rename = "accumulatedDamage")]
    pub accumulated_damage: u64,
    pub participants: usize,
    pub difficulty: RaidDifficulty,
    pub ranking: Vec<LeaderboardLine>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RaidStatusView {
    pub world: WorldId,
    pub state: RaidState,
    #[serde(rename = "secondsLeft")]
    pub seconds_left: Option<u64>,
    pub players: usize,
    #[serde(rename = "bossPercent")]
    pub boss_percent: Option<f64>,
    pub difficulty: RaidDifficulty,
    #[serde(rename = "bossDamageMultiplier")]
    pub boss_damage_multiplier: f64,
    pub message: String,
}
