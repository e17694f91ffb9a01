use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{
    seconds_to_ticks, ATTACK_COOLDOWN_TICKS, ATTACK_PROXIMITY_RADIUS, AUTO_START_INTERVAL_SECONDS,
    BOSS_LEVEL, BOSS_SPECIES, ENRAGE_STEP, ENROLL_RADIUS, HP_MULTIPLIER, LEADERBOARD_TOP_N,
    MAX_PLAYERS_PER_RAID, MIN_RAID_DURATION_SECONDS, PHASE_THRESHOLDS, POOL_MULTIPLIER,
    RAID_DURATION_SECONDS, REWARD_LEADERBOARD_SIZE, SEND_THRESHOLD, WAITING_DURATION_SECONDS,
};
use crate::error::ConfigError;
use crate::types::BlockPos;

pub const CONFIG_FILE_NAME: &str = "raid_config.json";

/// Scalar raid tuning. Raw fields are kept as loaded; read them through the
/// clamped getters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RaidConfig {
    pub hp_multiplier: f64,
    pub pool_multiplier: f64,
    pub phase_thresholds: Vec<f64>,
    pub send_threshold: f64,
    #[serde(rename = "tierACutoff", alias = "tierA_cutoff")]
    pub tier_a_cutoff: f64,
    #[serde(rename = "tierBCutoff", alias = "tierB_cutoff")]
    pub tier_b_cutoff: f64,
    pub max_players_per_raid: i64,
    pub default_raid_duration_seconds: i64,
    pub waiting_duration_seconds: i64,
    pub auto_start_interval_seconds: i64,
    pub enroll_radius: f64,
    pub attack_proximity_radius: f64,
    pub attack_cooldown_ticks: u64,
    pub boss_species: String,
    pub boss_level: u32,
    pub spawn_center: BlockPos,
    pub leaderboard_top_n: usize,
    pub reward_leaderboard_size: usize,
    pub enrage_step: f64,
    pub reward_seed: Option<u32>,
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            hp_multiplier: HP_MULTIPLIER,
            pool_multiplier: POOL_MULTIPLIER,
            phase_thresholds: PHASE_THRESHOLDS.to_vec(),
            send_threshold: SEND_THRESHOLD,
            tier_a_cutoff: 0.25,
            tier_b_cutoff: 0.10,
            max_players_per_raid: MAX_PLAYERS_PER_RAID as i64,
            default_raid_duration_seconds: RAID_DURATION_SECONDS as i64,
            waiting_duration_seconds: WAITING_DURATION_SECONDS as i64,
            auto_start_interval_seconds: AUTO_START_INTERVAL_SECONDS as i64,
            enroll_radius: ENROLL_RADIUS,
            attack_proximity_radius: ATTACK_PROXIMITY_RADIUS,
            attack_cooldown_ticks: ATTACK_COOLDOWN_TICKS,
            boss_species: BOSS_SPECIES.to_string(),
            boss_level: BOSS_LEVEL,
            spawn_center: BlockPos::default(),
            leaderboard_top_n: LEADERBOARD_TOP_N,
            reward_leaderboard_size: REWARD_LEADERBOARD_SIZE,
            enrage_step: ENRAGE_STEP,
            reward_seed: None,
        }
    }
}

impl RaidConfig {
    /// Reads `path`, falling back to defaults on any failure. A missing file
    /// gets the defaults written back.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                let config = Self::default();
                if let Err(error) = config.save(path) {
                    warn!(error = %error, "could not write default raid config");
                } else {
                    info!(path = %path.display(), "wrote default raid config");
                }
                config
            }
            Err(error) => {
                warn!(error = %error, "using default raid config");
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str::<Self>(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn hp_multiplier(&self) -> f64 {
        non_negative(self.hp_multiplier)
    }

    pub fn pool_multiplier(&self) -> f64 {
        non_negative(self.pool_multiplier)
    }

    pub fn phase_thresholds(&self) -> [f64; 3] {
        match self.phase_thresholds.as_slice() {
            [a, b, c] if [a, b, c].iter().all(|v| v.is_finite()) => {
                [a.clamp(0.0, 1.0), b.clamp(0.0, 1.0), c.clamp(0.0, 1.0)]
            }
            _ => PHASE_THRESHOLDS,
        }
    }

    pub fn send_threshold(&self) -> f64 {
        non_negative(self.send_threshold)
    }

    pub fn tier_a_cutoff(&self) -> f64 {
        unit(self.tier_a_cutoff)
    }

    pub fn tier_b_cutoff(&self) -> f64 {
        unit(self.tier_b_cutoff)
    }

    pub fn max_players_per_raid(&self) -> usize {
        self.max_players_per_raid.max(1) as usize
    }

    pub fn raid_duration_ticks(&self) -> u64 {
        let seconds =
            (self.default_raid_duration_seconds.max(0) as u64).max(MIN_RAID_DURATION_SECONDS);
        seconds_to_ticks(seconds)
    }

    pub fn waiting_duration_ticks(&self) -> u64 {
        seconds_to_ticks(self.waiting_duration_seconds.max(1) as u64)
    }

    pub fn auto_start_interval_ticks(&self) -> u64 {
        seconds_to_ticks(self.auto_start_interval_seconds.max(1) as u64)
    }

    pub fn enroll_radius(&self) -> f64 {
        non_negative(self.enroll_radius)
    }

    pub fn attack_proximity_radius(&self) -> f64 {
        non_negative(self.attack_proximity_radius)
    }

    pub fn boss_species(&self) -> &str {
        let trimmed = self.boss_species.trim();
        if trimmed.is_empty() {
            BOSS_SPECIES
        } else {
            trimmed
        }
    }

    pub fn boss_level(&self) -> u32 {
        self.boss_level.max(1)
    }

    pub fn leaderboard_top_n(&self) -> usize {
        self.leaderboard_top_n.max(1)
    }

    pub fn reward_leaderboard_size(&self) -> usize {
        self.reward_leaderboard_size.max(1)
    }

    pub fn enrage_step(&self) -> f64 {
        non_negative(self.enrage_step)
    }
}

pub fn default_config_path() -> PathBuf {
    std::env::var("RAID_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data"))
        .join(CONFIG_FILE_NAME)
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn unit(value: f64) -> f64 {
    non_negative(value).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!("{}-{}-{}", name, std::process::id(), rand::random::<u32>());
        std::env::temp_dir().join(unique).join(CONFIG_FILE_NAME)
    }

    #[test]
    fn missing_file_writes_defaults() {
        let path = temp_file("raid-config-missing");
        let config = RaidConfig::load_or_default(&path);
        assert_eq!(config.max_players_per_raid(), MAX_PLAYERS_PER_RAID);
        assert!(path.is_file());

        let reloaded = RaidConfig::try_load(&path)
            .expect("readable")
            .expect("file exists");
        assert_eq!(reloaded.send_threshold(), SEND_THRESHOLD);

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_keys() {
        let path = temp_file("raid-config-partial");
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(
            &path,
            r#"{ "hpMultiplier": 4.0, "maxPlayersPerRaid": 2, "tierA_cutoff": 0.3 }"#,
        )
        .expect("write file");

        let config = RaidConfig::load_or_default(&path);
        assert_eq!(config.hp_multiplier(), 4.0);
        assert_eq!(config.max_players_per_raid(), 2);
        assert_eq!(config.tier_a_cutoff(), 0.3);
        assert_eq!(config.pool_multiplier(), POOL_MULTIPLIER);
        assert_eq!(config.boss_species(), BOSS_SPECIES);

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        let path = temp_file("raid-config-invalid");
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(&path, "{ not json").expect("write file");

        assert!(matches!(
            RaidConfig::try_load(&path),
            Err(ConfigError::Parse { .. })
        ));
        let config = RaidConfig::load_or_default(&path);
        assert_eq!(config.hp_multiplier(), HP_MULTIPLIER);

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn getters_clamp_out_of_range_values() {
        let config = RaidConfig {
            hp_multiplier: -2.0,
            send_threshold: f64::NAN,
            tier_b_cutoff: 4.0,
            max_players_per_raid: 0,
            default_raid_duration_seconds: 3,
            phase_thresholds: vec![0.1, 0.2],
            boss_species: "   ".to_string(),
            ..RaidConfig::default()
        };
        assert_eq!(config.hp_multiplier(), 0.0);
        assert_eq!(config.send_threshold(), 0.0);
        assert_eq!(config.tier_b_cutoff(), 1.0);
        assert_eq!(config.max_players_per_raid(), 1);
        assert_eq!(config.raid_duration_ticks(), seconds_to_ticks(MIN_RAID_DURATION_SECONDS));
        assert_eq!(config.phase_thresholds(), PHASE_THRESHOLDS);
        assert_eq!(config.boss_species(), BOSS_SPECIES);
    }
}
