use crate::types::RaidDifficulty;

pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;
pub const TICKS_PER_SECOND: u64 = TICK_RATE as u64;

pub const AUTO_START_INTERVAL_SECONDS: u64 = 5 * 60;
pub const WAITING_DURATION_SECONDS: u64 = 30;
pub const RAID_DURATION_SECONDS: u64 = 120;
pub const MIN_RAID_DURATION_SECONDS: u64 = 10;

pub const MAX_PLAYERS_PER_RAID: usize = 50;
pub const ENROLL_RADIUS: f64 = 10.0;
pub const ATTACK_PROXIMITY_RADIUS: f64 = 16.0;
pub const ATTACK_COOLDOWN_TICKS: u64 = 40;
pub const TELEPORT_OFFER_TICKS: u64 = 30 * TICKS_PER_SECOND;

pub const BOSS_SPECIES: &str = "zacian";
pub const BOSS_LEVEL: u32 = 100;
pub const BOSS_LABEL: &str = "Raid Boss";

pub const HP_MULTIPLIER: f64 = 10.0;
pub const POOL_MULTIPLIER: f64 = 1.0;
pub const SEND_THRESHOLD: f64 = 0.005;
pub const PHASE_THRESHOLDS: [f64; 3] = [0.25, 0.50, 0.75];
pub const ENRAGE_STEP: f64 = 0.25;

pub const LEADERBOARD_TOP_N: usize = 5;
/// Undrained notifications the sim host keeps; older ones are dropped.
pub const NOTIFICATION_BACKLOG: usize = 4096;
pub const REWARD_LEADERBOARD_SIZE: usize = 3;

/// Seconds-remaining marks announced while the battle runs.
pub const BATTLE_CHECKPOINTS: [u64; 3] = [60, 30, 10];

pub fn seconds_to_ticks(seconds: u64) -> u64 {
    seconds.saturating_mul(TICKS_PER_SECOND)
}

pub fn is_waiting_checkpoint(seconds_left: u64) -> bool {
    seconds_left % 60 == 0 || seconds_left == 10 || seconds_left == 5
}

pub fn is_battle_checkpoint(seconds_left: u64) -> bool {
    BATTLE_CHECKPOINTS.contains(&seconds_left)
}

/// (health, player damage, boss damage) multipliers per difficulty.
pub fn get_difficulty_multiplier(difficulty: RaidDifficulty) -> (f64, f64, f64) {
    match difficulty {
        RaidDifficulty::Easy => (0.75, 1.25, 0.75),
        RaidDifficulty::Normal => (1.0, 1.0, 1.0),
        RaidDifficulty::Hard => (1.5, 0.85, 1.25),
        RaidDifficulty::Nightmare => (2.0, 0.7, 1.6),
    }
}

pub fn format_countdown(seconds: u64) -> String {
    let minutes = seconds / 60;
    let rest = seconds % 60;
    if minutes > 0 {
        format!("{minutes}m {rest}s")
    } else {
        format!("{rest}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_checkpoints_cover_minutes_and_final_seconds() {
        assert!(is_waiting_checkpoint(120));
        assert!(is_waiting_checkpoint(60));
        assert!(is_waiting_checkpoint(10));
        assert!(is_waiting_checkpoint(5));
        assert!(is_waiting_checkpoint(0));
        assert!(!is_waiting_checkpoint(30));
        assert!(!is_waiting_checkpoint(11));
    }

    #[test]
    fn battle_checkpoints_are_sixty_thirty_ten() {
        assert!(is_battle_checkpoint(60));
        assert!(is_battle_checkpoint(30));
        assert!(is_battle_checkpoint(10));
        assert!(!is_battle_checkpoint(120));
        assert!(!is_battle_checkpoint(5));
    }

    #[test]
    fn countdown_formats_minutes_only_when_present() {
        assert_eq!(format_countdown(5), "5s");
        assert_eq!(format_countdown(65), "1m 5s");
        assert_eq!(format_countdown(120), "2m 0s");
    }

    #[test]
    fn normal_difficulty_is_neutral() {
        assert_eq!(
            get_difficulty_multiplier(RaidDifficulty::Normal),
            (1.0, 1.0, 1.0)
        );
    }
}
