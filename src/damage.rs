use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::types::PlayerId;

/// Result of folding one hit into a pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolHit {
    pub accumulated: u64,
    pub percent_remaining: f64,
    /// True only for the single hit that first reached the pool.
    pub depleted_now: bool,
}

/// Engine-independent health total attached to one boss entity.
#[derive(Debug)]
pub struct DamagePool {
    hp_pool: u64,
    accumulated: AtomicU64,
    phase: AtomicU8,
    depleted: AtomicBool,
}

impl DamagePool {
    pub fn new(hp_pool: u64) -> Self {
        Self {
            hp_pool: hp_pool.max(1),
            accumulated: AtomicU64::new(0),
            phase: AtomicU8::new(0),
            depleted: AtomicBool::new(false),
        }
    }

    /// `max(1, round(base × multipliers))`.
    pub fn size_for(base_strength: f64, multipliers: &[f64]) -> u64 {
        let raw = multipliers
            .iter()
            .fold(base_strength, |acc, m| acc * m)
            .round();
        if raw.is_finite() && raw >= 1.0 {
            raw as u64
        } else {
            1
        }
    }

    pub fn hp_pool(&self) -> u64 {
        self.hp_pool
    }

    pub fn accumulated(&self) -> u64 {
        self.accumulated.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }

    pub fn is_depleted(&self) -> bool {
        self.depleted.load(Ordering::Acquire)
    }

    pub fn percent_remaining(&self) -> f64 {
        percent_remaining(self.accumulated(), self.hp_pool)
    }

    pub fn apply(&self, amount: u64) -> PoolHit {
        let (Ok(previous) | Err(previous)) =
            self.accumulated
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(current.saturating_add(amount))
                });
        let accumulated = previous.saturating_add(amount);
        let depleted_now = accumulated >= self.hp_pool
            && self
                .depleted
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
        PoolHit {
            accumulated,
            percent_remaining: percent_remaining(accumulated, self.hp_pool),
            depleted_now,
        }
    }

    /// Raises the phase to match the damage-done fraction. Returns the new
    /// phase when it moved.
    pub fn advance_phase(&self, thresholds: &[f64; 3]) -> Option<u8> {
        let done = 1.0 - self.percent_remaining();
        let target = thresholds.iter().filter(|t| done >= **t).count() as u8;
        let mut current = self.phase.load(Ordering::Acquire);
        while target > current {
            match self
                .phase
                .compare_exchange(current, target, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(target),
                Err(actual) => current = actual,
            }
        }
        None
    }
}

fn percent_remaining(accumulated: u64, hp_pool: u64) -> f64 {
    (1.0 - accumulated as f64 / hp_pool.max(1) as f64).max(0.0)
}

/// Per-session damage per player. Keys exist only for players that dealt at
/// least one point.
#[derive(Debug, Default)]
pub struct DamageTracker {
    totals: Mutex<HashMap<PlayerId, u64>>,
}

impl DamageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, player: &PlayerId, amount: u64) {
        if amount == 0 {
            return;
        }
        let mut totals = self.totals.lock();
        let entry = totals.entry(player.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn damage_of(&self, player: &PlayerId) -> u64 {
        self.totals.lock().get(player).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<PlayerId, u64> {
        self.totals.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.lock().is_empty()
    }

    pub fn reset(&self) {
        self.totals.lock().clear();
    }
}

/// Signed damage totals for the end-of-encounter top-N announcement.
#[derive(Debug, Default)]
pub struct Leaderboard {
    totals: Mutex<HashMap<PlayerId, i64>>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, player: &PlayerId, amount: i64) {
        let mut totals = self.totals.lock();
        let entry = totals.entry(player.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Highest totals first; equal totals ordered by player id.
    pub fn top(&self, n: usize) -> Vec<(PlayerId, i64)> {
        let mut rows: Vec<(PlayerId, i64)> = self
            .totals
            .lock()
            .iter()
            .map(|(id, damage)| (id.clone(), *damage))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(n);
        rows
    }

    pub fn reset(&self) {
        self.totals.lock().clear();
    }
}
