/// Seeded mulberry32 generator. Reward trials use it so a fixed seed replays
/// the same loot.
#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u32>())
    }

    pub fn next_f64(&mut self) -> f64 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        out as f64 / 4_294_967_296.0
    }

    /// Bernoulli trial. `probability` outside [0, 1] is clamped.
    pub fn chance(&mut self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        if p >= 1.0 {
            return true;
        }
        self.next_f64() < p
    }

    pub fn range_u64(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f64;
        min + (self.next_f64() * span).floor().min(span - 1.0) as u64
    }
}
