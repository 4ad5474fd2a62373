use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How hard the engine tries.
///
/// Levels 1 to 5 map onto a fixed table; lower levels search shallower, stop
/// sooner and pick among near-equal candidates with random noise.
///
/// | Level | Depth | Pool | Noise | Budget  |
/// |-------|-------|------|-------|---------|
/// | 1     | 1     | 5    | 120cp | 60 ms   |
/// | 2     | 2     | 4    | 70cp  | 180 ms  |
/// | 3     | 3     | 2    | 25cp  | 540 ms  |
/// | 4     | 4     | 1    | 0     | 1.5 s   |
/// | 5     | 5     | 1    | 0     | 5 s     |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deepest iteration in plies.
    pub max_depth: u8,
    /// Wall-clock budget per search; 0 means unbounded.
    pub time_budget_ms: u64,
    /// How many of the top root moves are eligible when noise is applied.
    pub candidate_pool: usize,
    /// Half-width of the uniform noise added to candidate scores.
    pub noise_cp: i32,
}

impl EngineConfig {
    pub const MIN_LEVEL: u8 = 1;
    pub const MAX_LEVEL: u8 = 5;

    /// Settings for difficulty `level`, clamped to 1..=5.
    pub fn level(level: u8) -> Self {
        let (max_depth, candidate_pool, noise_cp, time_budget_ms) =
            match level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL) {
                1 => (1, 5, 120, 60),
                2 => (2, 4, 70, 180),
                3 => (3, 2, 25, 540),
                4 => (4, 1, 0, 1_500),
                _ => (5, 1, 0, 5_000),
            };
        EngineConfig {
            max_depth,
            time_budget_ms,
            candidate_pool,
            noise_cp,
        }
    }

    /// A fixed-depth search with no time limit and no randomness.
    pub fn fixed_depth(max_depth: u8) -> Self {
        EngineConfig {
            max_depth,
            time_budget_ms: 0,
            candidate_pool: 1,
            noise_cp: 0,
        }
    }

    pub fn time_budget(&self) -> Option<Duration> {
        (self.time_budget_ms > 0).then(|| Duration::from_millis(self.time_budget_ms))
    }

    pub fn is_randomized(&self) -> bool {
        self.noise_cp > 0 && self.candidate_pool > 1
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::level(3)
    }
}
