use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::game::{Board, CellIndex};

/// 朴素电脑玩家：在所有空格中等概率随机选择，不做任何前瞻。
pub struct RandomAgent {
    rng: SmallRng,
}

impl RandomAgent {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// 棋盘已满时返回 `None`。
    pub fn choose(&mut self, board: &Board) -> Option<CellIndex> {
        board.empty_indices().choose(&mut self.rng).copied()
    }
}

impl Default for RandomAgent {
    fn default() -> Self {
        Self::new()
    }
}
