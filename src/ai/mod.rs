//! 电脑玩家（均匀随机选点）。

pub mod random;

pub use random::RandomAgent;
