//! 游戏核心逻辑模块（棋盘、判定规则、对局控制器）。

pub mod board;
pub mod controller;
pub mod rules;
pub mod state;

pub use board::{Board, Cell, CellIndex, Line, ParseBoardError, Symbol, CELL_COUNT, LINES};
pub use controller::{
    ControllerConfig, GameController, ManualScheduler, ScheduledMove, TurnScheduler,
    DEFAULT_COMPUTER_DELAY_MS,
};
pub use rules::{evaluate, status_text, validate_human_move, MoveError, MoveResolution, Verdict};
pub use state::{
    GameEvent, GameState, GameView, IntegrityError, Mode, MoveTicket, Mover, COMPUTER_SYMBOL,
    HUMAN_SYMBOL,
};
