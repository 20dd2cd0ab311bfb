use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::board::{Board, Cell, CellIndex, Line, Symbol, LINES};
use super::rules::{evaluate, line_owner, status_text, Verdict};

/// 人机模式下人类固定执 X。
pub const HUMAN_SYMBOL: Symbol = Symbol::X;
/// 人机模式下电脑固定执 O。
pub const COMPUTER_SYMBOL: Symbol = Symbol::O;

/// 对局模式。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Human,
    Computer,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Human
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "pvp" => Ok(Mode::Human),
            "computer" | "cpu" => Ok(Mode::Computer),
            _ => Err(()),
        }
    }
}

/// 落子来源。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mover {
    Human,
    Computer,
}

/// 电脑落子的预约凭证，每次预约递增；过期凭证一律作废。
pub type MoveTicket = u64;

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    MovePlayed {
        symbol: Symbol,
        index: CellIndex,
        by: Mover,
    },
    GameWon {
        winner: Symbol,
        line: Line,
    },
    GameDrawn,
    ComputerMoveScheduled {
        ticket: MoveTicket,
        delay_ms: u32,
    },
    ComputerMoveCancelled {
        ticket: MoveTicket,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    /// O 的子数超过 X，或 X 比 O 多出不止一子。
    SymbolCountMismatch { x: usize, o: usize },
    /// 双方同时连成一线。
    BothSymbolsWon,
    /// 胜负已分后仍有落子：X 胜时须比 O 多一子，O 胜时须子数相等。
    MovesAfterWin { winner: Symbol, x: usize, o: usize },
    /// 轮次与棋盘子数不一致。
    TurnMismatch { expected: Symbol, actual: Symbol },
}

/// 对局整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub board: Board,
    #[serde(default)]
    pub turn: Symbol,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(mode: Mode) -> Self {
        Self {
            board: Board::new(),
            turn: Symbol::X,
            mode,
            event_log: Vec::new(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        evaluate(&self.board)
    }

    pub fn is_finished(&self) -> bool {
        self.verdict().is_over()
    }

    /// 人机模式、轮到电脑且对局未结束。
    pub fn is_computer_turn(&self) -> bool {
        self.mode == Mode::Computer && self.turn == COMPUTER_SYMBOL && !self.is_finished()
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    /// 清空棋盘，X 先手，保留模式。
    pub fn reset(&mut self) {
        self.board.clear();
        self.turn = Symbol::X;
        self.event_log.clear();
    }

    /// 写入当前轮次的棋子并换手。调用方须先完成合法性校验。
    pub(crate) fn place(&mut self, index: CellIndex, by: Mover) -> Vec<GameEvent> {
        let symbol = self.turn;
        let mut events = Vec::new();
        if !self.board.set(index, Cell::Marked(symbol)) {
            return events;
        }
        self.turn = symbol.opponent();
        events.push(GameEvent::MovePlayed { symbol, index, by });

        match self.verdict() {
            Verdict::Win { winner, line } => events.push(GameEvent::GameWon { winner, line }),
            Verdict::Draw => events.push(GameEvent::GameDrawn),
            Verdict::InProgress => {}
        }

        for event in &events {
            self.record_event(event.clone());
        }
        events
    }

    /// 校验外部恢复的快照：X 先手，所以 X 的子数等于或比 O 多一；至多一方连线，
    /// 且胜线必须由最后一手完成；轮次与子数对应。
    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let x = self.board.count(Symbol::X);
        let o = self.board.count(Symbol::O);
        if o > x || x > o + 1 {
            return Err(IntegrityError::SymbolCountMismatch { x, o });
        }

        let has_line = |symbol| {
            LINES
                .iter()
                .any(|&line| line_owner(&self.board, line) == Some(symbol))
        };
        if has_line(Symbol::X) && has_line(Symbol::O) {
            return Err(IntegrityError::BothSymbolsWon);
        }

        if let Some(winner) = self.verdict().winner() {
            let consistent = match winner {
                Symbol::X => x == o + 1,
                Symbol::O => x == o,
            };
            if !consistent {
                return Err(IntegrityError::MovesAfterWin { winner, x, o });
            }
        }

        let expected = if x == o { Symbol::X } else { Symbol::O };
        if self.turn != expected {
            return Err(IntegrityError::TurnMismatch {
                expected,
                actual: self.turn,
            });
        }
        Ok(())
    }

    pub fn view(&self, computer_pending: bool) -> GameView {
        let verdict = self.verdict();
        GameView {
            board: self.board,
            status: status_text(&verdict, self.turn),
            winning_line: verdict
                .winning_line()
                .map(|line| line.to_vec())
                .unwrap_or_default(),
            turn: self.turn,
            mode: self.mode,
            verdict,
            computer_pending,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

/// 提供给页面渲染的只读投影。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameView {
    pub board: Board,
    pub status: String,
    pub winning_line: Vec<CellIndex>,
    pub turn: Symbol,
    pub mode: Mode,
    pub verdict: Verdict,
    pub computer_pending: bool,
}
