use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    board::{Board, Cell, CellIndex, Line, Symbol, CELL_COUNT, LINES},
    state::{GameEvent, GameState, Mode, HUMAN_SYMBOL},
};

/// 棋局判定结果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Verdict {
    InProgress,
    Win { winner: Symbol, line: Line },
    Draw,
}

impl Verdict {
    pub fn is_over(&self) -> bool {
        !matches!(self, Verdict::InProgress)
    }

    pub fn winner(&self) -> Option<Symbol> {
        match self {
            Verdict::Win { winner, .. } => Some(*winner),
            _ => None,
        }
    }

    pub fn winning_line(&self) -> Option<Line> {
        match self {
            Verdict::Win { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// 三格同为某一方时返回该方。
pub fn line_owner(board: &Board, line: Line) -> Option<Symbol> {
    let [a, b, c] = line;
    let Some(Cell::Marked(symbol)) = board.get(a) else {
        return None;
    };
    let mark = Some(Cell::Marked(symbol));
    (board.get(b) == mark && board.get(c) == mark).then_some(symbol)
}

/// 按固定顺序检查 8 条连线，第一条三子相同的连线即为胜线；
/// 无胜线且棋盘已满为平局，否则继续。对任意棋盘（包括无法合法到达的）都有定义。
pub fn evaluate(board: &Board) -> Verdict {
    for line in LINES {
        if let Some(winner) = line_owner(board, line) {
            return Verdict::Win { winner, line };
        }
    }

    if board.is_full() {
        Verdict::Draw
    } else {
        Verdict::InProgress
    }
}

/// 页面显示的状态文本。
pub fn status_text(verdict: &Verdict, turn: Symbol) -> String {
    match verdict {
        Verdict::Win { winner, .. } => format!("Winner: {winner}"),
        Verdict::Draw => "It's a draw!".to_string(),
        Verdict::InProgress => format!("Next Turn: {turn}"),
    }
}

/// 被拒绝的落子。前端只把它当作无效点击，状态保持不变。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum MoveError {
    OutOfRange { index: CellIndex },
    CellOccupied { index: CellIndex },
    GameFinished,
    NotHumanTurn,
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveError::OutOfRange { index } => {
                write!(f, "cell {index} is outside the board (0..{CELL_COUNT})")
            }
            MoveError::CellOccupied { index } => write!(f, "cell {index} is already taken"),
            MoveError::GameFinished => f.write_str("the game is already over"),
            MoveError::NotHumanTurn => f.write_str("waiting for the computer to move"),
        }
    }
}

impl std::error::Error for MoveError {}

/// 人类玩家落子前的全部检查，按顺序：越界、已占用、已结束、轮到电脑。
pub fn validate_human_move(state: &GameState, index: CellIndex) -> Result<(), MoveError> {
    validate_placement(state, index)?;
    if state.mode == Mode::Computer && state.turn != HUMAN_SYMBOL {
        return Err(MoveError::NotHumanTurn);
    }
    Ok(())
}

pub(crate) fn validate_placement(state: &GameState, index: CellIndex) -> Result<(), MoveError> {
    match state.board.get(index) {
        None => return Err(MoveError::OutOfRange { index }),
        Some(Cell::Marked(_)) => return Err(MoveError::CellOccupied { index }),
        Some(Cell::Empty) => {}
    }
    if evaluate(&state.board).is_over() {
        return Err(MoveError::GameFinished);
    }
    Ok(())
}

/// 一次成功落子的结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveResolution {
    pub index: CellIndex,
    pub symbol: Symbol,
    pub verdict: Verdict,
    pub events: Vec<GameEvent>,
    pub state: GameState,
}

impl MoveResolution {
    pub fn new(index: CellIndex, symbol: Symbol, state: GameState, events: Vec<GameEvent>) -> Self {
        let verdict = evaluate(&state.board);
        Self {
            index,
            symbol,
            verdict,
            events,
            state,
        }
    }
}
