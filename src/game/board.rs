use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 棋盘格子数量（3×3）。
pub const CELL_COUNT: usize = 9;

/// 格子下标，按行优先排列：0,1,2 / 3,4,5 / 6,7,8。
pub type CellIndex = usize;

/// 一条连线上的三个格子。
pub type Line = [CellIndex; 3];

/// 全部 8 条连线：先三行（自上而下），再三列（自左而右），最后两条对角线。
pub const LINES: [Line; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// 玩家使用的棋子符号。X 总是先手。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    pub fn opponent(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Symbol::X
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::X => f.write_str("X"),
            Symbol::O => f.write_str("O"),
        }
    }
}

/// 单个格子。序列化为 `null`、`"X"` 或 `"O"`，方便前端直接渲染。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "Option<Symbol>", into = "Option<Symbol>")]
pub enum Cell {
    Empty,
    Marked(Symbol),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn symbol(self) -> Option<Symbol> {
        match self {
            Cell::Empty => None,
            Cell::Marked(symbol) => Some(symbol),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

impl From<Option<Symbol>> for Cell {
    fn from(value: Option<Symbol>) -> Self {
        value.map_or(Cell::Empty, Cell::Marked)
    }
}

impl From<Cell> for Option<Symbol> {
    fn from(cell: Cell) -> Self {
        cell.symbol()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseBoardError {
    WrongLength { found: usize },
    InvalidCell { position: usize, found: char },
}

impl fmt::Display for ParseBoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseBoardError::WrongLength { found } => {
                write!(f, "expected {CELL_COUNT} cells, found {found}")
            }
            ParseBoardError::InvalidCell { position, found } => {
                write!(f, "invalid cell {found:?} at position {position}")
            }
        }
    }
}

impl std::error::Error for ParseBoardError {}

/// 3×3 棋盘快照。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct Board {
    cells: [Cell; CELL_COUNT],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: CellIndex) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    pub fn is_empty_at(&self, index: CellIndex) -> bool {
        matches!(self.get(index), Some(Cell::Empty))
    }

    /// 写入格子。越界时返回 `false` 且不修改棋盘；是否允许落子由规则层判断。
    pub(crate) fn set(&mut self, index: CellIndex, cell: Cell) -> bool {
        match self.cells.get_mut(index) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.cells = [Cell::Empty; CELL_COUNT];
    }

    pub fn empty_indices(&self) -> Vec<CellIndex> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_empty())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_empty())
    }

    pub fn count(&self, symbol: Symbol) -> usize {
        self.cells
            .iter()
            .filter(|cell| cell.symbol() == Some(symbol))
            .count()
    }
}

/// 解析紧凑写法，例如 `"XXX.OO..."`；`.`、`_`、`-` 和空格表示空格子。
impl FromStr for Board {
    type Err = ParseBoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().filter(|c| !matches!(c, '|' | '\n')).collect();
        if chars.len() != CELL_COUNT {
            return Err(ParseBoardError::WrongLength { found: chars.len() });
        }

        let mut board = Board::new();
        for (position, ch) in chars.into_iter().enumerate() {
            let cell = match ch.to_ascii_uppercase() {
                'X' => Cell::Marked(Symbol::X),
                'O' => Cell::Marked(Symbol::O),
                '.' | '_' | '-' | ' ' => Cell::Empty,
                found => return Err(ParseBoardError::InvalidCell { position, found }),
            };
            board.cells[position] = cell;
        }
        Ok(board)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, cells) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                f.write_str("\n")?;
            }
            for cell in cells {
                match cell {
                    Cell::Empty => f.write_str(".")?,
                    Cell::Marked(symbol) => write!(f, "{symbol}")?,
                }
            }
        }
        Ok(())
    }
}
