use serde::{Deserialize, Serialize};

use super::{
    board::CellIndex,
    rules::{validate_human_move, validate_placement, MoveError, MoveResolution, Verdict},
    state::{GameEvent, GameState, GameView, IntegrityError, Mode, MoveTicket, Mover},
};
use crate::ai::RandomAgent;

/// 电脑落子前的默认停顿，仅为让玩家看清节奏。
pub const DEFAULT_COMPUTER_DELAY_MS: u32 = 500;

fn default_computer_delay() -> u32 {
    DEFAULT_COMPUTER_DELAY_MS
}

/// 控制器配置，可由前端以 JSON 传入；缺省字段取默认值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerConfig {
    #[serde(default = "default_computer_delay")]
    pub computer_delay_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub mode: Mode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            computer_delay_ms: DEFAULT_COMPUTER_DELAY_MS,
            seed: None,
            mode: Mode::default(),
        }
    }
}

impl ControllerConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    fn agent(&self) -> RandomAgent {
        match self.seed {
            Some(seed) => RandomAgent::with_seed(seed),
            None => RandomAgent::new(),
        }
    }
}

/// 一次待执行的电脑落子。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledMove {
    pub ticket: MoveTicket,
    pub delay_ms: u32,
}

/// 电脑回合的定时器。到期后宿主应调用 [`GameController::run_scheduled`]；
/// 过期凭证会被控制器忽略，所以 `cancel` 只需尽力而为。
pub trait TurnScheduler {
    fn schedule(&mut self, request: ScheduledMove);
    fn cancel(&mut self, ticket: MoveTicket);
}

/// 只记录请求、由宿主显式触发的调度器，适用于无界面环境与测试。
#[derive(Debug, Default)]
pub struct ManualScheduler {
    pub requests: Vec<ScheduledMove>,
    pub cancelled: Vec<MoveTicket>,
}

impl ManualScheduler {
    pub fn take_requests(&mut self) -> Vec<ScheduledMove> {
        std::mem::take(&mut self.requests)
    }
}

impl TurnScheduler for ManualScheduler {
    fn schedule(&mut self, request: ScheduledMove) {
        self.requests.push(request);
    }

    fn cancel(&mut self, ticket: MoveTicket) {
        self.requests.retain(|request| request.ticket != ticket);
        self.cancelled.push(ticket);
    }
}

/// 持有棋盘、轮次与模式，并负责电脑回合的预约与取消。
pub struct GameController<S: TurnScheduler> {
    state: GameState,
    agent: RandomAgent,
    scheduler: S,
    config: ControllerConfig,
    pending: Option<MoveTicket>,
    next_ticket: MoveTicket,
}

impl<S: TurnScheduler> GameController<S> {
    pub fn new(config: ControllerConfig, scheduler: S) -> Self {
        Self {
            state: GameState::new(config.mode),
            agent: config.agent(),
            scheduler,
            config,
            pending: None,
            next_ticket: 1,
        }
    }

    /// 从快照恢复。快照必须通过完整性校验；恢复后若轮到电脑会立即预约。
    pub fn restore(
        config: ControllerConfig,
        scheduler: S,
        state: GameState,
    ) -> Result<Self, IntegrityError> {
        let mut controller = Self::new(config, scheduler);
        controller.replace_state(state)?;
        Ok(controller)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn verdict(&self) -> Verdict {
        self.state.verdict()
    }

    pub fn pending_ticket(&self) -> Option<MoveTicket> {
        self.pending
    }

    pub fn view(&self) -> GameView {
        self.state.view(self.pending.is_some())
    }

    /// 人类落子。被拒绝时状态完全不变。
    pub fn apply_move(&mut self, index: CellIndex) -> Result<MoveResolution, MoveError> {
        validate_human_move(&self.state, index)?;

        let symbol = self.state.turn;
        let mut events = self.state.place(index, Mover::Human);
        events.extend(self.sync_computer_turn());
        Ok(MoveResolution::new(index, symbol, self.state.clone(), events))
    }

    pub fn restart(&mut self) {
        self.cancel_pending();
        self.state.reset();
        self.sync_computer_turn();
    }

    /// 切换模式总是重开一局。
    pub fn set_mode(&mut self, mode: Mode) {
        self.state.mode = mode;
        self.restart();
    }

    /// 立即执行电脑回合，并作废尚未到期的预约。不在电脑回合时返回 `None`。
    pub fn computer_move(&mut self) -> Option<MoveResolution> {
        if !self.state.is_computer_turn() {
            return None;
        }
        self.cancel_pending();
        self.play_computer_turn()
    }

    /// 定时器到期时调用。只有当前有效的凭证才会落子。
    pub fn run_scheduled(&mut self, ticket: MoveTicket) -> Option<MoveResolution> {
        if self.pending != Some(ticket) {
            crate::console_log!("ignoring stale computer move ticket {ticket}");
            return None;
        }
        self.pending = None;
        if !self.state.is_computer_turn() {
            return None;
        }
        self.play_computer_turn()
    }

    /// 替换整个对局状态，作废预约并按新状态重新判断是否轮到电脑。
    pub fn replace_state(&mut self, state: GameState) -> Result<(), IntegrityError> {
        state.integrity_check()?;
        self.cancel_pending();
        self.state = state;
        self.sync_computer_turn();
        Ok(())
    }

    fn play_computer_turn(&mut self) -> Option<MoveResolution> {
        let Some(index) = self.agent.choose(&self.state.board) else {
            crate::utils::error("computer turn reached with no empty cell");
            debug_assert!(false, "computer turn reached with no empty cell");
            return None;
        };
        if let Err(error) = validate_placement(&self.state, index) {
            crate::utils::error(&format!("computer picked an illegal cell: {error}"));
            return None;
        }

        let symbol = self.state.turn;
        let mut events = self.state.place(index, Mover::Computer);
        events.extend(self.sync_computer_turn());
        crate::console_log!("computer played {symbol} at {index}");
        Some(MoveResolution::new(index, symbol, self.state.clone(), events))
    }

    /// 每次状态变化后的检查：人机模式、轮到 O 且未结束时，预约且仅预约一次电脑落子。
    fn sync_computer_turn(&mut self) -> Option<GameEvent> {
        if self.pending.is_some() || !self.state.is_computer_turn() {
            return None;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending = Some(ticket);

        let delay_ms = self.config.computer_delay_ms;
        self.scheduler.schedule(ScheduledMove { ticket, delay_ms });
        let event = GameEvent::ComputerMoveScheduled { ticket, delay_ms };
        self.state.record_event(event.clone());
        Some(event)
    }

    fn cancel_pending(&mut self) {
        if let Some(ticket) = self.pending.take() {
            self.scheduler.cancel(ticket);
            self.state
                .record_event(GameEvent::ComputerMoveCancelled { ticket });
        }
    }
}

impl GameController<ManualScheduler> {
    pub fn headless(config: ControllerConfig) -> Self {
        Self::new(config, ManualScheduler::default())
    }

    /// 触发所有已到期的预约，返回实际发生的电脑落子。
    pub fn fire_scheduled(&mut self) -> Vec<MoveResolution> {
        let requests = self.scheduler.take_requests();
        requests
            .into_iter()
            .filter_map(|request| self.run_scheduled(request.ticket))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Board, Cell, Symbol};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn controller(mode: Mode) -> GameController<ManualScheduler> {
        GameController::headless(ControllerConfig::default().with_seed(11).with_mode(mode))
    }

    fn board(notation: &str) -> Board {
        notation.parse().expect("test board should parse")
    }

    #[test]
    fn first_move_on_empty_board() {
        let mut game = controller(Mode::Human);
        let resolution = game.apply_move(4).expect("move should be accepted");

        assert_eq!(game.state().board.get(4), Some(Cell::Marked(Symbol::X)));
        assert_eq!(game.state().turn, Symbol::O);
        assert_eq!(resolution.verdict, Verdict::InProgress);
        assert_eq!(resolution.symbol, Symbol::X);
        assert!(game.pending_ticket().is_none(), "human mode never schedules");
    }

    #[test]
    fn won_board_rejects_every_move() {
        let mut game = controller(Mode::Human);
        game.state.board = board("XXX.OO...");
        game.state.turn = Symbol::O;
        let before = game.state().clone();

        for index in game.state().board.empty_indices() {
            assert_eq!(game.apply_move(index).err(), Some(MoveError::GameFinished));
        }
        assert_eq!(game.state(), &before);
        assert_eq!(
            game.verdict(),
            Verdict::Win {
                winner: Symbol::X,
                line: [0, 1, 2]
            }
        );
    }

    #[test]
    fn computer_takes_the_only_empty_cell() {
        let mut game = controller(Mode::Computer);
        game.state.board = board("XOXXOOO.X");
        game.state.turn = Symbol::O;

        let resolution = game.computer_move().expect("computer should move");
        assert_eq!(resolution.index, 7);
        assert_eq!(game.state().board.get(7), Some(Cell::Marked(Symbol::O)));
        assert_eq!(game.state().turn, Symbol::X);
    }

    #[test]
    fn full_board_is_draw() {
        let mut game = controller(Mode::Human);
        game.state.board = board("XOXOXOOXO");
        assert_eq!(game.verdict(), Verdict::Draw);
        assert_eq!(game.view().status, "It's a draw!");
    }

    #[test]
    fn mode_change_mid_game_resets_and_cancels_pending_move() {
        let mut game = controller(Mode::Computer);
        game.apply_move(0).expect("human move should be accepted");
        let ticket = game.pending_ticket().expect("computer move should be scheduled");

        game.set_mode(Mode::Computer);

        assert_eq!(game.state().board, Board::new());
        assert_eq!(game.state().turn, Symbol::X);
        assert_eq!(game.state().mode, Mode::Computer);
        assert!(game.pending_ticket().is_none());
        assert_eq!(game.scheduler().cancelled, vec![ticket]);
        assert!(game.scheduler().requests.is_empty());

        // 迟到的定时器不能写入已清空的棋盘。
        assert!(game.run_scheduled(ticket).is_none());
        assert_eq!(game.state().board, Board::new());
    }

    #[test]
    fn restart_cancels_pending_move() {
        let mut game = controller(Mode::Computer);
        game.apply_move(8).expect("human move should be accepted");
        let ticket = game.pending_ticket().expect("computer move should be scheduled");

        game.restart();

        assert!(game.run_scheduled(ticket).is_none());
        assert_eq!(game.state(), &GameState::new(Mode::Computer));
    }

    #[test]
    fn human_cannot_move_during_computer_turn() {
        let mut game = controller(Mode::Computer);
        game.apply_move(4).expect("human move should be accepted");
        let before = game.state().clone();

        assert_eq!(game.apply_move(0).err(), Some(MoveError::NotHumanTurn));
        assert_eq!(game.state(), &before);
    }

    #[test]
    fn exactly_one_move_is_scheduled_per_computer_turn() {
        let mut game = controller(Mode::Computer);
        game.apply_move(4).expect("human move should be accepted");
        assert_eq!(game.scheduler().requests.len(), 1);
        assert_eq!(
            game.scheduler().requests[0].delay_ms,
            DEFAULT_COMPUTER_DELAY_MS
        );

        let played = game.fire_scheduled();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].symbol, Symbol::O);
        assert_eq!(game.state().turn, Symbol::X);
        assert!(game.pending_ticket().is_none());
        assert!(game.scheduler().requests.is_empty());
    }

    #[test]
    fn direct_computer_move_invalidates_the_timer() {
        let mut game = controller(Mode::Computer);
        game.apply_move(4).expect("human move should be accepted");
        let ticket = game.pending_ticket().expect("computer move should be scheduled");

        game.computer_move().expect("computer should move");
        let snapshot = game.state().board;

        assert!(game.run_scheduled(ticket).is_none());
        assert_eq!(game.state().board, snapshot);
    }

    #[test]
    fn computer_move_outside_its_turn_is_noop() {
        let mut game = controller(Mode::Human);
        game.apply_move(0).expect("move should be accepted");
        let before = game.state().clone();

        assert!(game.computer_move().is_none());
        assert_eq!(game.state(), &before);
    }

    #[test]
    fn no_computer_move_after_human_wins() {
        let mut game = controller(Mode::Computer);
        game.state.board = board("XX.OO....");
        game.apply_move(2).expect("winning move should be accepted");

        assert_eq!(game.verdict().winner(), Some(Symbol::X));
        assert!(game.pending_ticket().is_none());
        assert!(game.scheduler().requests.is_empty());
    }

    #[test]
    fn restoring_computer_turn_schedules_a_move() {
        let mut state = GameState::new(Mode::Computer);
        state.board = board("X........");
        state.turn = Symbol::O;

        let game = GameController::restore(
            ControllerConfig::default().with_seed(3),
            ManualScheduler::default(),
            state,
        )
        .expect("snapshot should be valid");

        assert!(game.pending_ticket().is_some());
        assert_eq!(game.scheduler().requests.len(), 1);
    }

    #[test]
    fn restoring_corrupt_snapshot_fails() {
        let mut state = GameState::new(Mode::Human);
        state.board = board("XXX......");
        assert!(matches!(
            GameController::restore(ControllerConfig::default(), ManualScheduler::default(), state),
            Err(IntegrityError::SymbolCountMismatch { x: 3, o: 0 })
        ));
    }

    #[test]
    fn restoring_game_continued_after_win_fails() {
        let mut state = GameState::new(Mode::Computer);
        state.board = board("XXXOO.O..");
        let mut game = controller(Mode::Human);
        let before = game.state().clone();

        assert_eq!(
            game.replace_state(state),
            Err(IntegrityError::MovesAfterWin {
                winner: Symbol::X,
                x: 3,
                o: 3
            })
        );
        assert_eq!(game.state(), &before);

        let mut state = GameState::new(Mode::Computer);
        state.board = board("XXXOOO...");
        assert_eq!(game.replace_state(state), Err(IntegrityError::BothSymbolsWon));
        assert!(game.pending_ticket().is_none());
    }

    #[test]
    fn rejected_moves_leave_state_identical() {
        let mut game = controller(Mode::Human);
        game.apply_move(0).expect("move should be accepted");
        let before = game.state().clone();

        assert_eq!(
            game.apply_move(9).err(),
            Some(MoveError::OutOfRange { index: 9 })
        );
        assert_eq!(
            game.apply_move(0).err(),
            Some(MoveError::CellOccupied { index: 0 })
        );
        assert_eq!(game.state(), &before);
    }

    #[test]
    fn random_play_keeps_symbol_parity() {
        let mut rng = SmallRng::seed_from_u64(2024);
        for round in 0..200 {
            let mode = if round % 2 == 0 { Mode::Human } else { Mode::Computer };
            let mut game = GameController::headless(
                ControllerConfig::default().with_seed(round).with_mode(mode),
            );

            for _ in 0..40 {
                let index = rng.gen_range(0..12);
                let before = game.state().clone();
                if game.apply_move(index).is_err() {
                    assert_eq!(game.state(), &before, "rejection must be a no-op");
                }
                game.fire_scheduled();

                let x = game.state().board.count(Symbol::X);
                let o = game.state().board.count(Symbol::O);
                assert!(x >= o && x - o <= 1, "x={x} o={o}");
                assert_eq!(game.state().integrity_check(), Ok(()));

                if game.state().is_finished() {
                    break;
                }
            }
        }
    }

    #[test]
    fn config_json_defaults() {
        let config: ControllerConfig = serde_json::from_str("{}").expect("config should parse");
        assert_eq!(config, ControllerConfig::default());

        let config: ControllerConfig =
            serde_json::from_str(r#"{"computer_delay_ms":0,"seed":5,"mode":"computer"}"#)
                .expect("config should parse");
        assert_eq!(config.computer_delay_ms, 0);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.mode, Mode::Computer);
    }
}
