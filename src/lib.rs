pub mod ai;
pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use gloo_timers::callback::Timeout;
use gloo_timers::future::TimeoutFuture;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::js_sys::Function;

pub use ai::RandomAgent;
pub use game::{
    evaluate, status_text, Board, Cell, CellIndex, ControllerConfig, GameController, GameEvent,
    GameState, GameView, IntegrityError, ManualScheduler, Mode, MoveError, MoveResolution,
    MoveTicket, Mover, ScheduledMove, Symbol, TurnScheduler, Verdict,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// 统一用 JSON 兼容格式转换，保证空格子在 JS 中是 `null` 而非 `undefined`。
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn integrity_to_js_error(error: IntegrityError) -> JsValue {
    to_js(&error).unwrap_or_else(|serialize_err| serialize_err)
}

type SharedController = Rc<RefCell<GameController<BrowserScheduler>>>;
type Listener = Rc<RefCell<Option<Function>>>;

fn notify(listener: &Listener, view: &GameView) {
    // 先克隆回调再调用，回调内部可以重新注册监听或继续操作引擎。
    let callback = listener.borrow().clone();
    let Some(callback) = callback else {
        return;
    };
    match to_js(view) {
        Ok(value) => {
            if let Err(error) = callback.call1(&JsValue::NULL, &value) {
                web_sys::console::error_2(&"game listener threw".into(), &error);
            }
        }
        Err(error) => web_sys::console::error_2(&"failed to serialize game view".into(), &error),
    }
}

/// 控制器正忙时，到期的电脑回合稍后重试的间隔。
const BUSY_RETRY_MS: u32 = 16;

type WeakController = Weak<RefCell<GameController<BrowserScheduler>>>;

/// 用 `gloo_timers` 的单次定时器延迟执行电脑回合。定时器只持有控制器的弱引用；
/// 取消时丢弃 `Timeout`，浏览器侧的定时器随之清除。
pub struct BrowserScheduler {
    controller: WeakController,
    listener: Listener,
    timer: Option<(MoveTicket, Timeout)>,
}

impl BrowserScheduler {
    /// 交出已触发的定时器。
    fn release(&mut self, ticket: MoveTicket) -> Option<Timeout> {
        match self.timer.take() {
            Some((current, timeout)) if current == ticket => Some(timeout),
            other => {
                self.timer = other;
                None
            }
        }
    }
}

impl TurnScheduler for BrowserScheduler {
    fn schedule(&mut self, request: ScheduledMove) {
        let controller = self.controller.clone();
        let listener = self.listener.clone();
        let ticket = request.ticket;
        let timeout = Timeout::new(request.delay_ms, move || {
            fire_computer_move(&controller, &listener, ticket);
        });
        self.timer = Some((ticket, timeout));
    }

    fn cancel(&mut self, ticket: MoveTicket) {
        if let Some(timeout) = self.release(ticket) {
            drop(timeout);
            console_log!("computer move ticket {ticket} cancelled");
        }
    }
}

fn fire_computer_move(controller: &WeakController, listener: &Listener, ticket: MoveTicket) {
    let Some(shared) = controller.upgrade() else {
        return;
    };
    let view = {
        let Ok(mut game) = shared.try_borrow_mut() else {
            // 凭证仍然有效，稍后重试，否则电脑回合会永远挂起。
            utils::warn(&format!(
                "game controller busy, retrying computer move ticket {ticket}"
            ));
            let controller = controller.clone();
            let listener = listener.clone();
            spawn_local(async move {
                TimeoutFuture::new(BUSY_RETRY_MS).await;
                fire_computer_move(&controller, &listener, ticket);
            });
            return;
        };
        if let Some(spent) = game.scheduler_mut().release(ticket) {
            // 回调仍在执行，延后到下一个微任务再释放。
            spawn_local(async move { drop(spent) });
        }
        if game.run_scheduled(ticket).is_none() {
            return;
        }
        game.view()
    };
    notify(listener, &view);
}

#[derive(Serialize, Deserialize)]
struct MoveResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<MoveResolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<MoveError>,
}

/// 暴露给页面的对局引擎。
#[wasm_bindgen]
pub struct GameEngine {
    controller: SharedController,
    listener: Listener,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config: ControllerConfig = match config_json {
            Some(json) => serde_json::from_str(&json).map_err(serde_to_js_error)?,
            None => ControllerConfig::default(),
        };
        let listener: Listener = Rc::new(RefCell::new(None));
        let controller = Rc::new_cyclic(|weak| {
            let scheduler = BrowserScheduler {
                controller: weak.clone(),
                listener: listener.clone(),
                timer: None,
            };
            RefCell::new(GameController::new(config, scheduler))
        });
        Ok(GameEngine {
            controller,
            listener,
        })
    }

    /// 注册状态变化回调，参数为当前视图；传 `undefined` 取消注册。
    pub fn on_change(&self, callback: Option<Function>) {
        *self.listener.borrow_mut() = callback;
    }

    /// 玩家点击格子。无效点击返回 `false`，状态不变。
    pub fn apply_move(&self, index: usize) -> bool {
        let result = self.controller.borrow_mut().apply_move(index);
        match result {
            Ok(_) => {
                self.changed();
                true
            }
            Err(rejection) => {
                console_log!("move rejected: {rejection}");
                false
            }
        }
    }

    pub fn apply_move_json(&self, index: usize) -> Result<String, JsValue> {
        let result = self.controller.borrow_mut().apply_move(index);
        let response = match result {
            Ok(resolution) => MoveResponse {
                accepted: true,
                resolution: Some(resolution),
                rejection: None,
            },
            Err(rejection) => MoveResponse {
                accepted: false,
                resolution: None,
                rejection: Some(rejection),
            },
        };
        if response.accepted {
            self.changed();
        }
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    pub fn restart(&self) {
        self.controller.borrow_mut().restart();
        self.changed();
    }

    pub fn set_mode(&self, mode: &str) -> Result<(), JsValue> {
        let mode = Mode::from_str(mode)
            .map_err(|_| JsValue::from_str(&format!("unknown mode: {mode}")))?;
        self.controller.borrow_mut().set_mode(mode);
        self.changed();
        Ok(())
    }

    /// 立即让电脑落子，返回落子位置；不在电脑回合时返回 `undefined`。
    pub fn computer_move(&self) -> Option<usize> {
        let played = self.controller.borrow_mut().computer_move();
        let index = played.map(|resolution| resolution.index);
        if index.is_some() {
            self.changed();
        }
        index
    }

    pub fn computer_pending(&self) -> bool {
        self.controller.borrow().pending_ticket().is_some()
    }

    pub fn status(&self) -> String {
        self.controller.borrow().view().status
    }

    pub fn view(&self) -> Result<JsValue, JsValue> {
        to_js(&self.controller.borrow().view())
    }

    pub fn view_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.controller.borrow().view()).map_err(serde_to_js_error)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.controller.borrow().state()).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        self.controller
            .borrow_mut()
            .replace_state(state)
            .map_err(integrity_to_js_error)?;
        self.changed();
        Ok(())
    }
}

impl GameEngine {
    fn changed(&self) {
        let view = self.controller.borrow().view();
        notify(&self.listener, &view);
    }
}

/// 对任意棋盘做胜负判定。
#[wasm_bindgen(js_name = "evaluateBoard")]
pub fn evaluate_board(board: JsValue) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    to_js(&evaluate(&board))
}

#[wasm_bindgen(js_name = "statusText")]
pub fn status_text_for(board: JsValue, turn: JsValue) -> Result<String, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    let turn: Symbol = from_value(turn).map_err(JsValue::from)?;
    Ok(status_text(&evaluate(&board), turn))
}

/// 返回一局新的人人对战状态。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state() -> Result<JsValue, JsValue> {
    to_js(&GameState::default())
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state.integrity_check().map_err(integrity_to_js_error)
}
