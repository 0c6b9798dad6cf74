//! 探索エンジン
//!
//! 反復深化 + PVS（aspiration window、null move、razoring、futility、
//! LMR、singular extension）と、YBWC方式のsplit pointによる並列化。

mod history;
mod limits;
mod movepick;
#[allow(clippy::module_inception)]
mod search;
mod thread;
mod time_manager;
mod types;

pub use history::History;
pub use limits::LimitsType;
pub use movepick::{MovePhase, MovePicker};
pub use search::{InfoEvent, Search, SearchOptions, SearchResult};
pub use thread::{ThreadPool, MAX_THREADS};
pub use time_manager::TimeManager;
pub use types::{value_from_tt, value_to_tt, RootMoveList, SearchStack, Signals};
