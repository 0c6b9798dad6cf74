//! 局面表現
//!
//! - `Position`: 盤面・手番・キャスリング権・Zobristキーなどの正規状態
//! - `StateInfo`: do_move/undo_moveで退避・復元する差分情報
//! - FEN形式の入出力とSEE（静的交換評価）

mod fen;
mod pos;
mod see;
mod state;
mod zobrist;

pub use fen::{FenParseError, START_FEN};
pub use pos::Position;
pub use state::StateInfo;
