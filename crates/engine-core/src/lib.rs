//! Chess engine core
//!
//! - `types`: マス・駒・指し手・評価値などの基本型
//! - `bitboard`: magic bitboardによる利きテーブル
//! - `position`: 局面表現とdo_move/undo_move、SEE
//! - `movegen`: 段階的な指し手生成とperft
//! - `eval`: 駒割り+PSTの静的評価
//! - `tt`: 世代管理付きの共有置換表
//! - `search`: 反復深化・PVS・YBWC並列探索

pub mod bitboard;
pub mod eval;
pub mod movegen;
pub mod position;
pub mod search;
pub mod tt;
pub mod types;

pub use position::{Position, START_FEN};
pub use search::{InfoEvent, LimitsType, Search, SearchResult};

/// 全テーブル（利き・Zobrist・縮小テーブル）を初期化する
///
/// 各コンストラクタからも遅延初期化されるが、起動時に呼んでおくと
/// 最初の探索の前に重いmagic探索が済む。
pub fn init() {
    bitboard::init();
}
