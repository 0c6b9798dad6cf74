//! 局面状態（StateInfo）

use crate::bitboard::Bitboard;
use crate::types::{CastlingRights, Move, Piece, Square, Value};

/// 局面状態
///
/// do_move時に前の状態を保存し、undo_move時に復元するための情報を保持する。
#[derive(Clone, Copy)]
pub struct StateInfo {
    /// 局面ハッシュ
    pub key: u64,
    /// 歩のハッシュ
    pub pawn_key: u64,
    /// 駒割ハッシュ
    pub material_key: u64,
    /// キャスリング権
    pub castling: CastlingRights,
    /// アンパッサン可能マス
    pub ep_square: Option<Square>,
    /// 50手ルールカウンタ
    pub rule50: i32,
    /// 直近のヌルムーブからの手数
    pub plies_from_null: i32,
    /// 王手している駒
    pub checkers: Bitboard,
    /// この状態に至った指し手
    pub last_move: Move,
    /// 取られた駒
    pub captured: Piece,
    /// ポーン以外の駒の価値（手番別）
    pub non_pawn_material: [Value; 2],
}

impl StateInfo {
    /// 初期状態
    pub const fn empty() -> StateInfo {
        StateInfo {
            key: 0,
            pawn_key: 0,
            material_key: 0,
            castling: CastlingRights::NONE,
            ep_square: None,
            rule50: 0,
            plies_from_null: 0,
            checkers: Bitboard::EMPTY,
            last_move: Move::NONE,
            captured: Piece::NONE,
            non_pawn_material: [Value::ZERO, Value::ZERO],
        }
    }
}

impl Default for StateInfo {
    fn default() -> Self {
        Self::empty()
    }
}
