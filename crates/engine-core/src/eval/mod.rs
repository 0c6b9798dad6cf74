//! 静的評価
//!
//! 駒割りとPiece-Square Tableを局面のフェーズで補間する軽量な評価関数。
//! 探索側はこの関数を純粋な `evaluate(pos) -> Value` として扱う。

mod psqt;

use crate::position::Position;
use crate::types::{piece_value_endgame, piece_value_midgame, Color, Square, Value};

/// 評価の副産物
///
/// 静止探索のfutility判定に渡す余白。この評価関数は余白を持たないが、
/// 探索との受け渡し口として残している。
#[derive(Clone, Copy, Default)]
pub struct EvalInfo {
    /// 手番別のfutilityマージン
    pub futility_margin: [Value; 2],
}

/// 手番ボーナス
const TEMPO: Value = Value::new(10);

/// フェーズ計算の分母（初期配置のポーン以外の駒価値合計）
const PHASE_MAX: i32 = 2 * (2 * 817 + 2 * 836 + 2 * 1270 + 2521);

/// 局面を評価する（手番側から見たセンチポーン）
///
/// 同じ局面に対しては常に同じ値を返す。
pub fn evaluate(pos: &Position, ei: &mut EvalInfo) -> Value {
    ei.futility_margin = [Value::ZERO, Value::ZERO];

    let mut midgame = Value::ZERO;
    let mut endgame = Value::ZERO;

    for i in 0..64 {
        let sq = Square::from_index(i).unwrap();
        let pc = pos.piece_on(sq);
        if pc.is_none() {
            continue;
        }

        let (mg, eg) = psqt::psq_bonus(pc, sq);
        let sign = if pc.color() == Color::White { 1 } else { -1 };

        midgame += (piece_value_midgame(pc) + mg) * sign;
        endgame += (piece_value_endgame(pc) + eg) * sign;
    }

    // ポーン以外の残存戦力でフェーズを決める
    let npm =
        (pos.non_pawn_material(Color::White) + pos.non_pawn_material(Color::Black)).raw();
    let phase = npm.min(PHASE_MAX);

    let blended = (midgame.raw() * phase + endgame.raw() * (PHASE_MAX - phase)) / PHASE_MAX;

    let v = Value::new(blended);
    let v = if pos.side_to_move() == Color::White { v } else { -v };
    v + TEMPO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_is_pure() {
        let pos = Position::startpos();
        let mut ei = EvalInfo::default();
        let v1 = evaluate(&pos, &mut ei);
        let v2 = evaluate(&pos, &mut ei);
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_startpos_near_balanced() {
        let pos = Position::startpos();
        let mut ei = EvalInfo::default();
        let v = evaluate(&pos, &mut ei);
        // 対称局面なので手番ボーナス程度
        assert_eq!(v, TEMPO);
    }

    #[test]
    fn test_material_advantage() {
        // 白がルーク1枚多い
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").expect("valid fen");
        let mut ei = EvalInfo::default();
        let v = evaluate(&pos, &mut ei);
        assert!(v.raw() > 1000);

        // 黒番から見ると大きく負
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 b - - 0 1").expect("valid fen");
        let v = evaluate(&pos, &mut ei);
        assert!(v.raw() < -1000);
    }

    #[test]
    fn test_symmetry() {
        // 白黒を入れ替えて盤を反転した局面は手番側から見て同じ値
        let white =
            Position::from_fen("4k3/8/8/3N4/8/8/8/4K3 w - - 0 1").expect("valid fen");
        let black =
            Position::from_fen("4k3/8/8/8/3n4/8/8/4K3 b - - 0 1").expect("valid fen");
        let mut ei = EvalInfo::default();
        assert_eq!(evaluate(&white, &mut ei), evaluate(&black, &mut ei));
    }
}
