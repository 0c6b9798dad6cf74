//! Piece-Square Table
//!
//! 白から見た序盤・終盤のボーナス。黒は段を反転して参照する。

use crate::types::{Color, Piece, PieceType, Square, Value};

/// [駒種][マス] -> (序盤, 終盤)
/// 1段目が先頭（白から見た配列なので参照時にflipする）
#[rustfmt::skip]
const PAWN: [(i16, i16); 64] = [
    (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0),
    (  2,  0), (  4,  0), (  8,  0), ( 12,  0), ( 12,  0), (  8,  0), (  4,  0), (  2,  0),
    (  2,  2), (  6,  2), ( 12,  2), ( 20,  2), ( 20,  2), ( 12,  2), (  6,  2), (  2,  2),
    (  2,  4), (  8,  4), ( 14,  4), ( 28,  4), ( 28,  4), ( 14,  4), (  8,  4), (  2,  4),
    (  4,  8), ( 10,  8), ( 18,  8), ( 30,  8), ( 30,  8), ( 18,  8), ( 10,  8), (  4,  8),
    (  8, 16), ( 14, 16), ( 22, 16), ( 32, 16), ( 32, 16), ( 22, 16), ( 14, 16), (  8, 16),
    ( 16, 32), ( 24, 32), ( 32, 32), ( 40, 32), ( 40, 32), ( 32, 32), ( 24, 32), ( 16, 32),
    (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0), (  0,  0),
];

#[rustfmt::skip]
const KNIGHT: [(i16, i16); 64] = [
    (-60,-40), (-40,-30), (-30,-20), (-26,-16), (-26,-16), (-30,-20), (-40,-30), (-60,-40),
    (-36,-30), (-20,-16), ( -6, -8), (  0, -4), (  0, -4), ( -6, -8), (-20,-16), (-36,-30),
    (-26,-20), ( -6, -8), (  8,  0), ( 12,  6), ( 12,  6), (  8,  0), ( -6, -8), (-26,-20),
    (-20,-16), (  0, -4), ( 12,  6), ( 20, 12), ( 20, 12), ( 12,  6), (  0, -4), (-20,-16),
    (-16,-16), (  4, -4), ( 16,  6), ( 24, 12), ( 24, 12), ( 16,  6), (  4, -4), (-16,-16),
    (-20,-20), (  0, -8), ( 12,  0), ( 20,  6), ( 20,  6), ( 12,  0), (  0, -8), (-20,-20),
    (-36,-30), (-20,-16), ( -4, -8), (  2, -4), (  2, -4), ( -4, -8), (-20,-16), (-36,-30),
    (-70,-40), (-40,-30), (-26,-20), (-20,-16), (-20,-16), (-26,-20), (-40,-30), (-70,-40),
];

#[rustfmt::skip]
const BISHOP: [(i16, i16); 64] = [
    (-18,-18), ( -8,-10), (-12, -8), (-14, -6), (-14, -6), (-12, -8), ( -8,-10), (-18,-18),
    ( -8,-10), (  6, -4), (  2,  0), (  0,  2), (  0,  2), (  2,  0), (  6, -4), ( -8,-10),
    (-12, -8), (  2,  0), (  8,  4), (  6,  6), (  6,  6), (  8,  4), (  2,  0), (-12, -8),
    (-14, -6), (  0,  2), (  6,  6), ( 14,  8), ( 14,  8), (  6,  6), (  0,  2), (-14, -6),
    (-14, -6), (  0,  2), (  6,  6), ( 14,  8), ( 14,  8), (  6,  6), (  0,  2), (-14, -6),
    (-12, -8), (  2,  0), (  8,  4), (  6,  6), (  6,  6), (  8,  4), (  2,  0), (-12, -8),
    ( -8,-10), (  6, -4), (  2,  0), (  0,  2), (  0,  2), (  2,  0), (  6, -4), ( -8,-10),
    (-18,-18), ( -8,-10), (-12, -8), (-14, -6), (-14, -6), (-12, -8), ( -8,-10), (-18,-18),
];

#[rustfmt::skip]
const ROOK: [(i16, i16); 64] = [
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
    (  8,  0), ( 10,  0), ( 12,  0), ( 14,  0), ( 14,  0), ( 12,  0), ( 10,  0), (  8,  0),
    ( -6,  0), ( -3,  0), (  0,  0), (  4,  0), (  4,  0), (  0,  0), ( -3,  0), ( -6,  0),
];

#[rustfmt::skip]
const QUEEN: [(i16, i16); 64] = [
    ( -8,-16), ( -4,-10), ( -2, -8), (  0, -6), (  0, -6), ( -2, -8), ( -4,-10), ( -8,-16),
    ( -4,-10), (  2, -4), (  4, -2), (  4,  0), (  4,  0), (  4, -2), (  2, -4), ( -4,-10),
    ( -2, -8), (  4, -2), (  6,  2), (  6,  4), (  6,  4), (  6,  2), (  4, -2), ( -2, -8),
    (  0, -6), (  4,  0), (  6,  4), (  8,  8), (  8,  8), (  6,  4), (  4,  0), (  0, -6),
    (  0, -6), (  4,  0), (  6,  4), (  8,  8), (  8,  8), (  6,  4), (  4,  0), (  0, -6),
    ( -2, -8), (  4, -2), (  6,  2), (  6,  4), (  6,  4), (  6,  2), (  4, -2), ( -2, -8),
    ( -4,-10), (  2, -4), (  4, -2), (  4,  0), (  4,  0), (  4, -2), (  2, -4), ( -4,-10),
    ( -8,-16), ( -4,-10), ( -2, -8), (  0, -6), (  0, -6), ( -2, -8), ( -4,-10), ( -8,-16),
];

#[rustfmt::skip]
const KING: [(i16, i16); 64] = [
    ( 28,-40), ( 34,-28), ( 16,-20), (  0,-14), (  0,-14), ( 16,-20), ( 34,-28), ( 28,-40),
    ( 24,-28), ( 26,-14), (  6, -6), ( -8,  0), ( -8,  0), (  6, -6), ( 26,-14), ( 24,-28),
    ( 10,-20), (  4, -6), (-12,  4), (-24, 10), (-24, 10), (-12,  4), (  4, -6), ( 10,-20),
    (  0,-14), (-12,  0), (-24, 10), (-36, 18), (-36, 18), (-24, 10), (-12,  0), (  0,-14),
    (-10,-14), (-22,  0), (-34, 10), (-46, 18), (-46, 18), (-34, 10), (-22,  0), (-10,-14),
    (-20,-20), (-32, -6), (-44,  4), (-56, 10), (-56, 10), (-44,  4), (-32, -6), (-20,-20),
    (-30,-28), (-42,-14), (-54, -6), (-66,  0), (-66,  0), (-54, -6), (-42,-14), (-30,-28),
    (-40,-40), (-52,-28), (-64,-20), (-76,-14), (-76,-14), (-64,-20), (-52,-28), (-40,-40),
];

/// 駒とマスに対する(序盤, 終盤)のボーナス
#[inline]
pub(super) fn psq_bonus(pc: Piece, sq: Square) -> (Value, Value) {
    let sq = if pc.color() == Color::White { sq } else { sq.flip() };
    let (mg, eg) = match pc.piece_type() {
        PieceType::Pawn => PAWN[sq.index()],
        PieceType::Knight => KNIGHT[sq.index()],
        PieceType::Bishop => BISHOP[sq.index()],
        PieceType::Rook => ROOK[sq.index()],
        PieceType::Queen => QUEEN[sq.index()],
        PieceType::King => KING[sq.index()],
    };
    (Value::new(mg as i32), Value::new(eg as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psq_mirror() {
        // 白のe4と黒のe5（反転マス）は同じボーナス
        let we4 = psq_bonus(
            Piece::new(Color::White, PieceType::Knight),
            Square::from_index(28).unwrap(),
        );
        let be5 = psq_bonus(
            Piece::new(Color::Black, PieceType::Knight),
            Square::from_index(28 ^ 56).unwrap(),
        );
        assert_eq!(we4, be5);
    }

    #[test]
    fn test_center_preferred() {
        let center = psq_bonus(
            Piece::new(Color::White, PieceType::Knight),
            Square::from_index(27).unwrap(),
        );
        let corner = psq_bonus(
            Piece::new(Color::White, PieceType::Knight),
            Square::from_index(0).unwrap(),
        );
        assert!(center.0 > corner.0);
    }
}
