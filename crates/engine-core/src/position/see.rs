//! SEE（静的交換評価）
//!
//! 1マス上の取り合いを最小価値の駒から順にシミュレートし、
//! 手番側から見た駒得の下限を返す。X線の利きも考慮する。

use super::pos::Position;
use crate::bitboard::{bishop_attacks, rook_attacks, Bitboard};
use crate::types::{Move, PieceType, Square, Value};

/// SEEで使う駒の価値（交換の序列が保てれば十分）
const SEE_VALUES: [i32; PieceType::NUM] = [0, 100, 325, 325, 500, 975, 10000];

#[inline]
fn see_value(pt: PieceType) -> i32 {
    SEE_VALUES[pt.index()]
}

impl Position {
    /// 指し手のSEE値
    ///
    /// 取る手・取らない手どちらにも使える。取らない手は
    /// 移動先で取り返されるリスクだけが評価される。
    pub fn see(&self, m: Move) -> Value {
        let from = m.from();
        let to = m.to();

        // キャスリングは取り合いが発生しない
        if m.is_castle() {
            return Value::ZERO;
        }

        let us = self.piece_on(from).color();
        let mut occupied = self.occupied();
        let mut gain = [0i32; 32];
        let mut depth = 0;

        // 最初の捕獲
        if m.is_en_passant() {
            let capsq = Square::new(to.file(), from.rank());
            occupied.clear(capsq);
            gain[0] = see_value(PieceType::Pawn);
        } else {
            let captured = self.piece_on(to);
            gain[0] = if captured.is_some() {
                see_value(captured.piece_type())
            } else {
                0
            };
        }

        occupied.clear(from);
        let mut attackers = self.attackers_to_occ(to, occupied) & occupied;
        let mut stm = us.opposite();
        let mut victim = if m.is_promotion() {
            m.promotion_type()
        } else {
            self.piece_on(from).piece_type()
        };

        loop {
            let own = attackers & self.pieces_colored(stm);
            if own.is_empty() {
                break;
            }

            // 最小価値の攻撃駒を選ぶ
            let (sq, pt) = self.least_valuable(own);

            depth += 1;
            gain[depth] = see_value(victim) - gain[depth - 1];

            // 両者とも続ける価値がなければ打ち切れる
            if gain[depth].max(-gain[depth - 1]) < 0 {
                break;
            }

            occupied.clear(sq);
            victim = pt;

            // X線: 取り除いた駒の後ろの飛び駒を加え直す
            attackers |= rook_attacks(to, occupied)
                & (self.pieces(PieceType::Rook) | self.pieces(PieceType::Queen));
            attackers |= bishop_attacks(to, occupied)
                & (self.pieces(PieceType::Bishop) | self.pieces(PieceType::Queen));
            attackers &= occupied;

            stm = stm.opposite();
        }

        // ミニマックスで畳み込む
        while depth > 0 {
            gain[depth - 1] = -((-gain[depth - 1]).max(gain[depth]));
            depth -= 1;
        }
        Value::new(gain[0])
    }

    /// SEEの符号だけが必要な場合の近道
    ///
    /// 取る駒が取られる駒より安いか等しければ計算せずに非負とみなす。
    pub fn see_sign(&self, m: Move) -> Value {
        let captured = self.piece_on(m.to());
        let moved = self.piece_on(m.from());
        if captured.is_some()
            && see_value(moved.piece_type()) <= see_value(captured.piece_type())
        {
            return Value::new(1);
        }
        self.see(m)
    }

    /// 指定集合の中で最小価値の駒とそのマス
    fn least_valuable(&self, set: Bitboard) -> (Square, PieceType) {
        for pt in [
            PieceType::Pawn,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
            PieceType::King,
        ] {
            let subset = set & self.pieces(pt);
            if subset.is_not_empty() {
                return (subset.lsb_unchecked(), pt);
            }
        }
        unreachable!("least_valuable called with empty set");
    }
}

// 手番に依存しない価値であることの確認用
const _: () = assert!(SEE_VALUES[PieceType::King.index()] > SEE_VALUES[PieceType::Queen.index()]);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{File, Rank};

    fn sq(f: File, r: Rank) -> Square {
        Square::new(f, r)
    }

    #[test]
    fn test_see_free_pawn_capture() {
        // 白ルークがa5の浮いた黒ポーンを取る
        let pos = Position::from_fen("4k3/8/8/p7/8/8/8/R3K3 w - - 0 1").expect("valid fen");
        let m = Move::new(Square::A1, sq(File::FileA, Rank::Rank5));
        assert_eq!(pos.see(m), Value::new(100));
    }

    #[test]
    fn test_see_defended_pawn() {
        // b6のポーンがa5のポーンを守っている: Rxa5は損
        let pos = Position::from_fen("4k3/8/1p6/p7/8/8/8/R3K3 w - - 0 1").expect("valid fen");
        let m = Move::new(Square::A1, sq(File::FileA, Rank::Rank5));
        assert_eq!(pos.see(m), Value::new(100 - 500));
        assert!(pos.see_sign(m).raw() < 0);
    }

    #[test]
    fn test_see_equal_exchange() {
        // ポーンでポーンを取る（守られていても等価交換）
        let pos =
            Position::from_fen("4k3/8/2p5/3p4/4P3/8/8/4K3 w - - 0 1").expect("valid fen");
        let m = Move::new(sq(File::FileE, Rank::Rank4), sq(File::FileD, Rank::Rank5));
        assert_eq!(pos.see(m), Value::new(0));
        // 近道判定は正になる
        assert!(pos.see_sign(m).raw() >= 0);
    }

    #[test]
    fn test_see_xray() {
        // c3のナイトでd5のポーンを取ると、d8のルークに取り返され、
        // d1の自ルークが取り返す
        let pos =
            Position::from_fen("3rk3/8/8/3p4/8/2N5/8/3RK3 w - - 0 1").expect("valid fen");
        let m = Move::new(sq(File::FileC, Rank::Rank3), sq(File::FileD, Rank::Rank5));
        // 取り返すとX線のルークに取り返されて損なので、相手は取らない
        assert_eq!(pos.see(m), Value::new(100));
    }

    #[test]
    fn test_see_noncapture_hanging() {
        // ポーンに守られたマスへ女王を進めるのは大損
        let pos = Position::from_fen("4k3/8/1p6/8/8/8/3Q4/4K3 w - - 0 1").expect("valid fen");
        let m = Move::new(sq(File::FileD, Rank::Rank2), sq(File::FileA, Rank::Rank5));
        assert!(pos.see(m).raw() < 0);
    }
}
