//! Zobristハッシュ
//!
//! 駒×マス、手番、キャスリング権、アンパッサン筋のキーを
//! 固定シードの乱数列から一度だけ生成する。

use crate::types::Piece;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::OnceLock;

/// キー生成用の固定シード
const ZOBRIST_SEED: u64 = 0xB1E5_ED0A_17C4_FEED;

/// Zobristキー一式
pub(crate) struct Zobrist {
    /// 駒×マス
    pub psq: [[u64; 64]; Piece::NUM],
    /// キャスリング権（4bitの全組み合わせ）
    pub castling: [u64; 16],
    /// アンパッサンの筋
    pub en_passant: [u64; 8],
    /// 手番（黒番でXORする）
    pub side: u64,
    /// singular extension用の除外キー
    pub exclusion: u64,
    /// 駒種×枚数（material key用）
    pub material: [[u64; 11]; Piece::NUM],
}

static ZOBRIST: OnceLock<Box<Zobrist>> = OnceLock::new();

/// キーを取得（初回呼び出しで生成）
#[inline]
pub(crate) fn zobrist() -> &'static Zobrist {
    ZOBRIST.get_or_init(|| {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(ZOBRIST_SEED);

        let mut psq = [[0u64; 64]; Piece::NUM];
        for row in psq.iter_mut() {
            for v in row.iter_mut() {
                *v = rng.next_u64();
            }
        }

        let mut castling = [0u64; 16];
        for v in castling.iter_mut() {
            *v = rng.next_u64();
        }

        let mut en_passant = [0u64; 8];
        for v in en_passant.iter_mut() {
            *v = rng.next_u64();
        }

        let side = rng.next_u64();
        let exclusion = rng.next_u64();

        let mut material = [[0u64; 11]; Piece::NUM];
        for row in material.iter_mut() {
            for v in row.iter_mut() {
                *v = rng.next_u64();
            }
        }

        Box::new(Zobrist {
            psq,
            castling,
            en_passant,
            side,
            exclusion,
            material,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zobrist_deterministic() {
        let z1 = zobrist();
        let z2 = zobrist();
        assert_eq!(z1.psq[1][0], z2.psq[1][0]);
        assert_ne!(z1.side, 0);
    }

    #[test]
    fn test_zobrist_keys_distinct() {
        let z = zobrist();
        // 少なくとも基本的なキーは互いに異なる
        assert_ne!(z.psq[1][0], z.psq[1][1]);
        assert_ne!(z.side, z.exclusion);
        assert_ne!(z.castling[1], z.castling[2]);
    }
}
