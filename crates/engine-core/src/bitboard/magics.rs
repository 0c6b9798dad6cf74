//! Magic bitboard（飛び駒の利きテーブル）
//!
//! 起動時に各マスのmagic乗数を棄却サンプリングで探索する。
//! 候補は疎なビットに偏らせた乱数3つのANDで生成し、
//! `mask * magic` の最上位バイトに6bit以上立つものだけを受理する。
//! 64bit専用（32bit折り畳み版は持たない）。

use super::core::Bitboard;
use crate::types::Square;
use rand::RngCore;
use rand_xoshiro::Xoshiro256PlusPlus;

/// 飛車用テーブルの総エントリ数
pub(super) const ROOK_TABLE_SIZE: usize = 0x19000;
/// 角用テーブルの総エントリ数
pub(super) const BISHOP_TABLE_SIZE: usize = 0x1480;

/// 飛車の移動方向
pub(super) const ROOK_DELTAS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
/// 角の移動方向
pub(super) const BISHOP_DELTAS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

/// マスごとのmagic乗数探索で使うPRNG前進量（段ごと）
const MAGIC_BOOSTERS: [u32; 8] = [26, 21, 21, 32, 31, 9, 5, 11];

/// 1種類の飛び駒のmagicテーブル一式
pub(super) struct Magics {
    masks: [Bitboard; 64],
    magics: [u64; 64],
    shifts: [u32; 64],
    offsets: [usize; 64],
    attacks: Vec<Bitboard>,
}

impl Magics {
    /// 利きを取得
    #[inline]
    pub(super) fn attacks(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        let s = sq.index();
        let index = ((occupied & self.masks[s]).raw().wrapping_mul(self.magics[s])
            >> self.shifts[s]) as usize;
        self.attacks[self.offsets[s] + index]
    }

    /// 全マスのmagicを探索してテーブルを構築する
    pub(super) fn build(
        deltas: &[(i8, i8); 4],
        table_size: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Magics {
        let mut masks = [Bitboard::EMPTY; 64];
        let mut magics = [0u64; 64];
        let mut shifts = [0u32; 64];
        let mut offsets = [0usize; 64];
        let mut attacks = vec![Bitboard::EMPTY; table_size];

        let mut occupancy = [Bitboard::EMPTY; 4096];
        let mut proofs = [Bitboard::EMPTY; 4096];
        let mut offset = 0usize;

        for i in 0..64 {
            let sq = Square::from_index(i).unwrap();

            // 端のマスはマスクから除く（sと同じ筋・段の端は残す）
            // グローバルテーブルは構築中のためここでは使えない
            let rank_of_s = Bitboard::new(Bitboard::RANK_1.raw() << (8 * sq.rank().index()));
            let file_of_s = Bitboard::new(Bitboard::FILE_A.raw() << sq.file().index());
            let edges = ((Bitboard::RANK_1 | Bitboard::RANK_8) & !rank_of_s)
                | ((Bitboard::FILE_A | Bitboard::FILE_H) & !file_of_s);

            let mask = sliding_attacks(sq, Bitboard::EMPTY, deltas) & !edges;
            let bits = mask.count();
            let max_key = 1usize << bits;

            masks[i] = mask;
            shifts[i] = 64 - bits;
            offsets[i] = offset;

            // 先に全occupancyと参照利きを列挙しておく
            for (key, (occ, proof)) in
                occupancy.iter_mut().zip(proofs.iter_mut()).take(max_key).enumerate()
            {
                *occ = submask(mask, key);
                *proof = sliding_attacks(sq, *occ, deltas);
            }

            let booster = MAGIC_BOOSTERS[sq.rank().index()];

            // 全submaskが矛盾なく写像されるmagicが見つかるまで引き直す
            loop {
                let magic = pick_magic(mask, rng, booster);
                let slots = &mut attacks[offset..offset + max_key];
                slots.fill(Bitboard::EMPTY);

                let mut ok = true;
                for key in 0..max_key {
                    let index =
                        (occupancy[key].raw().wrapping_mul(magic) >> shifts[i]) as usize;

                    if slots[index].is_empty() {
                        slots[index] = proofs[key];
                    } else if slots[index] != proofs[key] {
                        ok = false;
                        break;
                    }
                }

                if ok {
                    magics[i] = magic;
                    break;
                }
            }

            offset += max_key;
        }

        debug_assert_eq!(offset, table_size);

        Magics {
            masks,
            magics,
            shifts,
            offsets,
            attacks,
        }
    }
}

/// 飛び駒の利きを逐次走査で求める（テーブル構築専用）
pub(super) fn sliding_attacks(
    sq: Square,
    occupied: Bitboard,
    deltas: &[(i8, i8); 4],
) -> Bitboard {
    let mut attacks = Bitboard::EMPTY;

    for &(df, dr) in deltas {
        let mut file = sq.file().index() as i8 + df;
        let mut rank = sq.rank().index() as i8 + dr;

        while (0..8).contains(&file) && (0..8).contains(&rank) {
            let s = Square::from_index((rank as usize) << 3 | file as usize).unwrap();
            attacks.set(s);

            if occupied.contains(s) {
                break;
            }
            file += df;
            rank += dr;
        }
    }
    attacks
}

/// keyのビット位置に従ってmaskの部分集合を取り出す
fn submask(mask: Bitboard, key: usize) -> Bitboard {
    let mut sub = Bitboard::EMPTY;
    let mut bits = mask;
    let mut n = 0;

    while let Some(sq) = bits.lsb() {
        bits.clear(sq);
        if key >> n & 1 != 0 {
            sub.set(sq);
        }
        n += 1;
    }
    sub
}

/// magic候補を1つ引く
///
/// 疎な乱数のANDで候補を作り、品質ヒューリスティック
/// （mask * magic の最上位バイトに6bit以上）を満たすまで繰り返す。
fn pick_magic(mask: Bitboard, rng: &mut Xoshiro256PlusPlus, booster: u32) -> u64 {
    for _ in 0..booster {
        rng.next_u64();
    }

    loop {
        let magic = rng.next_u64() & rng.next_u64() & rng.next_u64();

        if (mask.raw().wrapping_mul(magic) >> 56).count_ones() >= 6 {
            return magic;
        }
    }
}

/// 飛車の利き
#[inline]
pub fn rook_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    super::tables::tables().rook_magics.attacks(sq, occupied)
}

/// 角の利き
#[inline]
pub fn bishop_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    super::tables::tables().bishop_magics.attacks(sq, occupied)
}

/// 女王の利き
#[inline]
pub fn queen_attacks(sq: Square, occupied: Bitboard) -> Bitboard {
    rook_attacks(sq, occupied) | bishop_attacks(sq, occupied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{File, Rank};

    fn sq(f: File, r: Rank) -> Square {
        Square::new(f, r)
    }

    #[test]
    fn test_rook_attacks_empty_board() {
        super::super::init();
        let a = rook_attacks(sq(File::FileD, Rank::Rank4), Bitboard::EMPTY);
        // 同じ筋と段の14マス
        assert_eq!(a.count(), 14);
        assert!(a.contains(sq(File::FileD, Rank::Rank8)));
        assert!(a.contains(sq(File::FileA, Rank::Rank4)));
        assert!(!a.contains(sq(File::FileD, Rank::Rank4)));
    }

    #[test]
    fn test_rook_attacks_blocked() {
        super::super::init();
        let blocker = Bitboard::from_square(sq(File::FileD, Rank::Rank6));
        let a = rook_attacks(sq(File::FileD, Rank::Rank4), blocker);
        assert!(a.contains(sq(File::FileD, Rank::Rank6)));
        assert!(!a.contains(sq(File::FileD, Rank::Rank7)));
        assert!(!a.contains(sq(File::FileD, Rank::Rank8)));
    }

    #[test]
    fn test_bishop_attacks_corner() {
        super::super::init();
        let a = bishop_attacks(Square::A1, Bitboard::EMPTY);
        assert_eq!(a.count(), 7);
        assert!(a.contains(Square::H8));
    }

    #[test]
    fn test_queen_is_rook_plus_bishop() {
        super::super::init();
        let occ = Bitboard::from_square(sq(File::FileE, Rank::Rank5));
        let s = sq(File::FileC, Rank::Rank3);
        assert_eq!(queen_attacks(s, occ), rook_attacks(s, occ) | bishop_attacks(s, occ));
    }

    #[test]
    fn test_magic_matches_sliding_scan() {
        super::super::init();
        // いくつかの散在occupancyでmagic参照と逐次走査が一致すること
        let occs = [
            Bitboard::EMPTY,
            Bitboard::new(0x0042_0010_8800_2400),
            Bitboard::new(0xFFFF_0000_0000_FFFF),
        ];
        for i in [0usize, 7, 27, 36, 63] {
            let s = Square::from_index(i).unwrap();
            for &occ in &occs {
                assert_eq!(
                    rook_attacks(s, occ),
                    sliding_attacks(s, occ, &ROOK_DELTAS),
                    "rook mismatch at {s}"
                );
                assert_eq!(
                    bishop_attacks(s, occ),
                    sliding_attacks(s, occ, &BISHOP_DELTAS),
                    "bishop mismatch at {s}"
                );
            }
        }
    }
}
