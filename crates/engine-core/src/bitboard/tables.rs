//! 攻撃・幾何テーブル
//!
//! 非飛び駒のstepテーブル、マス間のBetweenテーブル、
//! 筋・段・パスポーン判定用マスクを起動時にまとめて構築する。

use super::core::Bitboard;
use super::magics::{
    sliding_attacks, Magics, BISHOP_DELTAS, BISHOP_TABLE_SIZE, ROOK_DELTAS, ROOK_TABLE_SIZE,
};
use crate::types::{Color, File, Piece, PieceType, Rank, Square};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::OnceLock;

/// magic探索用の固定シード（テーブルを再現可能にする）
const MAGIC_SEED: u64 = 0x39AF_5E21_C0DE_1024;

/// 全テーブル一式
pub(super) struct AttackTables {
    pawn_attacks: [[Bitboard; 64]; 2],
    knight_attacks: [Bitboard; 64],
    king_attacks: [Bitboard; 64],
    between: Box<[[Bitboard; 64]; 64]>,
    line: Box<[[Bitboard; 64]; 64]>,
    file_bb: [Bitboard; 8],
    rank_bb: [Bitboard; 8],
    adjacent_files: [Bitboard; 8],
    in_front: [[Bitboard; 8]; 2],
    squares_in_front: [[Bitboard; 64]; 2],
    passed_pawn_mask: [[Bitboard; 64]; 2],
    bishop_pseudo: [Bitboard; 64],
    rook_pseudo: [Bitboard; 64],
    queen_pseudo: [Bitboard; 64],
    pub(super) rook_magics: Magics,
    pub(super) bishop_magics: Magics,
}

static TABLES: OnceLock<Box<AttackTables>> = OnceLock::new();

/// テーブルを初期化する（冪等）
pub fn init() {
    TABLES.get_or_init(|| Box::new(build_tables()));
}

/// テーブルへの参照を取得
#[inline]
pub(super) fn tables() -> &'static AttackTables {
    TABLES.get_or_init(|| Box::new(build_tables()))
}

fn build_tables() -> AttackTables {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(MAGIC_SEED);
    let rook_magics = Magics::build(&ROOK_DELTAS, ROOK_TABLE_SIZE, &mut rng);
    let bishop_magics = Magics::build(&BISHOP_DELTAS, BISHOP_TABLE_SIZE, &mut rng);

    let mut file_bb = [Bitboard::EMPTY; 8];
    let mut rank_bb = [Bitboard::EMPTY; 8];
    for i in 0..8 {
        file_bb[i] = Bitboard::new(Bitboard::FILE_A.raw() << i);
        rank_bb[i] = Bitboard::new(Bitboard::RANK_1.raw() << (8 * i));
    }

    let mut adjacent_files = [Bitboard::EMPTY; 8];
    for f in 0..8 {
        if f > 0 {
            adjacent_files[f] |= file_bb[f - 1];
        }
        if f < 7 {
            adjacent_files[f] |= file_bb[f + 1];
        }
    }

    // 手番側から見て前方にある段の集合
    let mut in_front = [[Bitboard::EMPTY; 8]; 2];
    for r in 0..8 {
        for ahead in r + 1..8 {
            in_front[Color::White.index()][r] |= rank_bb[ahead];
        }
        for behind in 0..r {
            in_front[Color::Black.index()][r] |= rank_bb[behind];
        }
    }

    let mut pawn_attacks = [[Bitboard::EMPTY; 64]; 2];
    let mut knight_attacks = [Bitboard::EMPTY; 64];
    let mut king_attacks = [Bitboard::EMPTY; 64];
    let mut squares_in_front = [[Bitboard::EMPTY; 64]; 2];
    let mut passed_pawn_mask = [[Bitboard::EMPTY; 64]; 2];

    const KNIGHT_STEPS: [(i8, i8); 8] =
        [(1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2)];
    const KING_STEPS: [(i8, i8); 8] =
        [(0, 1), (1, 1), (1, 0), (1, -1), (0, -1), (-1, -1), (-1, 0), (-1, 1)];

    for i in 0..64 {
        let sq = Square::from_index(i).unwrap();
        let f = sq.file().index();
        let r = sq.rank().index();

        for &(df, dr) in &KNIGHT_STEPS {
            if let Some(to) = step(f, r, df, dr) {
                knight_attacks[i].set(to);
            }
        }
        for &(df, dr) in &KING_STEPS {
            if let Some(to) = step(f, r, df, dr) {
                king_attacks[i].set(to);
            }
        }
        for &(df, dr) in &[(-1i8, 1i8), (1, 1)] {
            if let Some(to) = step(f, r, df, dr) {
                pawn_attacks[Color::White.index()][i].set(to);
            }
        }
        for &(df, dr) in &[(-1i8, -1i8), (1, -1)] {
            if let Some(to) = step(f, r, df, dr) {
                pawn_attacks[Color::Black.index()][i].set(to);
            }
        }

        for c in [Color::White, Color::Black] {
            let front = in_front[c.index()][r];
            squares_in_front[c.index()][i] = front & file_bb[f];
            passed_pawn_mask[c.index()][i] = front & (file_bb[f] | adjacent_files[f]);
        }
    }

    let mut bishop_pseudo = [Bitboard::EMPTY; 64];
    let mut rook_pseudo = [Bitboard::EMPTY; 64];
    let mut queen_pseudo = [Bitboard::EMPTY; 64];
    let mut between: Box<[[Bitboard; 64]; 64]> = Box::new([[Bitboard::EMPTY; 64]; 64]);
    let mut line: Box<[[Bitboard; 64]; 64]> = Box::new([[Bitboard::EMPTY; 64]; 64]);

    for i in 0..64 {
        let s1 = Square::from_index(i).unwrap();
        bishop_pseudo[i] = sliding_attacks(s1, Bitboard::EMPTY, &BISHOP_DELTAS);
        rook_pseudo[i] = sliding_attacks(s1, Bitboard::EMPTY, &ROOK_DELTAS);
        queen_pseudo[i] = bishop_pseudo[i] | rook_pseudo[i];
    }

    // 同一直線上の2マスについて、その間の開いたマスを列挙する
    for i in 0..64 {
        let s1 = Square::from_index(i).unwrap();
        for j in 0..64 {
            let s2 = Square::from_index(j).unwrap();
            if i == j || !queen_pseudo[i].contains(s2) {
                continue;
            }

            let fd = (s2.file().index() as i8 - s1.file().index() as i8).signum();
            let rd = (s2.rank().index() as i8 - s1.rank().index() as i8).signum();

            let mut f = s1.file().index() as i8 + fd;
            let mut r = s1.rank().index() as i8 + rd;
            loop {
                let s3 = Square::from_index((r as usize) << 3 | f as usize).unwrap();
                if s3 == s2 {
                    break;
                }
                between[i][j].set(s3);
                f += fd;
                r += rd;
            }

            // 2マスを通る直線全体（両端方向に延長）
            line[i][j].set(s1);
            line[i][j].set(s2);
            for &(df, dr) in &[(fd, rd), (-fd, -rd)] {
                let mut f = s1.file().index() as i8 + df;
                let mut r = s1.rank().index() as i8 + dr;
                while (0..8).contains(&f) && (0..8).contains(&r) {
                    line[i][j].set(Square::from_index((r as usize) << 3 | f as usize).unwrap());
                    f += df;
                    r += dr;
                }
            }
        }
    }

    AttackTables {
        pawn_attacks,
        knight_attacks,
        king_attacks,
        between,
        line,
        file_bb,
        rank_bb,
        adjacent_files,
        in_front,
        squares_in_front,
        passed_pawn_mask,
        bishop_pseudo,
        rook_pseudo,
        queen_pseudo,
        rook_magics,
        bishop_magics,
    }
}

fn step(f: usize, r: usize, df: i8, dr: i8) -> Option<Square> {
    let nf = f as i8 + df;
    let nr = r as i8 + dr;
    if (0..8).contains(&nf) && (0..8).contains(&nr) {
        Square::from_index((nr as usize) << 3 | nf as usize)
    } else {
        None
    }
}

// =============================================================================
// 公開アクセサ
// =============================================================================

/// ポーンの利き
#[inline]
pub fn pawn_attacks(c: Color, sq: Square) -> Bitboard {
    tables().pawn_attacks[c.index()][sq.index()]
}

/// ナイトの利き
#[inline]
pub fn knight_attacks(sq: Square) -> Bitboard {
    tables().knight_attacks[sq.index()]
}

/// キングの利き
#[inline]
pub fn king_attacks(sq: Square) -> Bitboard {
    tables().king_attacks[sq.index()]
}

/// 駒の利き（occupancy考慮）
#[inline]
pub fn attacks_from(pc: Piece, sq: Square, occupied: Bitboard) -> Bitboard {
    match pc.piece_type() {
        PieceType::Pawn => pawn_attacks(pc.color(), sq),
        PieceType::Knight => knight_attacks(sq),
        PieceType::Bishop => super::bishop_attacks(sq, occupied),
        PieceType::Rook => super::rook_attacks(sq, occupied),
        PieceType::Queen => super::queen_attacks(sq, occupied),
        PieceType::King => king_attacks(sq),
    }
}

/// 同一直線上の2マスの間の開いたマス（直線外なら空）
#[inline]
pub fn between_bb(s1: Square, s2: Square) -> Bitboard {
    tables().between[s1.index()][s2.index()]
}

/// 2マスを通る直線全体（直線外なら空）
#[inline]
pub fn line_bb(s1: Square, s2: Square) -> Bitboard {
    tables().line[s1.index()][s2.index()]
}

/// 3マスが同一直線上にあるか
#[inline]
pub fn aligned(s1: Square, s2: Square, s3: Square) -> Bitboard {
    line_bb(s1, s2) & Bitboard::from_square(s3)
}

/// occupancyを無視した利き（飛び駒の方向判定用）
#[inline]
pub fn pseudo_attacks(pt: PieceType, sq: Square) -> Bitboard {
    let t = tables();
    match pt {
        PieceType::Bishop => t.bishop_pseudo[sq.index()],
        PieceType::Rook => t.rook_pseudo[sq.index()],
        PieceType::Queen => t.queen_pseudo[sq.index()],
        PieceType::Knight => t.knight_attacks[sq.index()],
        PieceType::King => t.king_attacks[sq.index()],
        PieceType::Pawn => Bitboard::EMPTY,
    }
}

/// 筋のBitboard
#[inline]
pub fn file_bb(f: File) -> Bitboard {
    tables().file_bb[f.index()]
}

/// 段のBitboard
#[inline]
pub fn rank_bb(r: Rank) -> Bitboard {
    tables().rank_bb[r.index()]
}

/// 隣接する筋のBitboard
#[inline]
pub fn adjacent_files_bb(f: File) -> Bitboard {
    tables().adjacent_files[f.index()]
}

/// 手番側から見て前方の段すべて
#[inline]
pub fn in_front_bb(c: Color, r: Rank) -> Bitboard {
    tables().in_front[c.index()][r.index()]
}

/// 同じ筋の前方マス
#[inline]
pub fn squares_in_front_bb(c: Color, sq: Square) -> Bitboard {
    tables().squares_in_front[c.index()][sq.index()]
}

/// パスポーン判定マスク（前方3筋）
#[inline]
pub fn passed_pawn_mask(c: Color, sq: Square) -> Bitboard {
    tables().passed_pawn_mask[c.index()][sq.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(f: File, r: Rank) -> Square {
        Square::new(f, r)
    }

    #[test]
    fn test_knight_attacks() {
        init();
        assert_eq!(knight_attacks(sq(File::FileD, Rank::Rank4)).count(), 8);
        assert_eq!(knight_attacks(Square::A1).count(), 2);
        assert!(knight_attacks(Square::A1).contains(sq(File::FileC, Rank::Rank2)));
    }

    #[test]
    fn test_king_attacks() {
        init();
        assert_eq!(king_attacks(sq(File::FileE, Rank::Rank4)).count(), 8);
        assert_eq!(king_attacks(Square::A1).count(), 3);
        assert_eq!(king_attacks(Square::H8).count(), 3);
    }

    #[test]
    fn test_pawn_attacks() {
        init();
        let w = pawn_attacks(Color::White, sq(File::FileE, Rank::Rank2));
        assert!(w.contains(sq(File::FileD, Rank::Rank3)));
        assert!(w.contains(sq(File::FileF, Rank::Rank3)));
        assert_eq!(w.count(), 2);

        // 端の筋では1マスのみ
        assert_eq!(pawn_attacks(Color::White, sq(File::FileA, Rank::Rank2)).count(), 1);

        let b = pawn_attacks(Color::Black, sq(File::FileE, Rank::Rank7));
        assert!(b.contains(sq(File::FileD, Rank::Rank6)));
        assert!(b.contains(sq(File::FileF, Rank::Rank6)));
    }

    #[test]
    fn test_between_bb() {
        init();
        let b = between_bb(Square::A1, sq(File::FileA, Rank::Rank8));
        assert_eq!(b.count(), 6);
        assert!(b.contains(sq(File::FileA, Rank::Rank4)));

        // 直線上にない2マスは空
        assert!(between_bb(Square::A1, sq(File::FileC, Rank::Rank2)).is_empty());

        // 隣接マスの間は空
        assert!(between_bb(Square::E1, Square::D1).is_empty());
    }

    #[test]
    fn test_passed_pawn_mask() {
        init();
        let m = passed_pawn_mask(Color::White, sq(File::FileE, Rank::Rank4));
        assert!(m.contains(sq(File::FileD, Rank::Rank5)));
        assert!(m.contains(sq(File::FileE, Rank::Rank8)));
        assert!(m.contains(sq(File::FileF, Rank::Rank7)));
        assert!(!m.contains(sq(File::FileE, Rank::Rank3)));
        assert!(!m.contains(sq(File::FileG, Rank::Rank5)));
    }

    #[test]
    fn test_squares_in_front() {
        init();
        let f = squares_in_front_bb(Color::Black, sq(File::FileC, Rank::Rank5));
        assert_eq!(f.count(), 4);
        assert!(f.contains(sq(File::FileC, Rank::Rank1)));
    }
}
