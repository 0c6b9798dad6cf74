//! Bitboard（64bit盤面表現）と攻撃テーブル

mod core;
mod magics;
mod tables;

pub use self::core::{Bitboard, BitboardIter};
pub use magics::{bishop_attacks, queen_attacks, rook_attacks};
pub use tables::{
    adjacent_files_bb, aligned, attacks_from, between_bb, file_bb, in_front_bb, init,
    king_attacks, knight_attacks, line_bb, passed_pawn_mask, pawn_attacks, pseudo_attacks,
    rank_bb, squares_in_front_bb,
};
