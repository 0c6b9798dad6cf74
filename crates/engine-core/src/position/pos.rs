//! 局面（Position）

use crate::bitboard::{
    aligned, attacks_from, between_bb, bishop_attacks, king_attacks, knight_attacks,
    passed_pawn_mask, pawn_attacks, rook_attacks, Bitboard,
};
use crate::types::{
    piece_value_midgame, CastlingRights, Color, Move, Piece, PieceType, Rank, Square, Value,
};

use super::state::StateInfo;
use super::zobrist::zobrist;

/// 各マスを動かす・取ることで失われるキャスリング権
fn castling_rights_mask(sq: Square) -> CastlingRights {
    match sq {
        Square::E1 => CastlingRights::both(Color::White),
        Square::H1 => CastlingRights::WHITE_OO,
        Square::A1 => CastlingRights::WHITE_OOO,
        Square::E8 => CastlingRights::both(Color::Black),
        Square::H8 => CastlingRights::BLACK_OO,
        Square::A8 => CastlingRights::BLACK_OOO,
        _ => CastlingRights::NONE,
    }
}

/// 局面
///
/// 盤面・手番・キャスリング権・アンパッサン・各種Zobristキーを保持する。
/// do_move/undo_moveでのみ変更され、探索スレッドはsplit時に自分のコピーを持つ。
#[derive(Clone)]
pub struct Position {
    /// 盤面（マスごとの駒）
    board: [Piece; 64],
    /// 駒種別のBitboard（インデックス0は未使用）
    by_type: [Bitboard; PieceType::NUM],
    /// 手番別のBitboard
    by_color: [Bitboard; 2],
    /// 手番
    side_to_move: Color,
    /// キャスリング権
    castling: CastlingRights,
    /// アンパッサン可能マス
    ep_square: Option<Square>,
    /// 50手ルールカウンタ（半手）
    rule50: i32,
    /// 直近のヌルムーブからの手数（千日手検出の遡り上限）
    plies_from_null: i32,
    /// 開始からの手数（半手）
    game_ply: i32,
    /// 局面ハッシュ
    key: u64,
    /// 歩のハッシュ
    pawn_key: u64,
    /// 駒割ハッシュ
    material_key: u64,
    /// 手番側の王に王手している駒
    checkers: Bitboard,
    /// ポーン以外の駒の価値（手番別）
    non_pawn_material: [Value; 2],
    /// undo用の状態スタック（キー履歴を兼ねる）
    states: Vec<StateInfo>,
}

impl Position {
    /// 空の局面（from_fenから使う）
    pub(super) fn empty() -> Position {
        crate::bitboard::init();
        Position {
            board: [Piece::NONE; 64],
            by_type: [Bitboard::EMPTY; PieceType::NUM],
            by_color: [Bitboard::EMPTY; 2],
            side_to_move: Color::White,
            castling: CastlingRights::NONE,
            ep_square: None,
            rule50: 0,
            plies_from_null: 0,
            game_ply: 0,
            key: 0,
            pawn_key: 0,
            material_key: 0,
            checkers: Bitboard::EMPTY,
            non_pawn_material: [Value::ZERO, Value::ZERO],
            states: Vec::with_capacity(256),
        }
    }

    /// 平手初期局面
    pub fn startpos() -> Position {
        Self::from_fen(super::START_FEN).expect("start position FEN is valid")
    }

    // =========================================================================
    // アクセサ
    // =========================================================================

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Piece {
        self.board[sq.index()]
    }

    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[0] | self.by_color[1]
    }

    /// 指定駒種のBitboard（両手番）
    #[inline]
    pub fn pieces(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()]
    }

    /// 指定手番・駒種のBitboard
    #[inline]
    pub fn pieces_of(&self, c: Color, pt: PieceType) -> Bitboard {
        self.by_type[pt.index()] & self.by_color[c.index()]
    }

    /// 指定手番の全駒
    #[inline]
    pub fn pieces_colored(&self, c: Color) -> Bitboard {
        self.by_color[c.index()]
    }

    #[inline]
    pub fn king_square(&self, c: Color) -> Square {
        self.pieces_of(c, PieceType::King).lsb_unchecked()
    }

    #[inline]
    pub fn castling_rights(&self) -> CastlingRights {
        self.castling
    }

    #[inline]
    pub fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    #[inline]
    pub fn rule50_count(&self) -> i32 {
        self.rule50
    }

    #[inline]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[inline]
    pub fn pawn_key(&self) -> u64 {
        self.pawn_key
    }

    #[inline]
    pub fn material_key(&self) -> u64 {
        self.material_key
    }

    /// singular extension探索用の局面キー
    #[inline]
    pub fn exclusion_key(&self) -> u64 {
        self.key ^ zobrist().exclusion
    }

    #[inline]
    pub fn checkers(&self) -> Bitboard {
        self.checkers
    }

    #[inline]
    pub fn in_check(&self) -> bool {
        self.checkers.is_not_empty()
    }

    #[inline]
    pub fn non_pawn_material(&self, c: Color) -> Value {
        self.non_pawn_material[c.index()]
    }

    /// 直前の指し手で取られた駒
    #[inline]
    pub fn captured_piece(&self) -> Piece {
        self.states.last().map_or(Piece::NONE, |st| st.captured)
    }

    /// 直前の指し手
    #[inline]
    pub fn last_move(&self) -> Move {
        self.states.last().map_or(Move::NONE, |st| st.last_move)
    }

    /// 7段目（相対）にポーンがあるか
    pub fn has_pawn_on_7th(&self, c: Color) -> bool {
        let rank7 = match c {
            Color::White => crate::bitboard::rank_bb(Rank::Rank7),
            Color::Black => crate::bitboard::rank_bb(Rank::Rank2),
        };
        (self.pieces_of(c, PieceType::Pawn) & rank7).is_not_empty()
    }

    /// キャスリング権が残っているか
    #[inline]
    pub fn can_castle(&self, c: Color) -> bool {
        self.castling.intersects(CastlingRights::both(c))
    }

    /// パスポーンかどうか
    pub fn pawn_is_passed(&self, c: Color, sq: Square) -> bool {
        (self.pieces_of(c.opposite(), PieceType::Pawn) & passed_pawn_mask(c, sq)).is_empty()
    }

    // =========================================================================
    // 利き・ピン
    // =========================================================================

    /// 指定マスに利いている全駒（occupancy指定）
    pub fn attackers_to_occ(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        (pawn_attacks(Color::White, sq) & self.pieces_of(Color::Black, PieceType::Pawn))
            | (pawn_attacks(Color::Black, sq) & self.pieces_of(Color::White, PieceType::Pawn))
            | (knight_attacks(sq) & self.pieces(PieceType::Knight))
            | (king_attacks(sq) & self.pieces(PieceType::King))
            | (rook_attacks(sq, occupied)
                & (self.pieces(PieceType::Rook) | self.pieces(PieceType::Queen)))
            | (bishop_attacks(sq, occupied)
                & (self.pieces(PieceType::Bishop) | self.pieces(PieceType::Queen)))
    }

    /// 指定マスに利いている全駒
    #[inline]
    pub fn attackers_to(&self, sq: Square) -> Bitboard {
        self.attackers_to_occ(sq, self.occupied())
    }

    /// ksqへの利きを遮っている駒（ピンまたは開き王手の候補）
    fn hidden_checkers(&self, ksq: Square, sliders: Color, blockers: Color) -> Bitboard {
        let mut result = Bitboard::EMPTY;
        let occupied = self.occupied();

        let rq = (self.pieces(PieceType::Rook) | self.pieces(PieceType::Queen))
            & self.pieces_colored(sliders)
            & crate::bitboard::pseudo_attacks(PieceType::Rook, ksq);
        let bq = (self.pieces(PieceType::Bishop) | self.pieces(PieceType::Queen))
            & self.pieces_colored(sliders)
            & crate::bitboard::pseudo_attacks(PieceType::Bishop, ksq);

        for s in rq | bq {
            let b = between_bb(ksq, s) & occupied;
            if b.is_not_empty() && !b.more_than_one() {
                result |= b & self.pieces_colored(blockers);
            }
        }
        result
    }

    /// 手番cの駒のうち、自王へのピンで動きを制限されている駒
    pub fn pinned_pieces(&self, c: Color) -> Bitboard {
        self.hidden_checkers(self.king_square(c), c.opposite(), c)
    }

    /// 手番cの駒のうち、動くと開き王手になる駒
    pub fn discovered_check_candidates(&self, c: Color) -> Bitboard {
        self.hidden_checkers(self.king_square(c.opposite()), c, c)
    }

    // =========================================================================
    // 指し手の性質
    // =========================================================================

    /// 駒を取る手か（アンパッサン含む）
    #[inline]
    pub fn move_is_capture(&self, m: Move) -> bool {
        m.is_en_passant() || self.board[m.to().index()].is_some()
    }

    /// 駒を取る手または昇格か
    #[inline]
    pub fn move_is_capture_or_promotion(&self, m: Move) -> bool {
        self.move_is_capture(m) || m.is_promotion()
    }

    /// パスポーンを進める手か
    pub fn move_is_passed_pawn_push(&self, m: Move) -> bool {
        let pc = self.piece_on(m.from());
        pc.is_some()
            && pc.piece_type() == PieceType::Pawn
            && pc.color() == self.side_to_move
            && self.pawn_is_passed(self.side_to_move, m.to())
    }

    /// mを指した後、動かした駒がsqに利いているか
    pub fn move_attacks_square(&self, m: Move, sq: Square) -> bool {
        let from = m.from();
        let to = m.to();
        let pc = self.piece_on(from);
        debug_assert!(pc.is_some());

        let occ = (self.occupied() & !Bitboard::from_square(from)) | Bitboard::from_square(to);
        attacks_from(pc, to, occ).contains(sq)
    }

    // =========================================================================
    // 合法性
    // =========================================================================

    /// 擬似合法手が合法か（ピン・王手放置のチェック）
    ///
    /// 生成された擬似合法手を前提とする。キャスリングは生成側で
    /// 通過マスの利きまで検査済みなのでここでは常に合法とみなす。
    pub fn is_legal(&self, m: Move, pinned: Bitboard) -> bool {
        let us = self.side_to_move;
        let from = m.from();
        let ksq = self.king_square(us);

        debug_assert!(self.piece_on(from).is_some());
        debug_assert!(self.piece_on(from).color() == us);

        if m.is_en_passant() {
            // 取られるポーンと自ポーンを外した盤面で王の安全を確認する
            let to = m.to();
            let capsq = Square::new(to.file(), from.rank());
            let occ = (self.occupied()
                & !Bitboard::from_square(from)
                & !Bitboard::from_square(capsq))
                | Bitboard::from_square(to);
            let them = us.opposite();

            return (rook_attacks(ksq, occ)
                & (self.pieces_of(them, PieceType::Rook) | self.pieces_of(them, PieceType::Queen)))
            .is_empty()
                && (bishop_attacks(ksq, occ)
                    & (self.pieces_of(them, PieceType::Bishop)
                        | self.pieces_of(them, PieceType::Queen)))
                .is_empty();
        }

        if self.piece_on(from).piece_type() == PieceType::King {
            if m.is_castle() {
                return true;
            }
            // スライダーのX線を考慮して王を外した盤面で判定する
            let occ = self.occupied() & !Bitboard::from_square(from);
            return (self.attackers_to_occ(m.to(), occ) & self.pieces_colored(us.opposite()))
                .is_empty();
        }

        !pinned.contains(from) || aligned(ksq, from, m.to()).is_not_empty()
    }

    /// 置換表から取り出した手が現局面で擬似合法か
    ///
    /// 壊れたエントリの手をそのまま指さないための検証。
    pub fn pseudo_legal(&self, m: Move) -> bool {
        if !m.is_some() {
            return false;
        }

        let us = self.side_to_move;
        let from = m.from();
        let to = m.to();
        let pc = self.piece_on(from);

        if pc.is_none() || pc.color() != us {
            return false;
        }

        let captured = self.piece_on(to);
        if captured.is_some()
            && (captured.color() == us || captured.piece_type() == PieceType::King)
        {
            return false;
        }

        if m.is_castle() {
            return self.castle_is_pseudo_legal(m);
        }

        let pt = pc.piece_type();

        if m.is_en_passant() {
            return pt == PieceType::Pawn
                && self.ep_square == Some(to)
                && pawn_attacks(us, from).contains(to);
        }

        if m.is_promotion() && pt != PieceType::Pawn {
            return false;
        }

        if pt == PieceType::Pawn {
            let up: i8 = if us == Color::White { 8 } else { -8 };
            let rank7 = if us == Color::White { Rank::Rank7 } else { Rank::Rank2 };
            let rank2 = if us == Color::White { Rank::Rank2 } else { Rank::Rank7 };

            // 昇格段への移動は必ず昇格フラグを持つ
            if (from.rank() == rank7) != m.is_promotion() {
                return false;
            }

            if pawn_attacks(us, from).contains(to) {
                // 斜め前は駒を取る場合のみ
                if captured.is_none() {
                    return false;
                }
            } else if from.offset(up) == Some(to) {
                if captured.is_some() {
                    return false;
                }
            } else if from.rank() == rank2 && from.offset(2 * up) == Some(to) {
                let mid = from.offset(up).unwrap();
                if captured.is_some() || self.piece_on(mid).is_some() {
                    return false;
                }
            } else {
                return false;
            }
        } else if !attacks_from(pc, from, self.occupied()).contains(to) {
            return false;
        }

        // 王手されている場合は王手を解消する手であること
        if self.in_check() && pt != PieceType::King {
            if self.checkers.more_than_one() {
                return false;
            }
            let checker = self.checkers.lsb_unchecked();
            let target = between_bb(self.king_square(us), checker) | self.checkers;
            let dest = if m.is_en_passant() {
                // アンパッサンで王手ポーンを取る場合
                Bitboard::from_square(Square::new(to.file(), from.rank()))
            } else {
                Bitboard::from_square(to)
            };
            if (target & dest).is_empty() {
                return false;
            }
        }

        true
    }

    /// キャスリング手の擬似合法性（経路と利きの検査込み）
    fn castle_is_pseudo_legal(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let from = m.from();
        let to = m.to();

        if self.in_check() || self.piece_on(from).piece_type() != PieceType::King {
            return false;
        }

        let kingside = to.file() > from.file();
        let rights = if kingside {
            CastlingRights::kingside(us)
        } else {
            CastlingRights::queenside(us)
        };
        if !self.castling.contains(rights) {
            return false;
        }

        let (rook_from, path, king_path) = self.castle_squares(us, kingside);
        if self.piece_on(rook_from) != Piece::new(us, PieceType::Rook) {
            return false;
        }
        if (path & self.occupied()).is_not_empty() {
            return false;
        }

        // 王の通過マスが利きにさらされていないこと
        let them = us.opposite();
        for sq in king_path {
            if (self.attackers_to(sq) & self.pieces_colored(them)).is_not_empty() {
                return false;
            }
        }
        true
    }

    /// キャスリングの関連マス（ルーク元、空きが必要な経路、王の通過マス）
    pub(crate) fn castle_squares(
        &self,
        us: Color,
        kingside: bool,
    ) -> (Square, Bitboard, Bitboard) {
        let rank = if us == Color::White { 0u8 } else { 56u8 };
        // SAFETY: rank + 0..8 は盤内
        let sq = |f: u8| unsafe { Square::from_index_unchecked(rank + f) };

        if kingside {
            let path = Bitboard::from_square(sq(5)) | Bitboard::from_square(sq(6));
            (sq(7), path, path)
        } else {
            let path = Bitboard::from_square(sq(1))
                | Bitboard::from_square(sq(2))
                | Bitboard::from_square(sq(3));
            let king_path = Bitboard::from_square(sq(2)) | Bitboard::from_square(sq(3));
            (sq(0), path, king_path)
        }
    }

    // =========================================================================
    // 王手判定
    // =========================================================================

    /// mが相手王に王手をかけるか
    pub fn gives_check(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let them = us.opposite();
        let ksq = self.king_square(them);
        let from = m.from();
        let to = m.to();
        let pc = self.piece_on(from);

        let mut occ = self.occupied() & !Bitboard::from_square(from);

        if m.is_castle() {
            let kingside = to.file() > from.file();
            let (rook_from, _, _) = self.castle_squares(us, kingside);
            let rook_to = if kingside {
                Square::new(crate::types::File::FileF, from.rank())
            } else {
                Square::new(crate::types::File::FileD, from.rank())
            };
            occ.clear(rook_from);
            occ.set(to);
            occ.set(rook_to);
            return rook_attacks(rook_to, occ).contains(ksq);
        }

        if m.is_en_passant() {
            occ.clear(Square::new(to.file(), from.rank()));
        }
        occ.set(to);

        // 直接王手
        let pt_after = if m.is_promotion() {
            m.promotion_type()
        } else {
            pc.piece_type()
        };
        if attacks_from(Piece::new(us, pt_after), to, occ).contains(ksq) {
            return true;
        }

        // 開き王手（動かした駒の後ろのスライダー）
        let from_bb = Bitboard::from_square(from);
        let rq = (self.pieces(PieceType::Rook) | self.pieces(PieceType::Queen))
            & self.pieces_colored(us)
            & !from_bb;
        if (rook_attacks(ksq, occ) & rq).is_not_empty() {
            return true;
        }
        let bq = (self.pieces(PieceType::Bishop) | self.pieces(PieceType::Queen))
            & self.pieces_colored(us)
            & !from_bb;
        (bishop_attacks(ksq, occ) & bq).is_not_empty()
    }

    // =========================================================================
    // 指し手の実行
    // =========================================================================

    fn put_piece(&mut self, pc: Piece, sq: Square) {
        let z = zobrist();
        self.board[sq.index()] = pc;
        self.by_type[pc.piece_type().index()].set(sq);
        self.by_color[pc.color().index()].set(sq);
        self.key ^= z.psq[pc.index()][sq.index()];
        if pc.piece_type() == PieceType::Pawn {
            self.pawn_key ^= z.psq[pc.index()][sq.index()];
        }
        let count = self.pieces_of(pc.color(), pc.piece_type()).count() as usize;
        self.material_key ^= z.material[pc.index()][count];
    }

    fn remove_piece(&mut self, sq: Square) {
        let pc = self.board[sq.index()];
        debug_assert!(pc.is_some());
        let z = zobrist();
        let count = self.pieces_of(pc.color(), pc.piece_type()).count() as usize;
        self.material_key ^= z.material[pc.index()][count];
        self.board[sq.index()] = Piece::NONE;
        self.by_type[pc.piece_type().index()].clear(sq);
        self.by_color[pc.color().index()].clear(sq);
        self.key ^= z.psq[pc.index()][sq.index()];
        if pc.piece_type() == PieceType::Pawn {
            self.pawn_key ^= z.psq[pc.index()][sq.index()];
        }
    }

    fn move_piece(&mut self, from: Square, to: Square) {
        let pc = self.board[from.index()];
        debug_assert!(pc.is_some());
        let z = zobrist();
        self.board[from.index()] = Piece::NONE;
        self.board[to.index()] = pc;
        let mask = Bitboard::from_square(from) | Bitboard::from_square(to);
        self.by_type[pc.piece_type().index()] ^= mask;
        self.by_color[pc.color().index()] ^= mask;
        self.key ^= z.psq[pc.index()][from.index()] ^ z.psq[pc.index()][to.index()];
        if pc.piece_type() == PieceType::Pawn {
            self.pawn_key ^= z.psq[pc.index()][from.index()] ^ z.psq[pc.index()][to.index()];
        }
    }

    /// 指し手を実行する
    pub fn do_move(&mut self, m: Move) {
        debug_assert!(m.is_some());
        let z = zobrist();
        let us = self.side_to_move;
        let them = us.opposite();
        let from = m.from();
        let to = m.to();
        let pc = self.piece_on(from);

        debug_assert!(pc.is_some() && pc.color() == us);

        let mut st = StateInfo {
            key: self.key,
            pawn_key: self.pawn_key,
            material_key: self.material_key,
            castling: self.castling,
            ep_square: self.ep_square,
            rule50: self.rule50,
            plies_from_null: self.plies_from_null,
            checkers: self.checkers,
            last_move: m,
            captured: Piece::NONE,
            non_pawn_material: self.non_pawn_material,
        };

        self.rule50 += 1;
        self.plies_from_null += 1;
        self.game_ply += 1;

        // 前のアンパッサン権を消す
        if let Some(ep) = self.ep_square.take() {
            self.key ^= z.en_passant[ep.file().index()];
        }

        // 駒を取る
        let capsq = if m.is_en_passant() {
            Square::new(to.file(), from.rank())
        } else {
            to
        };
        let captured = self.piece_on(capsq);
        if captured.is_some() {
            debug_assert!(captured.color() == them);
            debug_assert!(captured.piece_type() != PieceType::King);
            self.remove_piece(capsq);
            if captured.piece_type() != PieceType::Pawn {
                self.non_pawn_material[them.index()] -= piece_value_midgame(captured);
            }
            st.captured = captured;
            self.rule50 = 0;
        }

        if m.is_castle() {
            let kingside = to.file() > from.file();
            let (rook_from, _, _) = self.castle_squares(us, kingside);
            let rook_to = if kingside {
                Square::new(crate::types::File::FileF, from.rank())
            } else {
                Square::new(crate::types::File::FileD, from.rank())
            };
            self.move_piece(from, to);
            self.move_piece(rook_from, rook_to);
        } else {
            self.move_piece(from, to);
        }

        if pc.piece_type() == PieceType::Pawn {
            self.rule50 = 0;

            if m.is_promotion() {
                let promo = Piece::new(us, m.promotion_type());
                self.remove_piece(to);
                self.put_piece(promo, to);
                self.non_pawn_material[us.index()] += piece_value_midgame(promo);
            } else if (from.index() as i32 - to.index() as i32).abs() == 16 {
                // 2マス進んだ場合、相手ポーンが取れるときだけ権利を立てる
                let ep = Square::from_index((from.index() + to.index()) / 2).unwrap();
                if (pawn_attacks(us, ep) & self.pieces_of(them, PieceType::Pawn)).is_not_empty()
                {
                    self.ep_square = Some(ep);
                    self.key ^= z.en_passant[ep.file().index()];
                }
            }
        }

        // キャスリング権の更新
        let mut lost = castling_rights_mask(from);
        lost.insert(castling_rights_mask(to));
        if lost.intersects(self.castling) {
            self.key ^= z.castling[self.castling.bits() as usize];
            self.castling.remove(lost);
            self.key ^= z.castling[self.castling.bits() as usize];
        }

        // 手番交代
        self.side_to_move = them;
        self.key ^= z.side;

        // 新手番の王への王手
        self.checkers =
            self.attackers_to(self.king_square(them)) & self.pieces_colored(us);

        self.states.push(st);
    }

    /// 指し手を戻す
    pub fn undo_move(&mut self, m: Move) {
        let st = self.states.pop().expect("undo_move without do_move");
        debug_assert!(st.last_move == m);

        let them = self.side_to_move;
        let us = them.opposite();
        let from = m.from();
        let to = m.to();

        self.side_to_move = us;
        self.game_ply -= 1;

        if m.is_promotion() {
            self.remove_piece(to);
            self.put_piece(Piece::new(us, PieceType::Pawn), to);
        }

        if m.is_castle() {
            let kingside = to.file() > from.file();
            let (rook_from, _, _) = self.castle_squares(us, kingside);
            let rook_to = if kingside {
                Square::new(crate::types::File::FileF, from.rank())
            } else {
                Square::new(crate::types::File::FileD, from.rank())
            };
            self.move_piece(rook_to, rook_from);
        }

        self.move_piece(to, from);

        if st.captured.is_some() {
            let capsq = if m.is_en_passant() {
                Square::new(to.file(), from.rank())
            } else {
                to
            };
            self.put_piece(st.captured, capsq);
        }

        // キーは再計算せず保存値を復元する
        self.key = st.key;
        self.pawn_key = st.pawn_key;
        self.material_key = st.material_key;
        self.castling = st.castling;
        self.ep_square = st.ep_square;
        self.rule50 = st.rule50;
        self.plies_from_null = st.plies_from_null;
        self.checkers = st.checkers;
        self.non_pawn_material = st.non_pawn_material;
    }

    /// ヌルムーブ（パス）を実行する
    ///
    /// 王手されていない局面でのみ呼べる。
    pub fn do_null_move(&mut self) {
        debug_assert!(!self.in_check());
        let z = zobrist();

        let st = StateInfo {
            key: self.key,
            pawn_key: self.pawn_key,
            material_key: self.material_key,
            castling: self.castling,
            ep_square: self.ep_square,
            rule50: self.rule50,
            plies_from_null: self.plies_from_null,
            checkers: self.checkers,
            last_move: Move::NULL,
            captured: Piece::NONE,
            non_pawn_material: self.non_pawn_material,
        };

        if let Some(ep) = self.ep_square.take() {
            self.key ^= z.en_passant[ep.file().index()];
        }
        self.side_to_move = self.side_to_move.opposite();
        self.key ^= z.side;
        self.rule50 += 1;
        self.plies_from_null = 0;
        self.game_ply += 1;

        self.states.push(st);
    }

    /// ヌルムーブを戻す
    pub fn undo_null_move(&mut self) {
        let st = self.states.pop().expect("undo_null_move without do_null_move");
        debug_assert!(st.last_move == Move::NULL);

        self.side_to_move = self.side_to_move.opposite();
        self.game_ply -= 1;
        self.key = st.key;
        self.pawn_key = st.pawn_key;
        self.ep_square = st.ep_square;
        self.rule50 = st.rule50;
        self.plies_from_null = st.plies_from_null;
        self.checkers = st.checkers;
    }

    // =========================================================================
    // 引き分け判定
    // =========================================================================

    /// 引き分け（千日手・50手・駒不足）か
    pub fn is_draw(&self) -> bool {
        // 50手ルール
        if self.rule50 >= 100 {
            return true;
        }

        // 駒不足（両者ポーンなしで小駒1枚以下）
        if self.pieces(PieceType::Pawn).is_empty()
            && (self.non_pawn_material[0] + self.non_pawn_material[1]).raw()
                <= crate::types::BISHOP_VALUE_MIDGAME.raw()
        {
            return true;
        }

        // 同一局面の繰り返し（1回で引き分け扱い）
        let n = self.states.len();
        let limit = self.rule50.min(self.plies_from_null).min(n as i32);
        let mut i = 4;
        while i <= limit {
            if self.states[n - i as usize].key == self.key {
                return true;
            }
            i += 2;
        }

        false
    }

    /// 盤面の整合性チェック（デバッグ用）
    pub fn is_ok(&self) -> bool {
        if self.pieces_of(Color::White, PieceType::King).count() != 1
            || self.pieces_of(Color::Black, PieceType::King).count() != 1
        {
            return false;
        }
        if (self.by_color[0] & self.by_color[1]).is_not_empty() {
            return false;
        }
        let mut occ = Bitboard::EMPTY;
        for pt in 1..=6u8 {
            let pt = PieceType::from_u8(pt).unwrap();
            occ |= self.pieces(pt);
        }
        occ == self.occupied()
    }

    /// 盤面・手番などからキーを全計算する（FEN読込時）
    pub(super) fn compute_keys(&mut self) {
        self.plies_from_null = self.rule50;
        let z = zobrist();
        self.key = 0;
        self.pawn_key = 0;
        self.material_key = 0;
        self.non_pawn_material = [Value::ZERO, Value::ZERO];

        let mut counts = [0usize; Piece::NUM];
        for i in 0..64 {
            let pc = self.board[i];
            if pc.is_none() {
                continue;
            }
            self.key ^= z.psq[pc.index()][i];
            if pc.piece_type() == PieceType::Pawn {
                self.pawn_key ^= z.psq[pc.index()][i];
            } else if pc.piece_type() != PieceType::King {
                self.non_pawn_material[pc.color().index()] += piece_value_midgame(pc);
            }
            counts[pc.index()] += 1;
            self.material_key ^= z.material[pc.index()][counts[pc.index()]];
        }

        self.key ^= z.castling[self.castling.bits() as usize];
        if let Some(ep) = self.ep_square {
            self.key ^= z.en_passant[ep.file().index()];
        }
        if self.side_to_move == Color::Black {
            self.key ^= z.side;
        }

        let us = self.side_to_move;
        self.checkers =
            self.attackers_to(self.king_square(us)) & self.pieces_colored(us.opposite());
    }

    pub(super) fn set_board(&mut self, sq: Square, pc: Piece) {
        self.board[sq.index()] = pc;
        self.by_type[pc.piece_type().index()].set(sq);
        self.by_color[pc.color().index()].set(sq);
    }

    pub(super) fn set_side_to_move(&mut self, c: Color) {
        self.side_to_move = c;
    }

    pub(super) fn set_castling(&mut self, cr: CastlingRights) {
        self.castling = cr;
    }

    pub(super) fn set_ep_square(&mut self, sq: Option<Square>) {
        self.ep_square = sq;
    }

    pub(super) fn set_rule50(&mut self, n: i32) {
        self.rule50 = n;
    }

    pub(super) fn set_game_ply(&mut self, n: i32) {
        self.game_ply = n;
    }

}

impl PartialEq for Position {
    /// 盤面・手番・権利・カウンタの一致（履歴は比較しない）
    fn eq(&self, other: &Self) -> bool {
        self.board == other.board
            && self.side_to_move == other.side_to_move
            && self.castling == other.castling
            && self.ep_square == other.ep_square
            && self.rule50 == other.rule50
            && self.key == other.key
            && self.pawn_key == other.pawn_key
            && self.material_key == other.material_key
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Position {{")?;
        for rank in (0..8).rev() {
            write!(f, "  ")?;
            for file in 0..8 {
                let sq = Square::from_index((rank << 3) | file).unwrap();
                let pc = self.piece_on(sq);
                write!(f, "{}", if pc.is_some() { pc.to_char() } else { '.' })?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  fen: {}", self.to_fen())?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_basics() {
        let pos = Position::startpos();
        assert!(pos.is_ok());
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.occupied().count(), 32);
        assert_eq!(pos.king_square(Color::White), Square::E1);
        assert_eq!(pos.king_square(Color::Black), Square::E8);
        assert!(!pos.in_check());
        assert_eq!(pos.castling_rights(), CastlingRights::ALL);
    }

    #[test]
    fn test_do_undo_restores_everything() {
        let mut pos = Position::startpos();
        let key = pos.key();
        let pawn_key = pos.pawn_key();
        let material_key = pos.material_key();
        let snapshot = pos.clone();

        let m = Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank2),
            Square::new(crate::types::File::FileE, Rank::Rank4),
        );
        pos.do_move(m);
        assert_ne!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::Black);

        pos.undo_move(m);
        assert_eq!(pos.key(), key);
        assert_eq!(pos.pawn_key(), pawn_key);
        assert_eq!(pos.material_key(), material_key);
        assert_eq!(pos, snapshot);
    }

    #[test]
    fn test_null_move_roundtrip() {
        let mut pos = Position::startpos();
        let key = pos.key();

        pos.do_null_move();
        assert_ne!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::Black);

        pos.undo_null_move();
        assert_eq!(pos.key(), key);
        assert_eq!(pos.side_to_move(), Color::White);
    }

    #[test]
    fn test_capture_and_material() {
        // 1. e4 d5 2. exd5
        let mut pos = Position::startpos();
        let e4 = Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank2),
            Square::new(crate::types::File::FileE, Rank::Rank4),
        );
        let d5 = Move::new(
            Square::new(crate::types::File::FileD, Rank::Rank7),
            Square::new(crate::types::File::FileD, Rank::Rank5),
        );
        let exd5 = Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank4),
            Square::new(crate::types::File::FileD, Rank::Rank5),
        );
        pos.do_move(e4);
        pos.do_move(d5);
        let mk = pos.material_key();
        pos.do_move(exd5);
        assert_eq!(pos.captured_piece(), Piece::new(Color::Black, PieceType::Pawn));
        assert_ne!(pos.material_key(), mk);
        assert_eq!(pos.pieces(PieceType::Pawn).count(), 15);

        pos.undo_move(exd5);
        assert_eq!(pos.material_key(), mk);
        assert_eq!(pos.pieces(PieceType::Pawn).count(), 16);
    }

    #[test]
    fn test_ep_square_set_only_when_capturable() {
        let mut pos = Position::startpos();
        // 1. e4 には黒ポーンが隣接しないのでアンパッサン権は立たない
        pos.do_move(Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank2),
            Square::new(crate::types::File::FileE, Rank::Rank4),
        ));
        assert_eq!(pos.ep_square(), None);
    }

    #[test]
    fn test_fifty_move_draw() {
        let mut pos =
            Position::from_fen("4k3/8/8/8/8/8/8/4K2R w - - 99 80").expect("valid fen");
        assert!(!pos.is_draw());
        // 適当なルーク移動で100に到達
        pos.do_move(Move::new(Square::H1, Square::new(crate::types::File::FileH, Rank::Rank2)));
        assert!(pos.is_draw());
    }

    #[test]
    fn test_insufficient_material_draw() {
        let pos = Position::from_fen("8/8/4k3/8/8/2B5/4K3/8 w - - 0 1").expect("valid fen");
        assert!(pos.is_draw());

        let pos = Position::from_fen("8/8/4k3/8/8/2R5/4K3/8 w - - 0 1").expect("valid fen");
        assert!(!pos.is_draw());
    }

    #[test]
    fn test_repetition_draw() {
        let mut pos = Position::startpos();
        let ng1f3 = Move::new(Square::G1, Square::new(crate::types::File::FileF, Rank::Rank3));
        let ng8f6 = Move::new(
            Square::new(crate::types::File::FileG, Rank::Rank8),
            Square::new(crate::types::File::FileF, Rank::Rank6),
        );
        let nf3g1 = Move::new(Square::new(crate::types::File::FileF, Rank::Rank3), Square::G1);
        let nf6g8 = Move::new(
            Square::new(crate::types::File::FileF, Rank::Rank6),
            Square::new(crate::types::File::FileG, Rank::Rank8),
        );

        pos.do_move(ng1f3);
        pos.do_move(ng8f6);
        pos.do_move(nf3g1);
        assert!(!pos.is_draw());
        pos.do_move(nf6g8);
        // 初期局面に戻った（1回の繰り返し）
        assert!(pos.is_draw());
    }

    #[test]
    fn test_attackers_to() {
        let pos = Position::startpos();
        // e3にはd2/f2のポーンとg1のナイトが利いている
        let e3 = Square::new(crate::types::File::FileE, Rank::Rank3);
        let atk = pos.attackers_to(e3) & pos.pieces_colored(Color::White);
        assert_eq!(atk.count(), 3);
    }

    #[test]
    fn test_pinned_pieces() {
        // 黒ルークがe8から、e2の白ナイトをピン
        let pos =
            Position::from_fen("4r1k1/8/8/8/8/8/4N3/4K3 w - - 0 1").expect("valid fen");
        let pinned = pos.pinned_pieces(Color::White);
        assert_eq!(pinned.count(), 1);
        assert!(pinned.contains(Square::new(crate::types::File::FileE, Rank::Rank2)));
    }

    #[test]
    fn test_gives_check_direct_and_discovered() {
        // 白ルークe2、白王e1、黒王e8: ルークが動くと…王手にはならないがe7へは王手
        let pos =
            Position::from_fen("4k3/8/8/8/8/8/4R3/4K3 w - - 0 1").expect("valid fen");
        let re2e7 = Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank2),
            Square::new(crate::types::File::FileE, Rank::Rank7),
        );
        assert!(pos.gives_check(re2e7));
        let re2a2 = Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank2),
            Square::new(crate::types::File::FileA, Rank::Rank2),
        );
        // ルークが横に逃げると白王が直線上に現れるが王ではチェックにならない
        assert!(!pos.gives_check(re2a2));

        // 開き王手: 白ビショップをどかすと後ろのルークが王手
        let pos =
            Position::from_fen("4k3/8/8/8/8/4B3/8/4RK2 w - - 0 1").expect("valid fen");
        let be3c5 = Move::new(
            Square::new(crate::types::File::FileE, Rank::Rank3),
            Square::new(crate::types::File::FileC, Rank::Rank5),
        );
        assert!(pos.gives_check(be3c5));
    }

    #[test]
    fn test_exclusion_key_differs() {
        let pos = Position::startpos();
        assert_ne!(pos.key(), pos.exclusion_key());
    }
}
