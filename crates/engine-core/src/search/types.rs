//! 探索の基本型
//!
//! - `SearchStack`: plyごとの探索状態（PV・killer・eval）
//! - `RootMoveList`: ルート手の並べ替えと統計
//! - `Signals`: 停止フラグ
//! - 詰みスコアのply補正（value_to_tt / value_from_tt）

use crate::movegen::generate_legal;
use crate::position::Position;
use crate::types::{Depth, Move, Value, PLY_MAX_PLUS_2};
use std::sync::atomic::{AtomicBool, Ordering};

/// killerスロット数
pub const KILLER_MAX: usize = 2;

/// plyごとの探索状態
#[derive(Clone, Copy)]
pub struct SearchStack {
    /// このplyからのPV
    pub pv: [Move; PLY_MAX_PLUS_2],
    /// 現在探索中の手
    pub current_move: Move,
    /// ヌルムーブ反証から得た脅威の手
    pub threat_move: Move,
    /// 詰みを出した手
    pub mate_killer: Move,
    /// beta cutoffを出した静かな手
    pub killers: [Move; KILLER_MAX],
    /// 適用したLMRの削減量
    pub reduction: Depth,
    /// 静的評価のキャッシュ
    pub eval: Value,
}

impl SearchStack {
    pub const fn empty() -> SearchStack {
        SearchStack {
            pv: [Move::NONE; PLY_MAX_PLUS_2],
            current_move: Move::NONE,
            threat_move: Move::NONE,
            mate_killer: Move::NONE,
            killers: [Move::NONE; KILLER_MAX],
            reduction: 0,
            eval: Value::NONE,
        }
    }

    /// ノード到達時の初期化
    pub fn init(&mut self, ply: usize) {
        self.pv[ply] = Move::NONE;
        if ply + 1 < PLY_MAX_PLUS_2 {
            self.pv[ply + 1] = Move::NONE;
        }
        self.current_move = Move::NONE;
        self.threat_move = Move::NONE;
        self.reduction = 0;
        self.eval = Value::NONE;
    }

    /// killer系の初期化（2ply先に対して行う）
    pub fn init_killers(&mut self) {
        self.mate_killer = Move::NONE;
        self.killers = [Move::NONE; KILLER_MAX];
    }
}

/// 探索スタック配列
pub type StackArray = Box<[SearchStack; PLY_MAX_PLUS_2]>;

/// 新しい探索スタックを確保する
pub fn new_stack_array() -> StackArray {
    // Box::newだと一度スタックに乗るためvec経由で確保する
    let v = vec![SearchStack::empty(); PLY_MAX_PLUS_2];
    v.into_boxed_slice().try_into().ok().expect("stack array size")
}

/// 探索開始時のスタック初期化
pub fn init_ss_array(ss: &mut [SearchStack]) {
    for (ply, frame) in ss.iter_mut().enumerate().take(3) {
        frame.init(ply);
        frame.init_killers();
    }
}

/// value > alpha となった手でPVを更新する
pub fn update_pv(ss: &mut [SearchStack], ply: usize) {
    let (head, tail) = ss.split_at_mut(ply + 1);
    let frame = &mut head[ply];
    let child = &tail[0];

    frame.pv[ply] = frame.current_move;
    let mut p = ply + 1;
    while child.pv[p].is_some() {
        frame.pv[p] = child.pv[p];
        p += 1;
    }
    frame.pv[p] = Move::NONE;
}

/// split point用のPV更新（親スタックにも書き込む）
///
/// # Safety
/// `parent`はマスタースレッドのスタック配列先頭を指し、split pointが
/// 解放されるまで有効であること。呼び出しはsplit pointのロック下で行う。
pub unsafe fn sp_update_pv(parent: *mut SearchStack, ss: &mut [SearchStack], ply: usize) {
    let (head, tail) = ss.split_at_mut(ply + 1);
    let frame = &mut head[ply];
    let child = &tail[0];
    let pframe = &mut *parent.add(ply);

    frame.pv[ply] = frame.current_move;
    pframe.pv[ply] = frame.current_move;
    let mut p = ply + 1;
    while child.pv[p].is_some() {
        frame.pv[p] = child.pv[p];
        pframe.pv[p] = child.pv[p];
        p += 1;
    }
    frame.pv[p] = Move::NONE;
    pframe.pv[p] = Move::NONE;
}

// =============================================================================
// 詰みスコアのply補正
// =============================================================================

/// 置換表格納用にスコアを補正する
///
/// 詰みスコアはルートからの距離ではなく現ノードからの距離で格納する。
#[inline]
pub fn value_to_tt(v: Value, ply: i32) -> Value {
    if v >= Value::MATE_IN_MAX_PLY {
        v + ply
    } else if v <= Value::MATED_IN_MAX_PLY {
        v - ply
    } else {
        v
    }
}

/// 置換表から取り出したスコアを現在plyに合わせて戻す
#[inline]
pub fn value_from_tt(v: Value, ply: i32) -> Value {
    if v >= Value::MATE_IN_MAX_PLY {
        v - ply
    } else if v <= Value::MATED_IN_MAX_PLY {
        v + ply
    } else {
        v
    }
}

// =============================================================================
// Signals
// =============================================================================

/// 探索の停止指示
///
/// タイマースレッドとコマンド読み取りスレッドが書き、
/// 全ワーカーがポーリングで読む。
#[derive(Default)]
pub struct Signals {
    /// 即時停止
    pub stop: AtomicBool,
    /// ponderhit受信時に停止
    pub stop_on_ponderhit: AtomicBool,
    /// ponder中（停止判定を保留する）
    pub ponder: AtomicBool,
}

impl Signals {
    pub fn new() -> Signals {
        Signals::default()
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn pondering(&self) -> bool {
        self.ponder.load(Ordering::Relaxed)
    }

    /// ponderhit受信: 通常探索に切り替える
    pub fn ponderhit(&self) {
        self.ponder.store(false, Ordering::Relaxed);
        if self.stop_on_ponderhit.load(Ordering::Relaxed) {
            self.request_stop();
        }
    }

    pub fn reset(&self, ponder: bool) {
        self.stop.store(false, Ordering::Relaxed);
        self.stop_on_ponderhit.store(false, Ordering::Relaxed);
        self.ponder.store(ponder, Ordering::Relaxed);
    }
}

// =============================================================================
// RootMoveList
// =============================================================================

/// ルート手1つ分の統計
#[derive(Clone)]
pub struct RootMove {
    pub mv: Move,
    pub score: Value,
    /// この手の探索に費したノード数（直近イテレーション）
    pub nodes: u64,
    /// 累計ノード数（easy move判定用）
    pub cumulative_nodes: u64,
    /// 自分/相手のbeta cutoff加重カウント
    pub our_beta: u64,
    pub their_beta: u64,
    pub pv: Vec<Move>,
}

impl RootMove {
    fn new(mv: Move) -> RootMove {
        RootMove {
            mv,
            score: -Value::INFINITE,
            nodes: 0,
            cumulative_nodes: 0,
            our_beta: 0,
            their_beta: 0,
            pv: vec![mv],
        }
    }

    /// 並べ替えキー: スコア降順、同点なら相手のcutoffが少ない手を先に
    fn sort_key(&self) -> (i32, i64) {
        (self.score.raw(), -(self.their_beta as i64 - self.our_beta as i64))
    }
}

/// ルート手のリスト
pub struct RootMoveList {
    moves: Vec<RootMove>,
}

impl RootMoveList {
    /// 合法手から構築する（searchmoves指定があれば絞り込む)
    pub fn new(pos: &Position, search_moves: &[Move]) -> RootMoveList {
        let legal = generate_legal(pos);
        let moves = legal
            .iter()
            .filter(|&&m| search_moves.is_empty() || search_moves.contains(&m))
            .map(|&m| RootMove::new(m))
            .collect();
        RootMoveList { moves }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    #[inline]
    pub fn get(&self, i: usize) -> &RootMove {
        &self.moves[i]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize) -> &mut RootMove {
        &mut self.moves[i]
    }

    /// スコア降順に並べ替える
    pub fn sort(&mut self) {
        self.moves.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    }

    /// 先頭n+1件だけを並べ替える（MultiPV用）
    pub fn sort_multipv(&mut self, n: usize) {
        let end = (n + 1).min(self.moves.len());
        self.moves[..end].sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PLY_MAX;

    #[test]
    fn test_value_tt_roundtrip() {
        // 通常のスコアは補正されない
        assert_eq!(value_to_tt(Value::new(123), 10), Value::new(123));
        assert_eq!(value_from_tt(Value::new(123), 10), Value::new(123));

        // 詰みスコアはplyを足して格納し、取り出しで引く
        let mate = Value::mate_in(7);
        let stored = value_to_tt(mate, 3);
        assert_eq!(value_from_tt(stored, 3), mate);

        let mated = Value::mated_in(5);
        let stored = value_to_tt(mated, 2);
        assert_eq!(value_from_tt(stored, 2), mated);
    }

    #[test]
    fn test_mate_ply_agnostic_storage() {
        // ply 3で「あと4手で詰み」= mate_in(7) を格納すると、
        // ply 5から見れば mate_in(9) として取り出される
        let stored = value_to_tt(Value::mate_in(7), 3);
        assert_eq!(value_from_tt(stored, 5), Value::mate_in(9));
    }

    #[test]
    fn test_update_pv() {
        let mut ss = new_stack_array();
        let m1 = Move::from_u16(0x0100);
        let m2 = Move::from_u16(0x0200);

        ss[1].current_move = m1;
        ss[2].pv[2] = m2;
        ss[2].pv[3] = Move::NONE;
        update_pv(&mut ss[..], 1);

        assert_eq!(ss[1].pv[1], m1);
        assert_eq!(ss[1].pv[2], m2);
        assert_eq!(ss[1].pv[3], Move::NONE);
    }

    #[test]
    fn test_root_move_list() {
        let pos = Position::startpos();
        let mut rml = RootMoveList::new(&pos, &[]);
        assert_eq!(rml.len(), 20);

        rml.get_mut(5).score = Value::new(100);
        rml.get_mut(10).score = Value::new(50);
        rml.sort();
        assert_eq!(rml.get(0).score, Value::new(100));
        assert_eq!(rml.get(1).score, Value::new(50));
    }

    #[test]
    fn test_root_move_list_searchmoves() {
        let pos = Position::startpos();
        let all = RootMoveList::new(&pos, &[]);
        let only = vec![all.get(0).mv, all.get(1).mv];
        let rml = RootMoveList::new(&pos, &only);
        assert_eq!(rml.len(), 2);
    }

    #[test]
    fn test_stack_array_size() {
        let ss = new_stack_array();
        assert_eq!(ss.len(), (PLY_MAX + 2) as usize);
    }
}
