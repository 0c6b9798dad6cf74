//! 探索本体
//!
//! 反復深化ドライバ（think / id_loop / root_search）と、
//! PV・zero-window・静止探索の3つの相互再帰、YBWCのsplit実装。
//! 探索中の共有データは`SearchContext`に集約し、ワーカーには
//! split point経由で参照を渡す。

use super::history::History;
use super::limits::LimitsType;
use super::movepick::MovePicker;
use super::thread::{
    encode_sp, IdleEvent, SpShared, SplitPoint, ThreadPool, ThreadStateKind, SP_NONE,
};
use super::time_manager::TimeManager;
use super::types::{
    init_ss_array, new_stack_array, sp_update_pv, update_pv, value_from_tt, value_to_tt,
    RootMoveList, SearchStack, Signals, StackArray,
};
use crate::eval::{evaluate, EvalInfo};
use crate::position::Position;
use crate::tt::{TTData, TranspositionTable};
use crate::types::{
    Bound, Color, Depth, Move, PieceType, Value, ONE_PLY, PAWN_VALUE_ENDGAME, PAWN_VALUE_MIDGAME,
    PLY_MAX, PLY_MAX_PLUS_2,
};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// =============================================================================
// 定数
// =============================================================================

/// イテレーション1の探索深さ
const INITIAL_DEPTH: Depth = ONE_PLY;

/// 選択的探索の深さ上限（futility等の対象）
const SELECTIVE_DEPTH: Depth = 7 * ONE_PLY;

/// IIDを行う静的評価のマージン
const IID_MARGIN: Value = Value::new(0x100);

/// easy move判定のマージン
const EASY_MOVE_MARGIN: Value = Value::new(0x200);

/// ルートのスコアが前イテレーションからこれ以上落ちたら問題とみなす
const PROBLEM_MARGIN: Value = Value::new(0x28);

/// 問題フラグを解除するマージン
const NO_PROBLEM_MARGIN: Value = Value::new(0x14);

/// ヌルムーブを試みる静的評価のマージン
const NULL_MOVE_MARGIN: Value = Value::new(0x200);

/// singular extensionのマージン
const SINGLE_REPLY_MARGIN: Value = Value::new(0x20);

/// 静止探索のfutilityマージン
const FUTILITY_MARGIN_QS: Value = Value::new(0x80);

/// 手数ごとに縮むfutilityマージン
const INCREMENTAL_FUTILITY_MARGIN: i32 = 0x8;

/// razoringの深さ上限
const RAZOR_DEPTH: Depth = 4 * ONE_PLY;

/// 脅威検出（connected move）の深さ上限
const THREAT_DEPTH: Depth = 5 * ONE_PLY;

// =============================================================================
// 縮小・futilityテーブル
// =============================================================================

struct SearchTables {
    pv_reduction: [[i8; 64]; 64],
    nonpv_reduction: [[i8; 64]; 64],
    futility_margins: [i32; 2 * PLY_MAX_PLUS_2],
}

static TABLES: OnceLock<Box<SearchTables>> = OnceLock::new();

fn tables() -> &'static SearchTables {
    TABLES.get_or_init(|| {
        let mut t = Box::new(SearchTables {
            pv_reduction: [[0; 64]; 64],
            nonpv_reduction: [[0; 64]; 64],
            futility_margins: [0; 2 * PLY_MAX_PLUS_2],
        });

        for i in 1..64usize {
            for j in 1..64usize {
                let pv_red = 0.5 + (i as f64).ln() * (j as f64).ln() / 6.0;
                let nonpv_red = 0.5 + (i as f64).ln() * (j as f64).ln() / 3.0;
                t.pv_reduction[i][j] =
                    if pv_red >= 1.0 { (pv_red * ONE_PLY as f64).floor() as i8 } else { 0 };
                t.nonpv_reduction[i][j] =
                    if nonpv_red >= 1.0 { (nonpv_red * ONE_PLY as f64).floor() as i8 } else { 0 };
            }
        }

        for i in 2..2 * PLY_MAX_PLUS_2 {
            t.futility_margins[i] = 112 * (32 - ((i * i / 2) as u32).leading_zeros() as i32 - 1);
        }
        t
    })
}

#[inline]
fn pv_reduction(depth: Depth, move_number: i32) -> Depth {
    tables().pv_reduction[(depth as usize / 2).min(63)][(move_number as usize).min(63)] as Depth
}

#[inline]
fn nonpv_reduction(depth: Depth, move_number: i32) -> Depth {
    tables().nonpv_reduction[(depth as usize / 2).min(63)][(move_number as usize).min(63)]
        as Depth
}

#[inline]
fn futility_margin(depth: Depth) -> Value {
    Value::new(tables().futility_margins[depth.clamp(0, 2 * PLY_MAX_PLUS_2 as i32 - 1) as usize])
}

/// 手数ベースのfutility枝刈りの閾値
#[inline]
fn futility_move_count_margin(depth: Depth) -> i32 {
    3 + (1 << (3 * depth / 8))
}

// =============================================================================
// オプション・コンテキスト
// =============================================================================

/// 探索チューニングのオプション一式
///
/// 延長量はDepth単位（ONE_PLY = 1手）。インデックス0が非PV、1がPV。
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub check_extension: [Depth; 2],
    pub single_evasion_extension: [Depth; 2],
    pub mate_threat_extension: [Depth; 2],
    pub pawn_push_to_7th_extension: [Depth; 2],
    pub passed_pawn_extension: [Depth; 2],
    pub pawn_endgame_extension: [Depth; 2],
    pub multi_pv: usize,
    pub threads: usize,
    pub min_split_depth: usize,
    pub max_threads_per_split_point: usize,
    pub use_sleeping_threads: bool,
    pub ponder: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            check_extension: [1, 2],
            single_evasion_extension: [2, 2],
            mate_threat_extension: [0, 0],
            pawn_push_to_7th_extension: [1, 1],
            passed_pawn_extension: [0, 1],
            pawn_endgame_extension: [2, 2],
            multi_pv: 1,
            threads: 1,
            min_split_depth: 4,
            max_threads_per_split_point: 5,
            use_sleeping_threads: true,
            ponder: false,
        }
    }
}

/// ドライバがイテレーション間に更新し、thread 0のポーリングが読む状態
struct PollState {
    iteration: AtomicI32,
    root_move_number: AtomicI32,
    fail_low: AtomicBool,
    problem: AtomicBool,
    prev_iteration_value: AtomicI32,
}

impl PollState {
    fn new() -> PollState {
        PollState {
            iteration: AtomicI32::new(0),
            root_move_number: AtomicI32::new(0),
            fail_low: AtomicBool::new(false),
            problem: AtomicBool::new(false),
            prev_iteration_value: AtomicI32::new(0),
        }
    }
}

/// 1回の探索の共有コンテキスト
///
/// ドライバ（thread 0）のスタック上に構築され、ワーカーには
/// split point経由で参照が渡る。
pub(crate) struct SearchContext<'a> {
    pub tt: &'a TranspositionTable,
    pub history: &'a History,
    pub signals: &'a Signals,
    pub pool: &'a ThreadPool,
    pub opts: &'a SearchOptions,
    pub tm: &'a TimeManager,
    pub limits: &'a LimitsType,
    poll: &'a PollState,
    nodes_between_polls: u64,
}

// =============================================================================
// 探索結果と途中経過
// =============================================================================

/// 探索の最終結果
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub best_move: Move,
    pub ponder_move: Move,
    pub score: Value,
    pub nodes: u64,
    pub depth: i32,
}

/// 途中経過の通知（infoコマンドの素材）
#[derive(Clone, Debug)]
pub enum InfoEvent<'a> {
    /// 新しいイテレーションの開始
    Depth { depth: i32 },
    /// スコア付きのPV
    Pv {
        depth: i32,
        sel_depth: usize,
        score: Value,
        bound: Bound,
        time_ms: i64,
        nodes: u64,
        nps: u64,
        hashfull: i32,
        pv: &'a [Move],
        multipv: Option<usize>,
    },
    /// 現在探索中のルート手
    CurrMove { mv: Move, number: usize },
    /// 探索終了時の統計
    Stats { time_ms: i64, nodes: u64, nps: u64, hashfull: i32 },
}

// =============================================================================
// タイマースレッド
// =============================================================================

enum TimerMsg {
    Arm { until: Instant, signals: Arc<Signals> },
    Disarm,
    Quit,
}

fn timer_loop(rx: Receiver<TimerMsg>) {
    let mut armed: Option<(Instant, Arc<Signals>)> = None;

    loop {
        let msg = match &armed {
            None => rx.recv().ok(),
            Some((until, signals)) => {
                let now = Instant::now();
                if now >= *until {
                    // ponder中は打ち切らず、ponderhit時に止まるよう印を付ける
                    if signals.pondering() {
                        signals.stop_on_ponderhit.store(true, Ordering::Relaxed);
                    } else {
                        signals.request_stop();
                    }
                    armed = None;
                    continue;
                }
                match rx.recv_timeout(*until - now) {
                    Ok(m) => Some(m),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => None,
                }
            }
        };

        match msg {
            Some(TimerMsg::Arm { until, signals }) => armed = Some((until, signals)),
            Some(TimerMsg::Disarm) => armed = None,
            Some(TimerMsg::Quit) | None => break,
        }
    }
}

// =============================================================================
// Search（エンジン本体）
// =============================================================================

/// 探索エンジン
///
/// 置換表・history・スレッドプールを所有し、`think`で1手を探索する。
pub struct Search {
    tt: TranspositionTable,
    history: History,
    signals: Arc<Signals>,
    pool: Arc<ThreadPool>,
    handles: super::thread::WorkerHandles,
    pub options: SearchOptions,
    timer_tx: Sender<TimerMsg>,
    timer_handle: Option<JoinHandle<()>>,
}

impl Search {
    /// 新しいエンジンを作成する
    pub fn new(hash_mb: usize) -> Search {
        crate::bitboard::init();
        tables();

        let pool = Arc::new(ThreadPool::new());
        let (timer_tx, timer_rx) = crossbeam_channel::unbounded();
        let timer_handle = std::thread::Builder::new()
            .name("search-timer".to_string())
            .spawn(move || timer_loop(timer_rx))
            .ok();

        Search {
            tt: TranspositionTable::new(hash_mb),
            history: History::new(),
            signals: Arc::new(Signals::new()),
            pool,
            handles: super::thread::WorkerHandles::none(),
            options: SearchOptions::default(),
            timer_tx,
            timer_handle,
        }
    }

    /// 停止フラグへのハンドル（コマンドスレッドが使う）
    pub fn signals(&self) -> Arc<Signals> {
        Arc::clone(&self.signals)
    }

    /// 置換表サイズを変更する
    pub fn resize_tt(&mut self, mb: usize) {
        self.tt.resize(mb);
    }

    /// 置換表と履歴を消す（ucinewgame）
    pub fn clear_tables(&mut self) {
        self.tt.clear();
        self.history.clear();
    }

    /// 探索スレッド数を変更する（探索中は呼べない）
    pub fn set_threads(&mut self, n: usize) {
        let n = n.clamp(1, super::thread::MAX_THREADS);
        if n == self.options.threads && self.handles.count() == n - 1 {
            return;
        }
        self.options.threads = n;

        self.pool.request_exit();
        self.handles.join();

        // 新しいプールを張り直す
        self.pool = Arc::new(ThreadPool::new());
        self.pool.set_active_threads(n);
        if n > 1 {
            self.handles = super::thread::WorkerHandles::spawn(&self.pool, n);
        } else {
            self.handles = super::thread::WorkerHandles::none();
        }
    }

    /// 局面を探索して最善手を返す
    pub fn think(
        &mut self,
        pos: &mut Position,
        limits: &LimitsType,
        info: &mut dyn FnMut(InfoEvent),
    ) -> SearchResult {
        let us = pos.side_to_move();

        // 停止フラグのリセットは呼び出し側の責務。探索スレッド内で
        // リセットすると、spawn直後に届いたstopを取りこぼす。
        self.tt.new_search();
        self.history.clear();
        self.pool.new_search();
        self.pool.set_active_threads(self.options.threads);
        self.pool.set_min_split_depth(self.options.min_split_depth);
        self.pool
            .set_max_threads_per_split_point(self.options.max_threads_per_split_point);
        self.pool.set_use_sleeping_threads(self.options.use_sleeping_threads);

        let tm = TimeManager::new(limits, us, self.options.ponder);

        // 絶対上限または固定時間でタイマーを仕掛ける
        let deadline = if limits.move_time > 0 {
            Some(limits.move_time)
        } else if tm.use_time_management() {
            Some(tm.absolute_max_search_time())
        } else {
            None
        };
        if let Some(ms) = deadline {
            let _ = self.timer_tx.send(TimerMsg::Arm {
                until: Instant::now() + Duration::from_millis(ms.max(1) as u64),
                signals: Arc::clone(&self.signals),
            });
        }

        let poll = PollState::new();
        let nodes_between_polls = if limits.nodes > 0 {
            limits.nodes.min(30_000)
        } else if limits.time_for(us) > 0 && limits.time_for(us) < 1000 {
            1_000
        } else if limits.time_for(us) > 0 && limits.time_for(us) < 5000 {
            5_000
        } else {
            30_000
        };

        let ctx = SearchContext {
            tt: &self.tt,
            history: &self.history,
            signals: &self.signals,
            pool: &*self.pool,
            opts: &self.options,
            tm: &tm,
            limits,
            poll: &poll,
            nodes_between_polls,
        };

        log::debug!("searching: {} threads={}", pos.to_fen(), ctx.pool.active_threads());

        let result = id_loop(&ctx, pos, info);

        let _ = self.timer_tx.send(TimerMsg::Disarm);
        result
    }

    /// ponderhit受信（予想手が指された）
    pub fn ponderhit(&self) {
        self.signals.ponderhit();
    }
}

impl Drop for Search {
    fn drop(&mut self) {
        self.pool.request_exit();
        self.handles.join();
        let _ = self.timer_tx.send(TimerMsg::Quit);
        if let Some(h) = self.timer_handle.take() {
            let _ = h.join();
        }
    }
}

// =============================================================================
// 反復深化
// =============================================================================

fn id_loop(
    ctx: &SearchContext,
    pos: &mut Position,
    info: &mut dyn FnMut(InfoEvent),
) -> SearchResult {
    let mut searcher = Searcher::new(ctx, 0);
    let mut ss = new_stack_array();
    init_ss_array(&mut ss[..]);

    let mut rml = RootMoveList::new(pos, &ctx.limits.search_moves);

    // 合法手がない: 詰みかステイルメイト
    if rml.is_empty() {
        let score = if pos.in_check() { -Value::MATE } else { Value::DRAW };
        return SearchResult {
            best_move: Move::NONE,
            ponder_move: Move::NONE,
            score,
            nodes: 0,
            depth: 0,
        };
    }

    // 各ルート手を静止探索で下拵えして並べる
    for i in 0..rml.len() {
        let m = rml.get(i).mv;
        pos.do_move(m);
        let score = -searcher.qsearch(pos, &mut ss[..], -Value::INFINITE, Value::INFINITE, 0, 1);
        pos.undo_move(m);
        rml.get_mut(i).score = score;
    }
    rml.sort();

    let mut value_by_iteration = [Value::ZERO; PLY_MAX_PLUS_2];
    let mut best_move_changes = [0i64; PLY_MAX_PLUS_2];
    value_by_iteration[1] = rml.get(0).score;
    ctx.poll.prev_iteration_value.store(rml.get(0).score.raw(), Ordering::Relaxed);

    info(InfoEvent::Pv {
        depth: 1,
        sel_depth: ctx.pool.max_ply(),
        score: rml.get(0).score,
        bound: Bound::Exact,
        time_ms: ctx.tm.elapsed(),
        nodes: ctx.pool.nodes_searched(),
        nps: nps(ctx),
        hashfull: ctx.tt.hashfull(),
        pv: &rml.get(0).pv,
        multipv: None,
    });

    // 初期スコアの時点で1手だけ飛び抜けていればeasy move候補
    let mut easy_move = Move::NONE;
    if rml.len() == 1 || rml.get(0).score > rml.get(1).score + EASY_MOVE_MARGIN {
        easy_move = rml.get(0).mv;
    }

    let root_is_draw = pos.is_draw();
    let mut iteration = 1i32;
    let mut aspiration_delta = Value::ZERO;

    while iteration < PLY_MAX {
        rml.sort();
        iteration += 1;
        ctx.poll.iteration.store(iteration, Ordering::Relaxed);
        best_move_changes[iteration as usize] = 0;

        info(InfoEvent::Depth { depth: iteration });

        // aspiration window
        let (mut alpha, beta);
        if ctx.opts.multi_pv == 1
            && iteration >= 6
            && value_by_iteration[(iteration - 1) as usize].abs() < Value::KNOWN_WIN
        {
            let prev1 = value_by_iteration[(iteration - 1) as usize].raw()
                - value_by_iteration[(iteration - 2) as usize].raw();
            let prev2 = value_by_iteration[(iteration - 2) as usize].raw()
                - value_by_iteration[(iteration - 3) as usize].raw();

            let mut delta = (prev1.abs() + prev2.abs() / 2).max(16);
            delta = (delta + 7) / 8 * 8;
            aspiration_delta = Value::new(delta);

            let center = value_by_iteration[(iteration - 1) as usize];
            alpha = (center - aspiration_delta).max(-Value::INFINITE);
            beta = (center + aspiration_delta).min(Value::INFINITE);
        } else {
            alpha = -Value::INFINITE;
            beta = Value::INFINITE;
        }

        ctx.poll.prev_iteration_value
            .store(value_by_iteration[(iteration - 1) as usize].raw(), Ordering::Relaxed);

        let value = root_search(
            ctx,
            &mut searcher,
            pos,
            &mut ss,
            &mut rml,
            &mut alpha,
            beta,
            iteration,
            aspiration_delta,
            &mut best_move_changes[..],
            info,
        );

        // PVが上書きされていた場合に備えて書き戻す
        let pv: Vec<Move> = rml.get(0).pv.clone();
        ctx.tt.insert_pv(pos, &pv);

        if ctx.signals.stop_requested() {
            break;
        }

        value_by_iteration[iteration as usize] = value;

        // 新しい最善手がeasy move候補と違えば候補を破棄する
        if rml.get(0).mv != easy_move {
            easy_move = Move::NONE;
        }

        ctx.poll.problem.store(false, Ordering::Relaxed);

        if ctx.tm.use_time_management() {
            let mut stop_search = false;

            // 合法手が1つだけならイテレーション6以降で打ち切る
            if iteration >= 6 && rml.len() == 1 {
                stop_search = true;
            }

            // 2回連続で詰みスコアなら打ち切る
            if iteration >= 6
                && value_by_iteration[iteration as usize].abs()
                    >= Value::MATE.abs() - 100
                && value_by_iteration[(iteration - 1) as usize].abs()
                    >= Value::MATE.abs() - 100
            {
                stop_search = true;
            }

            // easy move: ノードが1手に集中していれば早めに指す
            let nodes = ctx.pool.nodes_searched();
            if iteration >= 8
                && easy_move == rml.get(0).mv
                && ((rml.get(0).cumulative_nodes > nodes * 85 / 100
                    && ctx.tm.elapsed() > ctx.tm.max_search_time() / 16)
                    || (rml.get(0).cumulative_nodes > nodes * 98 / 100
                        && ctx.tm.elapsed() > ctx.tm.max_search_time() / 32))
            {
                stop_search = true;
            }

            // 最善手が揺れていたら追加時間を与える
            if (6..=50).contains(&iteration) {
                let extra = best_move_changes[iteration as usize]
                    * (ctx.tm.max_search_time() / 2)
                    + best_move_changes[(iteration - 1) as usize]
                        * (ctx.tm.max_search_time() / 3);
                ctx.tm.set_extra_search_time(extra);
            }

            // 残り時間では次のイテレーションを回しきれない
            if ctx.tm.elapsed()
                > (ctx.tm.max_search_time() + ctx.tm.extra_search_time()) * 80 / 128
            {
                stop_search = true;
            }

            if stop_search {
                if !ctx.signals.pondering() {
                    break;
                }
                ctx.signals.stop_on_ponderhit.store(true, Ordering::Relaxed);
            }
        }

        if ctx.limits.depth > 0 && iteration >= ctx.limits.depth {
            break;
        }
    }
    rml.sort();

    info(InfoEvent::Stats {
        time_ms: ctx.tm.elapsed(),
        nodes: ctx.pool.nodes_searched(),
        nps: nps(ctx),
        hashfull: ctx.tt.hashfull(),
    });

    let best = rml.get(0);
    let ponder_move = if best.pv.len() > 1 { best.pv[1] } else { Move::NONE };

    // ルート局面自体が規則上の引き分けならスコアは0
    let score = if root_is_draw { Value::DRAW } else { best.score };

    SearchResult {
        best_move: best.mv,
        ponder_move,
        score,
        nodes: ctx.pool.nodes_searched(),
        depth: iteration.min(PLY_MAX),
    }
}

#[inline]
fn nps(ctx: &SearchContext) -> u64 {
    let t = ctx.tm.elapsed();
    if t > 0 {
        ctx.pool.nodes_searched() * 1000 / t as u64
    } else {
        0
    }
}

// =============================================================================
// ルート探索
// =============================================================================

#[allow(clippy::too_many_arguments)]
fn root_search(
    ctx: &SearchContext,
    searcher: &mut Searcher,
    pos: &mut Position,
    ss: &mut StackArray,
    rml: &mut RootMoveList,
    alpha: &mut Value,
    mut beta: Value,
    iteration: i32,
    aspiration_delta: Value,
    best_move_changes: &mut [i64],
    info: &mut dyn FnMut(InfoEvent),
) -> Value {
    let mut research_count = 0;
    let mut old_alpha = *alpha;
    let multi_pv = ctx.opts.multi_pv;
    let is_check = pos.in_check();

    let mut ei = EvalInfo::default();
    ss[0].eval = if is_check { Value::NONE } else { evaluate(pos, &mut ei) };

    // fail low loop
    loop {
        let mut i = 0;
        while i < rml.len() && !ctx.signals.stop_requested() {
            if *alpha >= beta {
                // fail high: 残りの手は次の再探索に回す
                rml.get_mut(i).score = -Value::INFINITE;
                i += 1;
                continue;
            }

            ctx.poll.root_move_number.store(i as i32 + 1, Ordering::Relaxed);
            let nodes_before = ctx.pool.nodes_searched();
            let m = rml.get(i).mv;
            ss[0].current_move = m;

            if ctx.tm.elapsed() >= 1000 {
                info(InfoEvent::CurrMove { mv: m, number: i + 1 });
            }

            let move_is_check = pos.gives_check(m);
            let capture_or_promotion = pos.move_is_capture_or_promotion(m);
            let depth = (iteration - 2) * ONE_PLY + INITIAL_DEPTH;
            let (ext, dangerous) =
                searcher.extension(pos, m, true, capture_or_promotion, move_is_check, false, false);
            let new_depth = depth + ext;

            let mut value = -Value::INFINITE;

            // fail high loop
            loop {
                pos.do_move(m);

                if i < multi_pv || value > *alpha {
                    // 上位スロットは全幅で探索する
                    if multi_pv > 1 {
                        *alpha = -Value::INFINITE;
                    }
                    value =
                        -searcher.search_pv(pos, &mut ss[..], -beta, -*alpha, new_depth, 1);

                    // スコアが大幅に落ちていたら時間を使い切るまで粘る
                    let problem = iteration >= 2
                        && value.raw()
                            <= ctx.poll.prev_iteration_value.load(Ordering::Relaxed)
                                - PROBLEM_MARGIN.raw();
                    ctx.poll.problem.store(problem, Ordering::Relaxed);
                    if problem {
                        // 粘っている間はponderhitで即終了しない
                        ctx.signals.stop_on_ponderhit.store(false, Ordering::Relaxed);
                    }
                } else {
                    // 残りはLMR付きのzero windowで済ませる
                    let mut do_full_depth = true;
                    if depth >= 3 * ONE_PLY
                        && !dangerous
                        && !capture_or_promotion
                        && !m.is_castle()
                    {
                        let red = pv_reduction(depth, (i as i32 + 2 - multi_pv as i32).max(1));
                        if red > 0 {
                            ss[0].reduction = red;
                            value = -searcher.search_nonpv(
                                pos,
                                &mut ss[..],
                                -*alpha,
                                new_depth - red,
                                1,
                                true,
                                Move::NONE,
                            );
                            do_full_depth = value > *alpha;
                        }
                    }

                    if do_full_depth {
                        ss[0].reduction = 0;
                        value = -searcher.search_nonpv(
                            pos,
                            &mut ss[..],
                            -*alpha,
                            new_depth,
                            1,
                            true,
                            Move::NONE,
                        );
                        if value > *alpha {
                            value =
                                -searcher.search_pv(pos, &mut ss[..], -beta, -*alpha, new_depth, 1);
                        }
                    }
                }

                pos.undo_move(m);

                if ctx.signals.stop_requested() || value < beta {
                    break;
                }

                // fail high: スコアを反映してから窓を広げて再探索
                rml.get_mut(i).score = value;
                update_pv(&mut ss[..], 0);
                set_root_pv(ctx, pos, rml, i, &ss[..]);

                emit_pv(ctx, info, iteration, value, beta, *alpha, &rml.get(i).pv, None);

                research_count += 1;
                beta = (beta + aspiration_delta * (1 << research_count)).min(Value::INFINITE);
            }

            if ctx.signals.stop_requested() {
                break;
            }

            // 並べ替え用の統計を記録する
            let (our, their) = ctx.pool.read_beta_counters(pos.side_to_move());
            {
                let rm = rml.get_mut(i);
                rm.our_beta = our;
                rm.their_beta = their;
                let searched = ctx.pool.nodes_searched() - nodes_before;
                rm.nodes = searched;
                rm.cumulative_nodes += searched;
            }

            if value <= *alpha && i >= multi_pv {
                rml.get_mut(i).score = -Value::INFINITE;
            } else {
                rml.get_mut(i).score = value;
                update_pv(&mut ss[..], 0);
                set_root_pv(ctx, pos, rml, i, &ss[..]);

                if multi_pv == 1 {
                    if i > 0 {
                        best_move_changes[iteration as usize] += 1;
                    }
                    emit_pv(ctx, info, iteration, value, beta, *alpha, &rml.get(i).pv, None);

                    if value > *alpha {
                        *alpha = value;
                    }
                    if value.raw()
                        > ctx.poll.prev_iteration_value.load(Ordering::Relaxed)
                            - NO_PROBLEM_MARGIN.raw()
                    {
                        ctx.poll.problem.store(false, Ordering::Relaxed);
                    }
                } else {
                    rml.sort_multipv(i);
                    for j in 0..multi_pv.min(rml.len()) {
                        let depth_j = if j <= i { iteration } else { iteration - 1 };
                        emit_pv(
                            ctx,
                            info,
                            depth_j,
                            rml.get(j).score,
                            beta,
                            *alpha,
                            &rml.get(j).pv,
                            Some(j + 1),
                        );
                    }
                    *alpha = rml.get(i.min(multi_pv - 1)).score;
                }
            }

            ctx.poll.fail_low.store(*alpha == old_alpha, Ordering::Relaxed);
            i += 1;
        }

        if ctx.signals.stop_requested() || *alpha > old_alpha {
            break;
        }

        // fail low: 窓を下に広げて同じイテレーションをやり直す
        research_count += 1;
        *alpha = (*alpha - aspiration_delta * (1 << research_count)).max(-Value::INFINITE);
        old_alpha = *alpha;
    }

    *alpha
}

/// ルート手のPVを探索スタックと置換表から組み立てる
fn set_root_pv(
    ctx: &SearchContext,
    pos: &mut Position,
    rml: &mut RootMoveList,
    i: usize,
    ss: &[SearchStack],
) {
    let mut pv = Vec::new();
    let mut p = 0;
    while ss[0].pv[p].is_some() {
        pv.push(ss[0].pv[p]);
        p += 1;
    }

    // スタックのPVを適用してから置換表で延長する
    let made = pv.clone();
    for &m in &made {
        pos.do_move(m);
    }
    ctx.tt.extract_pv(pos, &mut pv, PLY_MAX as usize);
    for &m in made.iter().rev() {
        pos.undo_move(m);
    }

    rml.get_mut(i).pv = pv;
}

#[allow(clippy::too_many_arguments)]
fn emit_pv(
    ctx: &SearchContext,
    info: &mut dyn FnMut(InfoEvent),
    depth: i32,
    value: Value,
    beta: Value,
    alpha: Value,
    pv: &[Move],
    multipv: Option<usize>,
) {
    let bound = if value >= beta {
        Bound::Lower
    } else if value <= alpha {
        Bound::Upper
    } else {
        Bound::Exact
    };

    info(InfoEvent::Pv {
        depth,
        sel_depth: ctx.pool.max_ply(),
        score: value,
        bound,
        time_ms: ctx.tm.elapsed(),
        nodes: ctx.pool.nodes_searched(),
        nps: nps(ctx),
        hashfull: ctx.tt.hashfull(),
        pv,
        multipv,
    });
}

// =============================================================================
// Searcher（スレッドごとの再帰状態）
// =============================================================================

pub(crate) struct Searcher<'c, 'a> {
    ctx: &'c SearchContext<'a>,
    tid: usize,
    nodes_since_poll: u64,
}

impl<'c, 'a> Searcher<'c, 'a> {
    pub(crate) fn new(ctx: &'c SearchContext<'a>, tid: usize) -> Searcher<'c, 'a> {
        Searcher { ctx, tid, nodes_since_poll: 0 }
    }

    /// ノード到達時の共通処理
    fn init_node(&mut self, ss: &mut [SearchStack], ply: i32) {
        let threads = &self.ctx.pool.threads[self.tid];
        threads.nodes.fetch_add(1, Ordering::Relaxed);
        if threads.max_ply.load(Ordering::Relaxed) < ply as usize {
            threads.max_ply.store(ply as usize, Ordering::Relaxed);
        }

        if self.tid == 0 {
            self.nodes_since_poll += 1;
            if self.nodes_since_poll >= self.ctx.nodes_between_polls {
                self.nodes_since_poll = 0;
                self.poll();
            }
        }

        let p = ply as usize;
        ss[p].init(p);
        ss[p + 2].init_killers();
    }

    /// 時間・ノード制限の確認（thread 0のみ）
    fn poll(&self) {
        let ctx = self.ctx;
        let t = ctx.tm.elapsed();

        // ノード制限はponder中でも有効
        if ctx.limits.nodes > 0 && ctx.pool.nodes_searched() >= ctx.limits.nodes {
            ctx.signals.request_stop();
            return;
        }

        if ctx.signals.pondering() {
            return;
        }

        let iteration = ctx.poll.iteration.load(Ordering::Relaxed);
        let still_at_first_move = ctx.poll.root_move_number.load(Ordering::Relaxed) == 1
            && !ctx.poll.fail_low.load(Ordering::Relaxed)
            && t > ctx.tm.max_search_time() + ctx.tm.extra_search_time();
        let no_more_time = ctx.tm.over_absolute() || still_at_first_move;

        if (iteration >= 3 && ctx.tm.use_time_management() && no_more_time)
            || (ctx.limits.move_time > 0 && t >= ctx.limits.move_time)
        {
            ctx.signals.request_stop();
        }
    }

    /// 探索を打ち切るべきか
    #[inline]
    fn should_stop(&self) -> bool {
        self.ctx.signals.stop_requested() || self.ctx.pool.cutoff_occurred(self.tid)
    }

    // =========================================================================
    // PVノードの探索
    // =========================================================================

    pub(crate) fn search_pv(
        &mut self,
        pos: &mut Position,
        ss: &mut [SearchStack],
        mut alpha: Value,
        mut beta: Value,
        depth: Depth,
        ply: i32,
    ) -> Value {
        debug_assert!(alpha < beta);

        if depth < ONE_PLY {
            return self.qsearch(pos, ss, alpha, beta, 0, ply);
        }

        self.init_node(ss, ply);
        if self.should_stop() {
            return Value::ZERO;
        }
        if pos.is_draw() || ply >= PLY_MAX - 1 {
            return Value::DRAW;
        }

        // mate distance pruning
        let old_alpha = alpha;
        alpha = alpha.max(Value::mated_in(ply));
        beta = beta.min(Value::mate_in(ply + 1));
        if alpha >= beta {
            return alpha;
        }

        // PVノードでは置換表を並べ替えにだけ使う
        let mut tte = self.ctx.tt.probe(pos.key());
        let mut tt_move = tte.map_or(Move::NONE, |d| d.mv);

        // TT手がなければ浅い探索で並べ替え用の手を得る
        if depth >= 5 * ONE_PLY && tt_move.is_none() {
            self.search_pv(pos, ss, alpha, beta, depth - 2 * ONE_PLY, ply);
            tt_move = ss[ply as usize].pv[ply as usize];
            tte = self.ctx.tt.probe(pos.key());
        }

        let is_check = pos.in_check();
        if !is_check {
            let mut ei = EvalInfo::default();
            let eval = evaluate(pos, &mut ei);
            ss[ply as usize].eval = eval;
            let prev = ss[(ply - 1) as usize];
            if prev.current_move.is_some() {
                self.ctx.history.update_gain(
                    pos.piece_on(prev.current_move.to()),
                    prev.current_move,
                    pos.captured_piece(),
                    prev.eval,
                    eval,
                );
            }
        }

        let pinned = pos.pinned_pieces(pos.side_to_move());
        let mate_threat = false;
        let mut mp = MovePicker::new_main(pos, tt_move, depth, &ss[ply as usize]);
        let mut moves_searched = [Move::NONE; 256];
        let mut move_count = 0usize;
        let mut best_value = -Value::INFINITE;
        let mut split_done = false;

        while alpha < beta && !self.should_stop() {
            let Some(m) = mp.next(pos, self.ctx.history) else { break };
            if !pos.is_legal(m, pinned) {
                continue;
            }

            let single_evasion = is_check && mp.number_of_evasions() == 1;
            let move_is_check = pos.gives_check(m);
            let capture_or_promotion = pos.move_is_capture_or_promotion(m);

            let (mut ext, dangerous) = self.extension(
                pos,
                m,
                true,
                capture_or_promotion,
                move_is_check,
                single_evasion,
                mate_threat,
            );

            // singular extension: TT手が兄弟手より明確に良ければ延長
            if let Some(d) = tte {
                if depth >= 6 * ONE_PLY
                    && ext < ONE_PLY
                    && d.mv == m
                    && d.bound.is_lower()
                    && d.depth >= depth - 3 * ONE_PLY
                {
                    let tt_value = value_from_tt(d.value, ply);
                    if tt_value.abs() < Value::KNOWN_WIN {
                        let excluded_beta = tt_value - SINGLE_REPLY_MARGIN;
                        let exc_value =
                            self.search_nonpv(pos, ss, excluded_beta, depth / 2, ply, false, m);
                        if exc_value < excluded_beta {
                            ext = ONE_PLY;
                        }
                    }
                }
            }

            let new_depth = depth - ONE_PLY + ext;
            moves_searched[move_count.min(255)] = m;
            move_count += 1;
            ss[ply as usize].current_move = m;

            pos.do_move(m);

            let value = if move_count == 1 {
                -self.search_pv(pos, ss, -beta, -alpha, new_depth, ply + 1)
            } else {
                let mut value = Value::ZERO;
                let mut do_full_depth = true;

                if depth >= 3 * ONE_PLY
                    && !dangerous
                    && !capture_or_promotion
                    && !m.is_castle()
                    && !is_killer(m, &ss[ply as usize])
                {
                    let red = pv_reduction(depth, move_count as i32);
                    if red > 0 {
                        ss[ply as usize].reduction = red;
                        value = -self.search_nonpv(
                            pos,
                            ss,
                            -alpha,
                            new_depth - red,
                            ply + 1,
                            true,
                            Move::NONE,
                        );
                        do_full_depth = value > alpha;
                    }
                }

                if do_full_depth {
                    ss[ply as usize].reduction = 0;
                    value =
                        -self.search_nonpv(pos, ss, -alpha, new_depth, ply + 1, true, Move::NONE);
                    if value > alpha && value < beta {
                        value = -self.search_pv(pos, ss, -beta, -alpha, new_depth, ply + 1);
                    }
                }
                value
            };

            pos.undo_move(m);

            if value > best_value {
                best_value = value;
                if value > alpha {
                    alpha = value;
                    update_pv(ss, ply as usize);
                    if value == Value::mate_in(ply + 1) {
                        ss[ply as usize].mate_killer = m;
                    }
                }
            }

            // split: 兄弟手を空いているスレッドに配る
            if self.ctx.pool.active_threads() > 1
                && best_value < beta
                && depth >= self.ctx.pool.min_split_depth()
                && self.ctx.poll.iteration.load(Ordering::Relaxed) <= 99
                && !self.should_stop()
                && self.ctx.pool.idle_thread_exists(self.tid)
                && split(
                    self.ctx,
                    self.tid,
                    pos,
                    ss,
                    ply,
                    &mut alpha,
                    beta,
                    &mut best_value,
                    Value::NONE,
                    depth,
                    &mut move_count,
                    &mut mp,
                    true,
                )
            {
                split_done = true;
                break;
            }
        }

        if move_count == 0 && !split_done {
            return if is_check { Value::mated_in(ply) } else { Value::DRAW };
        }

        if self.should_stop() {
            return best_value;
        }

        // 置換表・killer・historyの更新
        if best_value <= old_alpha {
            self.ctx.tt.store(
                pos.key(),
                value_to_tt(best_value, ply),
                Bound::Upper,
                depth,
                Move::NONE,
            );
        } else if best_value >= beta {
            let us = pos.side_to_move();
            self.ctx.pool.threads[self.tid].beta_cutoffs[us.index()]
                .fetch_add(depth.max(1) as u64, Ordering::Relaxed);
            let m = ss[ply as usize].pv[ply as usize];
            if !pos.move_is_capture_or_promotion(m) {
                self.update_history(pos, m, depth, &moves_searched[..move_count.min(256)]);
                update_killers(m, &mut ss[ply as usize]);
            }
            self.ctx.tt.store(pos.key(), value_to_tt(best_value, ply), Bound::Lower, depth, m);
        } else {
            self.ctx.tt.store(
                pos.key(),
                value_to_tt(best_value, ply),
                Bound::Exact,
                depth,
                ss[ply as usize].pv[ply as usize],
            );
        }

        best_value
    }

    // =========================================================================
    // zero windowノードの探索
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search_nonpv(
        &mut self,
        pos: &mut Position,
        ss: &mut [SearchStack],
        beta: Value,
        depth: Depth,
        ply: i32,
        allow_nullmove: bool,
        excluded: Move,
    ) -> Value {
        if depth < ONE_PLY {
            return self.qsearch(pos, ss, beta - 1, beta, 0, ply);
        }

        self.init_node(ss, ply);
        if self.should_stop() {
            return Value::ZERO;
        }
        if pos.is_draw() || ply >= PLY_MAX - 1 {
            return Value::DRAW;
        }

        // mate distance pruning
        if Value::mated_in(ply) >= beta {
            return beta;
        }
        if Value::mate_in(ply + 1) < beta {
            return beta - 1;
        }

        // 部分探索の結果が完全探索の値を潰さないよう、除外手があれば別キー
        let pos_key = if excluded.is_some() { pos.exclusion_key() } else { pos.key() };

        let mut tte = self.ctx.tt.probe(pos_key);
        let mut tt_move = tte.map_or(Move::NONE, |d| d.mv);

        if let Some(data) = tte {
            if ok_to_use_tt(&data, depth, beta, ply) {
                ss[ply as usize].current_move = data.mv;
                return value_from_tt(data.value, ply);
            }
        }

        let is_check = pos.in_check();
        let fmc_margin = futility_move_count_margin(depth);

        // 静的評価（置換表のキャッシュがあれば使う）
        let mut static_value = -Value::INFINITE;
        let mut futility_value = -Value::INFINITE;
        if !is_check {
            static_value = match tte {
                Some(d) if d.bound.is_eval() => value_from_tt(d.value, ply),
                _ => {
                    let mut ei = EvalInfo::default();
                    evaluate(pos, &mut ei)
                }
            };

            ss[ply as usize].eval = static_value;
            futility_value = static_value + futility_margin(depth);
            static_value = refine_eval(tte, static_value, ply);
            let prev = ss[(ply - 1) as usize];
            if prev.current_move.is_some() {
                self.ctx.history.update_gain(
                    pos.piece_on(prev.current_move.to()),
                    prev.current_move,
                    pos.captured_piece(),
                    prev.eval,
                    ss[ply as usize].eval,
                );
            }
        }

        let mut mate_threat = false;

        // static null move pruning: 評価値がマージン分を引いてもbeta以上
        if !is_check
            && allow_nullmove
            && depth < RAZOR_DEPTH
            && static_value - futility_margin(depth) >= beta
        {
            return static_value - futility_margin(depth);
        }

        // null move search
        if allow_nullmove
            && depth > ONE_PLY
            && !is_check
            && !value_is_mate(beta)
            && pos.non_pawn_material(pos.side_to_move()) != Value::ZERO
            && static_value >= beta - NULL_MOVE_MARGIN
        {
            ss[ply as usize].current_move = Move::NULL;

            pos.do_null_move();

            // 深さと評価値で削減量を調整する
            let mut r = 3 + if depth >= 5 * ONE_PLY { depth / 8 } else { 0 };
            if static_value - beta > PAWN_VALUE_MIDGAME {
                r += 1;
            }

            let null_value = -self.search_nonpv(
                pos,
                ss,
                -(beta - 1),
                depth - r * ONE_PLY,
                ply + 1,
                false,
                Move::NONE,
            );

            pos.undo_null_move();

            if null_value >= beta {
                if depth < 6 * ONE_PLY {
                    return beta;
                }
                // zugzwang検証探索
                let v =
                    self.search_nonpv(pos, ss, beta, depth - 5 * ONE_PLY, ply, false, Move::NONE);
                if v >= beta {
                    return beta;
                }
            } else {
                // ヌルムーブが反証された。反証手との関連を見て、
                // 削減された親の手を full depth で再探索させる
                if null_value == Value::mated_in(ply + 2) {
                    mate_threat = true;
                }

                ss[ply as usize].threat_move = ss[(ply + 1) as usize].current_move;
                if depth < THREAT_DEPTH
                    && ss[(ply - 1) as usize].reduction > 0
                    && connected_moves(
                        pos,
                        ss[(ply - 1) as usize].current_move,
                        ss[ply as usize].threat_move,
                    )
                {
                    return beta - 1;
                }
            }
        } else if !value_is_mate(beta)
            && !is_check
            && depth < RAZOR_DEPTH
            && static_value < beta - (NULL_MOVE_MARGIN + Value::new(16 * depth))
            && ss[(ply - 1) as usize].current_move != Move::NULL
            && tt_move.is_none()
            && !pos.has_pawn_on_7th(pos.side_to_move())
        {
            // razoring: 評価値がbetaを大きく割っていれば静止探索に落とす
            let rbeta = beta - (NULL_MOVE_MARGIN + Value::new(16 * depth));
            let v = self.qsearch(pos, ss, rbeta - 1, rbeta, 0, ply);
            if v < rbeta {
                return v;
            }
        }

        // internal iterative deepening
        if tt_move.is_none()
            && depth >= 8 * ONE_PLY
            && !is_check
            && ss[ply as usize].eval >= beta - IID_MARGIN
        {
            self.search_nonpv(
                pos,
                ss,
                beta,
                (depth / 2).min(depth - 2 * ONE_PLY),
                ply,
                false,
                Move::NONE,
            );
            tt_move = ss[ply as usize].pv[ply as usize];
            tte = self.ctx.tt.probe(pos.key());
        }

        let pinned = pos.pinned_pieces(pos.side_to_move());
        let mut mp = MovePicker::new_main(pos, tt_move, depth, &ss[ply as usize]);
        let mut moves_searched = [Move::NONE; 256];
        let mut move_count = 0usize;
        let mut best_value = -Value::INFINITE;
        let mut split_done = false;

        while best_value < beta && !self.should_stop() {
            let Some(m) = mp.next(pos, self.ctx.history) else { break };
            if m == excluded || !pos.is_legal(m, pinned) {
                continue;
            }

            let move_is_check = pos.gives_check(m);
            let single_evasion = is_check && mp.number_of_evasions() == 1;
            let capture_or_promotion = pos.move_is_capture_or_promotion(m);

            let (mut ext, dangerous) = self.extension(
                pos,
                m,
                false,
                capture_or_promotion,
                move_is_check,
                single_evasion,
                mate_threat,
            );

            // singular extension
            if let Some(d) = tte {
                if depth >= 8 * ONE_PLY
                    && ext < ONE_PLY
                    && excluded.is_none()
                    && d.mv == m
                    && d.bound.is_lower()
                    && d.depth >= depth - 3 * ONE_PLY
                {
                    let tt_value = value_from_tt(d.value, ply);
                    if tt_value.abs() < Value::KNOWN_WIN {
                        let excluded_beta = tt_value - SINGLE_REPLY_MARGIN;
                        let exc_value =
                            self.search_nonpv(pos, ss, excluded_beta, depth / 2, ply, false, m);
                        if exc_value < excluded_beta {
                            ext = ONE_PLY;
                        }
                    }
                }
            }

            let new_depth = depth - ONE_PLY + ext;
            moves_searched[move_count.min(255)] = m;
            move_count += 1;
            ss[ply as usize].current_move = m;

            // futility pruning
            if !is_check
                && !dangerous
                && !capture_or_promotion
                && !m.is_castle()
                && m != tt_move
            {
                // 手数による枝刈り
                if move_count as i32 >= fmc_margin
                    && ok_to_prune(pos, m, ss[ply as usize].threat_move)
                    && best_value > Value::mated_in(PLY_MAX)
                {
                    continue;
                }

                // 評価値による枝刈り
                let mut predicted_depth = new_depth;
                let red = nonpv_reduction(depth, move_count as i32);
                if red > 0 {
                    ss[ply as usize].reduction = red;
                    predicted_depth -= red;
                }

                if predicted_depth < SELECTIVE_DEPTH {
                    let mut margin = 0;
                    if predicted_depth >= ONE_PLY {
                        margin = futility_margin(predicted_depth).raw();
                    }
                    margin +=
                        self.ctx.history.gain(pos.piece_on(m.from()), m.to()).raw() + 45;

                    let futility_value_scaled = ss[ply as usize].eval
                        + Value::new(margin)
                        - Value::new(move_count as i32 * INCREMENTAL_FUTILITY_MARGIN);

                    if futility_value_scaled < beta {
                        if futility_value_scaled > best_value {
                            best_value = futility_value_scaled;
                        }
                        continue;
                    }
                }
            }

            pos.do_move(m);

            let mut do_full_depth = true;
            let mut value = Value::ZERO;

            if depth >= 3 * ONE_PLY
                && !dangerous
                && !capture_or_promotion
                && !m.is_castle()
                && !is_killer(m, &ss[ply as usize])
            {
                let red = nonpv_reduction(depth, move_count as i32);
                if red > 0 {
                    ss[ply as usize].reduction = red;
                    value = -self.search_nonpv(
                        pos,
                        ss,
                        -(beta - 1),
                        new_depth - red,
                        ply + 1,
                        true,
                        Move::NONE,
                    );
                    do_full_depth = value >= beta;
                }
            }

            if do_full_depth {
                ss[ply as usize].reduction = 0;
                value =
                    -self.search_nonpv(pos, ss, -(beta - 1), new_depth, ply + 1, true, Move::NONE);
            }

            pos.undo_move(m);

            if value > best_value {
                best_value = value;
                if value >= beta {
                    update_pv(ss, ply as usize);
                }
                if value == Value::mate_in(ply + 1) {
                    ss[ply as usize].mate_killer = m;
                }
            }

            // split
            if self.ctx.pool.active_threads() > 1
                && best_value < beta
                && depth >= self.ctx.pool.min_split_depth()
                && self.ctx.poll.iteration.load(Ordering::Relaxed) <= 99
                && !self.should_stop()
                && self.ctx.pool.idle_thread_exists(self.tid)
                && {
                    let mut sp_alpha = beta - 1;
                    split(
                        self.ctx,
                        self.tid,
                        pos,
                        ss,
                        ply,
                        &mut sp_alpha,
                        beta,
                        &mut best_value,
                        futility_value,
                        depth,
                        &mut move_count,
                        &mut mp,
                        false,
                    )
                }
            {
                split_done = true;
                break;
            }
        }

        if move_count == 0 && !split_done {
            return if excluded.is_some() {
                beta - 1
            } else if is_check {
                Value::mated_in(ply)
            } else {
                Value::DRAW
            };
        }

        if self.should_stop() {
            return best_value;
        }

        if best_value < beta {
            self.ctx.tt.store(pos_key, value_to_tt(best_value, ply), Bound::Upper, depth, Move::NONE);
        } else {
            let us = pos.side_to_move();
            self.ctx.pool.threads[self.tid].beta_cutoffs[us.index()]
                .fetch_add(depth.max(1) as u64, Ordering::Relaxed);
            let m = ss[ply as usize].pv[ply as usize];
            self.ctx.tt.store(pos_key, value_to_tt(best_value, ply), Bound::Lower, depth, m);
            if !pos.move_is_capture_or_promotion(m) {
                self.update_history(pos, m, depth, &moves_searched[..move_count.min(256)]);
                update_killers(m, &mut ss[ply as usize]);
            }
        }

        best_value
    }

    // =========================================================================
    // 静止探索
    // =========================================================================

    pub(crate) fn qsearch(
        &mut self,
        pos: &mut Position,
        ss: &mut [SearchStack],
        mut alpha: Value,
        beta: Value,
        depth: Depth,
        ply: i32,
    ) -> Value {
        debug_assert!(depth <= 0);

        self.init_node(ss, ply);
        if self.should_stop() {
            return Value::ZERO;
        }
        if pos.is_draw() || ply >= PLY_MAX - 1 {
            return Value::DRAW;
        }

        let pv_node = beta - alpha != Value::new(1);
        let old_alpha = alpha;

        let tte = self.ctx.tt.probe(pos.key());
        let tt_move = tte.map_or(Move::NONE, |d| d.mv);

        if !pv_node {
            if let Some(data) = tte {
                if ok_to_use_tt(&data, depth, beta, ply) {
                    ss[ply as usize].current_move = data.mv;
                    return value_from_tt(data.value, ply);
                }
            }
        }

        let is_check = pos.in_check();
        let mut ei = EvalInfo::default();

        // stand pat
        let static_value = if is_check {
            -Value::INFINITE
        } else {
            match tte {
                Some(d) if d.bound.is_eval() => value_from_tt(d.value, ply),
                _ => evaluate(pos, &mut ei),
            }
        };

        if !is_check {
            ss[ply as usize].eval = static_value;
            let prev = ss[(ply - 1) as usize];
            if prev.current_move.is_some() {
                self.ctx.history.update_gain(
                    pos.piece_on(prev.current_move.to()),
                    prev.current_move,
                    pos.captured_piece(),
                    prev.eval,
                    static_value,
                );
            }
        }

        let mut best_value = static_value;
        if best_value >= beta {
            // 次回の評価関数呼び出しを省くため、静的評価を下界として残す
            if !is_check && tte.is_none() {
                self.ctx.tt.store(
                    pos.key(),
                    value_to_tt(best_value, ply),
                    Bound::EvalLower,
                    crate::types::DEPTH_EVAL_ENTRY,
                    Move::NONE,
                );
            }
            return best_value;
        }

        if best_value > alpha {
            alpha = best_value;
        }

        // beta近傍ではもう1段だけ王手を読む
        let deep_checks =
            depth == -ONE_PLY && static_value >= beta - PAWN_VALUE_MIDGAME / 8;
        let with_checks = depth == 0 || deep_checks;

        let pinned = pos.pinned_pieces(pos.side_to_move());
        let mut mp = MovePicker::new_qsearch(pos, tt_move, with_checks);
        let enough_material =
            pos.non_pawn_material(pos.side_to_move()) > crate::types::ROOK_VALUE_MIDGAME;
        let futility_base = static_value + FUTILITY_MARGIN_QS
            + ei.futility_margin[pos.side_to_move().index()];
        let mut move_count = 0;

        while alpha < beta {
            let Some(m) = mp.next(pos, self.ctx.history) else { break };
            if !pos.is_legal(m, pinned) {
                continue;
            }

            let move_is_check = pos.gives_check(m);
            move_count += 1;
            ss[ply as usize].current_move = m;

            // futility pruning
            if enough_material
                && !is_check
                && !pv_node
                && !move_is_check
                && m != tt_move
                && !m.is_promotion()
                && !pos.move_is_passed_pawn_push(m)
            {
                let futility_value = futility_base
                    + crate::types::piece_value_endgame(pos.piece_on(m.to()))
                    + if m.is_en_passant() { PAWN_VALUE_ENDGAME } else { Value::ZERO };

                if futility_value < alpha {
                    if futility_value > best_value {
                        best_value = futility_value;
                    }
                    continue;
                }
            }

            // 王手回避でも負けが確定していない受けは枝刈り候補
            let evasion_prunable = is_check
                && best_value > Value::mated_in(PLY_MAX)
                && !pos.move_is_capture(m)
                && pos.piece_on(m.from()).piece_type() != PieceType::King
                && !pos.can_castle(pos.side_to_move());

            // SEEが負の取りは読まない
            if (!is_check || evasion_prunable)
                && m != tt_move
                && !m.is_promotion()
                && pos.see_sign(m).raw() < 0
            {
                continue;
            }

            pos.do_move(m);
            let value = -self.qsearch(pos, ss, -beta, -alpha, depth - ONE_PLY, ply + 1);
            pos.undo_move(m);

            if value > best_value {
                best_value = value;
                if value > alpha {
                    alpha = value;
                    update_pv(ss, ply as usize);
                }
            }
        }

        // 王手されていて逃げる手がなければ詰み
        if move_count == 0 && is_check {
            return Value::mated_in(ply);
        }

        // 置換表へ保存
        let d: Depth = if depth == 0 { 0 } else { -1 };
        if best_value <= old_alpha {
            // stand patから動かなかった場合は評価値キャッシュとして残す
            let bound = if best_value == static_value && !is_check {
                Bound::EvalUpper
            } else {
                Bound::Upper
            };
            self.ctx.tt.store(pos.key(), value_to_tt(best_value, ply), bound, d, Move::NONE);
        } else if best_value >= beta {
            let m = ss[ply as usize].pv[ply as usize];
            self.ctx.tt.store(pos.key(), value_to_tt(best_value, ply), Bound::Lower, d, m);
            if !pos.move_is_capture_or_promotion(m) {
                update_killers(m, &mut ss[ply as usize]);
            }
        } else {
            self.ctx.tt.store(
                pos.key(),
                value_to_tt(best_value, ply),
                Bound::Exact,
                d,
                ss[ply as usize].pv[ply as usize],
            );
        }

        best_value
    }

    // =========================================================================
    // 延長・history更新
    // =========================================================================

    /// 延長量と「危険な手」フラグを決める
    ///
    /// 危険な手はLMRとfutility枝刈りの対象から外す。
    fn extension(
        &self,
        pos: &Position,
        m: Move,
        pv_node: bool,
        capture_or_promotion: bool,
        move_is_check: bool,
        single_evasion: bool,
        mate_threat: bool,
    ) -> (Depth, bool) {
        let opts = self.ctx.opts;
        let pv = pv_node as usize;
        let mut result: Depth = 0;
        let mut dangerous = move_is_check || single_evasion || mate_threat;

        if move_is_check {
            result += opts.check_extension[pv];
        }
        if single_evasion {
            result += opts.single_evasion_extension[pv];
        }
        if mate_threat {
            result += opts.mate_threat_extension[pv];
        }

        let us = pos.side_to_move();
        if pos.piece_on(m.from()).piece_type() == PieceType::Pawn {
            if m.to().relative_rank(us) == crate::types::Rank::Rank7 {
                result += opts.pawn_push_to_7th_extension[pv];
                dangerous = true;
            }
            if pos.pawn_is_passed(us, m.to()) {
                result += opts.passed_pawn_extension[pv];
                dangerous = true;
            }
        }

        let captured = pos.piece_on(m.to());
        if capture_or_promotion
            && captured.is_some()
            && captured.piece_type() != PieceType::Pawn
            && !m.is_promotion()
            && !m.is_en_passant()
            && (pos.non_pawn_material(Color::White) + pos.non_pawn_material(Color::Black)
                - crate::types::piece_value_midgame(captured))
                == Value::ZERO
        {
            // ポーン終盤に入る取り
            result += opts.pawn_endgame_extension[pv];
            dangerous = true;
        }

        if pv_node
            && capture_or_promotion
            && captured.is_some()
            && captured.piece_type() != PieceType::Pawn
            && pos.see_sign(m).raw() >= 0
        {
            result += ONE_PLY / 2;
            dangerous = true;
        }

        (result.min(ONE_PLY), dangerous)
    }

    /// beta cutoffを出した静かな手を加点し、先行する兄弟手を減点する
    fn update_history(&self, pos: &Position, m: Move, depth: Depth, searched: &[Move]) {
        self.ctx.history.success(pos.piece_on(m.from()), m.to(), depth);

        for &other in searched {
            if other == m || other.is_none() {
                continue;
            }
            if !pos.move_is_capture_or_promotion(other) {
                self.ctx.history.failure(pos.piece_on(other.from()), other.to(), depth);
            }
        }
    }
}

/// killerリングを更新する
fn update_killers(m: Move, frame: &mut SearchStack) {
    if m == frame.killers[0] {
        return;
    }
    for i in (1..frame.killers.len()).rev() {
        frame.killers[i] = frame.killers[i - 1];
    }
    frame.killers[0] = m;
}

fn is_killer(m: Move, frame: &SearchStack) -> bool {
    frame.killers.contains(&m)
}

/// 詰みに届きうるスコアか
fn value_is_mate(v: Value) -> bool {
    v <= Value::mated_in(PLY_MAX) || v >= Value::mate_in(PLY_MAX)
}

/// 置換表の値でcutoffしてよいか
fn ok_to_use_tt(tte: &TTData, depth: Depth, beta: Value, ply: i32) -> bool {
    let v = value_from_tt(tte.value, ply);

    (tte.depth >= depth
        || v >= Value::mate_in(PLY_MAX).max(beta)
        || v < Value::mated_in(PLY_MAX).min(beta))
        && ((tte.bound.is_lower() && v >= beta) || (tte.bound.is_upper() && v < beta))
}

/// 整合する置換表の値で静的評価を置き換える
fn refine_eval(tte: Option<TTData>, default_eval: Value, ply: i32) -> Value {
    let Some(tte) = tte else { return default_eval };
    let v = value_from_tt(tte.value, ply);

    if (tte.bound.is_lower() && v >= default_eval) || (tte.bound.is_upper() && v < default_eval) {
        v
    } else {
        default_eval
    }
}

/// 2つの手が「関連している」か
///
/// m1は現局面に至った手、m2は現局面からの手。ヌルムーブの反証手が
/// 削減済みの手と関連していれば、full depthの再探索に値する。
fn connected_moves(pos: &Position, m1: Move, m2: Move) -> bool {
    use crate::bitboard::{attacks_from, between_bb};

    if m2.is_none() || m1.is_none() {
        return false;
    }

    let f1 = m1.from();
    let t1 = m1.to();
    let f2 = m2.from();
    let t2 = m2.to();

    // 同じ駒を動かしている
    if f2 == t1 {
        return true;
    }

    // m1が空けたマスへ向かう
    if t2 == f1 {
        return true;
    }

    // スライダーが空いたマスを通る
    let p2 = pos.piece_on(f2);
    if p2.is_slider() && between_bb(f2, t2).contains(f1) {
        return true;
    }

    // m1で動いた駒がm2の行き先を守っている
    let p1 = pos.piece_on(t1);
    if p1.is_some() && attacks_from(p1, t1, pos.occupied()).contains(t2) {
        return true;
    }

    // 開き王手になる位置関係
    let ksq = pos.king_square(pos.side_to_move());
    if p1.is_slider()
        && between_bb(t1, ksq).contains(f2)
        && !between_bb(t1, ksq).contains(t2)
    {
        let them = pos.side_to_move().opposite();
        if pos.discovered_check_candidates(them).contains(f2) {
            return true;
        }
    }
    false
}

/// 手数ベースの枝刈りが安全か
///
/// 脅威の対象を動かす・守る・遮る手は刈らない。
fn ok_to_prune(pos: &Position, m: Move, threat: Move) -> bool {
    use crate::bitboard::between_bb;
    use crate::types::piece_value_midgame;

    if threat.is_none() {
        return true;
    }

    let mfrom = m.from();
    let mto = m.to();
    let tfrom = threat.from();
    let tto = threat.to();

    // 脅威にさらされている駒を動かす手
    if mfrom == tto {
        return false;
    }

    // 脅かされた駒と同等以下の駒で守る手
    if pos.move_is_capture(threat)
        && (piece_value_midgame(pos.piece_on(tfrom)) >= piece_value_midgame(pos.piece_on(tto))
            || pos.piece_on(tfrom).piece_type() == PieceType::King)
        && pos.move_attacks_square(m, tto)
    {
        return false;
    }

    // スライダーの脅威の射線を安全に遮る手
    if pos.piece_on(tfrom).is_slider()
        && between_bb(tfrom, tto).contains(mto)
        && pos.see_sign(m).raw() >= 0
    {
        return false;
    }

    true
}

// =============================================================================
// Split point handling (YBWC)
// =============================================================================

/// Distribute the remaining moves of this node among idle threads.
///
/// Returns false when no split point could be set up. On success the
/// caller's `alpha` / `best_value` reflect the cooperative result and the
/// caller must break out of its move loop.
#[allow(clippy::too_many_arguments)]
fn split(
    ctx: &SearchContext,
    master: usize,
    pos: &Position,
    ss: &mut [SearchStack],
    ply: i32,
    alpha: &mut Value,
    beta: Value,
    best_value: &mut Value,
    futility_base: Value,
    depth: Depth,
    move_count: &mut usize,
    mp: &mut MovePicker,
    pv_node: bool,
) -> bool {
    let pool = ctx.pool;

    let slot;
    let sp_idx;
    {
        let _guard = pool.book_lock.lock().unwrap();

        if !pool.idle_thread_exists(master)
            || pool.threads[master].active_split_points.load(Ordering::Acquire)
                >= super::thread::MAX_ACTIVE_SPLIT_POINTS
        {
            return false;
        }

        slot = pool.threads[master].active_split_points.fetch_add(1, Ordering::AcqRel);
        sp_idx = encode_sp(master, slot);
        let sp = pool.split_point(master, slot);

        sp.finished.store(false, Ordering::Release);
        sp.cpus.store(1, Ordering::Release);
        sp.slave_mask.store(0, Ordering::Release);
        sp.parent.store(
            pool.threads[master].current_split_point.load(Ordering::Acquire),
            Ordering::Release,
        );

        {
            let mut locked = sp.locked.lock().unwrap();
            locked.master = master;
            locked.pv_node = pv_node;
            locked.depth = depth;
            locked.ply = ply;
            locked.alpha = if pv_node { *alpha } else { beta - 1 };
            locked.beta = beta;
            locked.best_value = *best_value;
            locked.futility_base = futility_base;
            locked.move_count = *move_count as i32;
            locked.seed = [
                ss[(ply - 1) as usize],
                ss[ply as usize],
                ss[(ply + 1) as usize],
            ];
            locked.shared = Some(SpShared {
                pos: pos as *const Position,
                mp: mp as *mut MovePicker,
                parent_ss: ss.as_mut_ptr(),
                ctx: ctx as *const SearchContext as *const (),
            });
        }

        pool.threads[master].stop.store(false, Ordering::Relaxed);
        pool.threads[master].current_split_point.store(sp_idx, Ordering::Release);

        // Book the idle slaves
        let max_slaves = pool.max_threads_per_split_point();
        let mut booked = Vec::new();
        for i in 0..pool.active_threads() {
            if sp.cpus.load(Ordering::Acquire) >= max_slaves {
                break;
            }
            if pool.thread_is_available(i, master) {
                pool.threads[i].stop.store(false, Ordering::Relaxed);
                pool.threads[i].current_split_point.store(sp_idx, Ordering::Release);
                pool.threads[i].set_state(ThreadStateKind::Booked);
                sp.slave_mask.fetch_or(1 << i, Ordering::AcqRel);
                sp.cpus.fetch_add(1, Ordering::AcqRel);
                booked.push(i);
            }
        }

        if booked.is_empty() {
            // The idle thread vanished between the check and the booking
            pool.threads[master]
                .active_split_points
                .fetch_sub(1, Ordering::AcqRel);
            pool.threads[master].current_split_point.store(
                pool.split_point(master, slot).parent.load(Ordering::Acquire),
                Ordering::Release,
            );
            return false;
        }

        for &i in &booked {
            pool.threads[i].set_state(ThreadStateKind::WorkIsWaiting);
        }
        drop(_guard);

        for &i in &booked {
            pool.threads[i].wake_up();
        }
    }

    // The master joins its own split point through the idle loop
    pool.threads[master].set_state(ThreadStateKind::WorkIsWaiting);
    loop {
        match pool.idle_wait(master, Some(sp_idx)) {
            IdleEvent::Work => {
                run_split_point(pool, master);
                pool.threads[master].set_state(ThreadStateKind::Available);
            }
            IdleEvent::SplitPointDone => break,
            IdleEvent::Exit => break,
        }
    }

    // All participants are done; collect the result
    let _guard = pool.book_lock.lock().unwrap();
    let sp = pool.split_point(master, slot);
    {
        let locked = sp.locked.lock().unwrap();
        if pv_node {
            *alpha = locked.alpha;
        }
        *best_value = locked.best_value;
        *move_count = locked.move_count as usize;
    }
    pool.threads[master].set_state(ThreadStateKind::Searching);
    pool.threads[master].stop.store(false, Ordering::Relaxed);
    pool.threads[master].active_split_points.fetch_sub(1, Ordering::AcqRel);
    pool.threads[master]
        .current_split_point
        .store(sp.parent.load(Ordering::Acquire), Ordering::Release);

    true
}

/// Entry point for a thread that was handed split-point work
pub(crate) fn run_split_point(pool: &ThreadPool, tid: usize) {
    let sp_idx = pool.threads[tid].current_split_point.load(Ordering::Acquire);
    if sp_idx == SP_NONE {
        return;
    }
    let sp = pool.split_point_at(sp_idx);
    let pv_node = sp.locked.lock().unwrap().pv_node;
    if pv_node {
        sp_search_pv(pool, sp, tid);
    } else {
        sp_search(pool, sp, tid);
    }
}

/// Snapshot of the immutable split-point setup
struct SpSetup {
    ctx: *const (),
    pos: *const Position,
    mp: *mut MovePicker,
    parent_ss: *mut SearchStack,
    depth: Depth,
    ply: i32,
    beta: Value,
    futility_base: Value,
    master: usize,
    seed: [SearchStack; 3],
}

fn sp_setup(sp: &SplitPoint) -> Option<SpSetup> {
    let locked = sp.locked.lock().unwrap();
    let shared = locked.shared.as_ref()?;
    Some(SpSetup {
        ctx: shared.ctx,
        pos: shared.pos,
        mp: shared.mp,
        parent_ss: shared.parent_ss,
        depth: locked.depth,
        ply: locked.ply,
        beta: locked.beta,
        futility_base: locked.futility_base,
        master: locked.master,
        seed: locked.seed,
    })
}

/// Leave a split point, stopping our slaves if a cutoff above us fired
fn sp_leave(pool: &ThreadPool, sp: &SplitPoint, tid: usize, master: usize) {
    let _locked = sp.locked.lock().unwrap();
    if master == tid && pool.cutoff_occurred(tid) {
        let mask = sp.slave_mask.load(Ordering::Acquire);
        for i in 0..pool.active_threads() {
            if mask & (1 << i) != 0 {
                pool.threads[i].stop.store(true, Ordering::Relaxed);
            }
        }
    }
    sp.slave_mask.fetch_and(!(1 << tid), Ordering::AcqRel);
    sp.cpus.fetch_sub(1, Ordering::AcqRel);
}

/// Broadcast a beta cutoff to every other participant
fn sp_cutoff(pool: &ThreadPool, sp: &SplitPoint, tid: usize, master: usize) {
    let mask = sp.slave_mask.load(Ordering::Acquire);
    for i in 0..pool.active_threads() {
        if i != tid && (i == master || mask & (1 << i) != 0) {
            pool.threads[i].stop.store(true, Ordering::Relaxed);
        }
    }
    sp.finished.store(true, Ordering::Release);
}

/// Search the shared move list of a zero-window split point
fn sp_search(pool: &ThreadPool, sp: &SplitPoint, tid: usize) {
    let Some(setup) = sp_setup(sp) else { return };

    // SAFETY: the master stays inside split() until cpus reaches zero,
    // keeping the context, position, move picker and parent stack alive.
    let ctx: &SearchContext = unsafe { &*(setup.ctx as *const SearchContext) };
    let mut pos = unsafe { (*setup.pos).clone() };

    let mut ss = new_stack_array();
    let base = (setup.ply - 1) as usize;
    ss[base..base + 3].copy_from_slice(&setup.seed);

    let mut searcher = Searcher::new(ctx, tid);
    let ply = setup.ply;
    let depth = setup.depth;
    let beta = setup.beta;
    let is_check = pos.in_check();
    let use_futility = depth < SELECTIVE_DEPTH && !is_check;
    let fmc_margin = futility_move_count_margin(depth);
    let pinned = pos.pinned_pieces(pos.side_to_move());

    loop {
        // Pull the next legal move under the split-point lock
        let (m, move_count) = {
            let mut locked = sp.locked.lock().unwrap();
            if locked.best_value >= beta || pool.cutoff_occurred(tid) {
                break;
            }
            // SAFETY: serialized by the split-point lock
            let picked = loop {
                match (unsafe { &mut *setup.mp }).next(&pos, ctx.history) {
                    Some(m) if pos.is_legal(m, pinned) => break Some(m),
                    Some(_) => continue,
                    None => break None,
                }
            };
            let Some(m) = picked else { break };
            locked.move_count += 1;
            (m, locked.move_count)
        };

        let move_is_check = pos.gives_check(m);
        let capture_or_promotion = pos.move_is_capture_or_promotion(m);
        ss[ply as usize].current_move = m;

        let (ext, dangerous) =
            searcher.extension(&pos, m, false, capture_or_promotion, move_is_check, false, false);
        let new_depth = depth - ONE_PLY + ext;

        // Futility pruning with the parent's futility base
        if use_futility && !dangerous && !capture_or_promotion {
            let sp_best = sp.locked.lock().unwrap().best_value;
            if move_count >= fmc_margin
                && ok_to_prune(&pos, m, ss[ply as usize].threat_move)
                && sp_best > Value::mated_in(PLY_MAX)
            {
                continue;
            }

            let futility_value_scaled = setup.futility_base
                - Value::new(move_count * INCREMENTAL_FUTILITY_MARGIN);
            if futility_value_scaled < beta {
                let mut locked = sp.locked.lock().unwrap();
                if futility_value_scaled > locked.best_value {
                    locked.best_value = futility_value_scaled;
                }
                continue;
            }
        }

        pos.do_move(m);

        let mut do_full_depth = true;
        let mut value = Value::ZERO;

        if !dangerous
            && !capture_or_promotion
            && !m.is_castle()
            && !is_killer(m, &ss[ply as usize])
        {
            let red = nonpv_reduction(depth, move_count);
            if red > 0 {
                ss[ply as usize].reduction = red;
                value = -searcher.search_nonpv(
                    &mut pos,
                    &mut ss[..],
                    -(beta - 1),
                    new_depth - red,
                    ply + 1,
                    true,
                    Move::NONE,
                );
                do_full_depth = value >= beta;
            }
        }

        if do_full_depth {
            ss[ply as usize].reduction = 0;
            value = -searcher.search_nonpv(
                &mut pos,
                &mut ss[..],
                -(beta - 1),
                new_depth,
                ply + 1,
                true,
                Move::NONE,
            );
        }

        pos.undo_move(m);

        if pool.cutoff_occurred(tid) {
            break;
        }

        // New best value?
        let sp_best = sp.locked.lock().unwrap().best_value;
        if value > sp_best {
            let mut locked = sp.locked.lock().unwrap();
            if value > locked.best_value && !pool.cutoff_occurred(tid) {
                locked.best_value = value;
                if value >= beta {
                    // SAFETY: parent stack is alive and we hold the lock
                    unsafe { sp_update_pv(setup.parent_ss, &mut ss[..], ply as usize) };
                    sp_cutoff(pool, sp, tid, setup.master);
                }
            }
        }
    }

    sp_leave(pool, sp, tid, setup.master);
}

/// Search the shared move list of a PV split point
fn sp_search_pv(pool: &ThreadPool, sp: &SplitPoint, tid: usize) {
    let Some(setup) = sp_setup(sp) else { return };

    // SAFETY: see sp_search
    let ctx: &SearchContext = unsafe { &*(setup.ctx as *const SearchContext) };
    let mut pos = unsafe { (*setup.pos).clone() };

    let mut ss = new_stack_array();
    let base = (setup.ply - 1) as usize;
    ss[base..base + 3].copy_from_slice(&setup.seed);

    let mut searcher = Searcher::new(ctx, tid);
    let ply = setup.ply;
    let depth = setup.depth;
    let beta = setup.beta;
    let pinned = pos.pinned_pieces(pos.side_to_move());

    loop {
        let (m, move_count, local_alpha) = {
            let mut locked = sp.locked.lock().unwrap();
            if locked.alpha >= beta || pool.cutoff_occurred(tid) {
                break;
            }
            // SAFETY: serialized by the split-point lock
            let picked = loop {
                match (unsafe { &mut *setup.mp }).next(&pos, ctx.history) {
                    Some(m) if pos.is_legal(m, pinned) => break Some(m),
                    Some(_) => continue,
                    None => break None,
                }
            };
            let Some(m) = picked else { break };
            locked.move_count += 1;
            (m, locked.move_count, locked.alpha)
        };

        let move_is_check = pos.gives_check(m);
        let capture_or_promotion = pos.move_is_capture_or_promotion(m);
        ss[ply as usize].current_move = m;

        let (ext, dangerous) =
            searcher.extension(&pos, m, true, capture_or_promotion, move_is_check, false, false);
        let new_depth = depth - ONE_PLY + ext;

        pos.do_move(m);

        let mut do_full_depth = true;
        let mut value = Value::ZERO;

        if !dangerous
            && !capture_or_promotion
            && !m.is_castle()
            && !is_killer(m, &ss[ply as usize])
        {
            let red = pv_reduction(depth, move_count);
            if red > 0 {
                ss[ply as usize].reduction = red;
                value = -searcher.search_nonpv(
                    &mut pos,
                    &mut ss[..],
                    -local_alpha,
                    new_depth - red,
                    ply + 1,
                    true,
                    Move::NONE,
                );
                do_full_depth = value > local_alpha;
            }
        }

        if do_full_depth {
            ss[ply as usize].reduction = 0;
            let local_alpha = sp.locked.lock().unwrap().alpha;
            value = -searcher.search_nonpv(
                &mut pos,
                &mut ss[..],
                -local_alpha,
                new_depth,
                ply + 1,
                true,
                Move::NONE,
            );

            if value > local_alpha && value < beta {
                // Another thread may have raised alpha past beta already
                let local_alpha = sp.locked.lock().unwrap().alpha;
                if local_alpha < beta {
                    value = -searcher.search_pv(
                        &mut pos,
                        &mut ss[..],
                        -beta,
                        -local_alpha,
                        new_depth,
                        ply + 1,
                    );
                }
            }
        }

        pos.undo_move(m);

        if pool.cutoff_occurred(tid) {
            break;
        }

        let sp_best = sp.locked.lock().unwrap().best_value;
        if value > sp_best {
            let mut locked = sp.locked.lock().unwrap();
            if value > locked.best_value && !pool.cutoff_occurred(tid) {
                locked.best_value = value;
                if value > locked.alpha {
                    if value >= beta {
                        sp_cutoff(pool, sp, tid, setup.master);
                    }
                    locked.alpha = value;

                    // SAFETY: parent stack is alive and we hold the lock
                    unsafe { sp_update_pv(setup.parent_ss, &mut ss[..], ply as usize) };
                    if value == Value::mate_in(ply + 1) {
                        ss[ply as usize].mate_killer = m;
                    }
                }
            }
        }
    }

    sp_leave(pool, sp, tid, setup.master);
}

/// Idle loop body for a spawned worker thread
pub(crate) fn worker_loop(pool: Arc<ThreadPool>, id: usize) {
    log::debug!("worker {id} started");
    pool.threads[id].set_state(ThreadStateKind::Available);

    loop {
        match pool.idle_wait(id, None) {
            IdleEvent::Work => {
                run_split_point(&pool, id);
                pool.threads[id].set_state(ThreadStateKind::Available);
            }
            IdleEvent::Exit => break,
            IdleEvent::SplitPointDone => unreachable!("worker waits on no split point"),
        }
    }

    pool.threads[id].set_state(ThreadStateKind::Terminated);
    log::debug!("worker {id} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_search(fen: &str, limits: LimitsType) -> SearchResult {
        let mut search = Search::new(4);
        let mut pos = Position::from_fen(fen).expect("valid fen");
        search.think(&mut pos, &limits, &mut |_| {})
    }

    fn depth_limits(d: i32) -> LimitsType {
        LimitsType { depth: d, ..Default::default() }
    }

    #[test]
    fn test_search_returns_legal_move() {
        let result = run_search(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            depth_limits(2),
        );
        let pos = Position::startpos();
        let legal = crate::movegen::generate_legal(&pos);
        assert!(legal.contains(&result.best_move));
    }

    #[test]
    fn test_mate_in_one() {
        let result = run_search("4k3/8/4K3/R7/8/8/8/8 w - - 0 1", depth_limits(3));
        assert_eq!(result.best_move.to_uci(), "a5a8");
        assert_eq!(result.score, Value::mate_in(1));
    }

    #[test]
    fn test_mated_position() {
        // 詰まされている局面: 合法手なし
        let result = run_search(
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
            depth_limits(2),
        );
        assert_eq!(result.best_move, Move::NONE);
        assert_eq!(result.score, -Value::MATE);
    }

    #[test]
    fn test_stalemate_position() {
        let result = run_search("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", depth_limits(2));
        assert_eq!(result.best_move, Move::NONE);
        assert_eq!(result.score, Value::DRAW);
    }

    #[test]
    fn test_fifty_move_draw_score() {
        let result = run_search("4k3/8/8/8/8/8/8/R3K3 w - - 100 80", depth_limits(4));
        assert_eq!(result.score, Value::DRAW);
    }

    #[test]
    fn test_finds_hanging_queen() {
        // 黒女王がただで取れる
        let result = run_search("4k3/8/8/3q4/8/2N5/8/4K3 w - - 0 1", depth_limits(4));
        assert_eq!(result.best_move.to_uci(), "c3d5");
    }

    #[test]
    fn test_node_limit_terminates() {
        let limits = LimitsType { nodes: 1, ..Default::default() };
        let mut search = Search::new(4);
        let mut pos = Position::startpos();
        let result = search.think(&mut pos, &limits, &mut |_| {});
        // ノード制限でもbestmoveは返る
        assert!(result.best_move.is_some());
    }

    #[test]
    fn test_bound_consistency_single_thread() {
        // 返る値はEXACTのときalphaとbetaの間にある
        let mut search = Search::new(4);
        let mut pos = Position::startpos();
        let limits = depth_limits(4);
        let result = search.think(&mut pos, &limits, &mut |_| {});
        assert!(result.score.abs() < Value::KNOWN_WIN);
    }

    #[test]
    fn test_parallel_search_completes() {
        let mut search = Search::new(8);
        search.set_threads(2);
        search.options.min_split_depth = 4;
        let mut pos = Position::startpos();
        let limits = depth_limits(6);
        let result = search.think(&mut pos, &limits, &mut |_| {});
        assert!(result.best_move.is_some());

        // split point帳簿が空に戻っている
        for t in 0..2 {
            assert_eq!(
                search.pool.threads[t].active_split_points.load(Ordering::Relaxed),
                0
            );
        }
    }

    #[test]
    fn test_repetition_draw_score() {
        let mut search = Search::new(4);
        let mut pos = Position::startpos();
        // 同形反復
        for uci in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let legal = crate::movegen::generate_legal(&pos);
            let m = legal.iter().copied().find(|m| m.to_uci() == uci).unwrap();
            pos.do_move(m);
        }
        let result = search.think(&mut pos, &depth_limits(3), &mut |_| {});
        assert_eq!(result.score, Value::DRAW);
    }
}
