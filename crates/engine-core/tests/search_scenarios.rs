//! End-to-end search scenarios
//!
//! Literal input positions with expected search outcomes, run through
//! the public engine API.

use engine_core::search::LimitsType;
use engine_core::types::Value;
use engine_core::{Position, Search};

fn think(fen: &str, limits: LimitsType) -> engine_core::SearchResult {
    let mut search = Search::new(8);
    let mut pos = Position::from_fen(fen).expect("valid fen");
    search.think(&mut pos, &limits, &mut |_| {})
}

fn depth(d: i32) -> LimitsType {
    LimitsType { depth: d, ..Default::default() }
}

#[test]
fn depth1_startpos_returns_an_opening_move() {
    let result = think(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        depth(1),
    );
    let pos = Position::startpos();
    let legal = engine_core::movegen::generate_legal(&pos);
    assert!(legal.contains(&result.best_move));
    // 1手の探索値は静的評価の範囲に収まる
    assert!(result.score.raw().abs() < 200);
}

#[test]
fn mate_in_one_rook_ladder() {
    let result = think("4k3/8/4K3/R7/8/8/8/8 w - - 0 1", depth(2));
    assert_eq!(result.best_move.to_uci(), "a5a8");
    assert_eq!(result.score, Value::mate_in(1));
}

#[test]
fn fifty_move_rule_is_draw_regardless_of_material() {
    let result = think("4k3/8/8/8/8/8/QQQQ4/K7 w - - 100 90", depth(3));
    assert_eq!(result.score, Value::DRAW);
}

#[test]
fn movetime_terminates_quickly() {
    let limits = LimitsType { move_time: 1, ..Default::default() };
    let mut search = Search::new(8);
    let mut pos = Position::startpos();
    let started = std::time::Instant::now();
    let result = search.think(&mut pos, &limits, &mut |_| {});
    assert!(result.best_move.is_some());
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[test]
fn node_limit_terminates_immediately() {
    let limits = LimitsType { nodes: 1, ..Default::default() };
    let mut search = Search::new(8);
    let mut pos = Position::startpos();
    let result = search.think(&mut pos, &limits, &mut |_| {});
    assert!(result.best_move.is_some());
}

#[test]
fn parallel_and_single_threaded_agree_on_forced_mate() {
    // 詰みのある局面ではスレッド数に関わらず同じ手に到達する
    let fen = "4k3/8/4K3/R7/8/8/8/8 w - - 0 1";

    let single = think(fen, depth(4));

    let mut search = Search::new(8);
    search.set_threads(2);
    let mut pos = Position::from_fen(fen).expect("valid fen");
    let multi = search.think(&mut pos, &depth(4), &mut |_| {});

    assert_eq!(single.best_move, multi.best_move);
    assert_eq!(single.score, Value::mate_in(1));
    assert_eq!(multi.score, Value::mate_in(1));
}
