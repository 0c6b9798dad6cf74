//! Deep perft reference counts
//!
//! These take a few seconds in release mode and validate the whole
//! position/movegen stack against well-known reference numbers. The
//! counts must not depend on transposition table state or thread count.

use engine_core::movegen::perft;
use engine_core::Position;

#[test]
fn perft_startpos_depth5() {
    let mut pos = Position::startpos();
    assert_eq!(perft(&mut pos, 5), 4_865_609);
}

#[test]
fn perft_kiwipete_depth4() {
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .expect("valid fen");
    assert_eq!(perft(&mut pos, 4), 4_085_603);
}

#[test]
fn perft_position5_depth3() {
    // CPW position 5: castling and promotion interplay
    let mut pos = Position::from_fen(
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    )
    .expect("valid fen");
    assert_eq!(perft(&mut pos, 1), 44);
    assert_eq!(perft(&mut pos, 2), 1_486);
    assert_eq!(perft(&mut pos, 3), 62_379);
}

#[test]
fn perft_is_deterministic_across_runs() {
    let mut pos = Position::startpos();
    let first = perft(&mut pos, 4);
    let second = perft(&mut pos, 4);
    assert_eq!(first, second);
    assert_eq!(first, 197_281);
}
