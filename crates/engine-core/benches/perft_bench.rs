//! Perft benchmark
//!
//! Exercises move generation, legality filtering and do/undo together.

use criterion::{criterion_group, criterion_main, Criterion};
use engine_core::movegen::perft;
use engine_core::Position;

fn perft_startpos(c: &mut Criterion) {
    engine_core::init();
    let mut pos = Position::startpos();

    c.bench_function("perft_startpos_4", |b| {
        b.iter(|| {
            let nodes = perft(&mut pos, 4);
            assert_eq!(nodes, 197_281);
            nodes
        })
    });
}

fn perft_kiwipete(c: &mut Criterion) {
    engine_core::init();
    let mut pos = Position::from_fen(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    )
    .expect("valid fen");

    c.bench_function("perft_kiwipete_3", |b| {
        b.iter(|| {
            let nodes = perft(&mut pos, 3);
            assert_eq!(nodes, 97_862);
            nodes
        })
    });
}

criterion_group!(benches, perft_startpos, perft_kiwipete);
criterion_main!(benches);
