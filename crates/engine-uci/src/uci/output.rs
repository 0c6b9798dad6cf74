//! Info line formatting and move notation
//!
//! Converts `InfoEvent`s from the search into UCI `info` lines and
//! translates moves between the internal encoding and long algebraic
//! notation (with the Chess960 king-takes-rook convention when enabled).

use engine_core::movegen::generate_legal;
use engine_core::search::InfoEvent;
use engine_core::types::{Bound, File, Move, Square, Value};
use engine_core::Position;

/// Format a move in long algebraic notation
///
/// With `chess960` castling is emitted as the king capturing its own
/// rook (e1h1 instead of e1g1).
pub fn format_move(m: Move, chess960: bool) -> String {
    if m.is_none() {
        return "(none)".to_string();
    }

    if chess960 && m.is_castle() {
        let kingside = m.to().file() > m.from().file();
        let rook_file = if kingside { File::FileH } else { File::FileA };
        let rook_sq = Square::new(rook_file, m.from().rank());
        return format!("{}{}", m.from(), rook_sq);
    }

    m.to_uci()
}

/// Find the legal move matching a long algebraic string
///
/// Accepts both the standard castling notation (e1g1) and the Chess960
/// king-takes-rook form (e1h1).
pub fn parse_move(pos: &Position, s: &str) -> Option<Move> {
    for m in generate_legal(pos) {
        if m.to_uci() == s {
            return Some(m);
        }
        if m.is_castle() && format_move(m, true) == s {
            return Some(m);
        }
    }
    None
}

/// Score token: `cp <n>` or `mate <n>`
fn format_score(v: Value) -> String {
    if v.is_mate_score() {
        let plies = Value::MATE.raw() - v.raw().abs();
        let mate_in = (plies + 1) / 2;
        if v.raw() > 0 {
            format!("mate {mate_in}")
        } else {
            format!("mate -{mate_in}")
        }
    } else {
        format!("cp {}", v.raw())
    }
}

/// Render one search event as an `info` line
pub fn format_info(event: &InfoEvent, chess960: bool) -> String {
    match event {
        InfoEvent::Depth { depth } => format!("info depth {depth}"),

        InfoEvent::Pv {
            depth,
            sel_depth,
            score,
            bound,
            time_ms,
            nodes,
            nps,
            hashfull,
            pv,
            multipv,
        } => {
            let mut line = format!("info depth {depth} seldepth {sel_depth}");
            if let Some(idx) = multipv {
                line.push_str(&format!(" multipv {idx}"));
            }
            line.push_str(&format!(" score {}", format_score(*score)));
            match bound {
                Bound::Lower => line.push_str(" lowerbound"),
                Bound::Upper => line.push_str(" upperbound"),
                _ => {}
            }
            line.push_str(&format!(
                " time {time_ms} nodes {nodes} nps {nps} hashfull {hashfull} pv"
            ));
            for m in pv.iter() {
                line.push(' ');
                line.push_str(&format_move(*m, chess960));
            }
            line
        }

        InfoEvent::CurrMove { mv, number } => {
            format!(
                "info currmove {} currmovenumber {number}",
                format_move(*mv, chess960)
            )
        }

        InfoEvent::Stats { time_ms, nodes, nps, hashfull } => {
            format!("info nodes {nodes} nps {nps} time {time_ms} hashfull {hashfull}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score_cp_and_mate() {
        assert_eq!(format_score(Value::new(35)), "cp 35");
        assert_eq!(format_score(Value::new(-120)), "cp -120");
        assert_eq!(format_score(Value::mate_in(1)), "mate 1");
        assert_eq!(format_score(Value::mate_in(5)), "mate 3");
        assert_eq!(format_score(Value::mated_in(2)), "mate -1");
    }

    #[test]
    fn test_parse_move_standard() {
        let pos = Position::startpos();
        let m = parse_move(&pos, "e2e4").expect("legal");
        assert_eq!(m.to_uci(), "e2e4");
        assert!(parse_move(&pos, "e2e5").is_none());
        assert!(parse_move(&pos, "nonsense").is_none());
    }

    #[test]
    fn test_castle_notation() {
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").expect("fen");
        let castle = parse_move(&pos, "e1g1").expect("castling legal");
        assert!(castle.is_castle());

        // Chess960 form maps to the same move
        assert_eq!(parse_move(&pos, "e1h1"), Some(castle));

        assert_eq!(format_move(castle, false), "e1g1");
        assert_eq!(format_move(castle, true), "e1h1");
    }

    #[test]
    fn test_info_pv_line() {
        let pos = Position::startpos();
        let m = parse_move(&pos, "d2d4").unwrap();
        let line = format_info(
            &InfoEvent::Pv {
                depth: 7,
                sel_depth: 12,
                score: Value::new(42),
                bound: Bound::Exact,
                time_ms: 345,
                nodes: 100_000,
                nps: 290_000,
                hashfull: 12,
                pv: &[m],
                multipv: None,
            },
            false,
        );
        assert_eq!(
            line,
            "info depth 7 seldepth 12 score cp 42 time 345 nodes 100000 nps 290000 hashfull 12 pv d2d4"
        );
    }

    #[test]
    fn test_info_bound_tokens() {
        let line = format_info(
            &InfoEvent::Pv {
                depth: 3,
                sel_depth: 3,
                score: Value::new(10),
                bound: Bound::Lower,
                time_ms: 1,
                nodes: 2,
                nps: 3,
                hashfull: 0,
                pv: &[],
                multipv: None,
            },
            false,
        );
        assert!(line.contains("lowerbound"));
    }
}
