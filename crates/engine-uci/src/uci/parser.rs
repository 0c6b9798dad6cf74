//! UCI command parsing
//!
//! Line-oriented commands from the GUI. Parsing never fails hard: an
//! unrecognized line becomes `UciCommand::Unknown` and leaves the engine
//! state untouched.

/// Parsed `go` parameters (times in milliseconds)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GoParams {
    pub wtime: Option<i64>,
    pub btime: Option<i64>,
    pub winc: Option<i64>,
    pub binc: Option<i64>,
    pub moves_to_go: Option<i32>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    pub move_time: Option<i64>,
    pub infinite: bool,
    pub ponder: bool,
    pub search_moves: Vec<String>,
}

/// A parsed UCI command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    Position { fen: Option<String>, moves: Vec<String> },
    SetOption { name: String, value: Option<String> },
    Go(GoParams),
    Stop,
    PonderHit,
    Quit,
    Unknown(String),
}

/// Parse one input line
pub fn parse_command(line: &str) -> UciCommand {
    let mut tokens = line.split_whitespace();
    let Some(cmd) = tokens.next() else {
        return UciCommand::Unknown(String::new());
    };

    match cmd {
        "uci" => UciCommand::Uci,
        "isready" => UciCommand::IsReady,
        "ucinewgame" => UciCommand::UciNewGame,
        "stop" => UciCommand::Stop,
        "ponderhit" => UciCommand::PonderHit,
        "quit" => UciCommand::Quit,
        "position" => parse_position(tokens),
        "setoption" => parse_setoption(tokens),
        "go" => UciCommand::Go(parse_go(tokens)),
        _ => UciCommand::Unknown(line.trim().to_string()),
    }
}

fn parse_position<'a, I: Iterator<Item = &'a str>>(mut tokens: I) -> UciCommand {
    let fen = match tokens.next() {
        Some("startpos") => None,
        Some("fen") => {
            // FEN is six space-separated fields, up to the "moves" keyword
            let fields: Vec<&str> =
                tokens.by_ref().take_while(|t| *t != "moves").collect();
            if fields.is_empty() {
                return UciCommand::Unknown("position fen".to_string());
            }
            return UciCommand::Position {
                fen: Some(fields.join(" ")),
                moves: tokens.map(str::to_string).collect(),
            };
        }
        other => {
            return UciCommand::Unknown(format!(
                "position {}",
                other.unwrap_or_default()
            ))
        }
    };

    // startpos [moves ...]
    match tokens.next() {
        Some("moves") => UciCommand::Position {
            fen,
            moves: tokens.map(str::to_string).collect(),
        },
        None => UciCommand::Position { fen, moves: Vec::new() },
        Some(other) => UciCommand::Unknown(format!("position startpos {other}")),
    }
}

fn parse_setoption<'a, I: Iterator<Item = &'a str>>(mut tokens: I) -> UciCommand {
    if tokens.next() != Some("name") {
        return UciCommand::Unknown("setoption".to_string());
    }

    // The option name may contain spaces, terminated by "value"
    let mut name_parts = Vec::new();
    let mut value_parts = Vec::new();
    let mut in_value = false;
    for t in tokens {
        if !in_value && t == "value" {
            in_value = true;
        } else if in_value {
            value_parts.push(t);
        } else {
            name_parts.push(t);
        }
    }

    if name_parts.is_empty() {
        return UciCommand::Unknown("setoption name".to_string());
    }

    UciCommand::SetOption {
        name: name_parts.join(" "),
        value: if in_value { Some(value_parts.join(" ")) } else { None },
    }
}

fn parse_go<'a, I: Iterator<Item = &'a str>>(mut tokens: I) -> GoParams {
    let mut params = GoParams::default();

    while let Some(t) = tokens.next() {
        match t {
            "wtime" => params.wtime = tokens.next().and_then(|v| v.parse().ok()),
            "btime" => params.btime = tokens.next().and_then(|v| v.parse().ok()),
            "winc" => params.winc = tokens.next().and_then(|v| v.parse().ok()),
            "binc" => params.binc = tokens.next().and_then(|v| v.parse().ok()),
            "movestogo" => params.moves_to_go = tokens.next().and_then(|v| v.parse().ok()),
            "depth" => params.depth = tokens.next().and_then(|v| v.parse().ok()),
            "nodes" => {
                // nodes 0 means "terminate at once", not "no limit"
                params.nodes =
                    tokens.next().and_then(|v| v.parse().ok()).map(|n: u64| n.max(1));
            }
            "movetime" => params.move_time = tokens.next().and_then(|v| v.parse().ok()),
            "infinite" => params.infinite = true,
            "ponder" => params.ponder = true,
            "searchmoves" => {
                params.search_moves = tokens.by_ref().map(str::to_string).collect();
            }
            _ => {}
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("uci"), UciCommand::Uci);
        assert_eq!(parse_command("isready"), UciCommand::IsReady);
        assert_eq!(parse_command("ucinewgame"), UciCommand::UciNewGame);
        assert_eq!(parse_command("stop"), UciCommand::Stop);
        assert_eq!(parse_command("ponderhit"), UciCommand::PonderHit);
        assert_eq!(parse_command("quit"), UciCommand::Quit);
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse_command("flip the board"),
            UciCommand::Unknown("flip the board".to_string())
        );
    }

    #[test]
    fn test_parse_position_startpos() {
        assert_eq!(
            parse_command("position startpos"),
            UciCommand::Position { fen: None, moves: vec![] }
        );
        assert_eq!(
            parse_command("position startpos moves e2e4 e7e5"),
            UciCommand::Position {
                fen: None,
                moves: vec!["e2e4".to_string(), "e7e5".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_position_fen() {
        let cmd = parse_command(
            "position fen 4k3/8/4K3/R7/8/8/8/8 w - - 0 1 moves a5a8",
        );
        assert_eq!(
            cmd,
            UciCommand::Position {
                fen: Some("4k3/8/4K3/R7/8/8/8/8 w - - 0 1".to_string()),
                moves: vec!["a5a8".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_setoption() {
        assert_eq!(
            parse_command("setoption name Hash value 128"),
            UciCommand::SetOption { name: "Hash".to_string(), value: Some("128".to_string()) }
        );
        // Option names may contain spaces
        assert_eq!(
            parse_command("setoption name Minimum Split Depth value 6"),
            UciCommand::SetOption {
                name: "Minimum Split Depth".to_string(),
                value: Some("6".to_string())
            }
        );
        // Button options carry no value
        assert_eq!(
            parse_command("setoption name Clear Hash"),
            UciCommand::SetOption { name: "Clear Hash".to_string(), value: None }
        );
    }

    #[test]
    fn test_parse_go() {
        let cmd = parse_command("go wtime 30000 btime 25000 winc 100 binc 100 movestogo 20");
        let UciCommand::Go(p) = cmd else { panic!("go expected") };
        assert_eq!(p.wtime, Some(30_000));
        assert_eq!(p.btime, Some(25_000));
        assert_eq!(p.winc, Some(100));
        assert_eq!(p.moves_to_go, Some(20));

        let UciCommand::Go(p) = parse_command("go depth 12") else { panic!() };
        assert_eq!(p.depth, Some(12));

        let UciCommand::Go(p) = parse_command("go infinite") else { panic!() };
        assert!(p.infinite);

        let UciCommand::Go(p) = parse_command("go nodes 0") else { panic!() };
        assert_eq!(p.nodes, Some(1));

        let UciCommand::Go(p) = parse_command("go searchmoves e2e4 d2d4") else { panic!() };
        assert_eq!(p.search_moves, vec!["e2e4", "d2d4"]);
    }
}
