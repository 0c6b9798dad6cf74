//! UCIプロトコルエンジン
//!
//! GUIとの通信を行うUCIプロトコル実装。コマンドはこのスレッドで
//! 解釈し、探索は専用スレッドに`Search`ごと移して実行する。

mod uci;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use clap::Parser;
use engine_core::search::{LimitsType, SearchResult, Signals};
use engine_core::{Position, Search};
use uci::{
    format_info, format_move, parse_command, parse_move, GoParams, OptionRegistry, UciCommand,
};

/// エンジン名
const ENGINE_NAME: &str = "RChess";
/// エンジンバージョン
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// エンジン作者
const ENGINE_AUTHOR: &str = "the RChess developers";
/// 探索スレッドのスタックサイズ（深い再帰に備えて増やす）
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging to stderr
    #[arg(short, long)]
    debug: bool,
}

/// UCIエンジンの状態
struct UciEngine {
    /// 探索エンジン（探索中はスレッドに移動している）
    search: Option<Search>,
    /// 現在の局面
    position: Position,
    /// 実行中の探索スレッド
    search_thread: Option<thread::JoinHandle<(Search, SearchResult)>>,
    /// 探索停止用のフラグ（探索スレッドと共有）
    signals: Option<Arc<Signals>>,
    /// オプションレジストリ
    options: OptionRegistry,
}

impl UciEngine {
    fn new() -> UciEngine {
        engine_core::init();

        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let default_threads = cores.min(7) as i64;
        let options =
            OptionRegistry::new(engine_core::search::MAX_THREADS as i64, default_threads);

        let mut search = Search::new(options.spin("Hash") as usize);
        search.set_threads(options.spin("Threads") as usize);

        UciEngine {
            search: Some(search),
            position: Position::startpos(),
            search_thread: None,
            signals: None,
            options,
        }
    }

    /// 実行中の探索を止めて`Search`を回収する
    fn finalize_search(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            if let Some(signals) = &self.signals {
                signals.ponder.store(false, std::sync::atomic::Ordering::Relaxed);
                signals.request_stop();
            }
            match handle.join() {
                Ok((search, _result)) => self.search = Some(search),
                Err(_) => {
                    log::error!("search thread panicked; rebuilding engine");
                    let mut search = Search::new(self.options.spin("Hash") as usize);
                    search.set_threads(self.options.spin("Threads") as usize);
                    self.search = Some(search);
                }
            }
        }
        self.signals = None;
    }

    fn cmd_uci(&self) {
        println!("id name {ENGINE_NAME} {ENGINE_VERSION}");
        println!("id author {ENGINE_AUTHOR}");
        for line in self.options.uci_lines() {
            println!("{line}");
        }
        println!("uciok");
    }

    fn cmd_setoption(&mut self, name: &str, value: Option<&str>) {
        self.finalize_search();

        if !self.options.set(name, value) {
            println!("No such option: {name}");
            return;
        }

        let search = self.search.as_mut().expect("search present while idle");
        match name {
            "Hash" => search.resize_tt(self.options.spin("Hash") as usize),
            "Clear Hash" => search.clear_tables(),
            "Threads" => search.set_threads(self.options.spin("Threads") as usize),
            _ => {}
        }
    }

    fn cmd_position(&mut self, fen: Option<&str>, moves: &[String]) {
        self.finalize_search();

        let mut pos = match fen {
            None => Position::startpos(),
            Some(fen) => match Position::from_fen(fen) {
                Ok(p) => p,
                Err(e) => {
                    println!("Unknown command: position fen {fen} ({e})");
                    return;
                }
            },
        };

        for s in moves {
            let Some(m) = parse_move(&pos, s) else {
                println!("Unknown command: illegal move {s}");
                return;
            };
            pos.do_move(m);
        }

        self.position = pos;
    }

    /// goコマンドから探索制限を組み立てる
    fn build_limits(&self, params: &GoParams) -> LimitsType {
        let mut limits = LimitsType {
            time: [params.wtime.unwrap_or(0), params.btime.unwrap_or(0)],
            inc: [params.winc.unwrap_or(0), params.binc.unwrap_or(0)],
            moves_to_go: params.moves_to_go.unwrap_or(0),
            depth: params.depth.unwrap_or(0),
            nodes: params.nodes.unwrap_or(0),
            move_time: params.move_time.unwrap_or(0),
            infinite: params.infinite,
            ponder: params.ponder,
            search_moves: Vec::new(),
        };

        for s in &params.search_moves {
            if let Some(m) = parse_move(&self.position, s) {
                limits.search_moves.push(m);
            }
        }
        limits
    }

    fn cmd_go(&mut self, params: &GoParams) {
        self.finalize_search();

        let mut search = self.search.take().expect("search present while idle");
        self.sync_options(&mut search);

        let signals = search.signals();
        // spawn前にこのスレッドでリセットしておくと、直後のstopと競合しない
        signals.reset(params.ponder);
        self.signals = Some(Arc::clone(&signals));

        let limits = self.build_limits(params);
        let mut pos = self.position.clone();
        let chess960 = self.options.check("UCI_Chess960");

        let builder = thread::Builder::new()
            .name("search-main".to_string())
            .stack_size(SEARCH_STACK_SIZE);
        let handle = builder
            .spawn(move || {
                let stdout = io::stdout();
                let result = search.think(&mut pos, &limits, &mut |event| {
                    let mut out = stdout.lock();
                    let _ = writeln!(out, "{}", format_info(&event, chess960));
                    let _ = out.flush();
                });

                // infinite/ponder中はstopかponderhitまでbestmoveを出さない
                while (limits.infinite || signals.pondering()) && !signals.stop_requested() {
                    thread::sleep(std::time::Duration::from_millis(1));
                }

                let mut line = format!("bestmove {}", format_move(result.best_move, chess960));
                if result.ponder_move.is_some() {
                    line.push_str(&format!(
                        " ponder {}",
                        format_move(result.ponder_move, chess960)
                    ));
                }
                let mut out = stdout.lock();
                let _ = writeln!(out, "{line}");
                let _ = out.flush();

                (search, result)
            })
            .expect("spawn search thread");

        self.search_thread = Some(handle);
    }

    /// レジストリの値を探索オプションへ反映する
    fn sync_options(&self, search: &mut Search) {
        let o = &self.options;
        let opts = &mut search.options;

        opts.multi_pv = o.spin("MultiPV") as usize;
        opts.ponder = o.check("Ponder");
        opts.min_split_depth = o.spin("Minimum Split Depth") as usize;
        opts.max_threads_per_split_point =
            o.spin("Maximum Number of Threads per Split Point") as usize;
        opts.use_sleeping_threads = o.check("Use Sleeping Threads");

        let ext = |name: &str| -> [i32; 2] {
            [
                o.spin(&format!("{name} (non-PV nodes)")) as i32,
                o.spin(&format!("{name} (PV nodes)")) as i32,
            ]
        };
        opts.check_extension = ext("Check Extension");
        opts.single_evasion_extension = ext("Single Evasion Extension");
        opts.mate_threat_extension = ext("Mate Threat Extension");
        opts.pawn_push_to_7th_extension = ext("Pawn Push to 7th Extension");
        opts.passed_pawn_extension = ext("Passed Pawn Extension");
        opts.pawn_endgame_extension = ext("Pawn Endgame Extension");
    }

    fn cmd_stop(&mut self) {
        if let Some(signals) = &self.signals {
            signals.ponder.store(false, std::sync::atomic::Ordering::Relaxed);
            signals.request_stop();
        }
        self.finalize_search();
    }

    fn cmd_ponderhit(&mut self) {
        if let Some(signals) = &self.signals {
            signals.ponderhit();
        }
    }

    fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            match parse_command(&line) {
                UciCommand::Uci => self.cmd_uci(),
                UciCommand::IsReady => println!("readyok"),
                UciCommand::UciNewGame => {
                    self.finalize_search();
                    if let Some(search) = self.search.as_mut() {
                        search.clear_tables();
                    }
                    self.position = Position::startpos();
                }
                UciCommand::Position { fen, moves } => {
                    self.cmd_position(fen.as_deref(), &moves)
                }
                UciCommand::SetOption { name, value } => {
                    self.cmd_setoption(&name, value.as_deref())
                }
                UciCommand::Go(params) => self.cmd_go(&params),
                UciCommand::Stop => self.cmd_stop(),
                UciCommand::PonderHit => self.cmd_ponderhit(),
                UciCommand::Quit => {
                    self.cmd_stop();
                    break;
                }
                UciCommand::Unknown(cmd) => {
                    if !cmd.is_empty() {
                        println!("Unknown command: {cmd}");
                    }
                }
            }
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // UCIはstdoutを使うのでログはstderrへ
    let level = if args.debug { "debug" } else { "warn" };
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", level));

    log::info!("{ENGINE_NAME} {ENGINE_VERSION} starting");

    let mut engine = UciEngine::new();
    engine.run()
}
