use assert_cmd::Command;

fn run_script(script: &str) -> String {
    let mut cmd = Command::cargo_bin("engine-uci").expect("binary available");
    let output = cmd.write_stdin(script).assert().success().get_output().stdout.clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn uci_handshake_lists_required_options() {
    let text = run_script("uci\nquit\n");

    assert!(text.contains("id name"), "id missing: {text}");
    assert!(text.contains("uciok"), "uciok missing: {text}");
    for option in [
        "option name Hash type spin",
        "option name Threads type spin",
        "option name MultiPV type spin",
        "option name Ponder type check",
        "option name UCI_Chess960 type check",
        "option name Minimum Split Depth type spin",
        "option name Maximum Number of Threads per Split Point type spin",
        "option name Use Sleeping Threads type check",
    ] {
        assert!(text.contains(option), "{option} missing: {text}");
    }
}

#[test]
fn isready_answers_readyok() {
    let text = run_script("isready\nquit\n");
    assert!(text.contains("readyok"), "readyok missing: {text}");
}

#[test]
fn go_depth_produces_single_bestmove() {
    let text = run_script("uci\nisready\nposition startpos\ngo depth 3\nquit\n");

    assert!(text.contains("info depth"), "info lines missing: {text}");
    let bestmove_count = text.match_indices("bestmove").count();
    assert_eq!(bestmove_count, 1, "bestmove emitted {bestmove_count} times: {text}");
}

#[test]
fn mate_in_one_is_found() {
    let text = run_script(
        "position fen 4k3/8/4K3/R7/8/8/8/8 w - - 0 1\ngo depth 3\nquit\n",
    );
    assert!(text.contains("bestmove a5a8"), "mate move missing: {text}");
    assert!(text.contains("score mate 1"), "mate score missing: {text}");
}

#[test]
fn unknown_command_is_reported_and_state_survives() {
    let text = run_script("uci\nbanana\nposition startpos\ngo depth 1\nquit\n");
    assert!(text.contains("Unknown command: banana"), "diagnostic missing: {text}");
    assert!(text.contains("bestmove"), "engine stopped working: {text}");
}

#[test]
fn no_such_option_is_reported() {
    let text = run_script("uci\nsetoption name Banana value 1\nquit\n");
    assert!(text.contains("No such option: Banana"), "diagnostic missing: {text}");
}

#[test]
fn setoption_hash_and_threads_accepted() {
    let text = run_script(
        "uci\nsetoption name Hash value 16\nsetoption name Threads value 2\n\
         isready\nposition startpos\ngo depth 4\nquit\n",
    );
    let bestmove_count = text.match_indices("bestmove").count();
    assert_eq!(bestmove_count, 1, "bestmove emitted {bestmove_count} times: {text}");
}

#[test]
fn stop_during_infinite_search_yields_bestmove() {
    let mut cmd = Command::cargo_bin("engine-uci").expect("binary available");
    let script = "position startpos\ngo infinite\nstop\nquit\n";
    let output = cmd
        .write_stdin(script)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("bestmove"), "bestmove missing after stop: {text}");
}

#[test]
fn position_moves_are_replayed() {
    // スコットランド・ゲームの出だしから探索できる
    let text = run_script(
        "position startpos moves e2e4 e7e5 g1f3 b8c6 d2d4\ngo depth 2\nquit\n",
    );
    assert!(text.contains("bestmove"), "bestmove missing: {text}");
}

#[test]
fn illegal_move_in_position_is_rejected() {
    let text = run_script("position startpos moves e2e5\ngo depth 1\nquit\n");
    assert!(
        text.contains("Unknown command: illegal move e2e5"),
        "diagnostic missing: {text}"
    );
    // 状態は変わらず、startposから普通に探索できる
    assert!(text.contains("bestmove"), "bestmove missing: {text}");
}
