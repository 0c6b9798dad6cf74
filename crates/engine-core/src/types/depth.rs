//! 探索深さ（Depth）
//!
//! 1手 = ONE_PLY の分数深さで表す。半手単位の延長・削減を許すため
//! ONE_PLY = 2 とする。

/// 探索深さ
pub type Depth = i32;

/// 1手分の深さ
pub const ONE_PLY: Depth = 2;

/// 最大探索深度（手数単位）
pub const PLY_MAX: i32 = 100;

/// 探索スタック長
pub const PLY_MAX_PLUS_2: usize = (PLY_MAX + 2) as usize;

/// 静的評価キャッシュのエントリに与える深さ
pub const DEPTH_EVAL_ENTRY: Depth = -127 * ONE_PLY;

// 定数間の関係をコンパイル時に検証する
const _: () = {
    assert!(ONE_PLY == 2);
    assert!(PLY_MAX > 0);
    assert!(DEPTH_EVAL_ENTRY < 0);
};
