//! 時間管理
//!
//! 残り時間と加算時間から今回の思考時間を割り当てる。
//! 割り当ては2段階: 通常の持ち時間（MaxSearchTime）と、
//! これを超えたら即座に打ち切る上限（AbsoluteMaxSearchTime）。

use super::limits::LimitsType;
use crate::types::Color;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// 時間管理の状態
///
/// 探索スレッド（thread 0）が経過時間の判定に読み、
/// 反復深化ドライバがイテレーション間にextraを更新する。
pub struct TimeManager {
    start: Instant,
    /// 通常の思考時間（ミリ秒、0 = 時間管理なし）
    max_search_time: i64,
    /// 絶対上限（ミリ秒）
    absolute_max_search_time: i64,
    /// 最善手が揺れているときの追加時間（イテレーション間に更新される）
    extra_search_time: AtomicI64,
    /// 時間管理を使うか
    use_time_management: bool,
}

impl TimeManager {
    /// 探索開始時に割り当てを計算する
    pub fn new(limits: &LimitsType, us: Color, ponder_enabled: bool) -> TimeManager {
        let my_time = limits.time_for(us);
        let my_inc = limits.inc_for(us);
        let mtg = limits.moves_to_go as i64;

        let (mut max, absolute) = if !limits.use_time_management() {
            (0, 0)
        } else if mtg == 0 {
            // sudden death
            if my_inc > 0 {
                (my_time / 30 + my_inc, (my_time / 4).max(my_inc - 100))
            } else {
                (my_time / 30, my_time / 8)
            }
        } else if mtg == 1 {
            // 最後の1手: 余裕を残して全部使う
            let abs = if my_time > 3000 { my_time - 500 } else { my_time * 3 / 4 };
            (my_time / 2, abs)
        } else {
            let max = my_time / mtg.min(20);
            let abs = (4 * my_time / mtg).min(my_time / 3);
            (max, abs)
        };

        // ponder有効時は少し厚めに使う
        if ponder_enabled && max > 0 {
            max += max / 4;
            max = max.min(absolute);
        }

        TimeManager {
            start: Instant::now(),
            max_search_time: max,
            absolute_max_search_time: absolute,
            extra_search_time: AtomicI64::new(0),
            use_time_management: limits.use_time_management(),
        }
    }

    /// 探索開始からの経過時間（ミリ秒）
    #[inline]
    pub fn elapsed(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    #[inline]
    pub fn use_time_management(&self) -> bool {
        self.use_time_management
    }

    #[inline]
    pub fn max_search_time(&self) -> i64 {
        self.max_search_time
    }

    #[inline]
    pub fn absolute_max_search_time(&self) -> i64 {
        self.absolute_max_search_time
    }

    #[inline]
    pub fn extra_search_time(&self) -> i64 {
        self.extra_search_time.load(Ordering::Relaxed)
    }

    /// 追加時間を設定する（最善手の揺れに応じてドライバが呼ぶ）
    pub fn set_extra_search_time(&self, extra: i64) {
        self.extra_search_time.store(extra, Ordering::Relaxed);
    }

    /// 通常割り当てを使い切ったか
    #[inline]
    pub fn over_allocated(&self) -> bool {
        self.use_time_management
            && self.elapsed() > self.max_search_time + self.extra_search_time()
    }

    /// 絶対上限を超えたか
    #[inline]
    pub fn over_absolute(&self) -> bool {
        self.use_time_management && self.elapsed() > self.absolute_max_search_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits_with_time(ms: i64) -> LimitsType {
        LimitsType {
            time: [ms, ms],
            ..Default::default()
        }
    }

    #[test]
    fn test_sudden_death_allocation() {
        let tm = TimeManager::new(&limits_with_time(60_000), Color::White, false);
        assert_eq!(tm.max_search_time(), 2_000);
        assert_eq!(tm.absolute_max_search_time(), 7_500);
    }

    #[test]
    fn test_increment_allocation() {
        let mut limits = limits_with_time(60_000);
        limits.inc[0] = 1_000;
        let tm = TimeManager::new(&limits, Color::White, false);
        assert_eq!(tm.max_search_time(), 60_000 / 30 + 1_000);
        assert_eq!(tm.absolute_max_search_time(), 15_000);
    }

    #[test]
    fn test_moves_to_go_allocation() {
        let mut limits = limits_with_time(60_000);
        limits.moves_to_go = 10;
        let tm = TimeManager::new(&limits, Color::White, false);
        assert_eq!(tm.max_search_time(), 6_000);
        assert_eq!(tm.absolute_max_search_time(), 20_000);
    }

    #[test]
    fn test_last_move_allocation() {
        let mut limits = limits_with_time(10_000);
        limits.moves_to_go = 1;
        let tm = TimeManager::new(&limits, Color::White, false);
        assert_eq!(tm.max_search_time(), 5_000);
        assert_eq!(tm.absolute_max_search_time(), 9_500);
    }

    #[test]
    fn test_no_time_management() {
        let tm = TimeManager::new(&LimitsType::default(), Color::White, false);
        assert!(!tm.use_time_management());
        assert!(!tm.over_allocated());
        assert!(!tm.over_absolute());
    }

    #[test]
    fn test_ponder_bonus_capped() {
        let tm = TimeManager::new(&limits_with_time(60_000), Color::White, true);
        assert_eq!(tm.max_search_time(), 2_500);
        assert!(tm.max_search_time() <= tm.absolute_max_search_time());
    }
}
