//! History / Gains統計
//!
//! (駒, 移動先)ごとの成功・失敗とeval変動の最大値を記録し、
//! 手の順序付けとfutility枝刈りに使う。全スレッドで共有され、
//! 更新はRelaxedなatomic操作で行う（取りこぼしは許容する）。

use crate::types::{Depth, Move, Piece, Square, Value, ONE_PLY};

use std::sync::atomic::{AtomicI32, Ordering};

/// historyの飽和上限
const HISTORY_MAX: i32 = 50_000;

/// テーブル長（駒16 × マス64）
const TABLE_SIZE: usize = Piece::NUM * Square::NUM;

/// History統計本体
pub struct History {
    /// 順序付け用スコア
    history: Vec<AtomicI32>,
    /// beta cutoffを出した回数
    success: Vec<AtomicI32>,
    /// cutoffを出せなかった回数
    failure: Vec<AtomicI32>,
    /// 静的評価の最大上昇幅
    gains: Vec<AtomicI32>,
}

#[inline]
fn index(pc: Piece, to: Square) -> usize {
    pc.index() * Square::NUM + to.index()
}

fn new_table() -> Vec<AtomicI32> {
    let mut v = Vec::with_capacity(TABLE_SIZE);
    for _ in 0..TABLE_SIZE {
        v.push(AtomicI32::new(0));
    }
    v
}

impl History {
    pub fn new() -> History {
        History {
            history: new_table(),
            success: new_table(),
            failure: new_table(),
            gains: new_table(),
        }
    }

    /// 全テーブルをクリアする
    pub fn clear(&self) {
        for t in [&self.history, &self.success, &self.failure, &self.gains] {
            for cell in t.iter() {
                cell.store(0, Ordering::Relaxed);
            }
        }
    }

    /// beta cutoffを出した静かな手を加点する（depth²）
    pub fn success(&self, pc: Piece, to: Square, depth: Depth) {
        let d = depth / ONE_PLY;
        let i = index(pc, to);
        let new = self.history[i].fetch_add(d * d, Ordering::Relaxed) + d * d;
        self.success[i].fetch_add(1, Ordering::Relaxed);

        // 飽和したら全体を半減してオーバーフローを防ぐ
        if new >= HISTORY_MAX {
            for cell in self.history.iter() {
                let v = cell.load(Ordering::Relaxed);
                cell.store(v / 2, Ordering::Relaxed);
            }
        }
    }

    /// cutoffに至らなかった静かな手を減点する
    pub fn failure(&self, pc: Piece, to: Square, depth: Depth) {
        let d = depth / ONE_PLY;
        let i = index(pc, to);
        self.history[i].fetch_sub(d * d, Ordering::Relaxed);
        self.failure[i].fetch_add(1, Ordering::Relaxed);
    }

    /// 順序付け用スコア
    #[inline]
    pub fn score(&self, pc: Piece, to: Square) -> i32 {
        self.history[index(pc, to)].load(Ordering::Relaxed)
    }

    /// 失敗が成功を大きく上回る手か（move count枝刈りの補助）
    pub fn ok_to_prune(&self, pc: Piece, to: Square, depth: Depth) -> bool {
        let i = index(pc, to);
        let d = depth / ONE_PLY;
        d * self.success[i].load(Ordering::Relaxed) < self.failure[i].load(Ordering::Relaxed)
    }

    /// 静かな手のeval上昇幅を記録する
    ///
    /// 更新則: 新しい値が現在値以上なら置き換え、でなければ1減らす。
    pub fn set_gain(&self, pc: Piece, to: Square, gain: Value) {
        let i = index(pc, to);
        let old = self.gains[i].load(Ordering::Relaxed);
        let new = if gain.raw() >= old { gain.raw() } else { old - 1 };
        self.gains[i].store(new, Ordering::Relaxed);
    }

    /// 記録されたeval上昇幅
    #[inline]
    pub fn gain(&self, pc: Piece, to: Square) -> Value {
        Value::new(self.gains[index(pc, to)].load(Ordering::Relaxed))
    }

    /// 静かな手のgain更新（直前の手のeval差から）
    pub fn update_gain(&self, pc: Piece, m: Move, captured: Piece, before: Value, after: Value) {
        if m.is_some()
            && m != Move::NULL
            && before != Value::NONE
            && after != Value::NONE
            && captured.is_none()
            && !m.is_promotion()
            && !m.is_castle()
        {
            self.set_gain(pc, m.to(), -(before + after));
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, PieceType};

    fn wn() -> Piece {
        Piece::new(Color::White, PieceType::Knight)
    }

    #[test]
    fn test_history_success_failure() {
        let h = History::new();
        let to = Square::from_index(28).unwrap();

        h.success(wn(), to, 4 * ONE_PLY);
        assert_eq!(h.score(wn(), to), 16);

        h.failure(wn(), to, 2 * ONE_PLY);
        assert_eq!(h.score(wn(), to), 12);
    }

    #[test]
    fn test_history_clear() {
        let h = History::new();
        let to = Square::from_index(0).unwrap();
        h.success(wn(), to, 6 * ONE_PLY);
        h.clear();
        assert_eq!(h.score(wn(), to), 0);
    }

    #[test]
    fn test_history_saturation_rescales() {
        let h = History::new();
        let to = Square::from_index(10).unwrap();
        // depth² = 10000 を6回で上限を超える
        for _ in 0..6 {
            h.success(wn(), to, 100 * ONE_PLY);
        }
        assert!(h.score(wn(), to) < HISTORY_MAX);
    }

    #[test]
    fn test_ok_to_prune() {
        let h = History::new();
        let to = Square::from_index(20).unwrap();
        for _ in 0..10 {
            h.failure(wn(), to, ONE_PLY);
        }
        assert!(h.ok_to_prune(wn(), to, 2 * ONE_PLY));

        for _ in 0..20 {
            h.success(wn(), to, ONE_PLY);
        }
        assert!(!h.ok_to_prune(wn(), to, 2 * ONE_PLY));
    }

    #[test]
    fn test_gains() {
        let h = History::new();
        let to = Square::from_index(30).unwrap();
        h.set_gain(wn(), to, Value::new(50));
        assert_eq!(h.gain(wn(), to), Value::new(50));

        // 小さい値では1ずつ減衰する
        h.set_gain(wn(), to, Value::new(10));
        assert_eq!(h.gain(wn(), to), Value::new(49));
    }
}
