//! 探索制限（LimitsType）

use crate::types::{Color, Move};

/// goコマンドで渡される探索制限
#[derive(Clone, Debug, Default)]
pub struct LimitsType {
    /// 残り時間（ミリ秒、手番別）
    pub time: [i64; 2],
    /// 加算時間（ミリ秒、手番別）
    pub inc: [i64; 2],
    /// 次の時間制御までの手数（0 = sudden death）
    pub moves_to_go: i32,
    /// 固定深さ（0 = 制限なし）
    pub depth: i32,
    /// ノード数制限（0 = 制限なし）
    pub nodes: u64,
    /// 1手の固定時間（ミリ秒、0 = 制限なし）
    pub move_time: i64,
    /// 無制限探索（stopまで続ける）
    pub infinite: bool,
    /// ponder探索として開始する
    pub ponder: bool,
    /// ルートで探索する手の制限（空 = 全合法手）
    pub search_moves: Vec<Move>,
}

impl LimitsType {
    /// 時間管理を使うか
    pub fn use_time_management(&self) -> bool {
        !self.infinite
            && self.move_time == 0
            && self.depth == 0
            && self.nodes == 0
            && (self.time[0] != 0 || self.time[1] != 0)
    }

    /// 手番側の残り時間
    #[inline]
    pub fn time_for(&self, c: Color) -> i64 {
        self.time[c.index()]
    }

    /// 手番側の加算時間
    #[inline]
    pub fn inc_for(&self, c: Color) -> i64 {
        self.inc[c.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_time_management() {
        let mut limits = LimitsType::default();
        assert!(!limits.use_time_management());

        limits.time[0] = 60_000;
        assert!(limits.use_time_management());

        limits.depth = 10;
        assert!(!limits.use_time_management());

        limits.depth = 0;
        limits.infinite = true;
        assert!(!limits.use_time_management());
    }
}
