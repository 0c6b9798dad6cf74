//! TranspositionTable本体
//!
//! - Cluster: 同一インデックスを共有するエントリのグループ
//! - probe / store / new_search / resize
//! - extract_pv / insert_pv
//!
//! エントリの読み書きは競合を許す。probeで返るヒットはkey32の照合を
//! 通ったものだけであり、指し手は利用側で合法性を再検証する。

use super::entry::{TTData, TTEntry};
use super::CLUSTER_SIZE;
use crate::movegen::generate_legal;
use crate::position::Position;
use crate::types::{Bound, Depth, Move, Value, DEPTH_EVAL_ENTRY};
use std::sync::atomic::{AtomicU8, Ordering};

/// 許容する最小サイズ（MB）
const MIN_SIZE_MB: usize = 1;

/// クラスター構造（64バイト = キャッシュライン）
#[repr(C, align(64))]
struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
}

impl Cluster {
    const fn new() -> Self {
        Self {
            entries: [TTEntry::new(), TTEntry::new(), TTEntry::new(), TTEntry::new()],
        }
    }
}

// クラスターは64バイトであることを保証
const _: () = assert!(std::mem::size_of::<Cluster>() == 64);

/// 置換表
pub struct TranspositionTable {
    /// クラスターの配列（要素数は2の冪）
    table: Box<[Cluster]>,
    /// インデックスマスク
    mask: usize,
    /// 世代カウンター
    generation: AtomicU8,
}

impl TranspositionTable {
    /// 新しい置換表を作成（サイズはMB単位）
    pub fn new(mb_size: usize) -> Self {
        let mut tt = Self {
            table: Box::new([]),
            mask: 0,
            generation: AtomicU8::new(0),
        };
        tt.resize(mb_size);
        tt
    }

    /// サイズを変更して全エントリを消す
    ///
    /// 指定サイズに収まる最大の2の冪のクラスター数を確保する。
    /// 確保に失敗したら半分にして再試行し、最小サイズでも失敗したら
    /// 診断を出して終了する。
    pub fn resize(&mut self, mb_size: usize) {
        let mut mb = mb_size.max(MIN_SIZE_MB);

        loop {
            let max_clusters = mb * 1024 * 1024 / std::mem::size_of::<Cluster>();
            let count = if max_clusters.is_power_of_two() {
                max_clusters
            } else {
                max_clusters.next_power_of_two() / 2
            };

            match Self::try_alloc(count) {
                Some(table) => {
                    self.table = table;
                    self.mask = count - 1;
                    self.generation.store(0, Ordering::Relaxed);
                    log::info!(
                        "transposition table: {} clusters ({} MB)",
                        count,
                        count * std::mem::size_of::<Cluster>() / (1024 * 1024)
                    );
                    return;
                }
                None if mb > MIN_SIZE_MB => {
                    log::warn!("transposition table allocation of {mb} MB failed, halving");
                    mb /= 2;
                }
                None => {
                    log::error!("cannot allocate minimum transposition table ({MIN_SIZE_MB} MB)");
                    eprintln!("Fatal: cannot allocate transposition table");
                    std::process::exit(1);
                }
            }
        }
    }

    fn try_alloc(count: usize) -> Option<Box<[Cluster]>> {
        let mut v: Vec<Cluster> = Vec::new();
        if v.try_reserve_exact(count).is_err() {
            return None;
        }
        v.resize_with(count, Cluster::new);
        Some(v.into_boxed_slice())
    }

    /// 全エントリを消す
    pub fn clear(&mut self) {
        self.generation.store(0, Ordering::Relaxed);
        for cluster in self.table.iter() {
            for entry in &cluster.entries {
                entry.clear();
            }
        }
    }

    /// 新しい探索を開始（世代を進める）
    pub fn new_search(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// 現在の世代を取得
    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation.load(Ordering::Relaxed)
    }

    #[inline]
    fn cluster(&self, key: u64) -> &Cluster {
        &self.table[(key as usize) & self.mask]
    }

    #[inline]
    fn key32(key: u64) -> u32 {
        (key >> 32) as u32
    }

    /// 置換表を検索する
    ///
    /// 返るデータのkey照合は済んでいるが、指し手の合法性は
    /// 呼び出し側で検証すること。
    pub fn probe(&self, key: u64) -> Option<TTData> {
        let key32 = Self::key32(key);
        let cluster = self.cluster(key);

        for entry in &cluster.entries {
            if entry.is_occupied() && entry.key32() == key32 {
                let data = entry.read();
                // 競合書き込みでkeyだけ一致した場合を弾く
                if data.key32 == key32 {
                    return Some(data);
                }
            }
        }
        None
    }

    /// 置換表に保存する
    ///
    /// 同じキーのエントリがあれば上書き。なければ空き、
    /// さもなくば(世代, 深さ)が最も古く浅いエントリを犠牲にする。
    pub fn store(&self, key: u64, value: Value, bound: Bound, depth: Depth, mv: Move) {
        let key32 = Self::key32(key);
        let cluster = self.cluster(key);
        let generation = self.generation();

        let mut replace = &cluster.entries[0];
        let mut replace_rank = i32::MAX;

        for entry in &cluster.entries {
            if !entry.is_occupied() || entry.key32() == key32 {
                replace = entry;
                break;
            }

            // 古い世代ほど、浅い探索ほど置換されやすい
            let rank =
                entry.read().depth - 256 * entry.relative_age(generation) as i32;
            if rank < replace_rank {
                replace_rank = rank;
                replace = entry;
            }
        }

        replace.save(key32, value, bound, depth, mv, generation);
    }

    /// 置換表の使用率を1000分率で返す
    pub fn hashfull(&self) -> i32 {
        let generation = self.generation();
        let samples = 1000.min(self.table.len());
        if samples == 0 {
            return 0;
        }

        let mut count = 0;
        for cluster in self.table.iter().take(samples) {
            for entry in &cluster.entries {
                if entry.is_occupied() && entry.relative_age(generation) == 0 {
                    count += 1;
                }
            }
        }
        (count * 1000 / (samples * CLUSTER_SIZE)) as i32
    }

    /// 保存された手をたどってPVを復元する
    ///
    /// 現局面から、合法かつ置換表にヒットする限り指し手を並べる。
    pub fn extract_pv(&self, pos: &mut Position, pv: &mut Vec<Move>, max_len: usize) {
        let mut made = 0;

        while pv.len() < max_len {
            let Some(data) = self.probe(pos.key()) else { break };
            let mv = data.mv;
            if mv.is_none() || !generate_legal(pos).contains(&mv) {
                break;
            }
            pv.push(mv);
            pos.do_move(mv);
            made += 1;

            if pos.is_draw() {
                break;
            }
        }

        // 局面を元に戻す
        for &mv in pv.iter().rev().take(made) {
            pos.undo_move(mv);
        }
    }

    /// PVを置換表に書き戻す
    ///
    /// 探索中に上書きされたPVエントリを、次のイテレーションの
    /// 並べ替えのために復元する。
    pub fn insert_pv(&self, pos: &mut Position, pv: &[Move]) {
        let mut made = 0;

        for &mv in pv {
            if mv.is_none() {
                break;
            }
            let needs_store = self.probe(pos.key()).map_or(true, |d| d.mv != mv);
            if needs_store {
                self.store(pos.key(), Value::NONE, Bound::None, DEPTH_EVAL_ENTRY, mv);
            }
            if !generate_legal(pos).contains(&mv) {
                break;
            }
            pos.do_move(mv);
            made += 1;
        }

        for &mv in pv.iter().rev().skip(pv.len() - made) {
            pos.undo_move(mv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tt_new() {
        let tt = TranspositionTable::new(1);
        assert!(tt.table.len() >= 2);
        assert!(tt.table.len().is_power_of_two());
        assert_eq!(tt.generation(), 0);
    }

    #[test]
    fn test_tt_store_probe_roundtrip() {
        let tt = TranspositionTable::new(1);
        let key = 0x1234_5678_9ABC_DEF0u64;

        assert!(tt.probe(key).is_none());

        let mv = Move::new(
            crate::types::Square::E1,
            crate::types::Square::E8,
        );
        tt.store(key, Value::new(77), Bound::Lower, 10, mv);

        let data = tt.probe(key).expect("stored entry found");
        assert_eq!(data.value, Value::new(77));
        assert_eq!(data.bound, Bound::Lower);
        assert_eq!(data.depth, 10);
        assert_eq!(data.mv, mv);
    }

    #[test]
    fn test_tt_probe_requires_full_key_match(){
        let tt = TranspositionTable::new(1);
        let key = 0xAAAA_BBBB_CCCC_DDDDu64;
        tt.store(key, Value::new(1), Bound::Exact, 4, Move::NONE);

        // 同じクラスターに落ちるがkey32が違うキーはヒットしない
        let other = (key & 0xFFFF_FFFF) | 0x1111_2222_0000_0000;
        assert!(tt.probe(other).is_none());
    }

    #[test]
    fn test_tt_new_search_and_generation() {
        let tt = TranspositionTable::new(1);
        tt.new_search();
        tt.new_search();
        assert_eq!(tt.generation(), 2);

        for _ in 0..300 {
            tt.new_search();
        }
        // u8でラップしても動き続ける
        let _ = tt.generation();
    }

    #[test]
    fn test_tt_clear() {
        let mut tt = TranspositionTable::new(1);
        let key = 42u64;
        tt.store(key, Value::new(5), Bound::Exact, 8, Move::NONE);
        assert!(tt.probe(key).is_some());

        tt.clear();
        assert!(tt.probe(key).is_none());
    }

    #[test]
    fn test_tt_replacement_prefers_old_shallow() {
        let tt = TranspositionTable::new(1);
        let cluster_count = tt.table.len() as u64;

        // 1つのクラスターを同じインデックスの別キーで満たす
        let base = 7u64;
        for i in 0..CLUSTER_SIZE as u64 {
            let key = base + (i + 1) * cluster_count * 0x1_0000_0000;
            tt.store(key, Value::new(i as i32), Bound::Exact, 10 + i as i32, Move::NONE);
        }

        // 追加の store はどれかを犠牲にする（浅いエントリが先に消える）
        let newcomer = base + 99 * cluster_count * 0x1_0000_0000;
        tt.store(newcomer, Value::new(99), Bound::Exact, 20, Move::NONE);
        assert!(tt.probe(newcomer).is_some());
    }

    #[test]
    fn test_tt_resize_clears() {
        let mut tt = TranspositionTable::new(1);
        let key = 99u64;
        tt.store(key, Value::new(5), Bound::Exact, 8, Move::NONE);
        tt.resize(2);
        assert!(tt.probe(key).is_none());
    }

    #[test]
    fn test_extract_pv_walks_legal_moves() {
        let tt = TranspositionTable::new(1);
        let mut pos = Position::startpos();

        // e2e4 e7e5 をPVとして格納
        let e4 = Move::new(
            crate::types::Square::new(crate::types::File::FileE, crate::types::Rank::Rank2),
            crate::types::Square::new(crate::types::File::FileE, crate::types::Rank::Rank4),
        );
        tt.store(pos.key(), Value::ZERO, Bound::Exact, 2, e4);
        pos.do_move(e4);
        let e5 = Move::new(
            crate::types::Square::new(crate::types::File::FileE, crate::types::Rank::Rank7),
            crate::types::Square::new(crate::types::File::FileE, crate::types::Rank::Rank5),
        );
        tt.store(pos.key(), Value::ZERO, Bound::Exact, 1, e5);
        pos.undo_move(e4);

        let key_before = pos.key();
        let mut pv = Vec::new();
        tt.extract_pv(&mut pos, &mut pv, 10);
        assert_eq!(pv, vec![e4, e5]);
        assert_eq!(pos.key(), key_before);
    }

    #[test]
    fn test_insert_pv_reseeds_moves() {
        let tt = TranspositionTable::new(1);
        let mut pos = Position::startpos();
        let d4 = Move::new(
            crate::types::Square::new(crate::types::File::FileD, crate::types::Rank::Rank2),
            crate::types::Square::new(crate::types::File::FileD, crate::types::Rank::Rank4),
        );

        tt.insert_pv(&mut pos, &[d4]);
        let data = tt.probe(pos.key()).expect("pv entry present");
        assert_eq!(data.mv, d4);
    }
}
