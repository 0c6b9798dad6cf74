//! Thread pool and split points (Young Brothers Wait Concept)
//!
//! The pool owns the worker threads and the per-thread split-point slot
//! arrays. A split point is addressed by `(thread, slot)` indices instead
//! of pointers, so parent chains and slave bookkeeping never form owning
//! cycles. Shared search data (position, move picker, parent stack,
//! search context) is passed through a split point as raw pointers that
//! stay valid until the master leaves `split()`.
//!
//! Locking discipline:
//! - `book_lock` (global): thread states and slave allocation
//! - per-split-point mutex: alpha / bestValue / move cursor / seed frames
//! - `finished`, `parent`, `slave_mask`, `cpus` are atomics polled
//!   lock-free by the cancellation cascade

use super::types::SearchStack;
use crate::types::{Depth, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Hard upper bound on worker threads
pub const MAX_THREADS: usize = 32;

/// Split-point slots per thread
pub const MAX_ACTIVE_SPLIT_POINTS: usize = 8;

/// Encoded "no split point"
pub const SP_NONE: usize = usize::MAX;

/// Encode a split point address as a single index
#[inline]
pub fn encode_sp(thread: usize, slot: usize) -> usize {
    thread * MAX_ACTIVE_SPLIT_POINTS + slot
}

/// Decode a split point address
#[inline]
pub fn decode_sp(idx: usize) -> (usize, usize) {
    (idx / MAX_ACTIVE_SPLIT_POINTS, idx % MAX_ACTIVE_SPLIT_POINTS)
}

/// Worker thread state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStateKind {
    Initializing = 0,
    Available,
    Booked,
    WorkIsWaiting,
    Searching,
    Terminated,
}

impl ThreadStateKind {
    fn from_u8(v: u8) -> ThreadStateKind {
        match v {
            0 => ThreadStateKind::Initializing,
            1 => ThreadStateKind::Available,
            2 => ThreadStateKind::Booked,
            3 => ThreadStateKind::WorkIsWaiting,
            4 => ThreadStateKind::Searching,
            _ => ThreadStateKind::Terminated,
        }
    }
}

/// Per-thread state
pub struct ThreadState {
    state: AtomicU8,
    /// Ordered to stop by a cutoff above us
    pub stop: AtomicBool,
    /// Number of active split points owned by this thread
    pub active_split_points: AtomicUsize,
    /// Split point this thread currently works under (SP_NONE if none)
    pub current_split_point: AtomicUsize,
    /// Nodes searched by this thread
    pub nodes: AtomicU64,
    /// Maximum ply reached (seldepth)
    pub max_ply: AtomicUsize,
    /// Depth-weighted beta cutoff counters per color
    pub beta_cutoffs: [AtomicU64; 2],
    sleep_lock: Mutex<()>,
    sleep_cond: Condvar,
}

impl ThreadState {
    fn new() -> ThreadState {
        ThreadState {
            state: AtomicU8::new(ThreadStateKind::Initializing as u8),
            stop: AtomicBool::new(false),
            active_split_points: AtomicUsize::new(0),
            current_split_point: AtomicUsize::new(SP_NONE),
            nodes: AtomicU64::new(0),
            max_ply: AtomicUsize::new(0),
            beta_cutoffs: [AtomicU64::new(0), AtomicU64::new(0)],
            sleep_lock: Mutex::new(()),
            sleep_cond: Condvar::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> ThreadStateKind {
        ThreadStateKind::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_state(&self, s: ThreadStateKind) {
        self.state.store(s as u8, Ordering::Release);
    }

    /// Wake the thread from its idle sleep
    pub fn wake_up(&self) {
        let _guard = self.sleep_lock.lock().unwrap();
        self.sleep_cond.notify_one();
    }
}

/// Raw pointers shared through a split point
///
/// Valid from `split()` setup until the master observes `cpus == 0`;
/// slaves only dereference them between being booked and decrementing
/// `cpus`, which is inside that window.
pub struct SpShared {
    /// Master's position at the split node
    pub pos: *const crate::position::Position,
    /// Shared move picker, advanced only under the split-point mutex
    pub mp: *mut super::movepick::MovePicker,
    /// Master's search stack base, for PV propagation
    pub parent_ss: *mut SearchStack,
    /// Type-erased `&SearchContext` of the driving search
    pub ctx: *const (),
}

// SAFETY: the pointers are only dereferenced while the owning master is
// parked inside split(), and all mutation happens under the split-point
// mutex. The pointees are Sync or access-serialized.
unsafe impl Send for SpShared {}

/// Mutable split-point payload, guarded by the mutex
pub struct SpLocked {
    pub master: usize,
    pub pv_node: bool,
    pub depth: Depth,
    pub ply: i32,
    pub alpha: Value,
    pub beta: Value,
    pub best_value: Value,
    /// Futility base of the parent node, precomputed before splitting
    pub futility_base: Value,
    pub move_count: i32,
    pub shared: Option<SpShared>,
    /// Master's stack frames around the split ply, seeded to slaves
    pub seed: [SearchStack; 3],
}

impl SpLocked {
    fn new() -> SpLocked {
        SpLocked {
            master: 0,
            pv_node: false,
            depth: 0,
            ply: 0,
            alpha: Value::ZERO,
            beta: Value::ZERO,
            best_value: Value::ZERO,
            futility_base: Value::ZERO,
            move_count: 0,
            shared: None,
            seed: [SearchStack::empty(); 3],
        }
    }
}

/// The shared fork record
pub struct SplitPoint {
    /// A beta cutoff happened here; slaves must abandon the point
    pub finished: AtomicBool,
    /// Threads still working at this point (master included)
    pub cpus: AtomicUsize,
    /// Bitmask of booked slave threads
    pub slave_mask: AtomicU64,
    /// Encoded parent split point of the master (SP_NONE at the root)
    pub parent: AtomicUsize,
    /// Everything mutated during the shared move loop
    pub locked: Mutex<SpLocked>,
}

impl SplitPoint {
    fn new() -> SplitPoint {
        SplitPoint {
            finished: AtomicBool::new(false),
            cpus: AtomicUsize::new(0),
            slave_mask: AtomicU64::new(0),
            parent: AtomicUsize::new(SP_NONE),
            locked: Mutex::new(SpLocked::new()),
        }
    }

    #[inline]
    pub fn is_slave(&self, thread: usize) -> bool {
        self.slave_mask.load(Ordering::Acquire) & (1 << thread) != 0
    }
}

/// The thread pool
pub struct ThreadPool {
    pub threads: Vec<ThreadState>,
    split_points: Vec<Vec<SplitPoint>>,
    /// Global lock for thread booking and split allocation
    pub book_lock: Mutex<()>,
    active_threads: AtomicUsize,
    all_threads_should_exit: AtomicBool,
    use_sleeping_threads: AtomicBool,
    min_split_depth: AtomicUsize,
    max_threads_per_split_point: AtomicUsize,
}

impl ThreadPool {
    pub fn new() -> ThreadPool {
        let threads = (0..MAX_THREADS).map(|_| ThreadState::new()).collect();
        let split_points = (0..MAX_THREADS)
            .map(|_| (0..MAX_ACTIVE_SPLIT_POINTS).map(|_| SplitPoint::new()).collect())
            .collect();

        ThreadPool {
            threads,
            split_points,
            book_lock: Mutex::new(()),
            active_threads: AtomicUsize::new(1),
            all_threads_should_exit: AtomicBool::new(false),
            use_sleeping_threads: AtomicBool::new(true),
            min_split_depth: AtomicUsize::new(4),
            max_threads_per_split_point: AtomicUsize::new(5),
        }
    }

    #[inline]
    pub fn split_point(&self, thread: usize, slot: usize) -> &SplitPoint {
        &self.split_points[thread][slot]
    }

    #[inline]
    pub fn split_point_at(&self, encoded: usize) -> &SplitPoint {
        let (t, s) = decode_sp(encoded);
        self.split_point(t, s)
    }

    #[inline]
    pub fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::Acquire)
    }

    pub fn set_active_threads(&self, n: usize) {
        self.active_threads.store(n.clamp(1, MAX_THREADS), Ordering::Release);
    }

    #[inline]
    pub fn min_split_depth(&self) -> Depth {
        self.min_split_depth.load(Ordering::Relaxed) as Depth * crate::types::ONE_PLY
    }

    pub fn set_min_split_depth(&self, plies: usize) {
        self.min_split_depth.store(plies, Ordering::Relaxed);
    }

    #[inline]
    pub fn max_threads_per_split_point(&self) -> usize {
        self.max_threads_per_split_point.load(Ordering::Relaxed)
    }

    pub fn set_max_threads_per_split_point(&self, n: usize) {
        self.max_threads_per_split_point.store(n, Ordering::Relaxed);
    }

    pub fn set_use_sleeping_threads(&self, v: bool) {
        self.use_sleeping_threads.store(v, Ordering::Relaxed);
    }

    #[inline]
    pub fn should_exit(&self) -> bool {
        self.all_threads_should_exit.load(Ordering::Acquire)
    }

    /// Total nodes searched by all threads in the current search
    pub fn nodes_searched(&self) -> u64 {
        self.threads.iter().take(self.active_threads()).map(|t| t.nodes.load(Ordering::Relaxed)).sum()
    }

    /// Maximum selective depth over all threads
    pub fn max_ply(&self) -> usize {
        self.threads
            .iter()
            .take(self.active_threads())
            .map(|t| t.max_ply.load(Ordering::Relaxed))
            .max()
            .unwrap_or(0)
    }

    /// Reset per-search counters
    pub fn new_search(&self) {
        for t in &self.threads {
            t.nodes.store(0, Ordering::Relaxed);
            t.max_ply.store(0, Ordering::Relaxed);
            t.stop.store(false, Ordering::Relaxed);
            t.beta_cutoffs[0].store(0, Ordering::Relaxed);
            t.beta_cutoffs[1].store(0, Ordering::Relaxed);
        }
    }

    /// Aggregate depth-weighted beta cutoff counters per color
    pub fn read_beta_counters(&self, us: crate::types::Color) -> (u64, u64) {
        let mut our = 0;
        let mut their = 0;
        for t in self.threads.iter().take(self.active_threads()) {
            our += t.beta_cutoffs[us.index()].load(Ordering::Relaxed);
            their += t.beta_cutoffs[us.opposite().index()].load(Ordering::Relaxed);
        }
        (our, their)
    }

    // =========================================================================
    // Booking
    // =========================================================================

    /// Is `slave` available to help `master` at a new split point?
    ///
    /// A thread that owns active split points may only help with work
    /// that descends from its own top split point (helpful master rule),
    /// otherwise two masters could end up waiting on each other forever.
    pub fn thread_is_available(&self, slave: usize, master: usize) -> bool {
        if slave == master || self.threads[slave].state() != ThreadStateKind::Available {
            return false;
        }

        let local_active = self.threads[slave].active_split_points.load(Ordering::Acquire);
        if local_active == 0 {
            return true;
        }

        if self.active_threads() == 2 {
            return true;
        }

        // Helpful master: the top split point of `slave` must already
        // count `master` among its workers
        self.split_point(slave, local_active - 1).is_slave(master)
    }

    /// Does any thread qualify as a slave for `master`?
    pub fn idle_thread_exists(&self, master: usize) -> bool {
        (0..self.active_threads()).any(|i| self.thread_is_available(i, master))
    }

    /// Must this thread abandon its current work?
    ///
    /// True when the thread was told to stop directly, or when a beta
    /// cutoff finished any split point between it and the root.
    pub fn cutoff_occurred(&self, thread: usize) -> bool {
        if self.threads[thread].stop.load(Ordering::Relaxed) {
            return true;
        }
        if self.active_threads() < 2 {
            return false;
        }

        let mut sp_idx = self.threads[thread].current_split_point.load(Ordering::Acquire);
        while sp_idx != SP_NONE {
            let sp = self.split_point_at(sp_idx);
            if sp.finished.load(Ordering::Acquire) {
                self.threads[thread].stop.store(true, Ordering::Relaxed);
                return true;
            }
            sp_idx = sp.parent.load(Ordering::Acquire);
        }
        false
    }

    /// Wake every active worker (start of a new search)
    pub fn wake_sleeping_threads(&self) {
        for i in 1..self.active_threads() {
            self.threads[i].wake_up();
        }
    }

    /// Park in the idle loop until work arrives or exit is ordered
    ///
    /// Workers call this with `wait_for = None`. A master that just set
    /// up a split point calls it with its own split point: the loop then
    /// returns once every participant has left (`cpus == 0`).
    pub fn idle_wait(&self, thread: usize, wait_for: Option<usize>) -> IdleEvent {
        loop {
            if self.should_exit() && wait_for.is_none() && thread != 0 {
                return IdleEvent::Exit;
            }

            if self.threads[thread].state() == ThreadStateKind::WorkIsWaiting {
                self.threads[thread].set_state(ThreadStateKind::Searching);
                return IdleEvent::Work;
            }

            if let Some(sp_idx) = wait_for {
                if self.split_point_at(sp_idx).cpus.load(Ordering::Acquire) == 0 {
                    return IdleEvent::SplitPointDone;
                }
                // Masters spin: they return as soon as the last slave leaves
                std::hint::spin_loop();
                continue;
            }

            if self.use_sleeping_threads.load(Ordering::Relaxed) {
                let guard = self.threads[thread].sleep_lock.lock().unwrap();
                // Re-check under the lock to avoid a lost wakeup
                if self.threads[thread].state() == ThreadStateKind::Available
                    && !self.should_exit()
                {
                    let _unused = self
                        .threads[thread]
                        .sleep_cond
                        .wait_timeout(guard, Duration::from_millis(2))
                        .unwrap();
                }
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Order every worker to exit and wake them up
    pub fn request_exit(&self) {
        self.all_threads_should_exit.store(true, Ordering::Release);
        for t in &self.threads {
            t.stop.store(true, Ordering::Relaxed);
            t.wake_up();
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

/// What ended an idle wait
#[derive(Debug, PartialEq, Eq)]
pub enum IdleEvent {
    /// A split point booked us; run its search
    Work,
    /// All participants left the awaited split point (masters only)
    SplitPointDone,
    /// The pool is shutting down
    Exit,
}

/// Handle set for the spawned worker OS threads
pub struct WorkerHandles {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandles {
    pub fn none() -> WorkerHandles {
        WorkerHandles { handles: Vec::new() }
    }

    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Spawn helper threads 1..n (thread 0 is the caller)
    ///
    /// Exits the process when a thread cannot be created.
    pub fn spawn(pool: &Arc<ThreadPool>, n: usize) -> WorkerHandles {
        let mut handles = Vec::new();
        for id in 1..n {
            let pool = Arc::clone(pool);
            // Deep recursion below a split point needs a roomy stack
            let builder = std::thread::Builder::new()
                .name(format!("search-worker-{id}"))
                .stack_size(8 * 1024 * 1024);
            match builder.spawn(move || super::search::worker_loop(pool, id)) {
                Ok(h) => handles.push(h),
                Err(e) => {
                    log::error!("failed to create thread {id}: {e}");
                    eprintln!("Failed to create search thread {id}");
                    std::process::exit(1);
                }
            }
        }
        WorkerHandles { handles }
    }

    /// Join all workers after `request_exit`
    pub fn join(&mut self) {
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sp_encoding_roundtrip() {
        for t in [0usize, 3, MAX_THREADS - 1] {
            for s in [0usize, 7] {
                let (dt, ds) = decode_sp(encode_sp(t, s));
                assert_eq!((dt, ds), (t, s));
            }
        }
    }

    #[test]
    fn test_thread_availability_rules() {
        let pool = ThreadPool::new();
        pool.set_active_threads(4);
        for i in 0..4 {
            pool.threads[i].set_state(ThreadStateKind::Available);
        }

        // A thread is never available to itself
        assert!(!pool.thread_is_available(1, 1));
        assert!(pool.thread_is_available(1, 0));

        // A busy thread is not available
        pool.threads[2].set_state(ThreadStateKind::Searching);
        assert!(!pool.thread_is_available(2, 0));

        // Helpful master: thread 1 owns a split point that does not
        // include thread 3, so it cannot help thread 3
        pool.threads[1].active_split_points.store(1, Ordering::Relaxed);
        pool.split_point(1, 0).slave_mask.store(0, Ordering::Relaxed);
        assert!(!pool.thread_is_available(1, 3));

        // but it can help a thread registered at its top split point
        pool.split_point(1, 0).slave_mask.store(1 << 3, Ordering::Relaxed);
        assert!(pool.thread_is_available(1, 3));
    }

    #[test]
    fn test_cutoff_cascade() {
        let pool = ThreadPool::new();
        pool.set_active_threads(4);

        // Build a parent chain: sp(0,0) <- sp(1,0); thread 2 works at sp(1,0)
        pool.split_point(1, 0)
            .parent
            .store(encode_sp(0, 0), Ordering::Release);
        pool.threads[2]
            .current_split_point
            .store(encode_sp(1, 0), Ordering::Release);

        assert!(!pool.cutoff_occurred(2));

        // A cutoff at the grandparent must stop thread 2
        pool.split_point(0, 0).finished.store(true, Ordering::Release);
        assert!(pool.cutoff_occurred(2));
        assert!(pool.threads[2].stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_idle_thread_exists() {
        let pool = ThreadPool::new();
        pool.set_active_threads(2);
        pool.threads[1].set_state(ThreadStateKind::Searching);
        assert!(!pool.idle_thread_exists(0));

        pool.threads[1].set_state(ThreadStateKind::Available);
        assert!(pool.idle_thread_exists(0));
    }

    #[test]
    fn test_new_search_resets_counters() {
        let pool = ThreadPool::new();
        pool.threads[0].nodes.store(123, Ordering::Relaxed);
        pool.threads[0].stop.store(true, Ordering::Relaxed);
        pool.new_search();
        assert_eq!(pool.threads[0].nodes.load(Ordering::Relaxed), 0);
        assert!(!pool.threads[0].stop.load(Ordering::Relaxed));
    }
}
