//! Host primitive layer.
//!
//! The "native" objects the emulation builds on, expressed with
//! `parking_lot`: a recursive exclusive lock, a condition variable bound to
//! that lock, an owner-aware reader/writer lock, an N-party barrier, and a
//! fixed-capacity table of thread-local slots.
//!
//! Ownership is tracked with a per-thread token rather than
//! `std::thread::current()`, so every primitive stays usable from
//! thread-exit destructors.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::{PthreadError, Result};

// ---------------------------------------------------------------------------
// Owner tokens
// ---------------------------------------------------------------------------

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Const-initialized and drop-free, so it stays readable during TLS teardown.
    static TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Non-zero token unique to the calling thread for the life of the process.
#[must_use]
pub fn owner_token() -> u64 {
    TOKEN.with(|t| {
        let v = t.get();
        if v != 0 {
            return v;
        }
        let fresh = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        t.set(fresh);
        fresh
    })
}

// ---------------------------------------------------------------------------
// Recursive mutex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Ownership {
    owner: u64,
    depth: usize,
}

/// Recursive exclusive lock.
#[derive(Debug, Default)]
pub struct HostMutex {
    state: Mutex<Ownership>,
    released: Condvar,
}

impl HostMutex {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Ownership { owner: 0, depth: 0 }),
            released: Condvar::new(),
        }
    }

    /// Blocks until acquired. Re-entry by the owner nests.
    pub fn lock(&self) -> Result<()> {
        let me = owner_token();
        let mut st = self.state.lock();
        if st.owner == me {
            st.depth = st
                .depth
                .checked_add(1)
                .ok_or(PthreadError::ResourceExhausted)?;
            return Ok(());
        }
        while st.owner != 0 {
            self.released.wait(&mut st);
        }
        st.owner = me;
        st.depth = 1;
        Ok(())
    }

    /// Acquires without blocking; `Busy` if another thread owns it.
    pub fn try_lock(&self) -> Result<()> {
        let me = owner_token();
        let mut st = self.state.lock();
        if st.owner == me {
            st.depth = st
                .depth
                .checked_add(1)
                .ok_or(PthreadError::ResourceExhausted)?;
            Ok(())
        } else if st.owner == 0 {
            st.owner = me;
            st.depth = 1;
            Ok(())
        } else {
            Err(PthreadError::Busy)
        }
    }

    /// Releases one nesting level. `NotPermitted` unless the caller owns it.
    pub fn unlock(&self) -> Result<()> {
        let mut st = self.state.lock();
        if st.owner != owner_token() {
            return Err(PthreadError::NotPermitted);
        }
        st.depth -= 1;
        if st.depth == 0 {
            st.owner = 0;
            self.released.notify_one();
        }
        Ok(())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner != 0
    }

    #[must_use]
    pub fn held_by_caller(&self) -> bool {
        self.state.lock().owner == owner_token()
    }

    /// Drops every nesting level held by the caller, returning the depth.
    fn release_all(&self) -> Result<usize> {
        let mut st = self.state.lock();
        if st.owner != owner_token() {
            return Err(PthreadError::NotPermitted);
        }
        let depth = st.depth;
        st.owner = 0;
        st.depth = 0;
        self.released.notify_one();
        Ok(depth)
    }

    /// Blocks until acquired, then restores a depth saved by `release_all`.
    fn reacquire(&self, depth: usize) {
        let me = owner_token();
        let mut st = self.state.lock();
        while st.owner != 0 {
            self.released.wait(&mut st);
        }
        st.owner = me;
        st.depth = depth;
    }
}

// ---------------------------------------------------------------------------
// Condition variable
// ---------------------------------------------------------------------------

/// Outcome of a [`HostCondvar::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Condition variable paired with [`HostMutex`].
///
/// Each signal bumps a sequence number under the condvar's own lock. A
/// waiter records the sequence before releasing the mutex, so a signal
/// issued after the release can never be missed.
#[derive(Debug, Default)]
pub struct HostCondvar {
    seq: Mutex<u64>,
    cv: Condvar,
}

impl HostCondvar {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Releases every level of `mutex`, waits for a signal or `deadline`, and
    /// reacquires `mutex` at its original depth before returning.
    pub fn wait(&self, mutex: &HostMutex, deadline: Option<Instant>) -> Result<WaitOutcome> {
        let mut seq = self.seq.lock();
        let start = *seq;
        let depth = mutex.release_all()?;
        let mut outcome = WaitOutcome::Signaled;
        while *seq == start {
            match deadline {
                None => self.cv.wait(&mut seq),
                Some(at) => {
                    if self.cv.wait_until(&mut seq, at).timed_out() {
                        if *seq == start {
                            outcome = WaitOutcome::TimedOut;
                        }
                        break;
                    }
                }
            }
        }
        drop(seq);
        mutex.reacquire(depth);
        Ok(outcome)
    }

    pub fn notify_one(&self) {
        let mut seq = self.seq.lock();
        *seq = seq.wrapping_add(1);
        self.cv.notify_one();
    }

    pub fn notify_all(&self) {
        let mut seq = self.seq.lock();
        *seq = seq.wrapping_add(1);
        self.cv.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Reader/writer lock
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RwState {
    readers: usize,
    writer: u64,
    writer_depth: usize,
}

impl RwState {
    fn shared_ok(&self, me: u64) -> bool {
        self.writer == 0 || self.writer == me
    }

    fn exclusive_ok(&self, me: u64, own_shared: usize) -> bool {
        (self.writer == 0 || self.writer == me) && self.readers == own_shared
    }
}

/// Owner-aware reader/writer lock.
///
/// A thread may nest shared and exclusive levels in stack order: the writer
/// can take shared levels, and a reader whose levels are the only shared
/// holders can take an exclusive one. `own_shared` is the number of shared
/// levels the caller already holds, supplied by the caller's mode trail.
#[derive(Debug, Default)]
pub struct HostRwLock {
    state: Mutex<RwState>,
    changed: Condvar,
}

impl HostRwLock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RwState {
                readers: 0,
                writer: 0,
                writer_depth: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn lock_shared(&self) {
        let me = owner_token();
        let mut st = self.state.lock();
        while !st.shared_ok(me) {
            self.changed.wait(&mut st);
        }
        st.readers += 1;
    }

    pub fn try_lock_shared(&self) -> bool {
        let mut st = self.state.lock();
        if st.shared_ok(owner_token()) {
            st.readers += 1;
            true
        } else {
            false
        }
    }

    pub fn lock_exclusive(&self, own_shared: usize) {
        let me = owner_token();
        let mut st = self.state.lock();
        while !st.exclusive_ok(me, own_shared) {
            self.changed.wait(&mut st);
        }
        st.writer = me;
        st.writer_depth += 1;
    }

    pub fn try_lock_exclusive(&self, own_shared: usize) -> bool {
        let me = owner_token();
        let mut st = self.state.lock();
        if st.exclusive_ok(me, own_shared) {
            st.writer = me;
            st.writer_depth += 1;
            true
        } else {
            false
        }
    }

    pub fn unlock_shared(&self) {
        let mut st = self.state.lock();
        st.readers = st.readers.saturating_sub(1);
        self.changed.notify_all();
    }

    pub fn unlock_exclusive(&self) {
        let mut st = self.state.lock();
        st.writer_depth = st.writer_depth.saturating_sub(1);
        if st.writer_depth == 0 {
            st.writer = 0;
        }
        self.changed.notify_all();
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        let st = self.state.lock();
        st.readers != 0 || st.writer != 0
    }
}

// ---------------------------------------------------------------------------
// Barrier
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BarrierState {
    arrived: u32,
    generation: u64,
}

/// Reusable N-party rendezvous. The last arrival of each generation is the
/// serial one.
#[derive(Debug)]
pub struct HostBarrier {
    parties: u32,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl HostBarrier {
    /// `parties` must be non-zero; the caller validates it.
    #[must_use]
    pub const fn new(parties: u32) -> Self {
        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        }
    }

    #[must_use]
    pub fn parties(&self) -> u32 {
        self.parties
    }

    /// Returns true for exactly one arrival per generation.
    pub fn wait(&self) -> bool {
        let mut st = self.state.lock();
        let generation = st.generation;
        st.arrived += 1;
        if st.arrived >= self.parties {
            st.arrived = 0;
            st.generation = st.generation.wrapping_add(1);
            self.released.notify_all();
            return true;
        }
        while st.generation == generation {
            self.released.wait(&mut st);
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Thread-local slots
// ---------------------------------------------------------------------------

/// Capacity of the host slot table.
pub const HOST_TLS_SLOTS: usize = 1088;

static SLOT_GENERATION: [AtomicU32; HOST_TLS_SLOTS] =
    [const { AtomicU32::new(0) }; HOST_TLS_SLOTS];
static SLOT_IN_USE: Mutex<[bool; HOST_TLS_SLOTS]> = Mutex::new([false; HOST_TLS_SLOTS]);

/// Handle to an allocated host slot.
///
/// Every allocation and free bumps the slot's generation, so values a thread
/// stored under an earlier incarnation read back as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlsSlot {
    index: u16,
    generation: u32,
}

impl TlsSlot {
    /// Claims a free slot; `ResourceExhausted` when the table is full.
    pub fn alloc() -> Result<Self> {
        let mut in_use = SLOT_IN_USE.lock();
        let index = in_use
            .iter()
            .position(|used| !used)
            .ok_or(PthreadError::ResourceExhausted)?;
        in_use[index] = true;
        let generation = SLOT_GENERATION[index].fetch_add(1, Ordering::AcqRel) + 1;
        Ok(Self {
            index: index as u16,
            generation,
        })
    }

    /// Returns the slot to the table. Stale or double frees are ignored.
    pub fn free(self) {
        let mut in_use = SLOT_IN_USE.lock();
        let i = usize::from(self.index);
        if in_use[i] && self.is_live() {
            SLOT_GENERATION[i].fetch_add(1, Ordering::AcqRel);
            in_use[i] = false;
        }
    }

    #[must_use]
    pub fn is_live(self) -> bool {
        SLOT_GENERATION[usize::from(self.index)].load(Ordering::Acquire) == self.generation
    }

    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.index)
    }

    /// Packs the handle into a non-zero word for lock-free publication.
    #[must_use]
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | (u64::from(self.index) << 1) | 1
    }

    /// Inverse of [`TlsSlot::to_bits`]; `None` for zero or out-of-range words.
    #[must_use]
    pub fn from_bits(bits: u64) -> Option<Self> {
        if bits & 1 == 0 {
            return None;
        }
        let index = ((bits >> 1) & 0xffff) as u16;
        if usize::from(index) >= HOST_TLS_SLOTS {
            return None;
        }
        Some(Self {
            index,
            generation: (bits >> 32) as u32,
        })
    }
}

/// Number of slots currently allocated.
#[must_use]
pub fn slots_in_use() -> usize {
    SLOT_IN_USE.lock().iter().filter(|used| **used).count()
}

/// One thread's slot values, tagged with the generation they were stored under.
#[derive(Debug, Default)]
pub struct SlotTable {
    entries: Vec<(u32, usize)>,
}

impl SlotTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, slot: TlsSlot) -> usize {
        match self.entries.get(slot.index()) {
            Some(&(generation, value)) if generation == slot.generation => value,
            _ => 0,
        }
    }

    pub fn set(&mut self, slot: TlsSlot, value: usize) {
        let i = slot.index();
        if self.entries.len() <= i {
            self.entries.resize(i + 1, (0, 0));
        }
        self.entries[i] = (slot.generation, value);
    }

    /// Reads and clears the value.
    pub fn take(&mut self, slot: TlsSlot) -> usize {
        let value = self.get(slot);
        if value != 0 {
            self.entries[slot.index()].1 = 0;
        }
        value
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|&(_, v)| v == 0)
    }
}
