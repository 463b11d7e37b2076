//! Thread lifecycle: create, join, detach, exit, and cooperative cancellation.
//!
//! ## Architecture
//!
//! Each thread gets a [`ControlBlock`] shared between its [`Thread`] handles,
//! the live-thread table, and the thread's own "self" slot. The host thread
//! runs a trampoline that installs "self", runs the start routine under
//! `catch_unwind`, and then runs the exit path:
//!
//! 1. remaining cleanup handlers, innermost first;
//! 2. key destructors for the thread's non-null values;
//! 3. detached threads release their block; joinable ones record the exit
//!    status for the joiner.
//!
//! [`exit`] unwinds back to the trampoline with a private payload, so scoped
//! cleanup guards fire on the way. Cancellation is a flag polled by
//! [`test_cancel`]; asynchronous cancellation is not supported.
//!
//! Numeric ids are process-unique and never reused. The C boundary hands
//! them out as `pthread_t`; ids leave the live table on join or detached
//! release, so stale ones report `NoSuchThread`.

use core::fmt;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::config::LogLevel;
use crate::error::{PthreadError, Result};
use crate::log;

use super::attr::{
    self, CancelState, CancelType, DetachState, PTHREAD_CANCELED, SchedParam, ThreadAttr,
};
use super::{cleanup, local, tls};

// ---------------------------------------------------------------------------
// Lifecycle phase
// ---------------------------------------------------------------------------

const PHASE_RUNNING: u8 = 0;
const PHASE_EXITED: u8 = 1;
const PHASE_JOINED: u8 = 2;
const PHASE_RELEASED: u8 = 3;

/// Where a thread is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Start routine still running (possibly with a cancel pending).
    Running,
    /// Exit path done; a joinable thread waits here for its joiner.
    Exited,
    /// Exit status consumed by `join`.
    Joined,
    /// Detached thread finished and dropped from the live table.
    Released,
}

impl Phase {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            PHASE_EXITED => Self::Exited,
            PHASE_JOINED => Self::Joined,
            PHASE_RELEASED => Self::Released,
            _ => Self::Running,
        }
    }
}

/// How a thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Returned from the start routine or passed to [`exit`].
    Value(usize),
    /// Acted on a cancellation request.
    Canceled,
}

impl ExitStatus {
    /// The `void *` value a C joiner observes.
    #[must_use]
    pub const fn as_raw(self) -> usize {
        match self {
            Self::Value(v) => v,
            Self::Canceled => PTHREAD_CANCELED,
        }
    }
}

/// Unwind payload carrying the status from [`exit`] to the trampoline.
struct ExitRequest(ExitStatus);

// ---------------------------------------------------------------------------
// Control block
// ---------------------------------------------------------------------------

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Live threads by id. Lock order: a block's `exit` lock, then this one.
static LIVE: Mutex<BTreeMap<u64, Thread>> = Mutex::new(BTreeMap::new());

/// Per-thread lifecycle record.
pub struct ControlBlock {
    id: u64,
    /// Obtained a block through [`current`] rather than [`create`].
    adopted: bool,
    detached: AtomicBool,
    cancel_state: AtomicI32,
    cancel_type: AtomicI32,
    canceled: AtomicBool,
    sched: Mutex<SchedParam>,
    concurrency: AtomicI32,
    phase: AtomicU8,
    /// Exit status; also serializes phase transitions.
    exit: Mutex<Option<ExitStatus>>,
    host: Mutex<Option<JoinHandle<()>>>,
}

impl ControlBlock {
    fn new(adopted: bool, detached: bool, sched: SchedParam) -> Self {
        Self {
            id: fresh_id(),
            adopted,
            detached: AtomicBool::new(detached),
            cancel_state: AtomicI32::new(CancelState::Enable.as_raw()),
            cancel_type: AtomicI32::new(CancelType::Deferred.as_raw()),
            canceled: AtomicBool::new(false),
            sched: Mutex::new(sched),
            concurrency: AtomicI32::new(0),
            phase: AtomicU8::new(PHASE_RUNNING),
            exit: Mutex::new(None),
            host: Mutex::new(None),
        }
    }

    fn phase(&self) -> Phase {
        Phase::from_raw(self.phase.load(Ordering::Acquire))
    }

    fn cancel_enabled(&self) -> bool {
        self.cancel_state.load(Ordering::Acquire) == CancelState::Enable.as_raw()
    }

    /// Final step of the exit path. `None` means the thread ended in a way
    /// that yields no value (a foreign panic).
    fn finish(&self, status: Option<ExitStatus>) {
        let mut exit = self.exit.lock();
        if self.phase() != Phase::Running {
            return;
        }
        *exit = status;
        if self.detached.load(Ordering::Acquire) {
            self.phase.store(PHASE_RELEASED, Ordering::Release);
            drop(exit);
            LIVE.lock().remove(&self.id);
            local::set_control(None);
        } else {
            self.phase.store(PHASE_EXITED, Ordering::Release);
        }
        log::record(LogLevel::Info, "thread_exit", |e| {
            let e = e.with_thread(self.id);
            match status {
                Some(ExitStatus::Canceled) => e.with_detail(serde_json::json!({"canceled": true})),
                _ => e,
            }
        });
    }
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("id", &self.id)
            .field("adopted", &self.adopted)
            .field("detached", &self.detached.load(Ordering::Relaxed))
            .field("canceled", &self.canceled.load(Ordering::Relaxed))
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Thread handle
// ---------------------------------------------------------------------------

/// Handle to a thread's control block.
#[derive(Clone)]
pub struct Thread {
    block: Arc<ControlBlock>,
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.block.id == other.block.id
    }
}

impl Eq for Thread {}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Thread").field(&self.block).finish()
    }
}

impl Thread {
    /// Process-unique id; the `pthread_t` value at the C boundary.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.block.id
    }

    /// Looks up a live thread. `NoSuchThread` once it was joined or released.
    pub fn from_id(id: u64) -> Result<Self> {
        LIVE.lock()
            .get(&id)
            .cloned()
            .ok_or(PthreadError::NoSuchThread)
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.block.detached.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.block.phase()
    }

    /// Waits for the thread to finish and consumes its exit status.
    ///
    /// `Deadlock` for the calling thread itself, `InvalidArgument` for a
    /// detached thread, `NoSuchThread` if already joined (or being joined),
    /// `Interrupted` if the thread ended with a foreign panic.
    pub fn join(&self) -> Result<ExitStatus> {
        let b = &self.block;
        if local::control().is_some_and(|me| me.id == b.id) {
            return Err(PthreadError::Deadlock);
        }
        {
            let _exit = b.exit.lock();
            if b.detached.load(Ordering::Acquire) {
                return Err(PthreadError::InvalidArgument);
            }
            if matches!(b.phase(), Phase::Joined | Phase::Released) {
                return Err(PthreadError::NoSuchThread);
            }
        }
        let handle = b.host.lock().take().ok_or(PthreadError::NoSuchThread)?;
        let joined = handle.join();

        let mut exit = b.exit.lock();
        b.phase.store(PHASE_JOINED, Ordering::Release);
        let status = exit.take();
        drop(exit);
        LIVE.lock().remove(&b.id);
        log::record(LogLevel::Info, "thread_join", |e| e.with_thread(b.id));

        match (joined, status) {
            (Ok(()), Some(status)) => Ok(status),
            _ => Err(PthreadError::Interrupted),
        }
    }

    /// Marks the thread detached. A thread that already exited is released
    /// immediately.
    pub fn detach(&self) -> Result<()> {
        let b = &self.block;
        let mut exit = b.exit.lock();
        if b.detached.load(Ordering::Acquire) {
            return Err(PthreadError::InvalidArgument);
        }
        if matches!(b.phase(), Phase::Joined | Phase::Released) {
            return Err(PthreadError::NoSuchThread);
        }
        b.detached.store(true, Ordering::Release);
        let exited = b.phase() == Phase::Exited;
        if exited {
            b.phase.store(PHASE_RELEASED, Ordering::Release);
            *exit = None;
        }
        drop(exit);
        drop(b.host.lock().take());
        if exited {
            LIVE.lock().remove(&b.id);
        }
        log::record(LogLevel::Info, "thread_detach", |e| e.with_thread(b.id));
        Ok(())
    }

    /// Requests cancellation; the target acts on it at its next
    /// [`test_cancel`] while cancellation is enabled.
    pub fn cancel(&self) -> Result<()> {
        let b = &self.block;
        if matches!(b.phase(), Phase::Joined | Phase::Released) {
            return Err(PthreadError::NoSuchThread);
        }
        b.canceled.store(true, Ordering::Release);
        log::record(LogLevel::Info, "thread_cancel", |e| e.with_thread(b.id));
        Ok(())
    }

    /// Signals cannot be delivered to emulated threads.
    pub fn kill(&self, _signal: i32) -> Result<()> {
        log::record(LogLevel::Warn, "unsupported", |e| {
            e.with_thread(self.block.id)
                .with_object("pthread_kill")
                .with_errno(PthreadError::NotSupported.errno())
        });
        Err(PthreadError::NotSupported)
    }

    #[must_use]
    pub fn sched_param(&self) -> SchedParam {
        *self.block.sched.lock()
    }

    /// Only `SCHED_OTHER` (optionally with the reset-on-fork flag) at
    /// priority 0 is accepted. Metadata only.
    pub fn set_sched_param(&self, policy: i32, priority: i32) -> Result<()> {
        attr::check_sched_policy(policy)?;
        attr::check_sched_priority(priority)?;
        *self.block.sched.lock() = SchedParam { policy, priority };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Creation and exit
// ---------------------------------------------------------------------------

/// Spawns a thread running `start`, whose return value becomes the exit
/// status.
///
/// `ResourceExhausted` if the host cannot spawn a thread.
pub fn create<F>(attr: Option<&ThreadAttr>, start: F) -> Result<Thread>
where
    F: FnOnce() -> usize + Send + 'static,
{
    let attr = attr.copied().unwrap_or_default();
    let detached = attr.detach_state() == DetachState::Detached;
    let block = Arc::new(ControlBlock::new(false, detached, attr.sched_param()));
    let thread = Thread {
        block: Arc::clone(&block),
    };
    let id = block.id;
    LIVE.lock().insert(id, thread.clone());

    let mut builder = std::thread::Builder::new().name(format!("hostpthread-{id}"));
    if attr.stack_size() != 0 {
        builder = builder.stack_size(attr.stack_size());
    }

    // Held across the spawn so a `detach` from the new thread waits for the
    // handle to be stored.
    let mut host = block.host.lock();
    let child = Arc::clone(&block);
    match builder.spawn(move || trampoline(child, start)) {
        Ok(handle) => {
            if !detached {
                *host = Some(handle);
            }
        }
        Err(_) => {
            drop(host);
            LIVE.lock().remove(&id);
            log::record(LogLevel::Error, "thread_create_failed", |e| {
                e.with_errno(PthreadError::ResourceExhausted.errno())
            });
            return Err(PthreadError::ResourceExhausted);
        }
    }
    drop(host);
    log::record(LogLevel::Info, "thread_create", |e| {
        e.with_thread(id)
            .with_detail(serde_json::json!({ "detached": detached }))
    });
    Ok(thread)
}

fn trampoline<F>(block: Arc<ControlBlock>, start: F)
where
    F: FnOnce() -> usize,
{
    local::set_control(Some(Arc::clone(&block)));
    match panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(value) => run_exit_path(Some(&block), Some(ExitStatus::Value(value))),
        Err(payload) => match payload.downcast::<ExitRequest>() {
            Ok(request) => run_exit_path(Some(&block), Some(request.0)),
            Err(foreign) => {
                run_exit_path(Some(&block), None);
                panic::resume_unwind(foreign);
            }
        },
    }
}

fn run_exit_path(block: Option<&Arc<ControlBlock>>, status: Option<ExitStatus>) {
    cleanup::unwind_all();
    if local::claim_dispatch() {
        tls::dispatch_exit_destructors(&mut |slot| {
            local::with_slots(|t| t.take(slot)).unwrap_or(0)
        });
    }
    if let Some(block) = block {
        block.finish(status);
    }
}

/// Exit path for a thread whose local context is being destroyed without
/// having run it.
pub(crate) fn finish_at_teardown(block: &ControlBlock) {
    block.finish(Some(ExitStatus::Value(0)));
}

/// Terminates the calling thread with `value` as its exit status.
///
/// Unwinds to the thread's entry point, running scoped cleanup guards on the
/// way. On a thread not started by [`create`] the exit path runs first and
/// the unwind then ends the thread the way an uncaught panic would.
pub fn exit(value: usize) -> ! {
    exit_with(ExitStatus::Value(value))
}

fn exit_with(status: ExitStatus) -> ! {
    match local::control() {
        Some(block) if !block.adopted => {}
        block => run_exit_path(block.as_ref(), Some(status)),
    }
    panic::resume_unwind(Box::new(ExitRequest(status)))
}

/// Runs the exit path for the calling thread without unwinding.
///
/// For threads that will end without returning through the trampoline or
/// calling [`exit`]; a second call is a no-op for the control block.
pub fn detach_current() {
    let block = local::control();
    run_exit_path(block.as_ref(), Some(ExitStatus::Value(0)));
}

/// Handle to the calling thread, adopting it on first use if it was not
/// started by [`create`]. Adopted threads are detached.
#[must_use]
pub fn current() -> Thread {
    if let Some(block) = local::control() {
        return Thread { block };
    }
    let block = Arc::new(ControlBlock::new(true, true, SchedParam::default()));
    let thread = Thread {
        block: Arc::clone(&block),
    };
    if local::set_control(Some(block)) {
        LIVE.lock().insert(thread.id(), thread.clone());
        log::record(LogLevel::Debug, "thread_adopt", |e| e.with_thread(thread.id()));
    }
    thread
}

#[must_use]
pub fn equal(a: &Thread, b: &Thread) -> bool {
    a == b
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancellation checkpoint: exits with [`ExitStatus::Canceled`] if a request
/// is pending and cancellation is enabled.
pub fn test_cancel() {
    let Some(block) = local::control() else {
        return;
    };
    if block.cancel_enabled() && block.canceled.load(Ordering::Acquire) {
        drop(block);
        exit_with(ExitStatus::Canceled);
    }
}

/// Sets the calling thread's cancel state, returning the previous one.
pub fn set_cancel_state(state: CancelState) -> CancelState {
    let me = current();
    let old = me.block.cancel_state.swap(state.as_raw(), Ordering::AcqRel);
    CancelState::from_raw(old).unwrap_or(CancelState::Enable)
}

/// Sets the calling thread's cancel type. Asynchronous cancellation is
/// `NotSupported`.
pub fn set_cancel_type(kind: CancelType) -> Result<CancelType> {
    if kind == CancelType::Asynchronous {
        return Err(PthreadError::NotSupported);
    }
    let me = current();
    let old = me.block.cancel_type.swap(kind.as_raw(), Ordering::AcqRel);
    Ok(CancelType::from_raw(old).unwrap_or(CancelType::Deferred))
}

// ---------------------------------------------------------------------------
// Concurrency hint
// ---------------------------------------------------------------------------

/// The calling thread's concurrency hint; 0 for threads without a block.
#[must_use]
pub fn concurrency() -> i32 {
    local::control().map_or(0, |b| b.concurrency.load(Ordering::Relaxed))
}

pub fn set_concurrency(level: i32) -> Result<()> {
    if level < 0 {
        return Err(PthreadError::InvalidArgument);
    }
    current().block.concurrency.store(level, Ordering::Relaxed);
    Ok(())
}

/// Number of threads in the live table.
#[must_use]
pub fn live_threads() -> usize {
    LIVE.lock().len()
}
