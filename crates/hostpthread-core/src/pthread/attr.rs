//! Attribute records and `<pthread.h>` constants.
//!
//! Attributes are plain values consumed at `init`/`create`. Setters validate
//! the same way the C accessors do: out-of-range values are
//! `InvalidArgument`, recognized-but-unimplementable values are
//! `NotSupported`.

use crate::error::{PthreadError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const SCHED_OTHER: i32 = 0;
pub const SCHED_FIFO: i32 = 1;
pub const SCHED_RR: i32 = 2;
pub const SCHED_BATCH: i32 = 3;
pub const SCHED_IDLE: i32 = 5;
/// Flag OR-ed into a policy; carried through unchanged.
pub const SCHED_RESET_ON_FORK: i32 = 0x4000_0000;

pub const PTHREAD_CREATE_JOINABLE: i32 = 1;
pub const PTHREAD_CREATE_DETACHED: i32 = 2;

pub const PTHREAD_INHERIT_SCHED: i32 = 1;
pub const PTHREAD_EXPLICIT_SCHED: i32 = 2;

pub const PTHREAD_CANCEL_ENABLE: i32 = 1;
pub const PTHREAD_CANCEL_DISABLE: i32 = 0;
pub const PTHREAD_CANCEL_DEFERRED: i32 = 0;
pub const PTHREAD_CANCEL_ASYNCHRONOUS: i32 = 1;

pub const PTHREAD_SCOPE_SYSTEM: i32 = 1;
pub const PTHREAD_SCOPE_PROCESS: i32 = 2;

pub const PTHREAD_PROCESS_SHARED: i32 = 1;
pub const PTHREAD_PROCESS_PRIVATE: i32 = 2;

pub const PTHREAD_PRIO_NONE: i32 = 0;
pub const PTHREAD_PRIO_INHERIT: i32 = 1;
pub const PTHREAD_PRIO_PROTECT: i32 = 2;

pub const PTHREAD_MUTEX_NORMAL: i32 = 0;
pub const PTHREAD_MUTEX_ERRORCHECK: i32 = 1;
pub const PTHREAD_MUTEX_RECURSIVE: i32 = 2;
/// Every emulated mutex is recursive, whatever type is requested.
pub const PTHREAD_MUTEX_DEFAULT: i32 = PTHREAD_MUTEX_RECURSIVE;

pub const PTHREAD_BARRIER_SERIAL_THREAD: i32 = -1;
pub const PTHREAD_STACK_MIN: usize = 65_536;

/// Exit value reported for a thread that ended through cancellation.
pub const PTHREAD_CANCELED: usize = usize::MAX;

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Policy with the reset-on-fork flag stripped.
#[must_use]
pub const fn base_policy(policy: i32) -> i32 {
    policy & !SCHED_RESET_ON_FORK
}

/// Returns true if `policy` (flag stripped) is a recognized scheduling policy.
#[must_use]
pub const fn valid_sched_policy(policy: i32) -> bool {
    matches!(base_policy(policy), SCHED_OTHER..=SCHED_IDLE)
}

/// Accepts only the default policy; realtime and batch policies are
/// recognized but not implementable on the host.
pub const fn check_sched_policy(policy: i32) -> Result<()> {
    if !valid_sched_policy(policy) {
        Err(PthreadError::InvalidArgument)
    } else if base_policy(policy) != SCHED_OTHER {
        Err(PthreadError::NotSupported)
    } else {
        Ok(())
    }
}

/// Only priority 0 is meaningful under `SCHED_OTHER`.
pub const fn check_sched_priority(priority: i32) -> Result<()> {
    if priority == 0 {
        Ok(())
    } else {
        Err(PthreadError::InvalidArgument)
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

macro_rules! raw_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $raw:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Decodes a C constant; unknown values are `InvalidArgument`.
            pub const fn from_raw(raw: i32) -> Result<Self> {
                match raw {
                    $(x if x == $raw => Ok(Self::$variant),)+
                    _ => Err(PthreadError::InvalidArgument),
                }
            }

            #[must_use]
            pub const fn as_raw(self) -> i32 {
                match self {
                    $(Self::$variant => $raw),+
                }
            }
        }
    };
}

raw_enum! {
    /// Whether a new thread can be joined.
    DetachState { Joinable = PTHREAD_CREATE_JOINABLE, Detached = PTHREAD_CREATE_DETACHED }
}

raw_enum! {
    InheritSched { Inherit = PTHREAD_INHERIT_SCHED, Explicit = PTHREAD_EXPLICIT_SCHED }
}

raw_enum! {
    /// Contention scope; only system scope is implementable.
    Scope { System = PTHREAD_SCOPE_SYSTEM, Process = PTHREAD_SCOPE_PROCESS }
}

raw_enum! {
    /// Process-shared flag for synchronization attributes.
    PShared { Shared = PTHREAD_PROCESS_SHARED, Private = PTHREAD_PROCESS_PRIVATE }
}

raw_enum! {
    Protocol { None = PTHREAD_PRIO_NONE, Inherit = PTHREAD_PRIO_INHERIT, Protect = PTHREAD_PRIO_PROTECT }
}

raw_enum! {
    /// Requested mutex type. Recorded only; locking is always recursive.
    MutexType {
        Normal = PTHREAD_MUTEX_NORMAL,
        ErrorCheck = PTHREAD_MUTEX_ERRORCHECK,
        Recursive = PTHREAD_MUTEX_RECURSIVE,
    }
}

raw_enum! {
    CancelState { Enable = PTHREAD_CANCEL_ENABLE, Disable = PTHREAD_CANCEL_DISABLE }
}

raw_enum! {
    /// Only deferred cancellation is implemented.
    CancelType { Deferred = PTHREAD_CANCEL_DEFERRED, Asynchronous = PTHREAD_CANCEL_ASYNCHRONOUS }
}

impl PShared {
    /// Process-shared storage cannot be expressed with in-process host objects.
    pub(crate) const fn require_private(self) -> Result<()> {
        match self {
            Self::Private => Ok(()),
            Self::Shared => Err(PthreadError::NotSupported),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling parameters
// ---------------------------------------------------------------------------

/// Scheduling policy plus priority, as carried by threads and thread attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedParam {
    pub policy: i32,
    pub priority: i32,
}

impl Default for SchedParam {
    fn default() -> Self {
        Self {
            policy: SCHED_OTHER,
            priority: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Attribute records
// ---------------------------------------------------------------------------

/// Thread creation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAttr {
    detach_state: DetachState,
    guard_size: usize,
    inherit_sched: InheritSched,
    sched: SchedParam,
    scope: Scope,
    /// Zero means the host default.
    stack_size: usize,
}

impl Default for ThreadAttr {
    fn default() -> Self {
        Self {
            detach_state: DetachState::Joinable,
            guard_size: 0,
            inherit_sched: InheritSched::Inherit,
            sched: SchedParam::default(),
            scope: Scope::System,
            stack_size: 0,
        }
    }
}

impl ThreadAttr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn detach_state(&self) -> DetachState {
        self.detach_state
    }

    pub fn set_detach_state(&mut self, state: DetachState) {
        self.detach_state = state;
    }

    /// Recorded only; the host manages guard pages itself.
    #[must_use]
    pub fn guard_size(&self) -> usize {
        self.guard_size
    }

    pub fn set_guard_size(&mut self, size: usize) {
        self.guard_size = size;
    }

    #[must_use]
    pub fn inherit_sched(&self) -> InheritSched {
        self.inherit_sched
    }

    pub fn set_inherit_sched(&mut self, inherit: InheritSched) {
        self.inherit_sched = inherit;
    }

    #[must_use]
    pub fn sched_param(&self) -> SchedParam {
        self.sched
    }

    pub fn set_sched_priority(&mut self, priority: i32) -> Result<()> {
        check_sched_priority(priority)?;
        self.sched.priority = priority;
        Ok(())
    }

    pub fn set_sched_policy(&mut self, policy: i32) -> Result<()> {
        check_sched_policy(policy)?;
        self.sched.policy = policy;
        Ok(())
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn set_scope(&mut self, scope: Scope) -> Result<()> {
        match scope {
            Scope::System => {
                self.scope = scope;
                Ok(())
            }
            Scope::Process => Err(PthreadError::NotSupported),
        }
    }

    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn set_stack_size(&mut self, size: usize) -> Result<()> {
        if size < PTHREAD_STACK_MIN {
            return Err(PthreadError::InvalidArgument);
        }
        self.stack_size = size;
        Ok(())
    }

    /// Caller-supplied stacks are not supported; only a null address passes.
    pub fn set_stack(&mut self, addr: usize, size: usize) -> Result<()> {
        if size < PTHREAD_STACK_MIN {
            return Err(PthreadError::InvalidArgument);
        }
        if addr != 0 {
            return Err(PthreadError::NotSupported);
        }
        self.stack_size = size;
        Ok(())
    }

    pub fn set_stack_addr(&mut self, addr: usize) -> Result<()> {
        if addr != 0 {
            return Err(PthreadError::NotSupported);
        }
        Ok(())
    }
}

/// Mutex attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexAttr {
    pub prio_ceiling: i32,
    pub protocol: Protocol,
    pub pshared: PShared,
    pub kind: MutexType,
}

impl Default for MutexAttr {
    fn default() -> Self {
        Self {
            prio_ceiling: 0,
            protocol: Protocol::None,
            pshared: PShared::Private,
            kind: MutexType::Recursive,
        }
    }
}

/// Condition variable attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CondAttr {
    pub pshared: PShared,
}

impl Default for CondAttr {
    fn default() -> Self {
        Self {
            pshared: PShared::Private,
        }
    }
}

/// Reader-writer lock attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwLockAttr {
    pub pshared: PShared,
}

impl Default for RwLockAttr {
    fn default() -> Self {
        Self {
            pshared: PShared::Private,
        }
    }
}

/// Barrier attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierAttr {
    pub pshared: PShared,
}

impl Default for BarrierAttr {
    fn default() -> Self {
        Self {
            pshared: PShared::Private,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_constants() {
        assert_eq!(PTHREAD_MUTEX_DEFAULT, PTHREAD_MUTEX_RECURSIVE);
        assert_eq!(PTHREAD_BARRIER_SERIAL_THREAD, -1);
        assert_eq!(PTHREAD_STACK_MIN, 65_536);
        assert_eq!(PTHREAD_CANCELED as isize, -1);
    }

    #[test]
    fn raw_enum_roundtrip_and_rejection() {
        assert_eq!(DetachState::from_raw(2), Ok(DetachState::Detached));
        assert_eq!(DetachState::Joinable.as_raw(), 1);
        assert_eq!(DetachState::from_raw(0), Err(PthreadError::InvalidArgument));
        assert_eq!(MutexType::from_raw(3), Err(PthreadError::InvalidArgument));
        assert_eq!(Protocol::from_raw(2), Ok(Protocol::Protect));
        assert_eq!(CancelType::from_raw(1), Ok(CancelType::Asynchronous));
        assert_eq!(PShared::from_raw(-1), Err(PthreadError::InvalidArgument));
    }

    #[test]
    fn sched_policy_validation() {
        assert_eq!(check_sched_policy(SCHED_OTHER), Ok(()));
        assert_eq!(check_sched_policy(SCHED_OTHER | SCHED_RESET_ON_FORK), Ok(()));
        assert_eq!(check_sched_policy(SCHED_FIFO), Err(PthreadError::NotSupported));
        assert_eq!(check_sched_policy(SCHED_RR), Err(PthreadError::NotSupported));
        assert_eq!(check_sched_policy(SCHED_IDLE), Err(PthreadError::NotSupported));
        assert_eq!(check_sched_policy(-1), Err(PthreadError::InvalidArgument));
        assert_eq!(check_sched_policy(6), Err(PthreadError::InvalidArgument));
        assert_eq!(check_sched_priority(1), Err(PthreadError::InvalidArgument));
    }

    #[test]
    fn thread_attr_defaults_and_setters() {
        let mut attr = ThreadAttr::new();
        assert_eq!(attr.detach_state(), DetachState::Joinable);
        assert_eq!(attr.inherit_sched(), InheritSched::Inherit);
        assert_eq!(attr.scope(), Scope::System);
        assert_eq!(attr.stack_size(), 0);
        assert_eq!(attr.sched_param(), SchedParam::default());

        assert_eq!(attr.set_scope(Scope::Process), Err(PthreadError::NotSupported));
        assert_eq!(attr.set_stack_size(1024), Err(PthreadError::InvalidArgument));
        attr.set_stack_size(PTHREAD_STACK_MIN * 2).unwrap();
        assert_eq!(attr.stack_size(), PTHREAD_STACK_MIN * 2);
        assert_eq!(
            attr.set_stack(0x1000, PTHREAD_STACK_MIN),
            Err(PthreadError::NotSupported)
        );
        assert_eq!(attr.set_stack_addr(0x1000), Err(PthreadError::NotSupported));
        attr.set_stack_addr(0).unwrap();
        assert_eq!(attr.set_sched_priority(5), Err(PthreadError::InvalidArgument));
        attr.set_guard_size(4096);
        assert_eq!(attr.guard_size(), 4096);
    }

    #[test]
    fn primitive_attr_defaults_are_private() {
        assert_eq!(MutexAttr::default().pshared, PShared::Private);
        assert_eq!(MutexAttr::default().kind, MutexType::Recursive);
        assert_eq!(CondAttr::default().pshared, PShared::Private);
        assert_eq!(RwLockAttr::default().pshared, PShared::Private);
        assert_eq!(BarrierAttr::default().pshared, PShared::Private);
        assert_eq!(PShared::Shared.require_private(), Err(PthreadError::NotSupported));
    }
}
