//! Stage barrier and the exclusivity guard.
//!
//! Non-exclusive stages hold the shared side of a [`StageBarrier`] for their whole
//! duration; exclusive stages hold the exclusive side. Executors that share a barrier
//! therefore never overlap an exclusive stage with any other stage. The guards are plain
//! RAII values, so they are released on every exit path, including unwinding.
//!
//! A panic while the barrier is held poisons the lock. The barrier protects no data, so a
//! poisoned lock is simply taken over.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// A shareable reader/writer barrier between stages.
#[derive(Clone, Default)]
pub struct StageBarrier {
    lock: Arc<RwLock<()>>,
}

impl StageBarrier {
    /// Creates an independent barrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for every exclusive holder to leave and enters shared.
    pub fn shared(&self) -> SharedGuard<'_> {
        SharedGuard {
            _guard: self.lock.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Waits for every other holder to leave and enters exclusively.
    pub fn exclusive(&self) -> ExclusiveGuard<'_> {
        ExclusiveGuard {
            _guard: self.lock.write().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl fmt::Debug for StageBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageBarrier").finish_non_exhaustive()
    }
}

/// Proof of shared access to a [`StageBarrier`].
pub struct SharedGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

/// Proof of exclusive access to a [`StageBarrier`].
///
/// Shared output (an archive writer, a symbol table) may be touched by whoever holds
/// one. Exclusive stages receive it through
/// [`crate::executor::RunContext::exclusive_guard`].
pub struct ExclusiveGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl fmt::Debug for SharedGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedGuard")
    }
}

impl fmt::Debug for ExclusiveGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExclusiveGuard")
    }
}
