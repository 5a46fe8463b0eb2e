//! Phase Guard
//!
//! A scope is in at most one phase at a time. Entering a phase returns a
//! guard; dropping the guard returns the scope to [`Phase::Idle`], so error
//! returns and early exits cannot leave a stale phase behind.

use std::fmt;

use parking_lot::Mutex;

use crate::error::{Result, ScopeError};

/// What a scope is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Inside `digest`.
    Digesting,
    /// Inside the expression of `apply`.
    Applying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Digesting => "$digest",
            Phase::Applying => "$apply",
        })
    }
}

/// Clears the phase when dropped.
pub(crate) struct PhaseGuard<'a> {
    slot: &'a Mutex<Phase>,
}

impl<'a> PhaseGuard<'a> {
    /// Enter `phase`, failing if another phase is already active.
    pub(crate) fn enter(slot: &'a Mutex<Phase>, phase: Phase) -> Result<Self> {
        let mut current = slot.lock();
        if *current != Phase::Idle {
            return Err(ScopeError::PhaseInProgress { active: *current });
        }
        *current = phase;
        Ok(Self { slot })
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_clears_phase_on_drop() {
        let slot = Mutex::new(Phase::Idle);
        {
            let _guard = PhaseGuard::enter(&slot, Phase::Digesting).unwrap();
            assert_eq!(*slot.lock(), Phase::Digesting);
        }
        assert_eq!(*slot.lock(), Phase::Idle);
    }

    #[test]
    fn second_phase_is_rejected() {
        let slot = Mutex::new(Phase::Idle);
        let _guard = PhaseGuard::enter(&slot, Phase::Applying).unwrap();

        let err = PhaseGuard::enter(&slot, Phase::Digesting).err().unwrap();
        assert!(matches!(err, ScopeError::PhaseInProgress { active: Phase::Applying }));

        // The rejected attempt must not have touched the active phase
        assert_eq!(*slot.lock(), Phase::Applying);
    }
}
