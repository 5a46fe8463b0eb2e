//! Error Types
//!
//! Every failure a caller can observe surfaces as a [`ScopeError`]. The two
//! contract violations (a digest that never settles, and re-entering a phase)
//! get their own variants so tests can assert on the precise cause.
//!
//! User callbacks (watch functions, listeners, queued tasks) report failure
//! through [`CallbackResult`]. Those failures are isolated by the engine:
//! they are logged and the cycle carries on. Only `apply` hands its
//! expression's error back to the caller, wrapped in
//! [`ScopeError::Callback`].

use crate::scope::Phase;

/// Boxed error returned by a user callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for user callbacks.
pub type CallbackResult<T = ()> = std::result::Result<T, CallbackError>;

/// Result type for scope operations.
pub type Result<T> = std::result::Result<T, ScopeError>;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// The digest was still dirty (or still receiving async work) when the
    /// iteration limit ran out.
    #[error("no resolution to digest after {iterations} iterations")]
    Convergence { iterations: usize },

    /// A digest or apply was started while another phase was active.
    #[error("{active} is already in progress")]
    PhaseInProgress { active: Phase },

    /// The expression passed to `apply` failed.
    #[error("expression failed: {0}")]
    Callback(#[source] CallbackError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse digest config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid digest config: {0}")]
    Invalid(String),
}

impl ScopeError {
    /// True for [`ScopeError::Convergence`].
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::Convergence { .. })
    }

    /// True for [`ScopeError::PhaseInProgress`].
    pub fn is_phase_violation(&self) -> bool {
        matches!(self, Self::PhaseInProgress { .. })
    }
}
