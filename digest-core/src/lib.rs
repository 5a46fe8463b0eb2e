//! Digest Core
//!
//! A dirty-checking change-detection engine. Callers register *watchers*
//! (a watch function plus a listener) on a [`Scope`]; a *digest* evaluates
//! every watch function, calls the listeners of those whose value changed,
//! and repeats until the scope reaches a fixed point.
//!
//! The crate provides:
//!
//! - the watcher registry, safe to mutate from inside a running digest
//! - the digest loop, with last-dirty short-circuiting and an iteration limit
//! - reference and deep comparison of watched [`Value`]s
//! - async, coalesced-apply and post-digest task queues
//! - a pluggable [`Timer`] for deferred digests
//!
//! # Architecture
//!
//! - `value`: watched values and the two comparison policies
//! - `scope`: the context, registry, digest loop, queues and phase guard
//! - `timer`: the timer trait plus manual and tokio implementations
//! - `config`: digest tuning
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use digest_core::{ManualTimer, Scope};
//!
//! let scope = Scope::new(Arc::new(ManualTimer::new()));
//! scope.set("name", "jane");
//!
//! scope.watch(
//!     |s| Ok(s.get("name")),
//!     |new, _old, s| {
//!         s.set("upper", new.as_str().unwrap_or_default().to_uppercase());
//!         Ok(())
//!     },
//!     false,
//! );
//!
//! scope.digest()?;
//! assert_eq!(scope.get("upper").as_str(), Some("JANE"));
//! ```

pub mod config;
pub mod error;
pub mod scope;
pub mod timer;
pub mod value;

pub use config::DigestConfig;
pub use error::{CallbackError, CallbackResult, ConfigError, Result, ScopeError};
pub use scope::{Phase, Scope, WatchHandle, WatcherId};
pub use timer::{ManualTimer, Timer, TimerCallback, TimerHandle, TokioTimer};
pub use value::{Array, Object, Value};
