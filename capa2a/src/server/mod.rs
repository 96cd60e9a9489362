//! Task lifecycle engine.
//!
//! - [`TaskStore`]: task state machine, persistence and per-task listeners
//! - [`StreamingTask`]: fan-out of one task's updates to many subscribers
//! - [`TaskService`]: the orchestrating operations surface
//! - [`AuthenticatedService`]: the same surface scoped to one user

mod auth;
mod card;
mod events;
mod service;
mod streaming;
mod task_store;
mod task_updater;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use auth::*;
pub use card::*;
pub use events::*;
pub use service::*;
pub use streaming::*;
pub use task_store::*;
pub use task_updater::*;

/// Locks a std mutex, recovering the data if a holder panicked.
///
/// Every critical section in this crate leaves its data consistent before
/// anything that can panic runs.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
