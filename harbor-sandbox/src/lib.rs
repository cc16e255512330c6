//! Sandbox host for Harbor extensions.
//!
//! Every loaded extension runs in its own isolated unit and is reached only
//! through JSON frames. The [`SandboxHost`] owns the units, answers their
//! capability calls from the shared [`CapabilitySurface`](harbor_capabilities::CapabilitySurface),
//! relays their logs and events, and guarantees that a unit which fails to
//! activate, crashes or is unloaded leaves nothing behind.

mod error;
mod events;
mod host;
mod thread;
mod unit;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use error::{Result, SandboxError};
pub use events::HostEvent;
pub use host::{EXTENSION_LOG_TARGET, HostConfig, LoadRequest, SandboxHost};
pub use thread::ThreadSpawner;
pub use unit::{ExecutionUnit, SpawnedUnit, UnitExit, UnitSpawner};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
