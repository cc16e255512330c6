//! Extension discovery, lifecycle and configuration for Harbor.
//!
//! The [`ExtensionManager`] finds extensions on disk, keeps one
//! [`ExtensionRecord`] per extension and drives activation through the
//! sandbox host. [`HarborConfig`] supplies directories and timeouts.

mod activation;
mod config;
mod error;
mod install;
mod manager;
mod record;
mod user_config;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use activation::{WILDCARD_EVENT, matches_activation_event};
pub use config::{CONFIG_FILE, Directories, HarborConfig, LlmConfig, Timeouts, dirs_path};
pub use error::{ExtensionError, Result};
pub use manager::{ActivationReport, ExtensionManager};
pub use record::ExtensionRecord;
pub use user_config::UserConfig;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
