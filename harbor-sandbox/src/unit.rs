//! The isolated execution unit abstraction.
//!
//! The host only ever talks to a unit through frames. How the unit is
//! realized (a dedicated thread, a child process, a scripted fake in tests)
//! is the [`UnitSpawner`]'s business.

use crate::error::Result;
use harbor_plugin_sdk::WorkerConfig;
use harbor_types::Frame;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Handle to a running unit.
pub trait ExecutionUnit: Send + Sync {
    /// Queues a frame for the unit. Fails once the unit has gone away.
    fn send(&self, frame: Frame) -> Result<()>;

    /// Forces the unit down. Calling it more than once has no further effect.
    fn terminate(&self);
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitExit {
    /// The worker returned with this exit code.
    Exited(i32),
    /// The unit died with a panic or could not run at all.
    Crashed(String),
    /// The host terminated the unit.
    Terminated,
}

impl UnitExit {
    /// Panics and non-zero exit codes.
    pub fn is_abnormal(&self) -> bool {
        match self {
            Self::Exited(code) => *code != 0,
            Self::Crashed(_) => true,
            Self::Terminated => false,
        }
    }
}

impl fmt::Display for UnitExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Crashed(reason) => write!(f, "crashed: {reason}"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

/// A freshly started unit: its handle, the frames it sends to the host and
/// a one-shot report of how it ended.
pub struct SpawnedUnit {
    pub unit: Arc<dyn ExecutionUnit>,
    pub inbox: mpsc::UnboundedReceiver<Frame>,
    pub exit: oneshot::Receiver<UnitExit>,
}

pub trait UnitSpawner: Send + Sync {
    fn spawn(&self, config: WorkerConfig) -> Result<SpawnedUnit>;
}
