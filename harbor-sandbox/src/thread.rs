//! Production units: one OS thread with its own current-thread runtime per
//! extension.
//!
//! Termination is cooperative at the runtime level: the kill signal wins the
//! race against the worker at its next await point, after which the runtime
//! is shut down and every task the plugin spawned is dropped.

use crate::error::{Result, SandboxError};
use crate::lock;
use crate::unit::{ExecutionUnit, SpawnedUnit, UnitExit, UnitSpawner};
use harbor_plugin_sdk::{ModuleLoader, SandboxWorker, WorkerConfig, panic_message};
use harbor_types::Frame;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

pub struct ThreadSpawner {
    loader: Arc<dyn ModuleLoader>,
}

impl ThreadSpawner {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self { loader }
    }
}

impl UnitSpawner for ThreadSpawner {
    fn spawn(&self, config: WorkerConfig) -> Result<SpawnedUnit> {
        let extension_id = config.extension_id.clone();
        let (to_unit, unit_inbox) = mpsc::unbounded_channel();
        let (unit_outbox, from_unit) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let loader = Arc::clone(&self.loader);

        std::thread::Builder::new()
            .name(format!("harbor-ext-{extension_id}"))
            .spawn(move || {
                let id = config.extension_id.clone();
                let exit = run_unit(config, loader, unit_inbox, unit_outbox, kill_rx);
                info!(extension_id = %id, "Unit {}", exit);
                let _ = exit_tx.send(exit);
            })
            .map_err(|e| SandboxError::Spawn {
                extension_id: extension_id.clone(),
                message: e.to_string(),
            })?;

        debug!(extension_id = %extension_id, "Unit thread started");
        Ok(SpawnedUnit {
            unit: Arc::new(ThreadUnit {
                extension_id,
                tx: to_unit,
                kill: Mutex::new(Some(kill_tx)),
            }),
            inbox: from_unit,
            exit: exit_rx,
        })
    }
}

fn run_unit(
    config: WorkerConfig,
    loader: Arc<dyn ModuleLoader>,
    inbox: mpsc::UnboundedReceiver<Frame>,
    outbox: mpsc::UnboundedSender<Frame>,
    kill: oneshot::Receiver<()>,
) -> UnitExit {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return UnitExit::Crashed(format!("runtime construction failed: {e}")),
    };
    let worker = SandboxWorker::new(config, loader, inbox, outbox);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(async move {
            tokio::select! {
                code = worker.run() => UnitExit::Exited(code),
                Ok(()) = kill => UnitExit::Terminated,
            }
        })
    }));

    // Drops every task the plugin left behind without waiting on blocking work.
    runtime.shutdown_background();

    match outcome {
        Ok(exit) => exit,
        Err(panic) => UnitExit::Crashed(panic_message(panic.as_ref())),
    }
}

struct ThreadUnit {
    extension_id: String,
    tx: mpsc::UnboundedSender<Frame>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl ExecutionUnit for ThreadUnit {
    fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| SandboxError::ChannelClosed(self.extension_id.clone()))
    }

    fn terminate(&self) {
        if let Some(kill) = lock(&self.kill).take() {
            warn!(extension_id = %self.extension_id, "Terminating unit");
            let _ = kill.send(());
        }
    }
}
