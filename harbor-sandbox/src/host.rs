//! Host side of the sandbox: one session per loaded extension.
//!
//! Each session pairs an [`ExecutionUnit`] with a dispatcher task that
//! drains the unit's frames in order. Capability calls are answered on
//! their own tasks so a slow call never holds up the frames behind it.

use crate::error::{Result, SandboxError};
use crate::events::HostEvent;
use crate::lock;
use crate::unit::{ExecutionUnit, UnitExit, UnitSpawner};
use futures::future::join_all;
use harbor_capabilities::{CallContext, CapabilitySurface, Delivery};
use harbor_plugin_sdk::{DEFAULT_CALL_TIMEOUT, WorkerConfig};
use harbor_types::{ApiCall, ApiResponse, Frame, HostMessage, LogLevel, Manifest, PermissionSet, WorkerMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Target under which plugin `log` messages are re-emitted.
pub const EXTENSION_LOG_TARGET: &str = "harbor::extension";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// How long a unit may take to answer `activate`.
    pub activation_timeout: Duration,
    /// How long a unit may take to exit after `deactivate`.
    pub unload_grace: Duration,
    /// Per-call timeout handed to each worker.
    pub call_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            activation_timeout: Duration::from_secs(30),
            unload_grace: Duration::from_secs(5),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// What the host needs to start a unit.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub extension_id: String,
    pub extension_path: PathBuf,
    pub manifest: Manifest,
    pub permissions: PermissionSet,
}

impl LoadRequest {
    /// A request granting exactly the permissions the manifest declares.
    pub fn new(extension_id: impl Into<String>, extension_path: impl Into<PathBuf>, manifest: Manifest) -> Self {
        let permissions = manifest.permission_set();
        Self {
            extension_id: extension_id.into(),
            extension_path: extension_path.into(),
            manifest,
            permissions,
        }
    }
}

struct Session {
    generation: u64,
    unit: Arc<dyn ExecutionUnit>,
    exit: watch::Receiver<Option<UnitExit>>,
}

struct Inner {
    config: HostConfig,
    spawner: Arc<dyn UnitSpawner>,
    surface: Arc<CapabilitySurface>,
    sessions: Mutex<HashMap<String, Session>>,
    next_generation: AtomicU64,
    events: broadcast::Sender<HostEvent>,
}

/// Owns every running unit. Cheap to clone.
#[derive(Clone)]
pub struct SandboxHost {
    inner: Arc<Inner>,
}

type ActivationReply = oneshot::Sender<Result<Value>>;

impl SandboxHost {
    pub fn new(config: HostConfig, spawner: Arc<dyn UnitSpawner>, surface: Arc<CapabilitySurface>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                spawner,
                surface,
                sessions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.inner.events.subscribe()
    }

    pub fn surface(&self) -> &Arc<CapabilitySurface> {
        &self.inner.surface
    }

    pub fn is_loaded(&self, extension_id: &str) -> bool {
        lock(&self.inner.sessions).contains_key(extension_id)
    }

    pub fn loaded(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }

    // ================================================================
    // Loading / Unloading
    // ================================================================

    /// Starts a unit, activates the plugin in it and returns the export
    /// summary. On any activation failure the unit is unloaded again, so no
    /// session outlives a failed load.
    pub async fn load(&self, request: LoadRequest) -> Result<Value> {
        let extension_id = request.extension_id.clone();
        if self.is_loaded(&extension_id) {
            return Err(SandboxError::AlreadyLoaded(extension_id));
        }

        let ctx = Arc::new(CallContext::new(
            extension_id.clone(),
            request.extension_path.clone(),
            request.permissions.clone(),
        ));
        let spawned = self.inner.spawner.spawn(WorkerConfig {
            extension_id: request.extension_id,
            extension_path: request.extension_path,
            manifest: request.manifest,
            permissions: request.permissions,
            call_timeout: self.inner.config.call_timeout,
        })?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (exit_tx, exit_rx) = watch::channel(None);
        {
            let mut sessions = lock(&self.inner.sessions);
            if sessions.contains_key(&extension_id) {
                spawned.unit.terminate();
                return Err(SandboxError::AlreadyLoaded(extension_id));
            }
            sessions.insert(
                extension_id.clone(),
                Session {
                    generation,
                    unit: Arc::clone(&spawned.unit),
                    exit: exit_rx,
                },
            );
        }

        let (activation_tx, activation_rx) = oneshot::channel();
        tokio::spawn(self.clone().run_dispatcher(Dispatch {
            extension_id: extension_id.clone(),
            generation,
            unit: Arc::clone(&spawned.unit),
            ctx,
            activation: Some(activation_tx),
            exit_watch: exit_tx,
        }, spawned.inbox, spawned.exit));

        info!(extension_id = %extension_id, generation, "Unit spawned; activating");
        let outcome = match Frame::encode(&HostMessage::Activate) {
            Ok(frame) => match spawned.unit.send(frame) {
                Ok(()) => self.await_activation(&extension_id, activation_rx).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(exports) => {
                info!(extension_id = %extension_id, "Extension activated");
                self.publish(HostEvent::Activated {
                    extension_id,
                    exports: exports.clone(),
                });
                Ok(exports)
            }
            Err(e) => {
                warn!(extension_id = %extension_id, "Activation failed: {}", e);
                if let Some(session) = self.take_session(&extension_id, Some(generation)) {
                    self.stop(&extension_id, session).await;
                }
                Err(e)
            }
        }
    }

    async fn await_activation(&self, extension_id: &str, reply: oneshot::Receiver<Result<Value>>) -> Result<Value> {
        let timeout = self.inner.config.activation_timeout;
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SandboxError::WorkerCrashed {
                extension_id: extension_id.to_string(),
                message: "unit ended before activating".into(),
            }),
            Err(_) => Err(SandboxError::ActivationTimeout {
                extension_id: extension_id.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Deactivates and stops the extension's unit, forcing it down if it
    /// does not exit within the grace period, then runs capability cleanup.
    /// Unloading an extension that is not loaded succeeds.
    pub async fn unload(&self, extension_id: &str) -> Result<()> {
        match self.take_session(extension_id, None) {
            Some(session) => {
                self.stop(extension_id, session).await;
                Ok(())
            }
            None => {
                debug!(extension_id = %extension_id, "Unload of an extension that is not loaded");
                Ok(())
            }
        }
    }

    /// Unloads every unit concurrently. Returns the failures, each of which
    /// has already been logged.
    pub async fn shutdown(&self) -> Vec<(String, SandboxError)> {
        let ids = self.loaded();
        info!(count = ids.len(), "Shutting down sandbox host");
        let results = join_all(ids.iter().map(|id| self.unload(id))).await;
        ids.into_iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    error!(extension_id = %id, "Unload during shutdown failed: {}", e);
                    Some((id, e))
                }
            })
            .collect()
    }

    fn take_session(&self, extension_id: &str, generation: Option<u64>) -> Option<Session> {
        let mut sessions = lock(&self.inner.sessions);
        let matches = sessions
            .get(extension_id)
            .is_some_and(|s| generation.is_none_or(|g| s.generation == g));
        if matches { sessions.remove(extension_id) } else { None }
    }

    async fn stop(&self, extension_id: &str, session: Session) {
        let Session { unit, mut exit, .. } = session;

        let deactivate = Frame::encode(&HostMessage::Deactivate)
            .map_err(SandboxError::from)
            .and_then(|frame| unit.send(frame));
        if let Err(e) = deactivate {
            debug!(extension_id = %extension_id, "Unit not accepting deactivate: {}", e);
        }

        let grace = self.inner.config.unload_grace;
        let exited = tokio::time::timeout(grace, exit.wait_for(Option::is_some)).await.is_ok();

        if !exited {
            warn!(extension_id = %extension_id, "Unit did not exit within grace period; terminating");
            unit.terminate();
        }

        self.inner.surface.cleanup(extension_id);
        let event = if exited {
            info!(extension_id = %extension_id, "Extension unloaded");
            HostEvent::Unloaded {
                extension_id: extension_id.to_string(),
            }
        } else {
            HostEvent::Terminated {
                extension_id: extension_id.to_string(),
            }
        };
        self.publish(event);
    }

    // ================================================================
    // Event delivery
    // ================================================================

    /// Pushes an event to every live unit and returns how many accepted it.
    pub fn broadcast(&self, event: &str, data: &Value) -> usize {
        let frame = match Frame::encode(&HostMessage::Event {
            event: event.to_string(),
            data: data.clone(),
        }) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = %event, "Could not encode broadcast: {}", e);
                return 0;
            }
        };

        let units: Vec<(String, Arc<dyn ExecutionUnit>)> = lock(&self.inner.sessions)
            .iter()
            .map(|(id, s)| (id.clone(), Arc::clone(&s.unit)))
            .collect();

        let mut delivered = 0;
        for (id, unit) in units {
            match unit.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(extension_id = %id, event = %event, "Broadcast failed: {}", e),
            }
        }
        delivered
    }

    /// Pushes an event to one unit.
    pub fn send_event(&self, extension_id: &str, event: &str, data: Value) -> Result<()> {
        let unit = lock(&self.inner.sessions)
            .get(extension_id)
            .map(|s| Arc::clone(&s.unit))
            .ok_or_else(|| SandboxError::NotLoaded(extension_id.to_string()))?;
        let frame = Frame::encode(&HostMessage::Event {
            event: event.to_string(),
            data,
        })?;
        unit.send(frame)
    }

    /// Forwards capability-surface deliveries (hook hits, post-processor
    /// notifications) to their units until the surface is dropped.
    pub fn spawn_delivery_pump(&self, mut deliveries: mpsc::UnboundedReceiver<Delivery>) -> JoinHandle<()> {
        let host = self.clone();
        tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                if let Err(e) = host.send_event(&delivery.extension_id, &delivery.event, delivery.data) {
                    debug!(extension_id = %delivery.extension_id, event = %delivery.event, "Delivery dropped: {}", e);
                }
            }
        })
    }

    fn publish(&self, event: HostEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    // ================================================================
    // Dispatcher
    // ================================================================

    async fn run_dispatcher(
        self,
        mut dispatch: Dispatch,
        mut inbox: mpsc::UnboundedReceiver<Frame>,
        mut exit: oneshot::Receiver<UnitExit>,
    ) {
        let status = loop {
            tokio::select! {
                biased;
                frame = inbox.recv() => match frame {
                    Some(frame) => self.handle_frame(&mut dispatch, frame),
                    None => break (&mut exit).await.ok(),
                },
                status = &mut exit => {
                    while let Ok(frame) = inbox.try_recv() {
                        self.handle_frame(&mut dispatch, frame);
                    }
                    break status.ok();
                }
            }
        };
        let status = status.unwrap_or_else(|| UnitExit::Crashed("unit vanished without an exit report".into()));
        self.unit_exited(dispatch, status);
    }

    fn handle_frame(&self, dispatch: &mut Dispatch, frame: Frame) {
        let id = &dispatch.extension_id;
        let message = match frame.decode::<WorkerMessage>() {
            Ok(message) => message,
            Err(e) => {
                warn!(extension_id = %id, "Ignoring unrecognized frame: {}", e);
                return;
            }
        };

        match message {
            WorkerMessage::Activated { exports } => match dispatch.activation.take() {
                Some(reply) => {
                    let _ = reply.send(Ok(exports));
                }
                None => debug!(extension_id = %id, "Duplicate activated ignored"),
            },
            WorkerMessage::Error { error, stack } => match dispatch.activation.take() {
                Some(reply) => {
                    let _ = reply.send(Err(SandboxError::ActivationFailed {
                        extension_id: id.clone(),
                        message: error,
                    }));
                }
                None => {
                    warn!(extension_id = %id, "Extension reported an error: {}", error);
                    self.publish(HostEvent::ExtensionError {
                        extension_id: id.clone(),
                        error,
                        stack,
                    });
                }
            },
            WorkerMessage::ApiCall(call) => self.answer(dispatch, call),
            WorkerMessage::Log { level, args } => relay_log(id, level, &args),
            WorkerMessage::EmitEvent { event, data } => self.publish(HostEvent::ExtensionEvent {
                extension_id: id.clone(),
                event,
                data,
            }),
        }
    }

    fn answer(&self, dispatch: &Dispatch, call: ApiCall) {
        let surface = Arc::clone(&self.inner.surface);
        let ctx = Arc::clone(&dispatch.ctx);
        let unit = Arc::clone(&dispatch.unit);
        tokio::spawn(async move {
            let response = match surface.dispatch(&ctx, &call.namespace, &call.method, &call.args).await {
                Ok(result) => ApiResponse::ok(call.call_id, result),
                Err(e) => {
                    debug!(
                        extension_id = %ctx.extension_id,
                        namespace = %call.namespace,
                        method = %call.method,
                        "Capability call failed: {}", e
                    );
                    ApiResponse::err(call.call_id, e.to_remote())
                }
            };
            match Frame::encode(&HostMessage::ApiResponse(response)) {
                Ok(frame) => {
                    if unit.send(frame).is_err() {
                        debug!(extension_id = %ctx.extension_id, "Unit gone before api-response");
                    }
                }
                Err(e) => warn!(extension_id = %ctx.extension_id, "Could not encode api-response: {}", e),
            }
        });
    }

    fn unit_exited(&self, dispatch: Dispatch, status: UnitExit) {
        let Dispatch {
            extension_id,
            generation,
            activation,
            exit_watch,
            ..
        } = dispatch;

        // A session still registered under this generation was not asked to stop.
        if self.take_session(&extension_id, Some(generation)).is_some() {
            if status.is_abnormal() {
                error!(extension_id = %extension_id, "Unit {}", status);
                self.publish(HostEvent::Crashed {
                    extension_id: extension_id.clone(),
                    reason: status.to_string(),
                });
            } else {
                info!(extension_id = %extension_id, "Unit {} on its own", status);
                self.publish(HostEvent::Unloaded {
                    extension_id: extension_id.clone(),
                });
            }
            self.inner.surface.cleanup(&extension_id);
        }

        let message = status.to_string();
        let _ = exit_watch.send(Some(status));
        if let Some(reply) = activation {
            let _ = reply.send(Err(SandboxError::WorkerCrashed { extension_id, message }));
        }
    }
}

struct Dispatch {
    extension_id: String,
    generation: u64,
    unit: Arc<dyn ExecutionUnit>,
    ctx: Arc<CallContext>,
    activation: Option<ActivationReply>,
    exit_watch: watch::Sender<Option<UnitExit>>,
}

fn relay_log(extension_id: &str, level: LogLevel, args: &[Value]) {
    let message = args
        .iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    match level {
        LogLevel::Debug => debug!(target: EXTENSION_LOG_TARGET, extension_id = %extension_id, "{}", message),
        LogLevel::Log | LogLevel::Info => info!(target: EXTENSION_LOG_TARGET, extension_id = %extension_id, "{}", message),
        LogLevel::Warn => warn!(target: EXTENSION_LOG_TARGET, extension_id = %extension_id, "{}", message),
        LogLevel::Error => error!(target: EXTENSION_LOG_TARGET, extension_id = %extension_id, "{}", message),
    }
}
