//! Worker side of the call-correlation protocol.
//!
//! Each capability call gets a fresh [`CallId`] and a oneshot continuation
//! parked in the pending map. The worker's reader task hands every inbound
//! `api-response` to [`RpcClient::resolve`], so responses may arrive in any
//! order and still reach the right caller.

use crate::error::{Result, SdkError};
use harbor_types::{ApiCall, ApiResponse, CallId, Frame, WorkerMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Default time a capability call waits for its response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sending half of the unit → host channel.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Frame>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self { tx }
    }

    pub fn send(&self, message: &WorkerMessage) -> Result<()> {
        let frame = Frame::encode(message)?;
        self.tx.send(frame).map_err(|_| SdkError::ChannelClosed)
    }
}

type PendingMap = HashMap<CallId, oneshot::Sender<ApiResponse>>;

#[derive(Clone)]
pub struct RpcClient {
    outbox: Outbox,
    pending: Arc<Mutex<PendingMap>>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(outbox: Outbox, timeout: Duration) -> Self {
        Self {
            outbox,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues `namespace.method(args)` and awaits the correlated response.
    pub async fn call(&self, namespace: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let call_id = CallId::new();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(call_id, tx);

        let message = WorkerMessage::ApiCall(ApiCall {
            call_id,
            namespace: namespace.to_string(),
            method: method.to_string(),
            args,
        });
        if let Err(e) = self.outbox.send(&message) {
            self.pending().remove(&call_id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => response.into_result().map_err(SdkError::Remote),
            Ok(Err(_)) => Err(SdkError::ChannelClosed),
            Err(_) => {
                self.pending().remove(&call_id);
                Err(SdkError::ApiCallTimeout {
                    namespace: namespace.to_string(),
                    method: method.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Completes the call matching `response.call_id`.
    /// Returns false for unknown or already-settled ids.
    pub fn resolve(&self, response: ApiResponse) -> bool {
        let call_id = response.call_id;
        match self.pending().remove(&call_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                debug!(call_id = %call_id, "Response for unknown call");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }
}
