//! Meeting store passthrough and post-processor registry.

use crate::error::Result;
use crate::lock;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

/// Read/write access to the meeting transcription store.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn all(&self) -> Result<Vec<Value>>;

    async fn by_id(&self, id: &str) -> Result<Option<Value>>;

    async fn update_content(&self, id: &str, content: Value) -> Result<()>;
}

/// An extension asking to be notified when a meeting is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessor {
    pub extension_id: String,
    pub processor_id: String,
}

#[derive(Default)]
pub(crate) struct PostProcessorRegistry {
    processors: Mutex<Vec<PostProcessor>>,
}

impl PostProcessorRegistry {
    pub(crate) fn add(&self, extension_id: &str, processor_id: &str) {
        lock(&self.processors).push(PostProcessor {
            extension_id: extension_id.to_string(),
            processor_id: processor_id.to_string(),
        });
    }

    /// Registered processors in registration order.
    pub(crate) fn snapshot(&self) -> Vec<PostProcessor> {
        lock(&self.processors).clone()
    }

    pub(crate) fn remove_extension(&self, extension_id: &str) -> usize {
        let mut processors = lock(&self.processors);
        let before = processors.len();
        processors.retain(|p| p.extension_id != extension_id);
        before - processors.len()
    }
}
