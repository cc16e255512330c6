//! Outbound channels of the capability surface.
//!
//! [`UiEvent`]s go to the presentation layer over a broadcast channel;
//! [`Delivery`]s go back to individual extensions (hook matches,
//! post-processor notifications) over an unbounded mpsc channel that the
//! sandbox host drains.

use crate::commands::Command;
use crate::ui::{StatusBarItem, View};
use harbor_types::PromptId;
use serde::Serialize;
use serde_json::Value;

/// Request or notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiEvent {
    Notification {
        extension_id: String,
        message: String,
        kind: String,
        /// Display time in milliseconds; `None` leaves it to the presentation layer.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<u64>,
    },
    QuickPick {
        extension_id: String,
        request_id: PromptId,
        items: Value,
        options: Value,
    },
    InputBox {
        extension_id: String,
        request_id: PromptId,
        options: Value,
    },
    StatusBarItemAdded(StatusBarItem),
    StatusBarItemUpdated(StatusBarItem),
    StatusBarItemRemoved {
        id: String,
    },
    ViewRegistered(View),
    ViewRemoved {
        id: String,
    },
    CommandRegistered(Command),
    CommandRemoved {
        id: String,
    },
    ExecuteCommand {
        id: String,
        args: Vec<Value>,
    },
    ExtensionCleanedUp {
        extension_id: String,
    },
}

/// Notification addressed to one extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub extension_id: String,
    pub event: String,
    pub data: Value,
}
