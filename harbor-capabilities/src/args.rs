//! Positional argument extraction for capability handlers.

use crate::error::{CapabilityError, Result};
use serde_json::Value;

/// Borrowed view over an `api-call` argument list.
pub(crate) struct Args<'a> {
    method: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub(crate) fn new(method: &'a str, values: &'a [Value]) -> Self {
        Self { method, values }
    }

    /// Argument at `index`, `null` when absent.
    pub(crate) fn value(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or(Value::Null)
    }

    pub(crate) fn str(&self, index: usize, name: &str) -> Result<&'a str> {
        self.values
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(format!("expected string argument '{name}'")))
    }

    pub(crate) fn opt_str(&self, index: usize) -> Option<&'a str> {
        self.values.get(index).and_then(Value::as_str)
    }

    /// Remaining arguments from `index` on.
    pub(crate) fn rest(&self, index: usize) -> Vec<Value> {
        self.values.get(index..).map(<[Value]>::to_vec).unwrap_or_default()
    }

    pub(crate) fn invalid(&self, message: String) -> CapabilityError {
        CapabilityError::InvalidArguments {
            method: self.method.to_string(),
            message,
        }
    }
}
