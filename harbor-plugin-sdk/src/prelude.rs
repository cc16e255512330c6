//! Common imports for plugin authors.

pub use crate::api::ExtensionApi;
pub use crate::{Console, Export, Exports, Extension, ExtensionContext, Module, NativeModules, SdkError};
pub use async_trait::async_trait;
pub use harbor_types::LogLevel;
