//! Event source capability: list current events and watch for changes.

use async_trait::async_trait;
use kgw_sdk::objects::{Event, ObjectList};
use thiserror::Error;

use crate::events::WatchReceiver;

/// Errors reported by an [`EventSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("list failed: {0}")]
    List(String),

    #[error("watch failed: {0}")]
    Watch(String),
}

/// Supplies the current state of events and notifications of later changes.
///
/// Delivery is at-least-once and eventually consistent; the informer
/// tolerates duplicates and relists when a watch breaks.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// List the events that currently exist.
    async fn list(&self) -> Result<ObjectList<Event>, SourceError>;

    /// Stream changes that happened after `resource_version`.
    ///
    /// The watch ends when the sender side of the returned channel closes.
    async fn watch(&self, resource_version: &str) -> Result<WatchReceiver, SourceError>;
}
