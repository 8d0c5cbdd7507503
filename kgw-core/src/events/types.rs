//! Event type definitions for the reconciliation pipeline.

use kgw_sdk::objects::WatchEvent;

use crate::source::SourceError;

/// One item delivered by an event source's watch: a frame, or the error
/// that ended the stream.
pub type WatchItem = Result<WatchEvent, SourceError>;

/// Report of a key that exhausted its retries and was dropped.
///
/// Dropped keys are never retried automatically; this is the only trace
/// they leave besides the error log.
#[derive(Debug, Clone)]
pub struct DroppedItem {
    /// Queue key of the dropped event.
    pub key: String,
    /// Failed attempts, including the last one.
    pub attempts: u32,
    /// The error of the final attempt.
    pub error: String,
    pub dropped_at: time::OffsetDateTime,
}
