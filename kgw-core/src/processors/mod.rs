//! Event processors for the reconciliation pipeline.
//!
//! - `Informer`: Lists and watches events, keeps the cache current, enqueues
//!   keys it has not seen before
//! - `Gateway`: Pulls keys from the queue, filters them and creates builds

pub mod gateway;
pub mod informer;

pub use gateway::{
    DEFAULT_MAX_RETRIES, DEFAULT_SCRIPT_REF, Gateway, GatewayOptions, GatewayStats, ScriptPolicy,
    SyncError, SyncOutcome,
};
pub use informer::Informer;
