#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

//! Event reconciliation core: a rate-limited work queue, an event cache kept
//! current by an informer, and the gateway that turns accepted events into
//! builds.

pub mod cache;
pub mod events;
pub mod filter;
pub mod processors;
pub mod queue;
pub mod script;
pub mod source;
pub mod store;

pub use cache::{EventCache, EventLookup, LookupError};
pub use processors::{Gateway, GatewayOptions, GatewayStats, Informer, ScriptPolicy};
pub use queue::RateLimitingQueue;
pub use script::{HttpScriptFetcher, ScriptFetcher};
pub use source::{EventSource, SourceError};
pub use store::{BuildStore, StoreError};
