//! Channels connecting the pipeline's tasks.
//!
//! # Flow
//!
//! 1. An event source pushes `WatchItem`s -> `Informer`
//! 2. `Informer` updates the cache and adds keys to the queue
//! 3. Gateway workers pull keys, and report keys they give up on as
//!    `DroppedItem`s
//!
//! Queue keys carry identifiers only; workers re-read the cache for the
//! current state of an event.

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, DroppedItemReceiver, DroppedItemSender, WatchReceiver, WatchSender,
    dropped_item_channel, watch_channel,
};

pub use types::{DroppedItem, WatchItem};
