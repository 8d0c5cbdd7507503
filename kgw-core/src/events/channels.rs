//! Channel factories and handles.

use super::types::{DroppedItem, WatchItem};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for watch frames.
pub type WatchSender = mpsc::Sender<WatchItem>;
/// Receiver handle for watch frames.
pub type WatchReceiver = mpsc::Receiver<WatchItem>;

/// Sender handle for DroppedItem reports.
pub type DroppedItemSender = mpsc::Sender<DroppedItem>;
/// Receiver handle for DroppedItem reports.
pub type DroppedItemReceiver = mpsc::Receiver<DroppedItem>;

/// Create a new watch channel.
///
/// An event source pushes decoded frames into the sender; the informer
/// drains the receiver. Closing the sender ends the watch.
pub fn watch_channel() -> (WatchSender, WatchReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a new DroppedItem channel.
///
/// Reports are sent with `try_send`; when the buffer is full they are
/// discarded rather than blocking a worker.
pub fn dropped_item_channel() -> (DroppedItemSender, DroppedItemReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
