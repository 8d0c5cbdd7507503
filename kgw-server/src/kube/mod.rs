//! Kubernetes-backed implementations of the core capabilities.

mod source;
mod store;

pub use source::KubeEventSource;
pub use store::KubeStore;
