//! Shared objects for the k8s-gateway event controller.
//!
//! `objects` holds the Kubernetes and Brigade wire types, `config` the JSON
//! gateway configuration format. The typed Kubernetes REST client lives in
//! `client` and is gated behind the `client` cargo feature.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod objects;
