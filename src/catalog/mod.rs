//! Remote catalog integration module.
//!
//! This module provides the connection seam to the remote catalog, its HTTP
//! implementation, the object types exchanged with it and the observer that
//! lists owned objects.

mod client;
mod types;
mod observer;
#[cfg(test)]
pub(crate) mod memory;

pub use client::{HttpCatalogClient, RemoteClient};
#[cfg(test)]
pub(crate) use client::MockRemoteClient;
pub use types::{
    DesiredObject, ObjectKind, ObservedObject, OutcomeAction, OutcomeRecord, Page,
};
pub use observer::CatalogObserver;
