//! Offline cache and update controller.
//!
//! Versioned response stores plus the routing rules that let the
//! application keep working without a network:
//!
//! - [`store`]: named stores, persisted as one JSON manifest
//! - [`controller`]: install, activate and request routing for one version
//! - [`host`]: installing/waiting/active slots and the consent-based takeover

pub mod controller;
pub mod fetch;
pub mod host;
pub mod store;
pub mod types;

pub use controller::{
    precache_store_name, runtime_store_name, store_version, CacheController, Route, Router,
    NETWORK_UNAVAILABLE,
};
pub use fetch::{Fetcher, HttpFetcher};
pub use host::{
    HostAction, HostPage, Registration, RegistrationEvent, RegistrationStatus, UpdatePrompt,
    UpdateStatus,
};
pub use store::CacheStorage;
pub use types::{Command, FetchOutcome, Request, Response, ServedFrom, WorkerState};
