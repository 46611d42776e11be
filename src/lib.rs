//! Gatekeeper Library
//!
//! Cache and admission-control coordination layer.
//!
//! # Features
//!
//! - **TTL entries**: key/value store with lazy read-path and background eviction
//! - **Locks**: non-blocking create-if-absent locks with owner tokens and hard expiry
//! - **Debounce**: duplicate-alert suppression built on the lock primitive
//! - **Deny-list**: TTL-bounded revocation list for credentials
//! - **Flash sale**: atomic quota admission that cannot oversell
//! - **Health probe**: write-read-wait-read self-test for the monitoring collaborator
//!
//! Every component talks to the backing store through narrow capability
//! traits in [`backend`]; [`backend::LocalBackend`] is the in-process
//! reference implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod blacklist;
pub mod cli;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod flashsale;
pub mod gatekeeper;
pub mod health;
pub mod lock;
pub mod metrics;

pub use error::{Error, Result};
pub use gatekeeper::Gatekeeper;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
