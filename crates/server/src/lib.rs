//! HTTP service for the seismic data management system.
//!
//! This crate provides the HTTP control plane:
//! - Tenant, subproject and dataset endpoints
//! - Dataset locking through the distributed locker
//! - Group-based authorization over paged entitlements
//! - Signed object URLs
//! - Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod entitlements;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod service;
pub mod state;

pub use auth::TraceId;
pub use entitlements::{ConfigEntitlements, Entitlements};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
