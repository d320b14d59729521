//! ktest Daemon library
//!
//! This module provides the components of the admission webhook:
//! - Layered configuration
//! - REST handlers for `AdmissionReview` envelopes
//! - Server lifecycle management (HTTP or HTTPS)

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use api::{create_router, AppState};
pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
