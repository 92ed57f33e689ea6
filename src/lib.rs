//! cookie-sync - keeps a backend account supplied with browser session cookies
//!
//! This crate harvests cookies for a configured set of domains from a local
//! browser profile and submits them to a backend on a schedule, keeping the
//! user's access token fresh along the way.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod exit_code;
pub mod harvest;
pub mod http;
pub mod logging;
pub mod model;
pub mod output;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod store;
pub mod sync;
pub mod utils;

pub use error::{Result, SyncError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
