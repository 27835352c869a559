//! Proxy module for zip-keyed egress identities
//!
//! This module provides functionality for:
//! - Loading the process-wide proxy credential base from the environment
//! - Deriving a per-attempt proxy endpoint that routes through a geographic
//!   exit node keyed by zip code
//! - Rendering endpoints for the browser (URL form) and for logs (redacted)

pub mod models;

pub use models::{ProxyEndpoint, ProxySettings, SettingsError, ZipRoutingScheme};
