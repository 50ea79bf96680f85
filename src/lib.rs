//! # Shuttle
//!
//! HTTP surface for the shuttle live-location service: driver location
//! reports, trip session management, and server-sent event streams for
//! viewers.

pub mod config;
mod http;
mod provider;

pub use crate::http::router;
pub use crate::provider::{Locations, Provider, Sessions};
