//! # Trip Session
//!
//! Lifecycle of tracking sessions: start, pause, resume, and complete a
//! session, append its events, and record which viewers have seen it.

mod lifecycle;
mod models;

pub use crate::lifecycle::TripSessionLifecycle;
pub use crate::models::*;
