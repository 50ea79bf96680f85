//! # Realtime Core
//!
//! Core modules shared by the live-location and trip-session crates: the
//! error taxonomy, the backing-store provider, and the clock source.

mod clock;
mod config;
mod error;
pub mod memory;
mod provider;

pub use crate::clock::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::memory::MemoryStore;
pub use crate::provider::*;
