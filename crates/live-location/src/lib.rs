//! # Live Location
//!
//! Ingestion and session-consistency core for shuttle live locations:
//! identifier normalization, redundancy throttling, session arbitration,
//! persistence, and viewer fanout.

pub mod config;
pub mod fanout;
pub mod identifier;
pub mod key_locker;
pub mod models;
pub mod processor;
pub mod session;
pub mod sync;
pub mod throttle;

pub use config::Config;
pub use fanout::{Subscription, SubscriptionFanout};
pub use identifier::VehicleId;
pub use models::*;
pub use processor::LocationProcessor;
pub use session::{ActiveSession, SessionRegistry, TerminatedSessions, Verdict};
pub use sync::LocationSync;
pub use throttle::{ThrottleGate, haversine_meters};
