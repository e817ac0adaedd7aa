//! Reads IEC 62056-21 (mode A/B/C) energy meters over a serial link, keeps
//! the measurements in a local cache and serves them over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod dump;
pub mod meter;
pub mod metering_62056;
pub mod models;
pub mod obis_utils;
pub mod scheduler;
pub mod status;

// Re-export common types for easier access
pub use api::ApiManager;
pub use cache::{MeasurementCache, MeasurementRepo, MemoryStore, RepoError, SledStore};
pub use config::CONFIG;
pub use meter::{MeterError, MeterSession, SerialLink, SessionSettings};
pub use models::{Measurement, Reading};
pub use scheduler::PollScheduler;
