//! # Lifesign Core
//!
//! Shared foundation for the Lifesign check-in service: configuration,
//! error taxonomy, domain types, capability traits, and the pause/deadline
//! computation engine.
//!
//! The scheduler, store, and channel crates all build on this one; nothing
//! here talks to the network or the database.

pub mod config;
pub mod crypto;
pub mod deadline;
pub mod error;
pub mod traits;
pub mod types;

pub use config::LifesignConfig;
pub use error::{LifesignError, Result};
