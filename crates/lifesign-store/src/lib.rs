//! # Lifesign Store
//!
//! SQLite-backed persistence for users, contacts, alert episodes, and the
//! ephemeral record classes swept by the retention job. Implements the
//! `DeadlineStore` capability consumed by the scheduler.

pub mod sqlite;

pub use sqlite::SqliteStore;
