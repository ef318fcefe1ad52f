//! # Lifesign Scheduler
//!
//! The deadline-tracking and alert-dispatch core: a periodic scan selects
//! users past their deadline, fans each alert out to their accepted
//! contacts over push and email, and records exactly one alert episode per
//! missed-deadline episode. A second, hourly job sweeps expired ephemeral
//! records.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio intervals, start/stop lifecycle)
//!   ├── scan job (60s): DeadlineStore::find_overdue_candidates
//!   │     └── per user → AlertDispatcher
//!   │           ├── PushChannel (one chunked batch)
//!   │           ├── EmailChannel (one send per recipient)
//!   │           └── write AlertEpisode (dedup marker)
//!   └── sweep job (1h): RetentionSweeper → delete_expired
//! ```
//!
//! Failure containment: per-contact > per-user > per-job. A failing tick is
//! logged and the timer keeps running.

pub mod dispatch;
pub mod scanner;
pub mod sweep;
pub mod templates;
#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{AlertDispatcher, DispatchOutcome};
pub use scanner::{ScanSummary, Scheduler};
pub use sweep::RetentionSweeper;
