//! Target grade history for Doubtfire projects.
//!
//! [`SyncEngine`] fetches a project's grade change history, keeps it sorted
//! and paginated, and re-fetches on a fixed interval without touching the
//! view when nothing changed.

pub mod config;
pub mod engine;
pub mod fetch;
pub mod grades;
pub mod history;
pub mod logging;
pub mod page;
pub mod poller;

pub use engine::{HistoryView, Phase, RefreshOutcome, SyncEngine};
pub use fetch::{FetchError, HistoryFetcher, HttpFetcher};
pub use grades::{GradeLookup, GradeTable};
pub use history::HistoryRecord;
