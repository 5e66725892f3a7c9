//! Order summary read model.
//!
//! Summaries are derived from the event log after each append commits. Each
//! record remembers the stream version it was last brought up to, so
//! re-delivered events are ignored and a summary left behind by a failed
//! projection step can be found and caught up from the log.

pub mod memory;
pub mod pg_summary_store;
pub mod projector;
pub mod store;
pub mod summary;

pub use memory::InMemorySummaryStore;
pub use pg_summary_store::PgSummaryStore;
pub use projector::{CatchUpReport, LaggingStream, SummaryProjector};
pub use store::SummaryStore;
pub use summary::{OrderSummary, ProjectionOutcome, SummaryChange};
