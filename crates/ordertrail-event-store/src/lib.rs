//! `PostgreSQL` storage for the order event log.
//!
//! The schema lives in the workspace `migrations/` directory and is applied
//! by the API binary at startup.

pub mod pg_event_repository;

pub use pg_event_repository::PgEventRepository;
