//! Order bounded context.
//!
//! Responsible for the order event vocabulary, rebuilding an `Order` by
//! replaying its stream, and turning commands into new events under
//! optimistic concurrency.

pub mod application;
pub mod domain;
