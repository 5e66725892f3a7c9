//! Application services for the order context.

pub mod command_handlers;
pub mod query_handlers;
