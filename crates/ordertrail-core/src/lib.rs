//! Shared event-sourcing abstractions for Ordertrail.
//!
//! This crate defines the traits and types that the order context, the
//! event store and the read model all depend on. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
