//! db-courier - an asynchronous SQL query dispatcher.
//!
//! Callers submit query text without blocking; a single worker task owns the
//! database connection, executes statements serially, and parks each finished
//! result in the submitting scope's inbox until the caller drains it on its
//! own schedule.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod escape;
pub mod export;
pub mod logging;
