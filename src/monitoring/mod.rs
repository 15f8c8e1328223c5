//! Monitoring Module
//!
//! Tracks what the application has been doing so front-ends can show it.
//!
//! # Components
//!
//! - [`ActivityLog`]: bounded log of user-facing operation messages

pub mod activity;

pub use activity::{ActivityEntry, ActivityLog, Level};
