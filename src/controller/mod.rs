//! # Controller
//!
//! Resource building, store access, reconciliation and the metrics/probe server.

pub mod reconciler;
pub mod resources;
pub mod server;
pub mod store;
