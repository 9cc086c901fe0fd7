//! waymark-core - Core library for Waymark
//!
//! This crate contains the objective model, the local record store, the
//! remote service seam, and the offline sync engine used by every Waymark
//! client.

pub mod config;
pub mod conflict;
pub mod connectivity;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod feed;
pub mod models;
pub mod reducer;
pub mod remote;
pub mod session;
pub mod state;
pub mod store;
pub mod util;

pub use error::{Error, Result};
pub use models::{Objective, ObjectiveId, PendingStatus};
