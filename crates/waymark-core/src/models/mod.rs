//! Data models for Waymark

mod objective;

pub use objective::{Objective, ObjectiveId, PendingStatus, TEMPORARY_ID_PREFIX};
