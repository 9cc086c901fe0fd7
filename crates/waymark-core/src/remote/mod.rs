//! Remote objective service seam
//!
//! The sync engine only ever talks to the server through [`ObjectiveService`].
//! [`HttpObjectiveService`] is the production implementation; tests provide
//! their own.

mod http;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpObjectiveService;

use crate::models::{Objective, ObjectiveId};

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server could not be reached (connection refused, DNS, timeout)
    #[error("Server unreachable: {0}")]
    Unreachable(String),
    /// The server answered with a non-success status
    #[error("Server rejected request: {message} ({status})")]
    Api { status: u16, message: String },
    /// The server answered with a body that is not an objective
    #[error("Invalid server payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// Whether the failure is a connectivity problem rather than a rejection
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::InvalidPayload(_) | Self::InvalidConfiguration(_) => false,
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// CRUD operations of the objective server
///
/// Every call may fail with [`RemoteError::Unreachable`]; the engine treats any
/// failure on save and delete as "offline".
#[async_trait]
pub trait ObjectiveService: Send + Sync {
    async fn list(&self, token: &str) -> RemoteResult<Vec<Objective>>;

    async fn get(&self, token: &str, id: &ObjectiveId) -> RemoteResult<Objective>;

    async fn create(&self, token: &str, objective: &Objective) -> RemoteResult<Objective>;

    async fn update(&self, token: &str, objective: &Objective) -> RemoteResult<Objective>;

    async fn delete(&self, token: &str, objective: &Objective) -> RemoteResult<()>;
}
