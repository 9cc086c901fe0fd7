use std::io;

use thiserror::Error;
use waymark_core::remote::RemoteError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] waymark_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Objective name cannot be empty")]
    EmptyName,
    #[error("Objective ID cannot be empty")]
    EmptyObjectiveId,
    #[error("No fields to change; pass at least one of --name, --city, --address, --neighborhood, --latitude, --longitude, --image")]
    NothingToEdit,
    #[error("Objective not found for id/prefix: {0}")]
    ObjectiveNotFound(String),
    #[error("{0}")]
    AmbiguousObjectiveId(String),
    #[error(
        "Objective {id} changed on the server (you edited version {local}, server has {server}). Re-run with --keep-local or --accept-server."
    )]
    UnresolvedConflict { id: String, local: u64, server: u64 },
    #[error(
        "No server configured. Pass --server, set WAYMARK_SERVER_URL, or add server_url to the config file."
    )]
    ServerNotConfigured,
}
