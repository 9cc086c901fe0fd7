use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "waymark")]
#[command(about = "Manage objectives from the command line, online or offline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local record store
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Objective server base URL (overrides config and environment)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Never contact the server; queue every change locally
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List objectives
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new objective
    #[command(alias = "new")]
    Add {
        #[command(flatten)]
        fields: ObjectiveArgs,
    },
    /// Edit an existing objective
    Edit {
        /// Objective ID or unique ID prefix
        id: String,
        #[command(flatten)]
        fields: ObjectiveArgs,
        /// On conflict, overwrite the server copy with this edit
        #[arg(long, conflicts_with = "accept_server")]
        keep_local: bool,
        /// On conflict, discard this edit and keep the server copy
        #[arg(long)]
        accept_server: bool,
    },
    /// Delete an objective
    Delete {
        /// Objective ID or unique ID prefix
        id: String,
    },
    /// Send queued local changes to the server
    Drain,
    /// Show pending local changes
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stay connected: drain on reconnect and log live updates until Ctrl-C
    Watch,
}

/// Editable objective fields; omitted flags leave the field unchanged
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ObjectiveArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub neighborhood: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<f64>,
    /// Path or URL of the attached image
    #[arg(long, value_name = "PATH")]
    pub image: Option<String>,
}

impl ObjectiveArgs {
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.city.is_none()
            && self.address.is_none()
            && self.neighborhood.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.image.is_none()
    }
}
