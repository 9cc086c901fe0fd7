//! Waymark CLI - manage objectives from the terminal
//!
//! Every command works offline; queued changes are sent with `waymark drain`
//! or automatically while `waymark watch` runs.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{open_context, GlobalOptions};
use crate::commands::delete::run_delete;
use crate::commands::drain::run_drain;
use crate::commands::edit::{resolution_from_flags, run_edit};
use crate::commands::list::run_list;
use crate::commands::status::run_status;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "waymark=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = GlobalOptions {
        store: cli.store,
        server: cli.server,
        offline: cli.offline,
    };
    let context = open_context(&options).await?;

    match cli.command {
        Commands::List { json } => run_list(json, &context).await?,
        Commands::Add { fields } => run_add(&fields, &context).await?,
        Commands::Edit {
            id,
            fields,
            keep_local,
            accept_server,
        } => {
            let resolution = resolution_from_flags(keep_local, accept_server);
            run_edit(&id, &fields, resolution, &context).await?;
        }
        Commands::Delete { id } => run_delete(&id, &context).await?,
        Commands::Drain => run_drain(&context).await?,
        Commands::Status { json } => run_status(json, &context)?,
        Commands::Watch => run_watch(&context).await?,
    }

    context.engine.settled().await;
    Ok(())
}
