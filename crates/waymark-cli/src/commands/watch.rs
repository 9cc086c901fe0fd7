use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use waymark_core::engine::RunOptions;
use waymark_core::util::feed_url_from_server;

use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_watch(context: &Context) -> Result<(), CliError> {
    let server = context.require_server()?;
    let shutdown = CancellationToken::new();

    let probe_server = Arc::clone(&server);
    let probe = context.engine.connectivity().spawn_probe(
        context.config.probe_interval(),
        shutdown.clone(),
        move || {
            let server = Arc::clone(&probe_server);
            async move { server.is_reachable().await }
        },
    );

    let options = RunOptions {
        feed_url: feed_url_from_server(server.base_url()),
    };
    let runner = tokio::spawn(Arc::clone(&context.engine).run(options, shutdown.clone()));

    println!("Watching {} (Ctrl-C to stop)", server.base_url());
    tokio::signal::ctrl_c().await?;

    shutdown.cancel();
    let _ = runner.await;
    let _ = probe.await;
    Ok(())
}
