use waymark_core::engine::DeleteOutcome;

use crate::commands::common::{normalize_objective_identifier, resolve_objective, Context};
use crate::error::CliError;

pub async fn run_delete(id: &str, context: &Context) -> Result<(), CliError> {
    let normalized_id = normalize_objective_identifier(id)?;
    let objective = resolve_objective(&normalized_id, context.engine.store())?;
    let label = objective
        .id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    match context.engine.delete(objective, context.online).await? {
        DeleteOutcome::Remote | DeleteOutcome::Discarded => println!("{label}"),
        DeleteOutcome::Local => println!("{label} (deleted locally, will sync when online)"),
    }
    Ok(())
}
