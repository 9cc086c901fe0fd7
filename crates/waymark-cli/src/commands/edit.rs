use waymark_core::conflict::{ConflictCheck, Resolution};

use crate::cli::ObjectiveArgs;
use crate::commands::add::print_save_outcome;
use crate::commands::common::{
    apply_fields, normalize_objective_identifier, resolve_objective, Context,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    fields: &ObjectiveArgs,
    resolution: Option<Resolution>,
    context: &Context,
) -> Result<(), CliError> {
    if fields.is_empty() && resolution != Some(Resolution::AcceptServer) {
        return Err(CliError::NothingToEdit);
    }
    let normalized_id = normalize_objective_identifier(id)?;
    let objective = resolve_objective(&normalized_id, context.engine.store())?;
    let Some(objective_id) = objective.id.clone() else {
        return Err(CliError::ObjectiveNotFound(normalized_id));
    };

    let (mut draft, check) = context.engine.open_for_edit(&objective_id).await?;
    apply_fields(&mut draft.fields, fields)?;

    let outcome = match check {
        ConflictCheck::Conflict(server) => {
            let Some(resolution) = resolution else {
                return Err(CliError::UnresolvedConflict {
                    id: objective_id.to_string(),
                    local: draft.base_version().unwrap_or_default(),
                    server: server.version,
                });
            };
            context
                .engine
                .resolve_conflict(draft, &server, resolution, context.online)
                .await?
        }
        ConflictCheck::Clean | ConflictCheck::Unverified => {
            if fields.is_empty() {
                println!("No conflict for {objective_id}; nothing to change");
                return Ok(());
            }
            context
                .engine
                .save(draft.into_record(), context.online)
                .await?
        }
    };

    print_save_outcome(&outcome);
    Ok(())
}

/// Map the `--keep-local` / `--accept-server` flags
pub const fn resolution_from_flags(keep_local: bool, accept_server: bool) -> Option<Resolution> {
    if keep_local {
        Some(Resolution::KeepLocal)
    } else if accept_server {
        Some(Resolution::AcceptServer)
    } else {
        None
    }
}
