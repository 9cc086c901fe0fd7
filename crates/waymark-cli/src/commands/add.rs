use waymark_core::conflict::EditDraft;
use waymark_core::engine::SaveOutcome;

use crate::cli::ObjectiveArgs;
use crate::commands::common::{new_objective, Context};
use crate::error::CliError;

pub async fn run_add(fields: &ObjectiveArgs, context: &Context) -> Result<(), CliError> {
    let user_id = context.session().user_id;
    let objective = new_objective(fields, &user_id)?;
    let record = EditDraft::create(objective).into_record();

    let outcome = context.engine.save(record, context.online).await?;
    print_save_outcome(&outcome);
    Ok(())
}

pub fn print_save_outcome(outcome: &SaveOutcome) {
    let id = outcome
        .objective()
        .id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    match outcome {
        SaveOutcome::Remote(_) | SaveOutcome::Adopted(_) => println!("{id}"),
        SaveOutcome::Local(_) => println!("{id} (saved locally, will sync when online)"),
    }
}
