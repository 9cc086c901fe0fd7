use crate::commands::common::{
    format_objective_lines, objective_to_list_item, Context, ObjectiveListItem,
};
use crate::error::CliError;

pub async fn run_list(as_json: bool, context: &Context) -> Result<(), CliError> {
    let objectives = context.engine.fetch().await?;

    if as_json {
        let json_items = objectives
            .iter()
            .map(objective_to_list_item)
            .collect::<Vec<ObjectiveListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if objectives.is_empty() {
        let state = context.engine.settled().await;
        match state.fetch_error {
            Some(error) => println!("No objectives available offline ({error})."),
            None => println!("No objectives yet."),
        }
        return Ok(());
    }

    for line in format_objective_lines(&objectives) {
        println!("{line}");
    }
    Ok(())
}
