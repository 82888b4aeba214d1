use std::path::Path;

use tasksync_core::TaskUpdate;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_task_identifier, normalize_text, open_service,
    resolve_task,
};
use crate::error::CliError;

pub async fn run_edit(
    id: &str,
    title: Option<&str>,
    description: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let service = open_service(db_path)?;
    let task = resolve_task(&normalized_id, &service).await?;

    let mut update = TaskUpdate {
        title: title.map(str::to_string),
        description: description.map(str::to_string),
        completed: None,
    };
    if update.is_empty() {
        let Some(edited_title) = capture_editor_input_with_initial(&task.title)? else {
            return Err(CliError::EmptyEditedTitle);
        };
        if edited_title == task.title {
            println!("{}", task.id);
            return Ok(());
        }
        update.title = Some(edited_title);
    } else if update.title.as_deref().is_some_and(|title| normalize_text(title).is_none()) {
        return Err(CliError::EmptyEditedTitle);
    }

    let updated = service
        .update_task(&task.id, update)
        .await?
        .ok_or_else(|| CliError::TaskNotFound(normalized_id))?;
    println!("{}", updated.id);
    Ok(())
}

pub async fn run_done(id: &str, completed: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let service = open_service(db_path)?;
    let task = resolve_task(&normalized_id, &service).await?;

    if task.completed == completed {
        println!("{}", task.id);
        return Ok(());
    }

    let update = TaskUpdate {
        completed: Some(completed),
        ..TaskUpdate::default()
    };
    let updated = service
        .update_task(&task.id, update)
        .await?
        .ok_or_else(|| CliError::TaskNotFound(normalized_id))?;
    println!("{}", updated.id);
    Ok(())
}
