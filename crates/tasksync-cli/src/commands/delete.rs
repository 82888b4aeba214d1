use std::path::Path;

use crate::commands::common::{normalize_task_identifier, open_service, resolve_task};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let service = open_service(db_path)?;
    let task = resolve_task(&normalized_id, &service).await?;

    if !service.delete_task(&task.id).await? {
        return Err(CliError::TaskNotFound(normalized_id));
    }
    println!("{}", task.id);
    Ok(())
}
