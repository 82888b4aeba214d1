use std::path::Path;

use tasksync_core::NewTask;

use crate::commands::common::{normalize_text, open_service, resolve_title};
use crate::error::CliError;

pub async fn run_add(
    title_parts: &[String],
    description: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let input = NewTask {
        title: resolve_title(title_parts)?,
        description: description.and_then(normalize_text),
    };

    let service = open_service(db_path)?;
    let task = service.create_task(input).await?;

    println!("{}", task.id);
    Ok(())
}
