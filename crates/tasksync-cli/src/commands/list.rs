use std::path::Path;

use tasksync_core::Task;

use crate::commands::common::{format_task_lines, open_service, task_to_list_item, TaskListItem};
use crate::error::CliError;

pub async fn list_tasks(include_completed: bool, db_path: &Path) -> Result<Vec<Task>, CliError> {
    let service = open_service(db_path)?;
    let mut tasks = service.get_all_tasks().await?;
    if !include_completed {
        tasks.retain(|task| !task.completed);
    }
    Ok(tasks)
}

pub async fn run_list(include_completed: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let tasks = list_tasks(include_completed, db_path).await?;

    if as_json {
        let json_items = tasks
            .iter()
            .map(task_to_list_item)
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }

    Ok(())
}
