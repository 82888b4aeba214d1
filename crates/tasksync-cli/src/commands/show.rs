use std::path::Path;

use serde::Serialize;
use tasksync_core::models::SyncQueueEntry;

use crate::commands::common::{
    format_sync_timestamp, normalize_task_identifier, open_service, queue_entry, resolve_task,
    task_to_list_item, TaskListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct TaskDetail {
    #[serde(flatten)]
    task: TaskListItem,
    queue: Option<SyncQueueEntry>,
}

pub async fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_task_identifier(id)?;
    let service = open_service(db_path)?;
    let task = resolve_task(&normalized_id, &service).await?;
    let queue = queue_entry(&service, &task.id).await?;

    if as_json {
        let detail = TaskDetail {
            task: task_to_list_item(&task),
            queue,
        };
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("id:          {}", task.id);
    println!(
        "server id:   {}",
        task.server_id.as_deref().unwrap_or("(not pushed)")
    );
    println!("title:       {}", task.title);
    println!("description: {}", task.description);
    println!("completed:   {}", if task.completed { "yes" } else { "no" });
    println!("created:     {}", format_sync_timestamp(task.created_at));
    println!("updated:     {}", format_sync_timestamp(task.updated_at));
    println!("sync status: {}", task.sync_status);
    if let Some(last_synced_at) = task.last_synced_at {
        println!("last synced: {}", format_sync_timestamp(last_synced_at));
    }
    if let Some(entry) = queue {
        let state = if entry.parked { "parked" } else { "queued" };
        println!(
            "queue:       {state}, {} attempt(s), next retry {}",
            entry.attempt_count,
            format_sync_timestamp(entry.next_retry_at)
        );
        if let Some(last_error) = entry.last_error {
            println!("last error:  {last_error}");
        }
    }
    Ok(())
}
