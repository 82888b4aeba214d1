use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::Serialize;
use tasksync_core::db::SyncQueue;
use tasksync_core::models::{Origin, SyncConflict, SyncQueueEntry};
use tasksync_core::{SyncConfig, SyncEngine, SyncStatus, Task, TaskId, TaskService};

use crate::error::CliError;
use crate::file_remote::FileRemote;

/// Filesystem locations the CLI works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub db_path: PathBuf,
    pub remote_path: PathBuf,
    pub config_path: PathBuf,
}

impl Paths {
    /// Resolve paths from flags, then `TASKSYNC_*` variables, then defaults
    pub fn resolve(db_path: Option<PathBuf>, remote_path: Option<PathBuf>) -> Self {
        Self::resolve_with(db_path, remote_path, |key| env::var_os(key).map(PathBuf::from))
    }

    pub fn resolve_with(
        db_path: Option<PathBuf>,
        remote_path: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<PathBuf>,
    ) -> Self {
        let data_dir = data_dir();
        Self {
            db_path: db_path
                .or_else(|| lookup("TASKSYNC_DB_PATH"))
                .unwrap_or_else(|| data_dir.join("tasksync.db")),
            remote_path: remote_path
                .or_else(|| lookup("TASKSYNC_REMOTE_PATH"))
                .unwrap_or_else(|| data_dir.join("remote.json")),
            config_path: lookup("TASKSYNC_CONFIG")
                .unwrap_or_else(|| data_dir.join("tasksync.json")),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
}

/// Load the sync configuration file and apply environment overrides
pub fn load_sync_config(path: &Path) -> Result<SyncConfig, CliError> {
    let mut config = SyncConfig::load_from_path(path)?;
    config.apply_overrides(|key| env::var(key).ok())?;
    Ok(config)
}

pub fn open_service(db_path: &Path) -> Result<TaskService, CliError> {
    Ok(TaskService::open_path(db_path)?)
}

/// Open the task service and an engine bound to the file-backed remote
pub fn open_engine(
    paths: &Paths,
    config: SyncConfig,
) -> Result<(TaskService, Arc<SyncEngine<FileRemote>>), CliError> {
    let service = open_service(&paths.db_path)?;
    let remote = FileRemote::open(&paths.remote_path)?;
    let engine = SyncEngine::new(service.database(), remote, config);
    Ok((service, Arc::new(engine)))
}

/// Queue entry for one task, if any
pub async fn queue_entry(
    service: &TaskService,
    task_id: &TaskId,
) -> Result<Option<SyncQueueEntry>, CliError> {
    let db = service.database();
    let db = db.lock().await;
    Ok(SyncQueue::new(db.connection()).get(task_id)?)
}

/// Find a live task by full id or unique id prefix
pub async fn resolve_task(task_query: &str, service: &TaskService) -> Result<Task, CliError> {
    if let Ok(task_id) = task_query.parse::<TaskId>() {
        if let Some(task) = service.get_task(&task_id).await? {
            return Ok(task);
        }
    }

    let prefix = task_query.to_ascii_lowercase();
    let mut matching = service
        .get_all_tasks()
        .await?
        .into_iter()
        .filter(|task| task.id.to_string().starts_with(&prefix))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::TaskNotFound(task_query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|task| short_id(&task.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousTaskId(format!(
                "ID prefix '{task_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub server_id: Option<String>,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

pub fn task_to_list_item(task: &Task) -> TaskListItem {
    let now_ms = Utc::now().timestamp_millis();
    TaskListItem {
        id: task.id.to_string(),
        server_id: task.server_id.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        completed: task.completed,
        created_at: task.created_at,
        updated_at: task.updated_at,
        relative_time: format_relative_time(task.updated_at, now_ms),
        sync_status: task.sync_status,
        last_synced_at: task.last_synced_at,
    }
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let mark = if task.completed { "[x]" } else { "[ ]" };
            let title = title_preview(&task.title, 40);
            let relative_time = format_relative_time(task.updated_at, now_ms);
            let short_id = short_id(&task.id);

            match task.sync_status {
                SyncStatus::Synced => {
                    format!("{short_id:<13}  {mark} {title:<40}  {relative_time}")
                }
                status => format!(
                    "{short_id:<13}  {mark} {title:<40}  {relative_time:<10}  ({status})"
                ),
            }
        })
        .collect()
}

pub fn short_id(id: &TaskId) -> String {
    id.to_string().chars().take(13).collect()
}

pub fn title_preview(title: &str, max_chars: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub task_id: String,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
    pub winner: Origin,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        task_id: conflict.task_id.to_string(),
        local_updated_at: conflict.local_updated_at,
        remote_updated_at: conflict.remote_updated_at,
        winner: conflict.winner,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  task={}  winner={:<6}  local={} remote={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                short_id(&conflict.task_id),
                conflict.winner.as_str(),
                conflict.local_updated_at,
                conflict.remote_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Title from arguments, else from piped stdin; `None` keeps the default
pub fn resolve_title(title_parts: &[String]) -> Result<Option<String>, CliError> {
    if let Some(title) = normalize_text(&title_parts.join(" ")) {
        return Ok(Some(title));
    }
    read_piped_stdin()
}

pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_task_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTaskId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_text(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_task_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_text(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let status = Command::new(program).args(parts).arg(file_path).status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_task_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("tasksync-title-{}-{now}.txt", std::process::id()))
}
