//! In-process reference remote.
//!
//! Stores the latest version of every record with a monotonic change
//! sequence, hands out sequence numbers as watermarks, and keeps the newest
//! write per record. Faults (unreachability, failing calls, per-task
//! rejections, latency) can be injected to exercise the engine's recovery
//! paths. The whole state serializes as a [`RemoteSnapshot`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{PullBatch, PushItem, PushOutcome, PushResult, Remote, RemoteError, RemoteTask};
use crate::models::{TaskId, Watermark};

/// A stored record and the change sequence that last wrote it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub seq: u64,
    pub record: RemoteTask,
}

/// Serializable remote state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Last assigned change sequence
    pub seq: u64,
    /// Last assigned numeric part of a server id
    pub last_server_id: u64,
    /// Records keyed by server id
    pub records: BTreeMap<String, StoredRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    push_failures: VecDeque<RemoteError>,
    pull_failures: VecDeque<RemoteError>,
    rejections: HashMap<TaskId, RemoteError>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: RemoteSnapshot,
    faults: Faults,
    pushed_items: usize,
}

/// Reference [`Remote`] backed by process memory
#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously captured state
    pub fn from_snapshot(snapshot: RemoteSnapshot) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot,
                ..Inner::default()
            }),
        }
    }

    /// Replace the stored state; injected faults are kept
    pub fn restore(&self, snapshot: RemoteSnapshot) {
        self.lock().snapshot = snapshot;
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> RemoteSnapshot {
        self.lock().snapshot.clone()
    }

    /// Current version of a record
    pub fn record(&self, server_id: &str) -> Option<RemoteTask> {
        self.lock()
            .snapshot
            .records
            .get(server_id)
            .map(|stored| stored.record.clone())
    }

    /// All current records ordered by server id
    pub fn records(&self) -> Vec<RemoteTask> {
        self.lock()
            .snapshot
            .records
            .values()
            .map(|stored| stored.record.clone())
            .collect()
    }

    /// Number of items the remote has received across all pushes
    pub fn pushed_items(&self) -> usize {
        self.lock().pushed_items
    }

    /// Write a record as another client would; assigns a server id if empty
    pub fn write_record(&self, mut record: RemoteTask) -> String {
        let mut inner = self.lock();
        if record.server_id.is_empty() {
            record.server_id = inner.next_server_id();
        }
        let server_id = record.server_id.clone();
        inner.store(record);
        server_id
    }

    /// Make every call fail with [`RemoteError::Unreachable`]
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().faults.unreachable = unreachable;
    }

    /// Fail the next push call as a whole
    pub fn fail_next_push(&self, error: RemoteError) {
        self.lock().faults.push_failures.push_back(error);
    }

    /// Fail the next pull call
    pub fn fail_next_pull(&self, error: RemoteError) {
        self.lock().faults.pull_failures.push_back(error);
    }

    /// Fail every push item for `task_id` until cleared
    pub fn reject_task(&self, task_id: TaskId, error: RemoteError) {
        self.lock().faults.rejections.insert(task_id, error);
    }

    pub fn clear_rejection(&self, task_id: &TaskId) {
        self.lock().faults.rejections.remove(task_id);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().faults.latency = latency;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().faults.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Inner {
    fn next_server_id(&mut self) -> String {
        self.snapshot.last_server_id += 1;
        format!("srv-{}", self.snapshot.last_server_id)
    }

    fn store(&mut self, record: RemoteTask) {
        self.snapshot.seq += 1;
        let seq = self.snapshot.seq;
        self.snapshot
            .records
            .insert(record.server_id.clone(), StoredRecord { seq, record });
    }

    fn find_server_id(&self, item: &PushItem) -> Option<String> {
        if let Some(server_id) = &item.server_id {
            if self.snapshot.records.contains_key(server_id) {
                return Some(server_id.clone());
            }
        }
        self.snapshot
            .records
            .values()
            .find(|stored| stored.record.client_id == Some(item.task_id))
            .map(|stored| stored.record.server_id.clone())
    }

    fn accept(&mut self, item: &PushItem) -> PushOutcome {
        if let Some(error) = self.faults.rejections.get(&item.task_id) {
            return PushOutcome::Failed(error.clone());
        }
        if item.title.trim().is_empty() {
            return PushOutcome::Failed(RemoteError::InvalidPayload(
                "title must not be empty".to_string(),
            ));
        }

        let existing = self.find_server_id(item);
        let server_id = existing
            .clone()
            .or_else(|| item.server_id.clone())
            .unwrap_or_else(|| self.next_server_id());

        let stored_clock = existing
            .as_ref()
            .and_then(|id| self.snapshot.records.get(id))
            .and_then(|stored| stored.record.updated_at);
        // The remote keeps the newest write; an older push is acknowledged
        // without overwriting it and the client picks the newer version up
        // on its next pull.
        if stored_clock.is_some_and(|clock| clock > item.updated_at) {
            return PushOutcome::Accepted { server_id };
        }

        let client_id = existing
            .as_ref()
            .and_then(|id| self.snapshot.records.get(id))
            .and_then(|stored| stored.record.client_id)
            .or(Some(item.task_id));
        let record = RemoteTask {
            server_id: server_id.clone(),
            client_id,
            title: item.title.clone(),
            description: item.description.clone(),
            completed: item.completed,
            created_at: item.created_at,
            updated_at: Some(item.updated_at),
            is_deleted: item.is_deleted,
        };
        let unchanged = existing
            .as_ref()
            .and_then(|id| self.snapshot.records.get(id))
            .is_some_and(|stored| stored.record == record);
        if !unchanged {
            self.store(record);
        }

        PushOutcome::Accepted { server_id }
    }
}

fn parse_watermark(since: Option<&Watermark>) -> Result<u64, RemoteError> {
    since.map_or(Ok(0), |watermark| {
        watermark.as_str().parse().map_err(|_| {
            RemoteError::InvalidPayload(format!("unknown watermark {watermark}"))
        })
    })
}

impl Remote for MemoryRemote {
    async fn push(&self, batch: &[PushItem]) -> Result<Vec<PushResult>, RemoteError> {
        self.simulate_latency().await;

        let mut inner = self.lock();
        if inner.faults.unreachable {
            return Err(RemoteError::Unreachable("memory remote offline".to_string()));
        }
        if let Some(error) = inner.faults.push_failures.pop_front() {
            return Err(error);
        }

        inner.pushed_items += batch.len();
        let results = batch
            .iter()
            .map(|item| PushResult {
                task_id: item.task_id,
                outcome: inner.accept(item),
            })
            .collect();
        Ok(results)
    }

    async fn pull(&self, since: Option<&Watermark>) -> Result<PullBatch, RemoteError> {
        self.simulate_latency().await;

        let mut inner = self.lock();
        if inner.faults.unreachable {
            return Err(RemoteError::Unreachable("memory remote offline".to_string()));
        }
        if let Some(error) = inner.faults.pull_failures.pop_front() {
            return Err(error);
        }

        let since = parse_watermark(since)?;
        let mut changed: Vec<&StoredRecord> = inner
            .snapshot
            .records
            .values()
            .filter(|stored| stored.seq > since)
            .collect();
        changed.sort_by_key(|stored| stored.seq);

        let high = changed.last().map_or(since, |stored| stored.seq);
        Ok(PullBatch {
            records: changed.into_iter().map(|stored| stored.record.clone()).collect(),
            new_watermark: Watermark::new(high.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, Task};
    use pretty_assertions::assert_eq;

    fn item(title: &str, updated_at: i64) -> PushItem {
        let mut task = Task::new(NewTask {
            title: Some(title.to_string()),
            description: None,
        });
        task.updated_at = updated_at;
        PushItem::from(&task)
    }

    fn accepted_id(result: &PushResult) -> String {
        match &result.outcome {
            PushOutcome::Accepted { server_id } => server_id.clone(),
            PushOutcome::Failed(error) => panic!("push failed: {error}"),
        }
    }

    #[tokio::test]
    async fn push_assigns_server_ids_and_pull_returns_changes() {
        let remote = MemoryRemote::new();
        let a = item("a", 10);
        let b = item("b", 20);

        let results = remote.push(&[a.clone(), b]).await.unwrap();
        assert_eq!(accepted_id(&results[0]), "srv-1");
        assert_eq!(accepted_id(&results[1]), "srv-2");

        let batch = remote.pull(None).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].client_id, Some(a.task_id));
        assert_eq!(batch.new_watermark, Watermark::new("2"));

        let empty = remote.pull(Some(&batch.new_watermark)).await.unwrap();
        assert!(empty.records.is_empty());
        assert_eq!(empty.new_watermark, Watermark::new("2"));
    }

    #[tokio::test]
    async fn repeated_push_of_same_client_id_does_not_duplicate() {
        let remote = MemoryRemote::new();
        let a = item("a", 10);

        remote.push(std::slice::from_ref(&a)).await.unwrap();
        let again = remote.push(std::slice::from_ref(&a)).await.unwrap();

        assert_eq!(accepted_id(&again[0]), "srv-1");
        assert_eq!(remote.records().len(), 1);
        assert_eq!(remote.snapshot().seq, 1);
    }

    #[tokio::test]
    async fn older_push_does_not_overwrite_newer_record() {
        let remote = MemoryRemote::new();
        let mut a = item("newer", 50);
        remote.push(std::slice::from_ref(&a)).await.unwrap();

        a.title = "older".to_string();
        a.updated_at = 40;
        remote.push(&[a]).await.unwrap();

        assert_eq!(remote.record("srv-1").unwrap().title, "newer");
    }

    #[tokio::test]
    async fn injected_faults_surface_as_errors() {
        let remote = MemoryRemote::new();
        let a = item("a", 10);

        remote.fail_next_push(RemoteError::Timeout);
        assert_eq!(
            remote.push(std::slice::from_ref(&a)).await,
            Err(RemoteError::Timeout)
        );

        remote.reject_task(a.task_id, RemoteError::Unauthorized("token".into()));
        let results = remote.push(std::slice::from_ref(&a)).await.unwrap();
        assert!(matches!(results[0].outcome, PushOutcome::Failed(_)));

        remote.set_unreachable(true);
        assert!(matches!(
            remote.pull(None).await,
            Err(RemoteError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_restores_state() {
        let remote = MemoryRemote::new();
        remote.push(&[item("a", 10)]).await.unwrap();

        let restored = MemoryRemote::from_snapshot(remote.snapshot());
        assert_eq!(restored.records(), remote.records());
        let batch = restored.push(&[item("b", 11)]).await.unwrap();
        assert_eq!(accepted_id(&batch[0]), "srv-2");
    }

    #[tokio::test]
    async fn restore_replaces_records_and_keeps_faults() {
        let source = MemoryRemote::new();
        source.push(&[item("a", 10)]).await.unwrap();

        let remote = MemoryRemote::new();
        remote.push(&[item("stale", 5)]).await.unwrap();
        remote.fail_next_pull(RemoteError::RateLimited);
        remote.restore(source.snapshot());

        assert_eq!(remote.records(), source.records());
        assert_eq!(remote.pull(None).await, Err(RemoteError::RateLimited));
    }

    #[tokio::test]
    async fn rejects_unknown_watermark() {
        let remote = MemoryRemote::new();
        assert!(matches!(
            remote.pull(Some(&Watermark::new("not-a-number"))).await,
            Err(RemoteError::InvalidPayload(_))
        ));
    }
}
