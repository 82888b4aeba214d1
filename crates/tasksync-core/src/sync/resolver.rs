//! Last-writer-wins conflict resolution.
//!
//! A pure function over two snapshots of the same logical task. The ordering
//! key is `(updated_at, is_deleted, is_remote)`: the later write wins, a
//! deletion beats an edit with the same clock, and the remote wins any
//! remaining tie. Because the key is a total order over one local and one
//! remote snapshot, argument order does not matter.

use super::{RemoteTask, SyncError};
use crate::models::{Origin, SyncStatus, Task};

/// One side of a conflict
#[derive(Debug, Clone, Copy)]
pub enum Version<'a> {
    Local(&'a Task),
    Remote(&'a RemoteTask),
}

impl Version<'_> {
    const fn origin(&self) -> Origin {
        match self {
            Self::Local(_) => Origin::Local,
            Self::Remote(_) => Origin::Remote,
        }
    }

    const fn updated_at(&self) -> Option<i64> {
        match self {
            Self::Local(task) => Some(task.updated_at),
            Self::Remote(task) => task.updated_at,
        }
    }

    const fn is_deleted(&self) -> bool {
        match self {
            Self::Local(task) => task.is_deleted,
            Self::Remote(task) => task.is_deleted,
        }
    }

    fn clock(&self) -> Result<i64, SyncError> {
        match self.updated_at() {
            Some(updated_at) if updated_at > 0 => Ok(updated_at),
            Some(updated_at) => Err(SyncError::ConflictUnresolvable(format!(
                "{} version has invalid updated_at {updated_at}",
                self.origin()
            ))),
            None => Err(SyncError::ConflictUnresolvable(format!(
                "{} version has no updated_at",
                self.origin()
            ))),
        }
    }
}

/// Merged result of a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// New canonical local state
    pub task: Task,
    pub winner: Origin,
    /// Both sides carried different content and the local side had
    /// unsynced changes
    pub conflicted: bool,
}

/// Resolve a local and a remote snapshot of the same task, in either order
///
/// The merged task keeps the local identity and creation time, links the
/// remote `server_id`, and takes its payload from the winner. A remote winner
/// is `synced` as of `now`; a local winner stays queued so it is pushed again.
pub fn resolve(a: Version<'_>, b: Version<'_>, now: i64) -> Result<Resolution, SyncError> {
    let (local, remote) = match (a, b) {
        (Version::Local(local), Version::Remote(remote))
        | (Version::Remote(remote), Version::Local(local)) => (local, remote),
        _ => {
            return Err(SyncError::ConflictUnresolvable(
                "resolution needs one local and one remote version".to_string(),
            ))
        }
    };

    let local_version = Version::Local(local);
    let remote_version = Version::Remote(remote);
    let local_clock = local_version.clock()?;
    let remote_clock = remote_version.clock()?;

    if let Some(server_id) = &local.server_id {
        if server_id != &remote.server_id {
            return Err(SyncError::ConflictUnresolvable(format!(
                "task {} is linked to {server_id}, remote version is {}",
                local.id, remote.server_id
            )));
        }
    }

    let local_key = (local_clock, local_version.is_deleted(), false);
    let remote_key = (remote_clock, remote_version.is_deleted(), true);
    let winner = if remote_key > local_key {
        Origin::Remote
    } else {
        Origin::Local
    };

    let content_differs = local.title != remote.title
        || local.description != remote.description
        || local.completed != remote.completed
        || local.is_deleted != remote.is_deleted
        || local_clock != remote_clock;
    let conflicted = content_differs && local.sync_status.needs_sync();

    let mut task = local.clone();
    task.server_id = Some(remote.server_id.clone());
    match winner {
        Origin::Remote => {
            task.title.clone_from(&remote.title);
            task.description.clone_from(&remote.description);
            task.completed = remote.completed;
            task.is_deleted = remote.is_deleted;
            task.updated_at = remote_clock;
            task.sync_status = SyncStatus::Synced;
            task.last_synced_at = Some(now);
        }
        Origin::Local => {
            // A parked failure stays parked; anything else is re-pushed.
            if task.sync_status != SyncStatus::Error {
                task.sync_status = SyncStatus::Pending;
            }
        }
    }

    Ok(Resolution {
        task,
        winner,
        conflicted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, TaskId};
    use pretty_assertions::assert_eq;

    const NOW: i64 = 9_000;

    fn local(updated_at: i64, completed: bool) -> Task {
        let mut task = Task::new(NewTask {
            title: Some("Write report".to_string()),
            description: None,
        });
        task.server_id = Some("srv-1".to_string());
        task.created_at = 100;
        task.updated_at = updated_at;
        task.completed = completed;
        task
    }

    fn remote(updated_at: Option<i64>, completed: bool) -> RemoteTask {
        RemoteTask {
            server_id: "srv-1".to_string(),
            client_id: None,
            title: "Write report".to_string(),
            description: "Not Mentioned".to_string(),
            completed,
            created_at: 100,
            updated_at,
            is_deleted: false,
        }
    }

    #[test]
    fn newer_remote_wins_and_is_synced() {
        let l = local(1_000, false);
        let r = remote(Some(2_000), true);

        let resolved = resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap();
        assert_eq!(resolved.winner, Origin::Remote);
        assert!(resolved.task.completed);
        assert_eq!(resolved.task.sync_status, SyncStatus::Synced);
        assert_eq!(resolved.task.last_synced_at, Some(NOW));
        assert_eq!(resolved.task.id, l.id);
        assert_eq!(resolved.task.updated_at, 2_000);
    }

    #[test]
    fn newer_local_wins_and_stays_pending() {
        let mut l = local(3_000, true);
        l.sync_status = SyncStatus::Synced;
        let r = remote(Some(2_000), false);

        let resolved = resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap();
        assert_eq!(resolved.winner, Origin::Local);
        assert!(resolved.task.completed);
        assert_eq!(resolved.task.sync_status, SyncStatus::Pending);
        assert_eq!(resolved.task.last_synced_at, l.last_synced_at);
    }

    #[test]
    fn argument_order_does_not_matter() {
        let cases = [(1_000, 2_000), (2_000, 1_000), (1_500, 1_500)];
        for (local_at, remote_at) in cases {
            let l = local(local_at, false);
            let r = remote(Some(remote_at), true);
            assert_eq!(
                resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap(),
                resolve(Version::Remote(&r), Version::Local(&l), NOW).unwrap(),
            );
        }
    }

    #[test]
    fn argument_order_does_not_matter_for_tied_deletions() {
        // (local deleted, remote deleted) at the same clock
        let cases = [(true, false), (false, true), (true, true)];
        for (local_deleted, remote_deleted) in cases {
            let mut l = local(1_500, false);
            l.is_deleted = local_deleted;
            let mut r = remote(Some(1_500), true);
            r.is_deleted = remote_deleted;

            let forward = resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap();
            let backward = resolve(Version::Remote(&r), Version::Local(&l), NOW).unwrap();
            assert_eq!(forward, backward);
            assert!(forward.task.is_deleted);

            let expected = if local_deleted && !remote_deleted {
                Origin::Local
            } else {
                Origin::Remote
            };
            assert_eq!(forward.winner, expected);
        }
    }

    #[test]
    fn remote_wins_ties() {
        let l = local(1_500, false);
        let r = remote(Some(1_500), true);

        let resolved = resolve(Version::Remote(&r), Version::Local(&l), NOW).unwrap();
        assert_eq!(resolved.winner, Origin::Remote);
        assert!(resolved.task.completed);
    }

    #[test]
    fn local_deletion_wins_tie_against_remote_edit() {
        let mut l = local(1_500, false);
        l.is_deleted = true;
        let r = remote(Some(1_500), true);

        let resolved = resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap();
        assert_eq!(resolved.winner, Origin::Local);
        assert!(resolved.task.is_deleted);
        assert_eq!(resolved.task.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn remote_deletion_wins_tie_and_later() {
        let l = local(1_500, true);
        let mut r = remote(Some(1_500), false);
        r.is_deleted = true;

        let resolved = resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap();
        assert!(resolved.task.is_deleted);
        assert_eq!(resolved.task.sync_status, SyncStatus::Synced);

        let older = local(1_000, true);
        let resolved = resolve(Version::Local(&older), Version::Remote(&r), NOW).unwrap();
        assert!(resolved.task.is_deleted);
    }

    #[test]
    fn links_server_id_for_unlinked_local() {
        let mut l = local(1_000, false);
        l.server_id = None;
        let r = remote(Some(1_000), false);

        let resolved = resolve(Version::Local(&l), Version::Remote(&r), NOW).unwrap();
        assert_eq!(resolved.task.server_id.as_deref(), Some("srv-1"));
        assert!(!resolved.conflicted);
    }

    #[test]
    fn pending_local_with_different_content_is_a_conflict() {
        let l = local(1_000, false);
        let r = remote(Some(2_000), true);
        assert!(
            resolve(Version::Local(&l), Version::Remote(&r), NOW)
                .unwrap()
                .conflicted
        );

        let mut synced = local(1_000, false);
        synced.sync_status = SyncStatus::Synced;
        assert!(
            !resolve(Version::Local(&synced), Version::Remote(&r), NOW)
                .unwrap()
                .conflicted
        );
    }

    #[test]
    fn missing_or_invalid_clock_is_unresolvable() {
        let l = local(1_000, false);
        let r = remote(None, true);
        assert!(matches!(
            resolve(Version::Local(&l), Version::Remote(&r), NOW),
            Err(SyncError::ConflictUnresolvable(_))
        ));

        let bad_local = local(0, false);
        let r = remote(Some(10), true);
        assert!(matches!(
            resolve(Version::Local(&bad_local), Version::Remote(&r), NOW),
            Err(SyncError::ConflictUnresolvable(_))
        ));
    }

    #[test]
    fn same_origin_pair_is_rejected() {
        let a = local(1_000, false);
        let mut b = local(2_000, true);
        b.id = TaskId::new();
        assert!(resolve(Version::Local(&a), Version::Local(&b), NOW).is_err());
    }

    #[test]
    fn mismatched_link_is_unresolvable() {
        let l = local(1_000, false);
        let mut r = remote(Some(2_000), true);
        r.server_id = "srv-2".to_string();
        assert!(resolve(Version::Local(&l), Version::Remote(&r), NOW).is_err());
    }
}
