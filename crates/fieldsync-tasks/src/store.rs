//! The canonical task collection.
//!
//! [`TaskStore`] owns the only copy of the task list. Screens read through
//! its helpers and write through its operations; nothing else mutates the
//! collection.
//!
//! # Ordering
//!
//! Every fetch takes a sequence number when it is issued. A fetched list is
//! applied only if no other fetch (and no [`reset`](TaskStore::reset)) was
//! issued after it, so a slow response can never overwrite a newer one. The
//! check and the write happen under the same lock. Fetch errors are always
//! returned to the caller.
//!
//! # Writes
//!
//! `update` and `delete` touch the collection only after the server
//! confirmed them. `create` never touches it; callers re-fetch.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use fieldsync::{Identity, SessionListener, SessionManager};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::api::{HttpTaskApi, TaskApi};
use crate::error::{TaskError, TaskResult};
use crate::types::{validate_draft, Task, TaskDraft, TaskPatch};

/// What the collection currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchScope {
    /// Nothing fetched since construction or the last reset.
    #[default]
    Empty,
    /// Tasks owned by a user (`GET /New/GetTask/:userId`).
    Owned(String),
    /// Tasks assigned to a user, by id.
    AssignedTo(String),
}

/// Result of a fetch that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The collection was replaced with this many tasks.
    Applied(usize),
    /// A newer fetch or a reset was issued meanwhile; the result was dropped.
    Superseded,
}

impl FetchOutcome {
    /// Whether the result made it into the collection.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Default)]
struct Collection {
    tasks: IndexMap<String, Task>,
    scope: FetchScope,
}

/// Clears a submission flag when the submission finishes, however it ends.
struct CreateGuard<'a>(&'a AtomicBool);

impl Drop for CreateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct UpdateGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    task_id: String,
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.task_id);
    }
}

/// Centralized, dependency-injected task collection.
///
/// # Examples
///
/// ```no_run
/// use fieldsync::{ClientConfig, SessionManager};
/// use fieldsync_tasks::TaskStore;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::from_file("fieldsync.toml")?;
/// let sessions = SessionManager::new(&config)?;
/// let tasks = TaskStore::attach(&sessions);
///
/// sessions.restore().await?;
/// tasks.fetch_assigned_to_current_user().await?;
/// for task in tasks.tasks() {
///     println!("{} - {}", task.id, task.description);
/// }
/// # Ok(())
/// # }
/// ```
pub struct TaskStore {
    api: Arc<dyn TaskApi>,
    identity: Arc<dyn Identity>,
    collection: RwLock<Collection>,
    issued: AtomicU64,
    creating: AtomicBool,
    updating: Mutex<HashSet<String>>,
    revision: watch::Sender<u64>,
}

impl TaskStore {
    /// Create a store over an explicit API and identity source.
    pub fn new(api: Arc<dyn TaskApi>, identity: Arc<dyn Identity>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            identity,
            collection: RwLock::new(Collection::default()),
            issued: AtomicU64::new(0),
            creating: AtomicBool::new(false),
            updating: Mutex::new(HashSet::new()),
            revision,
        }
    }

    /// Create a store on the session's client and reset it on every logout.
    pub fn attach(sessions: &SessionManager) -> Arc<Self> {
        let store = Arc::new(Self::new(
            Arc::new(HttpTaskApi::new(sessions.api().clone())),
            Arc::new(sessions.clone()),
        ));
        sessions.add_listener(&store);
        store
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    /// Snapshot of the collection, in server order.
    pub fn tasks(&self) -> Vec<Task> {
        self.collection.read().tasks.values().cloned().collect()
    }

    /// One task by id.
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.collection.read().tasks.get(task_id).cloned()
    }

    /// Whether `task_id` is in the collection.
    pub fn contains(&self, task_id: &str) -> bool {
        self.collection.read().tasks.contains_key(task_id)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.collection.read().tasks.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.collection.read().tasks.is_empty()
    }

    /// Tasks assigned to `user_id` (matched by id, never by name).
    pub fn assigned_to(&self, user_id: &str) -> Vec<Task> {
        self.filtered(|t| t.is_assigned_to(user_id))
    }

    /// Tasks created by `user_id`.
    pub fn created_by(&self, user_id: &str) -> Vec<Task> {
        self.filtered(|t| t.is_created_by(user_id))
    }

    /// What the collection currently holds.
    pub fn scope(&self) -> FetchScope {
        self.collection.read().scope.clone()
    }

    /// Observe collection changes. The value is a revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn filtered(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.collection
            .read()
            .tasks
            .values()
            .filter(|t| keep(t))
            .cloned()
            .collect()
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    // ─── Fetches ────────────────────────────────────────────────────────────

    /// Replace the collection with the tasks owned by `owner_id`.
    pub async fn fetch_all(&self, owner_id: &str) -> TaskResult<FetchOutcome> {
        let seq = self.issue();
        tracing::debug!(seq, owner_id, "Fetching owned tasks");
        let result = self.api.fetch_owned(owner_id).await;
        self.finish_fetch(seq, result, FetchScope::Owned(owner_id.to_string()))
    }

    /// Replace the collection with the tasks assigned to the signed-in user.
    pub async fn fetch_assigned_to_current_user(&self) -> TaskResult<FetchOutcome> {
        let Some(user_id) = self.identity.current_user_id() else {
            return Err(TaskError::Api(fieldsync::Error::authentication(
                "Please log in to see your tasks.",
            )));
        };
        let seq = self.issue();
        tracing::debug!(seq, user_id = %user_id, "Fetching assigned tasks");
        let result = self.api.fetch_all().await.map(|tasks| {
            tasks
                .into_iter()
                .filter(|t| t.is_assigned_to(&user_id))
                .collect()
        });
        self.finish_fetch(seq, result, FetchScope::AssignedTo(user_id))
    }

    fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn finish_fetch(
        &self,
        seq: u64,
        result: fieldsync::Result<Vec<Task>>,
        scope: FetchScope,
    ) -> TaskResult<FetchOutcome> {
        // A failed fetch leaves the collection alone, so its error is
        // reported even when a newer fetch or a reset overtook it.
        let tasks = result?;

        let mut collection = self.collection.write();
        let latest = self.issued.load(Ordering::SeqCst);
        if seq != latest {
            tracing::debug!(seq, latest, "Discarding superseded fetch result");
            return Ok(FetchOutcome::Superseded);
        }

        let count = tasks.len();
        collection.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        collection.scope = scope;
        drop(collection);

        self.bump_revision();
        tracing::info!(seq, count, "Task collection replaced");
        Ok(FetchOutcome::Applied(count))
    }

    // ─── Writes ─────────────────────────────────────────────────────────────

    /// Submit a new task.
    ///
    /// The draft is validated first; nothing is sent when it is invalid or
    /// when another create is still in flight. The collection is left alone
    /// either way; re-fetch to see the new task.
    pub async fn create(&self, mut draft: TaskDraft) -> TaskResult<()> {
        if self
            .creating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Create ignored: a submission is already in flight");
            return Err(TaskError::SubmissionInProgress);
        }
        let _guard = CreateGuard(&self.creating);

        let violations = validate_draft(&draft);
        if !violations.is_empty() {
            return Err(TaskError::Invalid { violations });
        }
        if draft.creator_id.is_empty() {
            if let Some(user_id) = self.identity.current_user_id() {
                draft.creator_id = user_id;
            }
        }

        self.api.create(&draft).await?;
        tracing::info!("Task created");
        Ok(())
    }

    /// Apply `patch` to task `task_id` and send the merged record.
    ///
    /// On success the entry is replaced with the merged record and returned.
    /// On failure the collection is unchanged.
    pub async fn update(&self, task_id: &str, patch: &TaskPatch) -> TaskResult<Task> {
        let current = self.get(task_id).ok_or_else(|| TaskError::NotFound {
            task_id: task_id.to_string(),
        })?;

        if !self.updating.lock().insert(task_id.to_string()) {
            return Err(TaskError::SubmissionInProgress);
        }
        let _guard = UpdateGuard {
            in_flight: &self.updating,
            task_id: task_id.to_string(),
        };

        let merged = patch.apply_to(&current);
        self.api.update(&merged).await?;

        let replaced = match self.collection.write().tasks.get_mut(task_id) {
            Some(entry) => {
                *entry = merged.clone();
                true
            },
            None => false,
        };
        if replaced {
            self.bump_revision();
            tracing::info!(task_id, "Task updated");
        } else {
            tracing::debug!(task_id, "Task updated after it left the collection");
        }
        Ok(merged)
    }

    /// Delete task `task_id`; it leaves the collection only after the server
    /// confirmed.
    pub async fn delete(&self, task_id: &str) -> TaskResult<()> {
        if !self.contains(task_id) {
            return Err(TaskError::NotFound {
                task_id: task_id.to_string(),
            });
        }

        self.api.delete(task_id).await?;

        if self.collection.write().tasks.shift_remove(task_id).is_some() {
            self.bump_revision();
        }
        tracing::info!(task_id, "Task deleted");
        Ok(())
    }

    /// Empty the collection and drop every fetch still in flight.
    pub fn reset(&self) {
        let mut collection = self.collection.write();
        self.issued.fetch_add(1, Ordering::SeqCst);
        let cleared = collection.tasks.len();
        *collection = Collection::default();
        drop(collection);

        self.bump_revision();
        tracing::debug!(cleared, "Task store reset");
    }
}

impl SessionListener for TaskStore {
    fn on_logout(&self) {
        self.reset();
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collection = self.collection.read();
        f.debug_struct("TaskStore")
            .field("len", &collection.tasks.len())
            .field("scope", &collection.scope)
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .finish()
    }
}
