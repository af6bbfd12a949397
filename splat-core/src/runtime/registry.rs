use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::runtime::pipeline::Variant;
use crate::runtime::types::{RuntimeError, Task, TaskId, TaskOutcome};

/// One task's current snapshot, locked independently of the map.
type TaskSlot = Arc<RwLock<Arc<Task>>>;

#[derive(Debug, Default)]
struct RegistryInner {
    tasks: HashMap<TaskId, TaskSlot>,
    /// Ids in creation order.
    order: Vec<TaskId>,
}

/// Centralized, thread-safe task store.
///
/// The map is behind a `tokio::sync::RwLock` that is only written when a task
/// is created.  Each task lives in its own slot lock, so recording a terminal
/// transition for one task never blocks lookups of another.  Every entry is
/// an immutable `Arc<Task>` snapshot; the terminal transition swaps the whole
/// snapshot, so a reader never sees a half-written task.
///
/// Entries are never removed while the registry lives.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl TaskRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh `TaskId` and insert a `Processing` record.
    pub async fn create_task(&self, variant: Variant) -> TaskId {
        let mut guard = self.inner.write().await;
        let mut task_id = Uuid::new_v4();
        while guard.tasks.contains_key(&task_id) {
            task_id = Uuid::new_v4();
        }
        let slot = Arc::new(RwLock::new(Arc::new(Task::processing(task_id, variant))));
        guard.tasks.insert(task_id, slot);
        guard.order.push(task_id);
        task_id
    }

    async fn slot(&self, task_id: TaskId) -> Result<TaskSlot, RuntimeError> {
        self.inner
            .read()
            .await
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(RuntimeError::TaskNotFound { task_id })
    }

    /// Return a snapshot of the task.
    pub async fn get_task(&self, task_id: TaskId) -> Result<Arc<Task>, RuntimeError> {
        let slot = self.slot(task_id).await?;
        let snapshot = Arc::clone(&*slot.read().await);
        Ok(snapshot)
    }

    /// Record the terminal outcome of a task.
    ///
    /// Allowed exactly once per task; later calls return
    /// [`RuntimeError::TaskAlreadyTerminal`] and leave the stored snapshot
    /// unchanged.
    pub async fn set_terminal(
        &self,
        task_id: TaskId,
        outcome: TaskOutcome,
    ) -> Result<Arc<Task>, RuntimeError> {
        let slot = self.slot(task_id).await?;
        let mut current = slot.write().await;
        if current.status.is_terminal() {
            return Err(RuntimeError::TaskAlreadyTerminal { task_id });
        }
        let finished = Arc::new(current.finish(outcome));
        *current = Arc::clone(&finished);
        Ok(finished)
    }

    /// All known task ids, oldest first.
    pub async fn list_task_ids(&self) -> Vec<TaskId> {
        self.inner.read().await.order.clone()
    }

    /// Number of tasks ever created.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
