//! Hand-off of a compiled graph to a persistence backend.
//!
//! The core does not persist anything itself. A backend implements
//! [`GraphStore`] and [`GraphTransaction`]; [`commit_output`] writes a
//! whole [`ParseOutput`] (project, tasks, tags, dependency edges, one audit
//! entry) inside a single transaction and rolls back if any step fails.
//! [`MemoryStore`] is an in-process backend used by the CLI and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::graph::NodeId;
use crate::normalize::{ExtractedProjectInfo, ExtractedTask, Priority};
use crate::pipeline::ParseOutput;

/// Errors reported by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("task {0} cannot depend on itself")]
    SelfDependency(Uuid),

    #[error("task {0} does not exist")]
    UnknownTask(Uuid),

    #[error("backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub goals: String,
    pub why: String,
    pub target_users: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub estimated_hours: Option<u32>,
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub id: Uuid,
    pub name: String,
}

/// `task_id` is blocked by `depends_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyRecord {
    pub task_id: Uuid,
    pub depends_on: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub action: String,
    pub entity_id: Uuid,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, entity_id: Uuid, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entity_id,
            detail: detail.into(),
            recorded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend traits
// ---------------------------------------------------------------------------

/// A persistence backend able to open all-or-nothing transactions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>, PersistenceError>;
}

/// Writes staged by a transaction become visible only on [`commit`].
///
/// [`commit`]: GraphTransaction::commit
#[async_trait]
pub trait GraphTransaction: Send {
    /// Create the project, or update the existing one with the same name.
    async fn upsert_project(&mut self, info: &ExtractedProjectInfo)
    -> Result<Uuid, PersistenceError>;

    async fn create_task(
        &mut self,
        project_id: Uuid,
        task: &ExtractedTask,
    ) -> Result<Uuid, PersistenceError>;

    /// Create the tag if it does not exist and attach it to the task.
    async fn link_tag(&mut self, task_id: Uuid, tag: &str) -> Result<(), PersistenceError>;

    /// Rejects self-edges.
    async fn create_dependency(
        &mut self,
        task_id: Uuid,
        depends_on: Uuid,
    ) -> Result<(), PersistenceError>;

    async fn append_audit(&mut self, entry: AuditEntry) -> Result<(), PersistenceError>;

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError>;
}

// ---------------------------------------------------------------------------
// Commit driver
// ---------------------------------------------------------------------------

/// Durable ids assigned by one [`commit_output`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub project_id: Uuid,
    /// Durable task id per graph node, in creation order.
    pub task_ids: Vec<(NodeId, Uuid)>,
    pub tags_linked: usize,
    pub dependencies_created: usize,
}

/// Persist `output` in one transaction.
///
/// Tasks are created in topological order so every dependency exists
/// before its dependents. On any failure the transaction is rolled back
/// and the original error returned.
pub async fn commit_output(
    store: &dyn GraphStore,
    output: &ParseOutput,
) -> Result<CommitSummary, PersistenceError> {
    let mut tx = store.begin().await?;
    let written = write_output(tx.as_mut(), output).await;
    match written {
        Ok(summary) => {
            tx.commit().await?;
            info!(
                document_id = %output.document_id,
                project_id = %summary.project_id,
                tasks = summary.task_ids.len(),
                dependencies = summary.dependencies_created,
                "parse output committed"
            );
            Ok(summary)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            warn!(document_id = %output.document_id, error = %err, "commit aborted");
            Err(err)
        }
    }
}

async fn write_output(
    tx: &mut dyn GraphTransaction,
    output: &ParseOutput,
) -> Result<CommitSummary, PersistenceError> {
    let mut info = output.result.project_info.clone();
    if info.name.is_empty() {
        info.name = format!("Imported {}", output.document_id);
    }
    let project_id = tx.upsert_project(&info).await?;

    let mut durable: HashMap<NodeId, Uuid> = HashMap::with_capacity(output.graph.len());
    let mut task_ids = Vec::with_capacity(output.graph.len());
    let mut tags_linked = 0;
    for node_id in output.graph.topological_order() {
        let Some(node) = output.graph.node(node_id) else {
            continue;
        };
        let task_id = tx.create_task(project_id, &node.task).await?;
        for tag in &node.task.tags {
            tx.link_tag(task_id, tag).await?;
            tags_linked += 1;
        }
        durable.insert(node_id, task_id);
        task_ids.push((node_id, task_id));
    }

    let mut dependencies_created = 0;
    for edge in output.graph.edges() {
        if let (Some(&from), Some(&to)) = (durable.get(&edge.from), durable.get(&edge.to)) {
            tx.create_dependency(from, to).await?;
            dependencies_created += 1;
        }
    }

    tx.append_audit(AuditEntry::new(
        "project.import",
        project_id,
        format!(
            "{} tasks, {} dependencies, {} documentation items from {}",
            task_ids.len(),
            dependencies_created,
            output.result.documentation.len(),
            output.document_id
        ),
    ))
    .await?;

    Ok(CommitSummary {
        project_id,
        task_ids,
        tags_linked,
        dependencies_created,
    })
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryState {
    pub projects: Vec<ProjectRecord>,
    pub tasks: Vec<TaskRecord>,
    pub tags: Vec<TagRecord>,
    /// `(task_id, tag_id)` pairs.
    pub task_tags: Vec<(Uuid, Uuid)>,
    pub dependencies: Vec<DependencyRecord>,
    pub audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn project_by_name(&self, name: &str) -> Option<&ProjectRecord> {
        self.projects.iter().find(|p| p.name == name)
    }

    fn tag_by_name(&self, name: &str) -> Option<&TagRecord> {
        self.tags.iter().find(|t| t.name == name)
    }

    fn has_task(&self, id: Uuid) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }
}

/// In-memory [`GraphStore`]. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything committed so far.
    pub fn snapshot(&self) -> MemoryState {
        lock(&self.state).clone()
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>, PersistenceError> {
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.state),
            staged: MemoryState::default(),
        }))
    }
}

/// Staged writes against a [`MemoryStore`]. Dropping without commit
/// discards them.
struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    staged: MemoryState,
}

impl MemoryTransaction {
    fn task_exists(&self, id: Uuid) -> bool {
        self.staged.has_task(id) || lock(&self.shared).has_task(id)
    }
}

#[async_trait]
impl GraphTransaction for MemoryTransaction {
    async fn upsert_project(
        &mut self,
        info: &ExtractedProjectInfo,
    ) -> Result<Uuid, PersistenceError> {
        let existing = self
            .staged
            .project_by_name(&info.name)
            .or(lock(&self.shared).project_by_name(&info.name))
            .map(|p| p.id);
        let id = existing.unwrap_or_else(Uuid::new_v4);
        let record = ProjectRecord {
            id,
            name: info.name.clone(),
            description: info.description.clone(),
            goals: info.goals.clone(),
            why: info.why.clone(),
            target_users: info.target_users.clone(),
        };
        self.staged.projects.retain(|p| p.id != id);
        self.staged.projects.push(record);
        debug!(project_id = %id, updated = existing.is_some(), "staged project");
        Ok(id)
    }

    async fn create_task(
        &mut self,
        project_id: Uuid,
        task: &ExtractedTask,
    ) -> Result<Uuid, PersistenceError> {
        let id = Uuid::new_v4();
        self.staged.tasks.push(TaskRecord {
            id,
            project_id,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            estimated_hours: task.estimated_hours,
            acceptance_criteria: task.acceptance_criteria.clone(),
        });
        Ok(id)
    }

    async fn link_tag(&mut self, task_id: Uuid, tag: &str) -> Result<(), PersistenceError> {
        if !self.task_exists(task_id) {
            return Err(PersistenceError::UnknownTask(task_id));
        }
        let existing = self
            .staged
            .tag_by_name(tag)
            .map(|t| t.id)
            .or_else(|| lock(&self.shared).tag_by_name(tag).map(|t| t.id));
        let tag_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                self.staged.tags.push(TagRecord {
                    id,
                    name: tag.to_owned(),
                });
                id
            }
        };
        if !self.staged.task_tags.contains(&(task_id, tag_id)) {
            self.staged.task_tags.push((task_id, tag_id));
        }
        Ok(())
    }

    async fn create_dependency(
        &mut self,
        task_id: Uuid,
        depends_on: Uuid,
    ) -> Result<(), PersistenceError> {
        if task_id == depends_on {
            return Err(PersistenceError::SelfDependency(task_id));
        }
        for id in [task_id, depends_on] {
            if !self.task_exists(id) {
                return Err(PersistenceError::UnknownTask(id));
            }
        }
        let record = DependencyRecord {
            task_id,
            depends_on,
        };
        if !self.staged.dependencies.contains(&record) {
            self.staged.dependencies.push(record);
        }
        Ok(())
    }

    async fn append_audit(&mut self, entry: AuditEntry) -> Result<(), PersistenceError> {
        self.staged.audit.push(entry);
        Ok(())
    }

    /// Names are resolved again under the lock: a project or tag another
    /// transaction committed in the meantime absorbs the staged row, and
    /// every reference to the staged id is rewritten to the existing one.
    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let MemoryTransaction { shared, staged } = *self;
        let mut state = lock(&shared);
        let mut remap: HashMap<Uuid, Uuid> = HashMap::new();

        for project in staged.projects {
            match state.projects.iter_mut().find(|p| p.name == project.name) {
                Some(existing) => {
                    let id = existing.id;
                    if id != project.id {
                        remap.insert(project.id, id);
                    }
                    *existing = ProjectRecord { id, ..project };
                }
                None => state.projects.push(project),
            }
        }
        for tag in staged.tags {
            match state.tag_by_name(&tag.name).map(|t| t.id) {
                Some(id) => {
                    remap.insert(tag.id, id);
                }
                None => state.tags.push(tag),
            }
        }
        if !remap.is_empty() {
            debug!(merged = remap.len(), "merged staged rows into existing names");
        }

        let canonical = |id: Uuid| remap.get(&id).copied().unwrap_or(id);
        for mut task in staged.tasks {
            task.project_id = canonical(task.project_id);
            state.tasks.push(task);
        }
        for (task_id, tag_id) in staged.task_tags {
            let link = (task_id, canonical(tag_id));
            if !state.task_tags.contains(&link) {
                state.task_tags.push(link);
            }
        }
        state.dependencies.extend(staged.dependencies);
        for mut entry in staged.audit {
            entry.entity_id = canonical(entry.entity_id);
            state.audit.push(entry);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        debug!(
            tasks = self.staged.tasks.len(),
            "discarding staged writes"
        );
        Ok(())
    }
}
