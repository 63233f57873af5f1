//! Execution plan hierarchy: Checkpoint → TaskGroup → Task → Action.
//!
//! The plan lives beside the manifest as `plan.json`. Its structure is fixed
//! once authored; only `status` fields (and a blocked task's `blocker`) move.
//! Task statuses are reported by the worker and never inferred here.

use crate::error::{Result, SessionError};
use crate::paths;
use crate::types::{PlanStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub command: String,
    pub file: String,
}

/// A file to read before working on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReference {
    pub file: String,
    /// Line range such as `10-25`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<String>,
    #[serde(default)]
    pub purpose: String,
}

/// Pre-loaded context so a worker can start without searching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default)]
    pub read_before: Vec<ContextReference>,
    #[serde(default)]
    pub related_files: Vec<String>,
}

impl TaskContext {
    pub fn is_empty(&self) -> bool {
        self.read_before.is_empty() && self.related_files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Exists,
    New,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub status: FileStatus,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    #[serde(default)]
    pub files: Vec<FileState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
}

/// File states at a checkpoint's start and the projected states at its end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    #[serde(default)]
    pub beginning: FileSnapshot,
    #[serde(default)]
    pub ending: FileSnapshot,
}

impl FileContext {
    pub fn is_empty(&self) -> bool {
        self.beginning == FileSnapshot::default() && self.ending == FileSnapshot::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(default, skip_serializing_if = "TaskContext::is_empty")]
    pub context: TaskContext,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingStrategy {
    #[serde(default)]
    pub approach: String,
    #[serde(default)]
    pub verification_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub prerequisites: Vec<u32>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub testing_strategy: TestingStrategy,
    #[serde(default, skip_serializing_if = "FileContext::is_empty")]
    pub file_context: FileContext,
    #[serde(default)]
    pub task_groups: Vec<TaskGroup>,
}

impl Checkpoint {
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.task_groups.iter().flat_map(|g| g.tasks.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub session_id: String,
    #[serde(default)]
    pub spec_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

/// Completion summary of one checkpoint's tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReadiness {
    pub checkpoint: u32,
    pub total_tasks: usize,
    pub complete_tasks: usize,
    pub incomplete_tasks: Vec<String>,
    pub ready: bool,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

impl ExecutionPlan {
    pub fn exists(root: &Path, session_id: &str) -> bool {
        paths::plan_path(root, session_id).exists()
    }

    /// Load and structurally validate `plan.json`.
    pub fn load(root: &Path, session_id: &str) -> Result<Self> {
        Self::load_optional(root, session_id)?
            .ok_or_else(|| SessionError::PlanNotFound(session_id.to_string()))
    }

    pub fn load_optional(root: &Path, session_id: &str) -> Result<Option<Self>> {
        let path = paths::plan_path(root, session_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)?;
        Self::parse(&data, &path).map(Some)
    }

    /// Parse and validate plan bytes read from `path`.
    pub fn parse(data: &[u8], path: &Path) -> Result<Self> {
        let plan: ExecutionPlan = serde_json::from_slice(data)
            .map_err(|e| SessionError::InvalidPlan(format!("{}: {e}", path.display())))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        self.validate()?;
        crate::io::write_json(&paths::plan_path(root, &self.session_id), self)
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        for (idx, cp) in self.checkpoints.iter().enumerate() {
            let expected = idx as u32 + 1;
            if cp.id != expected {
                return Err(SessionError::InvalidPlan(format!(
                    "checkpoint ids must be sequential from 1: expected {expected}, found {}",
                    cp.id
                )));
            }
            for &pre in &cp.prerequisites {
                if pre == 0 || pre >= cp.id {
                    return Err(SessionError::InvalidPlan(format!(
                        "checkpoint {} has prerequisite {pre} that is not an earlier checkpoint",
                        cp.id
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for task in self.all_tasks() {
            if !seen.insert(task.id.as_str()) {
                return Err(SessionError::InvalidPlan(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }
        for task in self.all_tasks() {
            for dep in &task.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(SessionError::InvalidPlan(format!(
                        "task '{}' depends on unknown task '{dep}'",
                        task.id
                    )));
                }
                if dep == &task.id {
                    return Err(SessionError::InvalidPlan(format!(
                        "task '{}' depends on itself",
                        task.id
                    )));
                }
            }
            if task.context.read_before.iter().any(|r| r.file.trim().is_empty()) {
                return Err(SessionError::InvalidPlan(format!(
                    "task '{}' has a context reference without a file",
                    task.id
                )));
            }
        }

        dependency_layers(self.all_tasks())?;
        Ok(())
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.checkpoints.iter().flat_map(|c| c.tasks())
    }

    pub fn checkpoint(&self, id: u32) -> Result<&Checkpoint> {
        self.checkpoints
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::InvalidCheckpoint {
                checkpoint: id,
                expected: None,
                reason: "not declared in plan".to_string(),
            })
    }

    fn checkpoint_mut(&mut self, id: u32) -> Result<&mut Checkpoint> {
        self.checkpoints
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::InvalidCheckpoint {
                checkpoint: id,
                expected: None,
                reason: "not declared in plan".to_string(),
            })
    }

    /// The task and the id of the checkpoint that owns it.
    pub fn find_task(&self, task_id: &str) -> Result<(u32, &Task)> {
        self.checkpoints
            .iter()
            .find_map(|c| c.tasks().find(|t| t.id == task_id).map(|t| (c.id, t)))
            .ok_or_else(|| SessionError::TaskNotFound(task_id.to_string()))
    }

    fn status_map(&self) -> HashMap<&str, TaskStatus> {
        self.all_tasks().map(|t| (t.id.as_str(), t.status)).collect()
    }

    /// Dependencies of `task` that are not yet complete.
    pub fn unmet_dependencies(&self, task: &Task) -> Vec<String> {
        let statuses = self.status_map();
        task.depends_on
            .iter()
            .filter(|d| statuses.get(d.as_str()) != Some(&TaskStatus::Complete))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Scheduling queries
    // -----------------------------------------------------------------------

    /// Pending tasks in `checkpoint` whose dependencies are all complete.
    /// Tasks in different groups (or the same group) carry no relative order.
    pub fn eligible_tasks(&self, checkpoint: u32) -> Result<Vec<&Task>> {
        let cp = self.checkpoint(checkpoint)?;
        let statuses = self.status_map();
        Ok(cp
            .tasks()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.depends_on
                    .iter()
                    .all(|d| statuses.get(d.as_str()) == Some(&TaskStatus::Complete))
            })
            .collect())
    }

    /// Dependency levels of a checkpoint's tasks. Every task in a wave can run
    /// concurrently once the previous waves finish. Dependencies outside the
    /// checkpoint are treated as already satisfied.
    pub fn execution_waves(&self, checkpoint: u32) -> Result<Vec<Vec<String>>> {
        let cp = self.checkpoint(checkpoint)?;
        dependency_layers(cp.tasks())
    }

    pub fn checkpoint_readiness(&self, checkpoint: u32) -> Result<CheckpointReadiness> {
        let cp = self.checkpoint(checkpoint)?;
        let total_tasks = cp.tasks().count();
        let incomplete_tasks: Vec<String> = cp
            .tasks()
            .filter(|t| t.status != TaskStatus::Complete)
            .map(|t| t.id.clone())
            .collect();
        Ok(CheckpointReadiness {
            checkpoint,
            total_tasks,
            complete_tasks: total_tasks - incomplete_tasks.len(),
            ready: incomplete_tasks.is_empty(),
            incomplete_tasks,
        })
    }

    // -----------------------------------------------------------------------
    // Status updates
    // -----------------------------------------------------------------------

    pub fn set_task_status(
        &mut self,
        task_id: &str,
        status: TaskStatus,
        blocker: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let (checkpoint_id, task) = self.find_task(task_id)?;
        if self.checkpoint(checkpoint_id)?.is_complete() {
            return Err(SessionError::validation(
                "status",
                format!("checkpoint {checkpoint_id} is complete; its tasks are frozen"),
            ));
        }
        if matches!(status, TaskStatus::InProgress | TaskStatus::Complete) {
            let waiting_on = self.unmet_dependencies(task);
            if !waiting_on.is_empty() {
                return Err(SessionError::TaskBlocked {
                    task: task_id.to_string(),
                    waiting_on,
                });
            }
        }
        let blocker = match status {
            TaskStatus::Blocked => {
                let reason = blocker.map(str::trim).unwrap_or_default();
                if reason.is_empty() {
                    return Err(SessionError::validation(
                        "blocker",
                        "a blocked task needs a reason",
                    ));
                }
                Some(reason.to_string())
            }
            _ => None,
        };

        let cp = self.checkpoint_mut(checkpoint_id)?;
        if status != TaskStatus::Pending && cp.status == TaskStatus::Pending {
            cp.status = TaskStatus::InProgress;
        }
        let task = cp
            .task_groups
            .iter_mut()
            .flat_map(|g| g.tasks.iter_mut())
            .find(|t| t.id == task_id)
            .ok_or_else(|| SessionError::TaskNotFound(task_id.to_string()))?;
        task.status = status;
        task.blocker = blocker;
        let updated = task.clone();

        if self.status == PlanStatus::Draft && status != TaskStatus::Pending {
            self.status = PlanStatus::InProgress;
        }
        self.touch(now);
        Ok(updated)
    }

    pub fn mark_checkpoint_started(&mut self, checkpoint: u32, now: DateTime<Utc>) -> Result<()> {
        let cp = self.checkpoint_mut(checkpoint)?;
        if !cp.is_complete() {
            cp.status = TaskStatus::InProgress;
        }
        if self.status == PlanStatus::Draft {
            self.status = PlanStatus::InProgress;
        }
        self.touch(now);
        Ok(())
    }

    pub fn mark_checkpoint_complete(&mut self, checkpoint: u32, now: DateTime<Utc>) -> Result<()> {
        self.checkpoint_mut(checkpoint)?.status = TaskStatus::Complete;
        self.status = if self.checkpoints.iter().all(Checkpoint::is_complete) {
            PlanStatus::Complete
        } else {
            PlanStatus::InProgress
        };
        self.touch(now);
        Ok(())
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

// ---------------------------------------------------------------------------
// Dependency layering (Kahn's algorithm)
// ---------------------------------------------------------------------------

/// Group tasks into dependency levels. Edges to tasks outside `tasks` are
/// ignored. Fails with `InvalidPlan` naming the members of any cycle.
fn dependency_layers<'a>(tasks: impl Iterator<Item = &'a Task>) -> Result<Vec<Vec<String>>> {
    let tasks: Vec<&Task> = tasks.collect();
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in &tasks {
        in_degree.entry(task.id.as_str()).or_insert(0);
        for dep in task.depends_on.iter().filter(|d| ids.contains(d.as_str())) {
            *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
        }
    }

    let mut layer: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut layers = Vec::new();
    let mut placed = 0;

    while !layer.is_empty() {
        let mut next = BTreeSet::new();
        for &id in &layer {
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.insert(dependent);
                    }
                }
            }
        }
        placed += layer.len();
        layers.push(layer.into_iter().map(str::to_string).collect());
        layer = next;
    }

    if placed != tasks.len() {
        let mut members: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&id, _)| id)
            .collect();
        members.sort_unstable();
        return Err(SessionError::InvalidPlan(format!(
            "dependency cycle detected among tasks: [{}]",
            members.join(", ")
        )));
    }

    Ok(layers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
