use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Opaque task identifier.
pub type TaskId = String;

/// Opaque agent identifier.
pub type AgentId = String;

/// A task's position in the state machine owned by the Workflow Controller
/// (design §4.3). Transitions are only ever written through the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Todo,
    Doing,
    Paused,
    Resumed,
    Blocked,
    Done,
    Errored,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::Doing => "DOING",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Resumed => "RESUMED",
            TaskStatus::Blocked => "BLOCKED",
            TaskStatus::Done => "DONE",
            TaskStatus::Errored => "ERRORED",
        };
        write!(f, "{s}")
    }
}

/// Accumulated execution statistics for a task, populated by the owning
/// agent runtime at each decision boundary (design §3.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub duration_ms: u64,
    pub iterations: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A unit of work bound to one agent, possibly depending on other tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub reference_id: Option<String>,
    pub description: String,
    pub expected_output: Option<String>,
    pub agent_id: AgentId,
    pub dependencies: Vec<TaskId>,
    pub allow_parallel_execution: bool,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub stats: TaskStats,
}

impl Task {
    /// Creates a new task bound to `agent_id`, initialized to `TODO` with no
    /// dependencies and sequential (non-parallel) execution.
    pub fn new(agent_id: impl Into<AgentId>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reference_id: None,
            description: description.into(),
            expected_output: None,
            agent_id: agent_id.into(),
            dependencies: Vec::new(),
            allow_parallel_execution: false,
            status: TaskStatus::Todo,
            result: None,
            stats: TaskStats::default(),
        }
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_expected_output(mut self, expected_output: impl Into<String>) -> Self {
        self.expected_output = Some(expected_output.into());
        self
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn allow_parallel(mut self, allow: bool) -> Self {
        self.allow_parallel_execution = allow;
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Done | TaskStatus::Errored | TaskStatus::Blocked
        )
    }
}

/// Walks a task list's dependency edges and rejects a cyclic graph with
/// `ConfigurationError`, per design §4.2's "Cycle detection".
pub fn detect_cycle(tasks: &[Task]) -> Option<TaskId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let by_id: std::collections::HashMap<&str, &Task> =
        tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut marks: std::collections::HashMap<&str, Mark> = std::collections::HashMap::new();

    fn visit<'a>(
        id: &'a str,
        by_id: &std::collections::HashMap<&'a str, &'a Task>,
        marks: &mut std::collections::HashMap<&'a str, Mark>,
        stack: &mut HashSet<&'a str>,
    ) -> Option<TaskId> {
        if let Some(Mark::Done) = marks.get(id) {
            return None;
        }
        if stack.contains(id) {
            return Some(id.to_string());
        }
        stack.insert(id);
        marks.insert(id, Mark::Visiting);
        if let Some(task) = by_id.get(id) {
            for dep in &task.dependencies {
                if let Some(cycle_at) = visit(dep.as_str(), by_id, marks, stack) {
                    return Some(cycle_at);
                }
            }
        }
        stack.remove(id);
        marks.insert(id, Mark::Done);
        None
    }

    for task in tasks {
        let mut stack = HashSet::new();
        if let Some(cycle_at) = visit(task.id.as_str(), &by_id, &mut marks, &mut stack) {
            return Some(cycle_at);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_todo_with_no_deps() {
        let task = Task::new("agent-1", "do the thing");
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(task.dependencies.is_empty());
        assert!(!task.allow_parallel_execution);
    }

    #[test]
    fn detect_cycle_accepts_dag() {
        let a = Task::new("agent-1", "a");
        let b = Task::new("agent-1", "b").depends_on([a.id.clone()]);
        assert!(detect_cycle(&[a, b]).is_none());
    }

    #[test]
    fn detect_cycle_rejects_cycle() {
        let mut a = Task::new("agent-1", "a");
        let mut b = Task::new("agent-1", "b");
        a.dependencies.push(b.id.clone());
        b.dependencies.push(a.id.clone());
        assert!(detect_cycle(&[a, b]).is_some());
    }
}
