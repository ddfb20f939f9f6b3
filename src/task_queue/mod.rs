//! Dependency-aware admission queue.
//!
//! Grounded on the teacher's `task_queue.rs` (`Arc<Mutex<Vec<Task>>>`,
//! `MAX_QUEUE_SIZE` admission cap), generalized from a flat FIFO into a
//! dependency resolver: a task is admissible only once every task it
//! depends on has reached `DONE`, and the queue hands back every admissible
//! task at once (bounded by `max_in_flight`) so the controller can start
//! them together rather than one at a time (design §4.2, invariant
//! "near-simultaneous start" and `PARALLEL_START_LOG_SLACK`).

use crate::error::{OrchestratorError, Result};
use crate::models::{detect_cycle, Task, TaskId, TaskStatus};

/// Validates and resolves admission order over a task graph; holds no task
/// state itself — the [`crate::state_store::StateStore`] is the source of
/// truth, this type only decides what may start next.
#[derive(Debug, Clone, Copy)]
pub struct TaskQueue {
    max_in_flight: usize,
}

impl TaskQueue {
    pub fn new(max_in_flight: usize) -> Self {
        Self { max_in_flight }
    }

    /// Rejects a cyclic dependency graph up front, matching the design's
    /// `Start` precondition that the task graph be a DAG.
    pub fn validate(&self, tasks: &[Task]) -> Result<()> {
        if let Some(cycle_at) = detect_cycle(tasks) {
            return Err(OrchestratorError::Configuration(format!(
                "dependency cycle detected at task {cycle_at}"
            )));
        }
        Ok(())
    }

    /// Returns the ids of every task that is ready to start: status is
    /// `TODO` or `RESUMED`, and every dependency has reached `DONE`.
    ///
    /// `in_flight` is the number of tasks currently `DOING`; the returned
    /// list is truncated so `in_flight + admitted.len() <= max_in_flight`.
    /// Tasks with `allow_parallel_execution == false` are admitted only one
    /// at a time even when capacity allows more.
    pub fn admissible(&self, tasks: &[Task], in_flight: usize) -> Vec<TaskId> {
        if in_flight >= self.max_in_flight {
            return Vec::new();
        }
        let mut capacity = self.max_in_flight - in_flight;
        let mut sequential_admitted = false;
        let mut ready = Vec::new();

        for task in tasks {
            if capacity == 0 {
                break;
            }
            if !matches!(task.status, TaskStatus::Todo | TaskStatus::Resumed) {
                continue;
            }
            let deps_satisfied = task.dependencies.iter().all(|dep_id| {
                tasks
                    .iter()
                    .find(|t| &t.id == dep_id)
                    .map(|dep| dep.status == TaskStatus::Done)
                    .unwrap_or(false)
            });
            if !deps_satisfied {
                continue;
            }
            if !task.allow_parallel_execution {
                // Rule 4: a sequential task may never be admitted while
                // anything is already executing, not just while another
                // sequential task was admitted earlier in this same call —
                // otherwise a re-poll after the first sequential task has
                // moved to DOING would admit a second one alongside it.
                if in_flight > 0 || sequential_admitted {
                    continue;
                }
                sequential_admitted = true;
            }
            ready.push(task.id.clone());
            capacity -= 1;
        }
        ready
    }

    /// Whether every task in the set has reached a terminal status, the
    /// condition under which the workflow controller finishes a run.
    pub fn all_terminal(tasks: &[Task]) -> bool {
        tasks.iter().all(Task::is_terminal)
    }

    /// Whether the task graph is stuck: nothing in flight, nothing
    /// admissible, and not everything terminal — a cycle-free graph can
    /// only reach this state when a dependency chain bottoms out on a
    /// `BLOCKED` or `ERRORED` task (design §9 "BLOCKED halts the whole
    /// team").
    pub fn is_deadlocked(&self, tasks: &[Task], in_flight: usize) -> bool {
        in_flight == 0 && self.admissible(tasks, 0).is_empty() && !Self::all_terminal(tasks)
    }
}
