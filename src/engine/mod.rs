mod runner;

use std::sync::Arc;

use crate::TaskContext;
use crate::fileset::FileSet;

pub use runner::{Outcome, Report, TaskExecution};
pub(crate) use runner::run_tasks_parallel;

#[cfg(feature = "live")]
pub(crate) use runner::watch;

/// Body of a task.
pub type TaskFn = Arc<dyn Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync>;

/// A named node of the task graph.
#[derive(Clone)]
pub struct Task {
    name: String,
    prerequisites: Vec<String>,
    /// Groups only order their prerequisites and have nothing to run.
    body: Option<TaskFn>,
}

impl Task {
    pub(crate) fn new(name: String, prerequisites: Vec<String>, body: Option<TaskFn>) -> Self {
        Self {
            name,
            prerequisites,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn is_group(&self) -> bool {
        self.body.is_none()
    }

    pub(crate) fn execute(&self, context: &TaskContext) -> anyhow::Result<()> {
        match &self.body {
            Some(body) => body(context),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("group", &self.is_group())
            .finish()
    }
}

/// Tasks to rerun when a watched file changes.
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub sources: FileSet,
    /// Empty for files that only need the browser to reload.
    pub tasks: Vec<String>,
}

impl WatchRule {
    pub fn new(sources: FileSet, tasks: &[&str]) -> Self {
        Self {
            sources,
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn reload(sources: FileSet) -> Self {
        Self {
            sources,
            tasks: Vec::new(),
        }
    }
}
