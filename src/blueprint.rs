use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};

use crate::engine::{Report, Task, TaskFn, run_tasks_parallel};
use crate::error::GraphError;
use crate::{Environment, TaskContext};

/// The declaration of a task graph.
///
/// Tasks are registered by name together with the names of their
/// prerequisites, in any order. Nothing is checked until [`finish`], which
/// wires the prerequisites into edges and rejects duplicate names, unknown
/// prerequisites and cycles.
///
/// ```rust,no_run
/// use shikake::Blueprint;
///
/// let mut blueprint = Blueprint::new();
/// blueprint
///     .register("styles:sass", &[], |_| Ok(()))
///     .register("styles", &["styles:sass"], |_| Ok(()))
///     .group("default", &["styles"]);
///
/// let graph = blueprint.finish()?;
/// # Ok::<(), shikake::GraphError>(())
/// ```
///
/// [`finish`]: Blueprint::finish
#[derive(Default)]
pub struct Blueprint {
    pub(crate) graph: Graph<Task, ()>,
    index: HashMap<String, NodeIndex>,
    duplicates: Vec<String>,
}

impl Blueprint {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, name: &str, prerequisites: &[&str], body: Option<TaskFn>) -> &mut Self {
        if self.index.contains_key(name) {
            self.duplicates.push(name.to_string());
            return self;
        }

        let prerequisites = prerequisites.iter().map(|p| p.to_string()).collect();
        let index = self
            .graph
            .add_node(Task::new(name.to_string(), prerequisites, body));
        self.index.insert(name.to_string(), index);
        self
    }

    /// Adds a task running `body` after all of its prerequisites.
    pub fn register<F>(&mut self, name: &str, prerequisites: &[&str], body: F) -> &mut Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(name, prerequisites, Some(Arc::new(body)))
    }

    /// Adds a task that only runs its prerequisites.
    pub fn group(&mut self, name: &str, prerequisites: &[&str]) -> &mut Self {
        self.add(name, prerequisites, None)
    }

    /// Validates the declaration into a runnable graph.
    pub fn finish(mut self) -> Result<TaskGraph, GraphError> {
        if let Some(name) = self.duplicates.first() {
            return Err(GraphError::Duplicate(name.clone()));
        }

        let mut edges = Vec::new();
        for index in self.graph.node_indices() {
            let task = &self.graph[index];
            for prerequisite in task.prerequisites() {
                match self.index.get(prerequisite) {
                    Some(&source) => edges.push((source, index)),
                    None => {
                        return Err(GraphError::UnknownPrerequisite {
                            task: task.name().to_string(),
                            prerequisite: prerequisite.clone(),
                        });
                    }
                }
            }
        }

        for (source, target) in edges {
            self.graph.add_edge(source, target, ());
        }

        for component in petgraph::algo::tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || self
                    .graph
                    .contains_edge(component[0], component[0]);

            if is_cycle {
                let mut names: Vec<_> = component
                    .iter()
                    .map(|&index| self.graph[index].name().to_string())
                    .collect();
                names.sort();
                return Err(GraphError::Cycle(names));
            }
        }

        Ok(TaskGraph {
            dag: self.graph,
            index: self.index,
        })
    }
}

/// A validated task graph, ready to run.
///
/// Created from a [`Blueprint`]. Every run executes the requested tasks
/// together with their transitive prerequisites, each at most once.
#[derive(Debug)]
pub struct TaskGraph {
    pub(crate) dag: Graph<Task, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    fn lookup(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Names of all tasks, sorted.
    pub fn tasks(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.index.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declared prerequisites of a task, in declaration order.
    pub fn prerequisites(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let index = self.lookup(name)?;
        Ok(self.dag[index]
            .prerequisites()
            .iter()
            .map(String::as_str)
            .collect())
    }

    /// Runs a task and everything it depends on.
    pub fn run(&self, env: &Environment, name: &str) -> Result<Report, GraphError> {
        self.run_all(env, &[name])
    }

    /// Runs several tasks side by side, sharing common prerequisites.
    pub fn run_all(&self, env: &Environment, names: &[&str]) -> Result<Report, GraphError> {
        let mut nodes = HashSet::new();
        let reversed = Reversed(&self.dag);

        for name in names {
            let mut dfs = Dfs::new(reversed, self.lookup(name)?);
            while let Some(index) = dfs.next(reversed) {
                nodes.insert(index);
            }
        }

        tracing::debug!(tasks = ?names, count = nodes.len(), "running");
        Ok(run_tasks_parallel(self, env, &nodes))
    }
}

impl Display for TaskGraph {
    /// Renders the graph as a Mermaid flowchart, prerequisites pointing at
    /// their dependents.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.dag.node_indices() {
            let task = &self.dag[index];
            let name = task.name().replace('"', "\\\"");

            if task.is_group() {
                writeln!(f, "    {}([\"{}\"])", index.index(), name)?;
            } else {
                writeln!(f, "    {}[\"{}\"]", index.index(), name)?;
            }
        }

        for edge in self.dag.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_wires_edges() {
        let mut blueprint = Blueprint::new();
        blueprint
            .register("b", &["a"], |_| Ok(()))
            .register("a", &[], |_| Ok(()))
            .group("c", &["a", "b"]);

        let graph = blueprint.finish().unwrap();
        assert_eq!(graph.prerequisites("c").unwrap(), vec!["a", "b"]);
        assert_eq!(graph.tasks(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_mermaid() {
        let mut blueprint = Blueprint::new();
        blueprint
            .register("a", &[], |_| Ok(()))
            .group("b", &["a"]);

        let graph = blueprint.finish().unwrap();
        assert_eq!(
            graph.to_string(),
            "graph LR\n    0[\"a\"]\n    1([\"b\"])\n    0 --> 1\n"
        );
    }

    #[test]
    fn test_unknown_task() {
        let graph = Blueprint::new().finish().unwrap();
        assert_eq!(
            graph.prerequisites("nope").unwrap_err(),
            GraphError::UnknownTask("nope".into())
        );
    }

    #[test]
    fn test_duplicate() {
        let mut blueprint = Blueprint::new();
        blueprint
            .register("a", &[], |_| Ok(()))
            .register("a", &[], |_| Ok(()));

        assert_eq!(
            blueprint.finish().unwrap_err(),
            GraphError::Duplicate("a".into())
        );
    }

    #[test]
    fn test_unknown_prerequisite() {
        let mut blueprint = Blueprint::new();
        blueprint.register("a", &["missing"], |_| Ok(()));

        assert_eq!(
            blueprint.finish().unwrap_err(),
            GraphError::UnknownPrerequisite {
                task: "a".into(),
                prerequisite: "missing".into()
            }
        );
    }

    #[test]
    fn test_cycle() {
        let mut blueprint = Blueprint::new();
        blueprint
            .register("a", &["c"], |_| Ok(()))
            .register("b", &["a"], |_| Ok(()))
            .register("c", &["b"], |_| Ok(()))
            .register("d", &[], |_| Ok(()));

        assert_eq!(
            blueprint.finish().unwrap_err(),
            GraphError::Cycle(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn test_self_cycle() {
        let mut blueprint = Blueprint::new();
        blueprint.group("a", &["a"]);

        assert_eq!(
            blueprint.finish().unwrap_err(),
            GraphError::Cycle(vec!["a".into()])
        );
    }
}
