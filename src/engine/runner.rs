#[cfg(feature = "server")]
mod http;
#[cfg(feature = "live")]
mod watch;

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use console::style;
use petgraph::graph::NodeIndex;
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::BuildError;
use crate::{Environment, TaskContext, TaskGraph};

#[cfg(feature = "live")]
pub(crate) use watch::watch;

#[derive(Debug, Clone, Copy)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Terminal state of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    /// Not started because a prerequisite didn't succeed.
    Skipped,
}

/// What happened during a run.
#[derive(Debug, Default)]
pub struct Report {
    /// Outcome of every task that was part of the run.
    pub outcomes: HashMap<String, Outcome>,
    /// Timings of the tasks that actually ran.
    pub execution_times: HashMap<String, TaskExecution>,
    /// Errors of failed tasks, in the order they failed.
    pub failures: Vec<(String, anyhow::Error)>,
    /// Task names in the order they reached a terminal state.
    pub completed: Vec<String>,
}

impl Report {
    pub fn outcome(&self, name: &str) -> Option<Outcome> {
        self.outcomes.get(name).copied()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(|&o| o == Outcome::Succeeded)
    }

    pub fn skipped(&self) -> Vec<&str> {
        let mut skipped: Vec<_> = self
            .outcomes
            .iter()
            .filter(|(_, o)| **o == Outcome::Skipped)
            .map(|(name, _)| name.as_str())
            .collect();
        skipped.sort();
        skipped
    }

    /// Appends the results of a later run.
    pub fn merge(&mut self, other: Report) {
        self.outcomes.extend(other.outcomes);
        self.execution_times.extend(other.execution_times);
        self.failures.extend(other.failures);
        self.completed.extend(other.completed);
    }

    /// Turns the first failure into an error.
    pub fn into_result(mut self) -> Result<Self, BuildError> {
        if !self.failures.is_empty() {
            let (name, err) = self.failures.remove(0);
            return Err(BuildError::Task(name, err));
        }

        if let Some(name) = self.skipped().first() {
            return Err(BuildError::Skipped(name.to_string()));
        }

        Ok(self)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for name in &self.completed {
            let outcome = match self.outcomes.get(name) {
                Some(Outcome::Succeeded) => style("ok").green(),
                Some(Outcome::Failed) => style("failed").red(),
                Some(Outcome::Skipped) | None => style("skipped").yellow(),
            };

            match self.execution_times.get(name) {
                Some(exec) => writeln!(f, "{name:<24} {outcome} {:.2?}", exec.duration)?,
                None => writeln!(f, "{name:<24} {outcome}")?,
            }
        }
        Ok(())
    }
}

/// Prerequisites of a task that are part of the run.
fn prerequisites<'a>(
    graph: &'a TaskGraph,
    nodes: &'a HashSet<NodeIndex>,
    index: NodeIndex,
) -> impl Iterator<Item = NodeIndex> + 'a {
    graph
        .dag
        .neighbors_directed(index, petgraph::Direction::Incoming)
        .filter(move |dep| nodes.contains(dep))
}

enum Message {
    Done {
        index: NodeIndex,
        result: anyhow::Result<()>,
        start: Instant,
        duration: Duration,
    },
    Skipped(NodeIndex),
}

/// Executes a subset of the task graph on the rayon pool.
///
/// Tasks start as soon as all of their prerequisites in `nodes` reached a
/// terminal state:
/// 1. Every task gets a count of its pending prerequisites.
/// 2. Tasks with nothing pending are spawned right away.
/// 3. The calling thread waits for completions on a channel, decrementing
///    the counts of the dependents.
/// 4. A dependent whose count reaches zero is spawned, or skipped when one
///    of its prerequisites didn't succeed.
pub(crate) fn run_tasks_parallel(
    graph: &TaskGraph,
    env: &Environment,
    nodes: &HashSet<NodeIndex>,
) -> Report {
    let mut report = Report::default();

    let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.dag.raw_edges() {
        dependents
            .entry(edge.source())
            .or_default()
            .push(edge.target());
    }

    let mut dependency_counts: HashMap<NodeIndex, usize> = nodes
        .iter()
        .map(|&i| (i, prerequisites(graph, nodes, i).count()))
        .collect();

    let total_tasks = nodes.len() as u64;
    if total_tasks == 0 {
        return report;
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(total_tasks);
    root_span.pb_set_style(&crate::io::style_run());
    root_span.pb_set_message("Running tasks...");
    let _enter = root_span.enter();

    let mut outcomes: HashMap<NodeIndex, Outcome> = HashMap::new();
    let pb_style = crate::io::style_task();

    // the calling thread only waits, it never occupies a pool worker
    rayon::in_place_scope(|s| {
        let (sender, receiver) = channel::<Message>();

        let spawn_task = |outcomes: &HashMap<NodeIndex, Outcome>, index: NodeIndex| {
            let sender = sender.clone();

            let blocked = prerequisites(graph, nodes, index)
                .any(|dep| outcomes.get(&dep) != Some(&Outcome::Succeeded));

            if blocked {
                // the receiver lives until every task reported back
                let _ = sender.send(Message::Skipped(index));
                return;
            }

            let task = &graph.dag[index];
            let pb_style = pb_style.clone();

            s.spawn(move |_| {
                let span = tracing::span!(Level::INFO, "task", name = task.name());
                span.pb_set_style(&pb_style);
                span.pb_set_message(&format!("Running {}", task.name()));
                let _enter = span.enter();

                let context = TaskContext {
                    name: task.name(),
                    env,
                    span: span.clone(),
                };

                let start = Instant::now();

                // A panicking body only ever touches its own state, the
                // shared graph and environment are read-only.
                let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    task.execute(&context)
                })) {
                    Ok(result) => result,
                    Err(panic) => {
                        let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                            format!("Task panicked: {s}")
                        } else if let Some(s) = panic.downcast_ref::<String>() {
                            format!("Task panicked: {s}")
                        } else {
                            String::from("Task panicked with unknown payload")
                        };

                        Err(anyhow::anyhow!(msg))
                    }
                };

                let _ = sender.send(Message::Done {
                    index,
                    result,
                    start,
                    duration: start.elapsed(),
                });
            });
        };

        for &index in nodes {
            if dependency_counts.get(&index).copied().unwrap_or(0) == 0 {
                spawn_task(&outcomes, index);
            }
        }

        let mut completed_tasks = 0;
        while completed_tasks < total_tasks {
            // the closure above holds a sender, so this never disconnects
            let Ok(message) = receiver.recv() else {
                break;
            };

            let (index, outcome) = match message {
                Message::Done {
                    index,
                    result,
                    start,
                    duration,
                } => {
                    let name = graph.dag[index].name().to_string();
                    report
                        .execution_times
                        .insert(name.clone(), TaskExecution { start, duration });

                    match result {
                        Ok(()) => {
                            tracing::info!("{} {}", name, crate::io::as_overhead(start));
                            (index, Outcome::Succeeded)
                        }
                        Err(err) => {
                            tracing::error!(task = %name, "{err:#}");
                            report.failures.push((name, err));
                            (index, Outcome::Failed)
                        }
                    }
                }
                Message::Skipped(index) => {
                    tracing::warn!(
                        task = graph.dag[index].name(),
                        "skipped, a prerequisite failed"
                    );
                    (index, Outcome::Skipped)
                }
            };

            let name = graph.dag[index].name().to_string();
            report.outcomes.insert(name.clone(), outcome);
            report.completed.push(name);
            outcomes.insert(index, outcome);
            completed_tasks += 1;
            root_span.pb_inc(1);

            if let Some(dependents) = dependents.get(&index) {
                for &dependent in dependents {
                    if let Some(count) = dependency_counts.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            spawn_task(&outcomes, dependent);
                        }
                    }
                }
            }
        }
    });

    report
}
