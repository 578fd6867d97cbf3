//! The task dependency graph.
//!
//! Tasks are registered once at startup; identity collisions and references
//! to missing tasks are rejected before anything executes. `resolve` returns
//! the transitive dependency closure of a target in a valid topological
//! order, with ties between independent tasks broken by registration order
//! so two runs over the same graph always schedule identically.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::task::Task;

/// Errors detected while building or resolving the graph.
///
/// All of these are configuration errors: they surface before any task has
/// executed and are never retried.
#[derive(Debug, Error)]
pub enum GraphError {
  /// A task with this name was already registered.
  #[error("duplicate task: {0}")]
  DuplicateTask(String),

  /// The requested target task does not exist.
  #[error("unknown task: {0}")]
  UnknownTask(String),

  /// A task declares a dependency on a name that was never registered.
  #[error("unknown task '{name}' (required by '{required_by}')")]
  UnknownDependency { name: String, required_by: String },

  /// The dependency relation contains a cycle; the path walks the cycle
  /// from its first member back to itself.
  #[error("dependency cycle: {}", path.join(" -> "))]
  Cycle { path: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}

/// A registration-ordered directed acyclic graph of tasks.
#[derive(Default)]
pub struct TaskGraph {
  /// Tasks in registration order; positions double as node indices.
  tasks: Vec<Task>,

  /// Map from task name to registration position.
  index: HashMap<String, usize>,
}

impl TaskGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a task.
  ///
  /// Dependencies may name tasks that have not been registered yet; they
  /// are validated when the graph is resolved.
  pub fn add(&mut self, task: Task) -> Result<(), GraphError> {
    if self.index.contains_key(task.name()) {
      return Err(GraphError::DuplicateTask(task.name().to_string()));
    }

    self.index.insert(task.name().to_string(), self.tasks.len());
    self.tasks.push(task);
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&Task> {
    self.index.get(name).map(|&i| &self.tasks[i])
  }

  /// Tasks in registration order.
  pub fn tasks(&self) -> impl Iterator<Item = &Task> {
    self.tasks.iter()
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Resolve the ordered execution closure for `target`.
  ///
  /// Every task appears after all of its dependencies. The whole graph is
  /// validated first (missing references, cycles), so configuration errors
  /// surface even when the broken region is outside the target's closure.
  pub fn resolve(&self, target: &str) -> Result<Vec<&Task>, GraphError> {
    let target_idx = *self
      .index
      .get(target)
      .ok_or_else(|| GraphError::UnknownTask(target.to_string()))?;

    let graph = self.build_edges()?;
    self.check_acyclic()?;

    // Transitive dependency closure of the target.
    let mut in_closure = vec![false; self.tasks.len()];
    let mut stack = vec![target_idx];
    while let Some(idx) = stack.pop() {
      if in_closure[idx] {
        continue;
      }
      in_closure[idx] = true;
      for dep in graph.neighbors_directed(NodeIndex::new(idx), Direction::Incoming) {
        stack.push(dep.index());
      }
    }

    // Kahn's algorithm restricted to the closure. Ready tasks are taken
    // lowest registration index first, which makes the order deterministic
    // across runs for identical graphs.
    let mut in_degree = vec![0usize; self.tasks.len()];
    for idx in 0..self.tasks.len() {
      if !in_closure[idx] {
        continue;
      }
      in_degree[idx] = graph
        .neighbors_directed(NodeIndex::new(idx), Direction::Incoming)
        .filter(|dep| in_closure[dep.index()])
        .count();
    }

    let mut ready: std::collections::BTreeSet<usize> = (0..self.tasks.len())
      .filter(|&i| in_closure[i] && in_degree[i] == 0)
      .collect();

    let mut order = Vec::new();
    while let Some(&idx) = ready.iter().next() {
      ready.remove(&idx);
      order.push(&self.tasks[idx]);

      for succ in graph.neighbors_directed(NodeIndex::new(idx), Direction::Outgoing) {
        let succ = succ.index();
        if !in_closure[succ] {
          continue;
        }
        in_degree[succ] -= 1;
        if in_degree[succ] == 0 {
          ready.insert(succ);
        }
      }
    }

    Ok(order)
  }

  /// Materialize dependency edges, validating that every referenced name
  /// exists. Edges run from dependency to dependent.
  fn build_edges(&self) -> Result<DiGraph<(), ()>, GraphError> {
    let mut graph = DiGraph::new();
    for _ in &self.tasks {
      graph.add_node(());
    }

    for (idx, task) in self.tasks.iter().enumerate() {
      for dep_name in task.deps() {
        let dep_idx = *self.index.get(dep_name).ok_or_else(|| GraphError::UnknownDependency {
          name: dep_name.clone(),
          required_by: task.name().to_string(),
        })?;
        graph.add_edge(NodeIndex::new(dep_idx), NodeIndex::new(idx), ());
      }
    }

    Ok(graph)
  }

  /// Depth-first cycle check with three-color marking.
  ///
  /// A task reached while still in progress on the current path signals a
  /// cycle; the error carries the full path around it.
  fn check_acyclic(&self) -> Result<(), GraphError> {
    let mut marks = vec![Mark::Unvisited; self.tasks.len()];
    let mut trail = Vec::new();

    for idx in 0..self.tasks.len() {
      if marks[idx] == Mark::Unvisited {
        self.visit(idx, &mut marks, &mut trail)?;
      }
    }

    Ok(())
  }

  fn visit(&self, idx: usize, marks: &mut [Mark], trail: &mut Vec<usize>) -> Result<(), GraphError> {
    marks[idx] = Mark::InProgress;
    trail.push(idx);

    for dep_name in self.tasks[idx].deps() {
      // Unknown names are reported by build_edges; skip here.
      let Some(&dep_idx) = self.index.get(dep_name) else {
        continue;
      };

      match marks[dep_idx] {
        Mark::Done => {}
        Mark::Unvisited => self.visit(dep_idx, marks, trail)?,
        Mark::InProgress => {
          let start = trail.iter().position(|&i| i == dep_idx).unwrap_or(0);
          let mut path: Vec<String> = trail[start..]
            .iter()
            .map(|&i| self.tasks[i].name().to_string())
            .collect();
          path.push(self.tasks[dep_idx].name().to_string());
          return Err(GraphError::Cycle { path });
        }
      }
    }

    trail.pop();
    marks[idx] = Mark::Done;
    Ok(())
  }
}

impl std::fmt::Debug for TaskGraph {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskGraph")
      .field("tasks", &self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>())
      .finish()
  }
}
