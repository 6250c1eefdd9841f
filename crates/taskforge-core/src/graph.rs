//! Dependency resolution: extracted tasks to an acyclic task graph.
//!
//! Nodes get per-parse ordinals in order of appearance. Dependency
//! references are joined by title; the first task with a given title owns
//! it. References to unknown titles, self-references, and repeated edges
//! are skipped. Every edge is checked against the edges accepted before
//! it, and the first one that would close a cycle aborts the whole call.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::normalize::ExtractedTask;

/// Per-parse node identifier, assigned by first-appearance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Blocks,
}

/// `from` cannot start until `to` is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    pub id: NodeId,
    pub task: ExtractedTask,
}

/// The edge that would have made the graph cyclic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("dependency of {from_title:?} ({from}) on {to_title:?} ({to}) would create a cycle")]
pub struct GraphCycleError {
    pub from: NodeId,
    pub from_title: String,
    pub to: NodeId,
    pub to_title: String,
}

/// Tasks plus `blocks` edges. Always acyclic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    edges: Vec<Edge>,
}

impl TaskGraph {
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that `id` waits on.
    pub fn dependencies_of(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to)
            .collect()
    }

    /// Nodes waiting on `id`.
    pub fn dependents_of(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from)
            .collect()
    }

    /// Node ids with every dependency before its dependents.
    ///
    /// Kahn's algorithm; among ready nodes the lowest ordinal goes first, so
    /// the order is stable for a given input.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &self.edges {
            pending[edge.from.0] += 1;
            dependents[edge.to.0].push(edge.from.0);
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(NodeId(node));
            for &dependent in &dependents[node] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
        order
    }
}

/// Build an acyclic [`TaskGraph`] from `tasks`.
pub fn resolve(tasks: &[ExtractedTask]) -> Result<TaskGraph, GraphCycleError> {
    let mut by_title: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        by_title.entry(task.title.as_str()).or_insert(i);
    }

    let mut staged: Vec<(usize, usize)> = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (from, task) in tasks.iter().enumerate() {
        for title in &task.dependency_titles {
            let Some(&to) = by_title.get(title.as_str()) else {
                debug!(task = %task.title, dependency = %title, "skipping unresolved dependency");
                continue;
            };
            if to == from {
                debug!(task = %task.title, "skipping self-dependency");
                continue;
            }
            if seen.insert((from, to)) {
                staged.push((from, to));
            }
        }
    }

    // Accepted edges as adjacency: dependent -> dependencies.
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for &(from, to) in &staged {
        if reaches(&adjacency, to, from) {
            return Err(GraphCycleError {
                from: NodeId(from),
                from_title: tasks[from].title.clone(),
                to: NodeId(to),
                to_title: tasks[to].title.clone(),
            });
        }
        adjacency[from].push(to);
    }

    let nodes = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| TaskNode {
            id: NodeId(i),
            task: task.clone(),
        })
        .collect();
    let edges = staged
        .into_iter()
        .map(|(from, to)| Edge {
            from: NodeId(from),
            to: NodeId(to),
            kind: EdgeKind::Blocks,
        })
        .collect();

    Ok(TaskGraph { nodes, edges })
}

/// Whether `target` is reachable from `start` along accepted edges.
fn reaches(adjacency: &[Vec<usize>], start: usize, target: usize) -> bool {
    let mut visited = vec![false; adjacency.len()];
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if std::mem::replace(&mut visited[node], true) {
            continue;
        }
        stack.extend(adjacency[node].iter().copied().filter(|n| !visited[*n]));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Priority;

    fn task(title: &str, deps: &[&str]) -> ExtractedTask {
        ExtractedTask {
            title: title.to_owned(),
            description: format!("{title} description"),
            priority: Priority::Medium,
            estimated_hours: None,
            tags: Vec::new(),
            dependency_titles: deps.iter().map(|d| (*d).to_owned()).collect(),
            acceptance_criteria: Vec::new(),
        }
    }

    #[test]
    fn single_dependency_yields_one_edge() {
        let graph = resolve(&[task("Setup DB", &[]), task("Create API", &["Setup DB"])]).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.edges(),
            &[Edge {
                from: NodeId(1),
                to: NodeId(0),
                kind: EdgeKind::Blocks
            }]
        );
    }

    #[test]
    fn mutual_dependency_is_rejected() {
        let err = resolve(&[task("A", &["B"]), task("B", &["A"])]).unwrap_err();
        assert_eq!(err.from, NodeId(1));
        assert_eq!(err.to, NodeId(0));
        assert_eq!(err.from_title, "B");
        assert_eq!(err.to_title, "A");
    }

    #[test]
    fn error_names_the_closing_edge_of_a_longer_cycle() {
        let err = resolve(&[task("A", &["B"]), task("B", &["C"]), task("C", &["A"])]).unwrap_err();
        assert_eq!((err.from_title.as_str(), err.to_title.as_str()), ("C", "A"));
        assert!(err.to_string().contains("\"C\""));
    }

    #[test]
    fn cycles_longer_than_ten_hops_are_caught() {
        let titles: Vec<String> = (0..15).map(|i| format!("T{i}")).collect();
        let mut tasks: Vec<ExtractedTask> = (0..15)
            .map(|i| task(&titles[i], &[titles[(i + 1) % 15].as_str()]))
            .collect();
        assert!(resolve(&tasks).is_err());

        // Break the ring and it resolves.
        tasks[14].dependency_titles.clear();
        assert_eq!(resolve(&tasks).unwrap().edges().len(), 14);
    }

    #[test]
    fn unresolved_reference_is_skipped_but_others_kept() {
        let graph = resolve(&[
            task("Setup DB", &[]),
            task("Create API", &["Nonexistent Title", "Setup DB"]),
        ])
        .unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.dependencies_of(NodeId(1)), vec![NodeId(0)]);
    }

    #[test]
    fn duplicate_titles_resolve_to_first_occurrence() {
        let graph = resolve(&[
            task("Build", &[]),
            task("Build", &[]),
            task("Ship", &["Build"]),
        ])
        .unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dependencies_of(NodeId(2)), vec![NodeId(0)]);
        assert!(graph.dependents_of(NodeId(1)).is_empty());
    }

    #[test]
    fn self_reference_is_never_an_edge() {
        let graph = resolve(&[task("Loop", &["Loop"])]).unwrap();
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn repeated_references_are_deduplicated() {
        let graph = resolve(&[task("A", &[]), task("B", &["A", "A"])]).unwrap();
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = resolve(&[
            task("Base", &[]),
            task("Left", &["Base"]),
            task("Right", &["Base"]),
            task("Top", &["Left", "Right"]),
        ])
        .unwrap();
        assert_eq!(graph.edges().len(), 4);
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let graph = resolve(&[
            task("Deploy", &["Build", "Test"]),
            task("Test", &["Build"]),
            task("Build", &[]),
            task("Docs", &[]),
        ])
        .unwrap();
        let order = graph.topological_order();
        assert_eq!(order, vec![NodeId(2), NodeId(1), NodeId(0), NodeId(3)]);
    }

    #[test]
    fn empty_input_is_an_empty_graph() {
        let graph = resolve(&[]).unwrap();
        assert!(graph.is_empty());
        assert!(graph.topological_order().is_empty());
    }
}
