//! Dependency graph over a task set
//!
//! Node indices equal task positions in the [`TaskSet`]. An edge `a → b`
//! means `a` depends on `b`, so `b` is applied first.

use crate::error::EngineError;
use crate::task::TaskSet;
use crate::types::TaskKey;
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskKey, ()>,
}

impl TaskGraph {
    /// Build the graph, rejecting unknown dependencies and cycles
    ///
    /// A cycle error names every task on every cycle.
    pub fn build(tasks: &TaskSet) -> Result<Self, EngineError> {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        for task in tasks.iter() {
            graph.add_node(task.key());
        }

        for (i, task) in tasks.iter().enumerate() {
            for dependency in task.dependencies(tasks) {
                let Some(j) = tasks.position(&dependency) else {
                    return Err(EngineError::UnknownDependency {
                        task: task.key(),
                        dependency,
                    });
                };
                graph.update_edge(NodeIndex::new(i), NodeIndex::new(j), ());
            }
        }

        let mut members: Vec<TaskKey> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|n| graph[n].clone())
            .collect();
        if !members.is_empty() {
            members.sort();
            return Err(EngineError::Cycle { members });
        }

        log::debug!(
            "task graph: {} task(s), {} dependency edge(s)",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(Self { graph })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn key(&self, task: usize) -> &TaskKey {
        &self.graph[NodeIndex::new(task)]
    }

    /// Direct dependencies of `task`, sorted by position
    pub fn dependencies_of(&self, task: usize) -> Vec<usize> {
        self.neighbors(task, Direction::Outgoing)
    }

    /// Tasks that directly depend on `task`, sorted by position
    pub fn dependents_of(&self, task: usize) -> Vec<usize> {
        self.neighbors(task, Direction::Incoming)
    }

    fn neighbors(&self, task: usize, direction: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(task), direction)
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out
    }

    /// Task positions with dependencies before dependents
    pub fn topological_order(&self) -> Vec<usize> {
        // Edges point at dependencies, so reverse the sort
        match toposort(&self.graph, None) {
            Ok(order) => order.into_iter().rev().map(NodeIndex::index).collect(),
            Err(_) => (0..self.len()).collect(),
        }
    }
}
