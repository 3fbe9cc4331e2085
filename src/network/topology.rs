//! Topological ordering of a processor network.
//!
//! The evaluator caches an [`EvaluationPlan`] keyed by the graph generation
//! and asks [`TopologyCompiler`] for a fresh one only after the wiring changed.

use super::error::{NetworkError, NetworkResult};
use super::graph::Graph;
use super::id::ProcessorId;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::time::Instant;

/// Cached visiting order for one topology generation.
#[derive(Debug, Clone, Default)]
pub struct EvaluationPlan {
    /// Every processor, upstream before downstream.
    pub order: Vec<ProcessorId>,

    /// Graph generation this plan was compiled from.
    pub generation: u64,

    pub stats: PlanStats,
}

impl EvaluationPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of `id` in the plan.
    pub fn position(&self, id: ProcessorId) -> Option<usize> {
        self.order.iter().position(|&p| p == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    pub total_processors: usize,

    /// No inports.
    pub source_processors: usize,

    /// No outports.
    pub sink_processors: usize,

    pub connections: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

/// Compiles a graph into an evaluation plan.
pub struct TopologyCompiler;

impl TopologyCompiler {
    /// Fails with `CycleDetected` listing every processor that could not be
    /// scheduled.
    pub fn compile(graph: &Graph) -> NetworkResult<EvaluationPlan> {
        let start_time = Instant::now();

        let nodes = graph.processor_ids();
        let edges = graph.edges();
        let order = Self::sort(&nodes, &edges)
            .map_err(|processors| NetworkError::CycleDetected { processors })?;

        let stats = PlanStats {
            total_processors: nodes.len(),
            source_processors: graph.processors().filter(|s| s.is_source()).count(),
            sink_processors: graph.processors().filter(|s| s.is_sink()).count(),
            connections: edges.len(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(EvaluationPlan {
            order,
            generation: graph.generation(),
            stats,
        })
    }

    /// Kahn's algorithm. Among processors that are ready at the same time the
    /// one listed first in `nodes` goes first, so registration order breaks
    /// ties. Edges naming unknown processors are ignored.
    ///
    /// On a cycle, returns the processors left unscheduled.
    pub fn sort(
        nodes: &[ProcessorId],
        edges: &[(ProcessorId, ProcessorId)],
    ) -> Result<Vec<ProcessorId>, Vec<ProcessorId>> {
        let n = nodes.len();
        let position: HashMap<ProcessorId, usize> =
            nodes.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];

        for (from, to) in edges {
            if let (Some(&from), Some(&to)) = (position.get(from), position.get(to)) {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(node)) = ready.pop() {
            order.push(nodes[node]);
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Processor network has a cycle! Only {} of {} processors scheduled.",
                order.len(),
                n
            );
            return Err((0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| nodes[i])
                .collect());
        }

        Ok(order)
    }
}

/// Every processor reachable downstream of `start`, not counting `start`
/// itself unless it sits on a cycle.
pub fn successors(graph: &Graph, start: ProcessorId) -> BTreeSet<ProcessorId> {
    reach(start, |id| graph.direct_successors(id))
}

/// Every processor `start` transitively depends on.
pub fn predecessors(graph: &Graph, start: ProcessorId) -> BTreeSet<ProcessorId> {
    reach(start, |id| graph.direct_predecessors(id))
}

fn reach<F>(start: ProcessorId, neighbours: F) -> BTreeSet<ProcessorId>
where
    F: Fn(ProcessorId) -> Vec<ProcessorId>,
{
    let mut reached = BTreeSet::new();
    let mut stack = neighbours(start);

    while let Some(node) = stack.pop() {
        if reached.insert(node) {
            stack.extend(neighbours(node));
        }
    }

    reached
}
