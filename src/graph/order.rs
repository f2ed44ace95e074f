//! Topological ordering and level computation over a [`PipelineGraph`].

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use super::{GraphError, PipelineGraph};

/// Successor lists plus in-degree counts, derived from active connections.
/// Duplicate port-level connections between the same node pair collapse to a
/// single edge.
fn adjacency(graph: &PipelineGraph) -> (FxHashMap<&str, Vec<&str>>, FxHashMap<&str, usize>) {
    let mut successors: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    for id in graph.node_ids() {
        successors.insert(id.as_str(), Vec::new());
        in_degree.insert(id.as_str(), 0);
    }
    for conn in graph.connections().iter().filter(|c| c.active) {
        let Some(succ) = successors.get_mut(conn.source.as_str()) else {
            continue;
        };
        if succ.contains(&conn.target.as_str()) {
            continue;
        }
        succ.push(conn.target.as_str());
        if let Some(deg) = in_degree.get_mut(conn.target.as_str()) {
            *deg += 1;
        }
    }
    (successors, in_degree)
}

/// Kahn's algorithm seeded in node insertion order, so repeated runs over the
/// same graph yield the same total order.
pub fn execution_order(graph: &PipelineGraph) -> Result<Vec<String>, GraphError> {
    let (successors, mut in_degree) = adjacency(graph);

    let mut ready: VecDeque<&str> = graph
        .node_ids()
        .iter()
        .map(String::as_str)
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for succ in &successors[id] {
            let deg = in_degree
                .get_mut(succ)
                .expect("successor missing from in-degree map");
            *deg -= 1;
            if *deg == 0 {
                ready.push_back(succ);
            }
        }
    }

    if order.len() != graph.len() {
        return Err(GraphError::CycleDetected);
    }
    Ok(order)
}

/// Group nodes into dependency levels: level 0 holds the sources, and each
/// node lands one level past its deepest predecessor. Nodes within one level
/// are mutually independent and safe to run concurrently.
pub fn execution_levels(graph: &PipelineGraph) -> Result<Vec<Vec<String>>, GraphError> {
    let (successors, mut in_degree) = adjacency(graph);

    let mut levels = Vec::new();
    let mut placed = 0usize;
    let mut current: Vec<&str> = graph
        .node_ids()
        .iter()
        .map(String::as_str)
        .filter(|id| in_degree[id] == 0)
        .collect();

    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for id in &current {
            for succ in &successors[*id] {
                let deg = in_degree
                    .get_mut(succ)
                    .expect("successor missing from in-degree map");
                *deg -= 1;
                if *deg == 0 {
                    next.push(*succ);
                }
            }
        }
        // Preserve insertion order within the level for determinism.
        next.sort_by_key(|id| {
            graph
                .node_ids()
                .iter()
                .position(|n| n == id)
                .unwrap_or(usize::MAX)
        });
        levels.push(current.iter().map(|id| id.to_string()).collect());
        current = next;
    }

    if placed != graph.len() {
        return Err(GraphError::CycleDetected);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, PortLayout, Processor, StepOutput};
    use crate::types::DataMap;
    use async_trait::async_trait;

    struct Passthrough;

    #[async_trait]
    impl Processor for Passthrough {
        fn type_tag(&self) -> &str {
            "passthrough"
        }

        async fn process(
            &mut self,
            inputs: DataMap,
        ) -> Result<StepOutput, crate::module::ModuleError> {
            Ok(StepOutput::new(inputs))
        }
    }

    fn module(name: &str) -> Module {
        Module::new(Box::new(Passthrough)).with_name(name)
    }

    async fn diamond() -> PipelineGraph {
        let mut graph = PipelineGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.add(module(id), Some(id.to_string())).unwrap();
        }
        graph.connect("a", "out", "b", "in").await.unwrap();
        graph.connect("a", "out", "c", "in").await.unwrap();
        graph.connect("b", "out", "d", "left").await.unwrap();
        graph.connect("c", "out", "d", "right").await.unwrap();
        graph
    }

    #[tokio::test]
    async fn diamond_orders_sources_first() {
        let graph = diamond().await;
        let order = execution_order(&graph).unwrap();
        assert_eq!(order.first().map(String::as_str), Some("a"));
        assert_eq!(order.last().map(String::as_str), Some("d"));
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[tokio::test]
    async fn diamond_levels_group_independents() {
        let graph = diamond().await;
        let levels = execution_levels(&graph).unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn cycle_is_rejected() {
        let mut graph = PipelineGraph::new();
        graph.add(module("x"), Some("x".into())).unwrap();
        graph.add(module("y"), Some("y".into())).unwrap();
        graph.connect("x", "out", "y", "in").await.unwrap();
        graph.connect("y", "out", "x", "in").await.unwrap();
        assert!(matches!(
            execution_order(&graph),
            Err(GraphError::CycleDetected)
        ));
        assert!(matches!(
            execution_levels(&graph),
            Err(GraphError::CycleDetected)
        ));
    }

    #[tokio::test]
    async fn duplicate_port_edges_collapse() {
        let mut graph = PipelineGraph::new();
        graph.add(module("p"), Some("p".into())).unwrap();
        graph.add(module("q"), Some("q".into())).unwrap();
        graph.connect("p", "out", "q", "in").await.unwrap();
        graph.connect("p", "out", "q", "other").await.unwrap();
        let order = execution_order(&graph).unwrap();
        assert_eq!(order, vec!["p".to_string(), "q".to_string()]);
    }

    #[test]
    fn empty_graph_yields_empty_order() {
        let graph = PipelineGraph::new();
        assert!(execution_order(&graph).unwrap().is_empty());
        assert!(execution_levels(&graph).unwrap().is_empty());
    }
}
