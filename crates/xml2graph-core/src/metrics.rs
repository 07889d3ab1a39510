//! Node centrality for export annotations

use std::collections::HashMap;

use crate::graph::Graph;

/// PageRank configuration
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Damping factor (usually 0.85)
    pub damping_factor: f64,
    /// Maximum number of iterations
    pub iterations: usize,
    /// Stop once the summed absolute change drops below this
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            iterations: 100,
            tolerance: 1.0e-6,
        }
    }
}

/// Compute PageRank over the directed graph, keyed by node id.
///
/// Scores sum to 1. Parallel edges with different labels each count as a
/// link; rank held by nodes without outgoing edges is spread evenly.
pub fn page_rank(graph: &Graph, config: &PageRankConfig) -> HashMap<String, f64> {
    let n = graph.node_count();
    if n == 0 {
        return HashMap::new();
    }

    let mut out_degree = vec![0usize; n];
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in graph.edges() {
        // Endpoints always exist in a built graph
        let (Some(s), Some(t)) = (graph.node_index(&edge.source), graph.node_index(&edge.target))
        else {
            continue;
        };
        out_degree[s] += 1;
        incoming[t].push(s);
    }

    let d = config.damping_factor;
    let uniform = 1.0 / n as f64;
    let mut scores = vec![uniform; n];
    let mut next = vec![0.0; n];

    for _ in 0..config.iterations {
        let dangling: f64 = scores
            .iter()
            .zip(&out_degree)
            .filter(|(_, deg)| **deg == 0)
            .map(|(score, _)| score)
            .sum();
        let base = (1.0 - d) * uniform + d * dangling * uniform;

        let mut diff = 0.0;
        for i in 0..n {
            let inflow: f64 = incoming[i]
                .iter()
                .map(|&src| scores[src] / out_degree[src] as f64)
                .sum();
            next[i] = base + d * inflow;
            diff += (next[i] - scores[i]).abs();
        }

        std::mem::swap(&mut scores, &mut next);
        if diff < config.tolerance {
            break;
        }
    }

    graph
        .nodes()
        .zip(scores)
        .map(|(node, score)| (node.id.clone(), score))
        .collect()
}
