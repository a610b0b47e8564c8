//! Dinic max-flow / min-cut over a residual graph with float capacities

use std::collections::VecDeque;

const EPS: f64 = 1e-9;

/// Flow network; edges are stored in pairs so `e ^ 1` is the reverse of `e`
#[derive(Debug, Clone)]
pub struct FlowGraph {
    adjacency: Vec<Vec<usize>>,
    to: Vec<usize>,
    capacity: Vec<f64>,
    level: Vec<usize>,
    cursor: Vec<usize>,
}

impl FlowGraph {
    #[must_use]
    pub fn new(nodes: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); nodes],
            to: Vec::new(),
            capacity: Vec::new(),
            level: vec![usize::MAX; nodes],
            cursor: vec![0; nodes],
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Add an edge `u -> v` with capacity `forward` and a reverse capacity
    /// `backward` (0 for a plain directed edge)
    pub fn add_edge(&mut self, u: usize, v: usize, forward: f64, backward: f64) {
        let e = self.to.len();
        self.to.push(v);
        self.capacity.push(forward.max(0.0));
        self.adjacency[u].push(e);
        self.to.push(u);
        self.capacity.push(backward.max(0.0));
        self.adjacency[v].push(e + 1);
    }

    fn build_levels(&mut self, source: usize, sink: usize) -> bool {
        self.level.iter_mut().for_each(|l| *l = usize::MAX);
        self.level[source] = 0;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.to[e];
                if self.capacity[e] > EPS && self.level[v] == usize::MAX {
                    self.level[v] = self.level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        self.level[sink] != usize::MAX
    }

    /// Push flow along shortest augmenting paths until the level graph is saturated
    fn blocking_flow(&mut self, source: usize, sink: usize) -> f64 {
        let mut total = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut u = source;
        loop {
            if u == sink {
                let pushed = path
                    .iter()
                    .map(|&e| self.capacity[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.capacity[e] -= pushed;
                    self.capacity[e ^ 1] += pushed;
                }
                total += pushed;
                path.clear();
                u = source;
                continue;
            }

            let mut advanced = false;
            while self.cursor[u] < self.adjacency[u].len() {
                let e = self.adjacency[u][self.cursor[u]];
                let v = self.to[e];
                if self.capacity[e] > EPS && self.level[v] == self.level[u].wrapping_add(1) {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                self.cursor[u] += 1;
            }
            if advanced {
                continue;
            }

            // Dead end: prune the node and step back
            self.level[u] = usize::MAX;
            match path.pop() {
                Some(e) => {
                    u = self.to[e ^ 1];
                    self.cursor[u] += 1;
                },
                None => return total,
            }
        }
    }

    /// Maximum flow from `source` to `sink`
    pub fn max_flow(&mut self, source: usize, sink: usize) -> f64 {
        if source == sink {
            return 0.0;
        }
        let mut flow = 0.0;
        while self.build_levels(source, sink) {
            self.cursor.iter_mut().for_each(|c| *c = 0);
            flow += self.blocking_flow(source, sink);
        }
        flow
    }

    /// Nodes reachable from `source` in the residual graph (the source side of the min cut)
    #[must_use]
    pub fn source_side(&self, source: usize) -> Vec<bool> {
        let mut seen = vec![false; self.node_count()];
        seen[source] = true;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.to[e];
                if self.capacity[e] > EPS && !seen[v] {
                    seen[v] = true;
                    queue.push_back(v);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_network() {
        // CLRS example, max flow 23
        let mut g = FlowGraph::new(6);
        g.add_edge(0, 1, 16.0, 0.0);
        g.add_edge(0, 2, 13.0, 0.0);
        g.add_edge(2, 1, 4.0, 0.0);
        g.add_edge(1, 3, 12.0, 0.0);
        g.add_edge(3, 2, 9.0, 0.0);
        g.add_edge(2, 4, 14.0, 0.0);
        g.add_edge(4, 3, 7.0, 0.0);
        g.add_edge(3, 5, 20.0, 0.0);
        g.add_edge(4, 5, 4.0, 0.0);
        let flow = g.max_flow(0, 5);
        assert!((flow - 23.0).abs() < 1e-9);

        let side = g.source_side(0);
        assert!(side[0] && !side[5]);
    }

    #[test]
    fn test_min_cut_splits_weak_link() {
        // s -> a == b -> t with a weak middle link
        let mut g = FlowGraph::new(4);
        g.add_edge(0, 1, 100.0, 0.0);
        g.add_edge(1, 2, 1.5, 1.5);
        g.add_edge(2, 3, 100.0, 0.0);
        assert!((g.max_flow(0, 3) - 1.5).abs() < 1e-9);
        let side = g.source_side(0);
        assert_eq!(side, vec![true, true, false, false]);
    }

    #[test]
    fn test_disconnected_sink() {
        let mut g = FlowGraph::new(3);
        g.add_edge(0, 1, 5.0, 0.0);
        assert_eq!(g.max_flow(0, 2), 0.0);
    }
}
