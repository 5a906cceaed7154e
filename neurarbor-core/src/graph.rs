//! Graph representations of skeletons.
//!
//! - [`TreeGraph`]: `petgraph::DiGraph` with child → parent edges weighted by
//!   Euclidean distance, plus a node id ↔ `NodeIndex` map.
//! - [`FastGraph`]: flat parent/children index used for traversals. Neurons only
//!   cache one when the `fast-graph` feature is enabled.
//! - Node classification, segment decomposition and dotprops.

use crate::nodes::{NodeTable, NodeType};
use crate::table::{Cell, Table};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Euclidean distance between two points.
#[must_use]
pub fn euclidean(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Directed skeleton graph: edges point from child to parent.
#[derive(Debug, Clone, Default)]
pub struct TreeGraph {
    /// Node weights are node ids, edge weights are distances.
    pub graph: DiGraph<i64, f64>,
    pub id_to_index: HashMap<i64, NodeIndex>,
}

impl TreeGraph {
    /// Builds the graph from a node table.
    #[must_use]
    pub fn from_nodes(nodes: &NodeTable) -> Self {
        let mut graph = DiGraph::with_capacity(nodes.len(), nodes.len());
        let mut id_to_index = HashMap::with_capacity(nodes.len());
        for id in &nodes.node_id {
            id_to_index.insert(*id, graph.add_node(*id));
        }
        let rows = nodes.id_index();
        for i in 0..nodes.len() {
            let parent = nodes.parent_id[i];
            if parent < 0 {
                continue;
            }
            if let Some(&p) = rows.get(&parent) {
                let w = euclidean(nodes.position(i), nodes.position(p));
                graph.add_edge(id_to_index[&nodes.node_id[i]], id_to_index[&parent], w);
            }
        }
        Self { graph, id_to_index }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Sum of all edge weights, ignoring NaN.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.graph
            .edge_weights()
            .filter(|w| !w.is_nan())
            .sum()
    }

    /// Parent of a node, if any.
    #[must_use]
    pub fn parent(&self, node_id: i64) -> Option<i64> {
        let ix = *self.id_to_index.get(&node_id)?;
        self.graph
            .edges_directed(ix, Direction::Outgoing)
            .next()
            .map(|e| self.graph[e.target()])
    }

    /// Children of a node.
    #[must_use]
    pub fn children(&self, node_id: i64) -> Vec<i64> {
        self.id_to_index.get(&node_id).map_or_else(Vec::new, |&ix| {
            self.graph
                .neighbors_directed(ix, Direction::Incoming)
                .map(|n| self.graph[n])
                .collect()
        })
    }

    /// True if the undirected graph has no cycles.
    #[must_use]
    pub fn is_forest(&self) -> bool {
        !petgraph::algo::is_cyclic_undirected(&self.graph)
    }

    /// Weakly connected components as lists of node ids.
    ///
    /// Components and their members follow node insertion order.
    #[must_use]
    pub fn connected_components(&self) -> Vec<Vec<i64>> {
        let mut uf = UnionFind::new(self.graph.node_count());
        for e in self.graph.edge_references() {
            uf.union(e.source().index(), e.target().index());
        }
        let mut order: Vec<usize> = Vec::new();
        let mut groups: HashMap<usize, Vec<i64>> = HashMap::new();
        for ix in self.graph.node_indices() {
            let label = uf.find(ix.index());
            groups
                .entry(label)
                .or_insert_with(|| {
                    order.push(label);
                    Vec::new()
                })
                .push(self.graph[ix]);
        }
        order
            .into_iter()
            .filter_map(|label| groups.remove(&label))
            .collect()
    }

    /// A directed cycle as `(child, parent)` edges, if the parent relation loops.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<(i64, i64)>> {
        let start = match petgraph::algo::toposort(&self.graph, None) {
            Ok(_) => return None,
            Err(cycle) => cycle.node_id(),
        };
        // Walk to a node that is guaranteed to lie on the cycle.
        let mut seen = HashSet::new();
        let mut current = start;
        while seen.insert(current) {
            current = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .next()?;
        }
        let entry = current;
        let mut edges = Vec::new();
        loop {
            let next = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .next()?;
            edges.push((self.graph[current], self.graph[next]));
            current = next;
            if current == entry {
                return Some(edges);
            }
        }
    }
}

/// Flat parent/children index over the rows of a node table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastGraph {
    pub ids: Vec<i64>,
    /// Row of the parent, `None` for roots.
    pub parent: Vec<Option<usize>>,
    /// Distance to parent, 0 for roots.
    pub weight: Vec<f64>,
    child_offsets: Vec<usize>,
    child_rows: Vec<usize>,
}

impl FastGraph {
    /// Builds the index from a node table.
    #[must_use]
    pub fn from_nodes(nodes: &NodeTable) -> Self {
        let n = nodes.len();
        let rows = nodes.id_index();
        let parent: Vec<Option<usize>> = nodes
            .parent_id
            .iter()
            .map(|p| if *p < 0 { None } else { rows.get(p).copied() })
            .collect();
        let weight = (0..n)
            .map(|i| parent[i].map_or(0.0, |p| euclidean(nodes.position(i), nodes.position(p))))
            .collect();

        let mut counts = vec![0usize; n + 1];
        for p in parent.iter().flatten() {
            counts[*p + 1] += 1;
        }
        for i in 0..n {
            counts[i + 1] += counts[i];
        }
        let mut fill = counts.clone();
        let mut child_rows = vec![0usize; counts[n]];
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                child_rows[fill[*p]] = i;
                fill[*p] += 1;
            }
        }
        Self {
            ids: nodes.node_id.clone(),
            parent,
            weight,
            child_offsets: counts,
            child_rows,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Child rows of row `i`.
    #[must_use]
    pub fn children(&self, i: usize) -> &[usize] {
        &self.child_rows[self.child_offsets[i]..self.child_offsets[i + 1]]
    }

    /// Sum of all parent distances, ignoring NaN.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.weight.iter().filter(|w| !w.is_nan()).sum()
    }

    /// Rows reachable from a root, parents before children.
    #[must_use]
    pub fn topological_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.len());
        let mut queue: VecDeque<usize> =
            (0..self.len()).filter(|&i| self.parent[i].is_none()).collect();
        while let Some(i) = queue.pop_front() {
            order.push(i);
            queue.extend(self.children(i));
        }
        order
    }

    /// Geodesic distance of every row to its root; NaN if unreachable.
    #[must_use]
    pub fn dist_to_root(&self) -> Vec<f64> {
        let mut dist = vec![f64::NAN; self.len()];
        for i in self.topological_order() {
            dist[i] = self.parent[i].map_or(0.0, |p| dist[p] + self.weight[i]);
        }
        dist
    }

    /// Rows of the subtree rooted at row `i`, including `i`.
    ///
    /// Each row is visited once, so parent cycles terminate.
    #[must_use]
    pub fn subtree(&self, i: usize) -> Vec<usize> {
        let mut visited = vec![false; self.len()];
        visited[i] = true;
        let mut out = vec![i];
        let mut k = 0;
        while k < out.len() {
            for &c in self.children(out[k]) {
                if !visited[c] {
                    visited[c] = true;
                    out.push(c);
                }
            }
            k += 1;
        }
        out
    }

    /// True if every row reaches a root through its parents.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().len() == self.len()
    }

    /// Rows from `i` up to and including its root.
    #[must_use]
    pub fn path_to_root(&self, i: usize) -> Vec<usize> {
        let mut out = vec![i];
        let mut current = i;
        while let Some(p) = self.parent[current] {
            if out.len() > self.len() {
                break;
            }
            out.push(p);
            current = p;
        }
        out
    }
}

/// Builds a [`FastGraph`] if the `fast-graph` feature is enabled.
#[must_use]
pub fn build_fast_graph(nodes: &NodeTable) -> Option<FastGraph> {
    #[cfg(feature = "fast-graph")]
    {
        Some(FastGraph::from_nodes(nodes))
    }
    #[cfg(not(feature = "fast-graph"))]
    {
        let _ = nodes;
        None
    }
}

/// Refreshes the `node_type` column from the parent relation.
pub fn classify_nodes(nodes: &mut NodeTable) {
    let mut n_children: HashMap<i64, usize> = HashMap::with_capacity(nodes.len());
    for p in &nodes.parent_id {
        if *p >= 0 {
            *n_children.entry(*p).or_default() += 1;
        }
    }
    nodes.node_type = nodes
        .node_id
        .iter()
        .zip(&nodes.parent_id)
        .map(|(id, parent)| {
            if *parent < 0 {
                return NodeType::Root;
            }
            match n_children.get(id).copied().unwrap_or(0) {
                0 => NodeType::End,
                1 => NodeType::Slab,
                _ => NodeType::Branch,
            }
        })
        .collect();
}

/// Distance of every node to its parent; roots get `root_dist`.
#[must_use]
pub fn parent_dist(nodes: &NodeTable, root_dist: f64) -> Vec<f64> {
    let fg = FastGraph::from_nodes(nodes);
    fg.parent
        .iter()
        .zip(&fg.weight)
        .map(|(p, w)| if p.is_some() { *w } else { root_dist })
        .collect()
}

/// Longest-path decomposition into linear segments of node ids.
///
/// Leafs are visited by decreasing distance to root; each walk stops after the
/// first node already claimed by an earlier segment. Segments run leaf → root
/// and are sorted by length, longest first.
#[must_use]
pub fn generate_segments(nodes: &NodeTable) -> Vec<Vec<i64>> {
    let fg = FastGraph::from_nodes(nodes);
    let dist = fg.dist_to_root();
    let mut leafs: Vec<usize> = (0..fg.len()).filter(|&i| fg.children(i).is_empty()).collect();
    leafs.sort_by(|a, b| dist[*b].total_cmp(&dist[*a]));

    let mut seen = vec![false; fg.len()];
    let mut segments = Vec::new();
    for leaf in leafs {
        let mut seq = vec![fg.ids[leaf]];
        let mut current = fg.parent[leaf];
        while let Some(p) = current {
            seq.push(fg.ids[p]);
            if seen[p] {
                break;
            }
            seen[p] = true;
            current = fg.parent[p];
        }
        if seq.len() > 1 {
            segments.push(seq);
        }
    }
    segments.sort_by_key(|s| std::cmp::Reverse(s.len()));
    segments
}

/// Breaks the skeleton into segments between leaf, branch and root nodes.
#[must_use]
pub fn break_segments(nodes: &NodeTable) -> Vec<Vec<i64>> {
    let fg = FastGraph::from_nodes(nodes);
    let is_branch = |i: usize| fg.children(i).len() > 1;
    let starts = (0..fg.len())
        .filter(|&i| fg.children(i).is_empty() && fg.parent[i].is_some())
        .chain((0..fg.len()).filter(|&i| is_branch(i)));
    let mut segments = Vec::new();
    for start in starts {
        let mut seq = vec![fg.ids[start]];
        let mut current = fg.parent[start];
        while let Some(p) = current {
            seq.push(fg.ids[p]);
            if is_branch(p) || seq.len() > fg.len() {
                break;
            }
            current = fg.parent[p];
        }
        if seq.len() > 1 {
            segments.push(seq);
        }
    }
    segments
}

/// Point cloud with tangent vectors: one entry per child → parent edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dotprops {
    /// Midpoint between child and parent.
    pub points: Vec<[f64; 3]>,
    /// Vector from child to parent.
    pub vectors: Vec<[f64; 3]>,
    pub vec_length: Vec<f64>,
}

impl Dotprops {
    /// Computes dotprops for a node table.
    #[must_use]
    pub fn from_nodes(nodes: &NodeTable) -> Self {
        let rows = nodes.id_index();
        let mut dps = Self::default();
        for i in 0..nodes.len() {
            let Some(&p) = rows.get(&nodes.parent_id[i]) else {
                continue;
            };
            let (a, b) = (nodes.position(i), nodes.position(p));
            let vec = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            dps.points
                .push([a[0] + vec[0] / 2.0, a[1] + vec[1] / 2.0, a[2] + vec[2] / 2.0]);
            dps.vec_length.push(euclidean(a, b));
            dps.vectors.push(vec);
        }
        dps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Flattens into a table with `point_*`, `vector_*` and `vec_length` columns.
    #[must_use]
    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        for (axis, name) in ["x", "y", "z"].iter().enumerate() {
            let _ = t.add_column(
                format!("point_{name}"),
                self.points.iter().map(|p| Cell::Float(p[axis])).collect(),
            );
        }
        for (axis, name) in ["x", "y", "z"].iter().enumerate() {
            let _ = t.add_column(
                format!("vector_{name}"),
                self.vectors.iter().map(|v| Cell::Float(v[axis])).collect(),
            );
        }
        let _ = t.add_column(
            "vec_length",
            self.vec_length.iter().map(|v| Cell::Float(*v)).collect(),
        );
        t
    }
}
