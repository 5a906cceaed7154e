//! Morphology operations on skeletons.
//!
//! Every operation mutates the neuron in place and leaves it consistent:
//! node types are refreshed, cached representations dropped and a soma that
//! was removed is demoted. Copy semantics are layered on top by the caller.

use crate::error::{Error, Result};
use crate::graph::{euclidean, generate_segments, FastGraph};
use crate::neuron::TreeNeuron;
use crate::nodes::{NodeRow, NodeTable};
use std::collections::HashSet;

/// Which side of a cut to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cut {
    /// Keep the part between root and cut node.
    KeepProximal,
    /// Keep the subtree rooted at the cut node.
    KeepDistal,
}

/// Strahler orders to remove. Negative orders count down from the highest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrahlerSelection {
    /// `k >= 0` removes orders `1..=k`; `k < 0` keeps only the top `|k|` orders.
    Order(i64),
    /// Explicit orders.
    Orders(Vec<i64>),
    /// Half-open range of orders; bounds default to the lowest and highest order.
    Range { start: Option<i64>, end: Option<i64> },
}

impl StrahlerSelection {
    fn resolve(&self, max: i64) -> HashSet<i64> {
        let relative = |o: i64| if o < 0 { max + 1 + o } else { o };
        match self {
            Self::Order(k) if *k >= 0 => (1..=*k).collect(),
            Self::Order(k) => (1..=max + k).collect(),
            Self::Orders(orders) => orders.iter().map(|o| relative(*o)).collect(),
            Self::Range { start, end } => {
                let start = start.map_or(1, relative);
                let end = end.map_or(max + 1, relative);
                (start..end).collect()
            }
        }
    }
}

/// A region of space.
pub trait Volume: Send + Sync {
    fn contains(&self, point: [f64; 3]) -> bool;
}

/// Axis-aligned box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    #[must_use]
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// From `[[xmin, xmax], [ymin, ymax], [zmin, zmax]]`.
    #[must_use]
    pub fn from_bbox(bbox: [[f64; 2]; 3]) -> Self {
        Self {
            min: [bbox[0][0], bbox[1][0], bbox[2][0]],
            max: [bbox[0][1], bbox[1][1], bbox[2][1]],
        }
    }
}

impl Volume for BoundingBox {
    fn contains(&self, p: [f64; 3]) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }
}

/// Whether to keep nodes inside or outside a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMode {
    Inside,
    Outside,
}

/// Membership of each point in a volume.
#[must_use]
pub fn points_in_volume(points: &[[f64; 3]], volume: &dyn Volume) -> Vec<bool> {
    points.iter().map(|p| volume.contains(*p)).collect()
}

/// Fails if some nodes never reach a root through their parents.
fn require_acyclic(fg: &FastGraph) -> Result<()> {
    if fg.is_acyclic() {
        Ok(())
    } else {
        Err(Error::Validation(
            "parent links form a cycle; the neuron is not a tree".to_string(),
        ))
    }
}

/// Keeps only the given node ids and the connectors attached to them.
pub(crate) fn subset_in_place(n: &mut TreeNeuron, keep: &HashSet<i64>) {
    let nodes = n.nodes().subset(keep);
    if let Some(c) = n.core_mut().connectors_mut() {
        *c = c.retain_nodes(keep);
    }
    n.set_nodes(nodes);
}

/// Rows that start or end a linear stretch: roots, leafs and branch points.
fn key_rows(fg: &FastGraph) -> Vec<bool> {
    (0..fg.len())
        .map(|i| fg.parent[i].is_none() || fg.children(i).len() != 1)
        .collect()
}

/// Rows from a key row up to (and including) the next key ancestor.
fn chain_up(fg: &FastGraph, key: &[bool], row: usize) -> Vec<usize> {
    let mut chain = vec![row];
    let mut current = fg.parent[row];
    while let Some(p) = current {
        chain.push(p);
        if key[p] || chain.len() > fg.len() {
            break;
        }
        current = fg.parent[p];
    }
    chain
}

/// Resamples every linear stretch to nodes spaced `resample_to` apart.
///
/// Roots, branch points and leafs keep their ids; new nodes get fresh ids.
/// Connectors attached to removed nodes move to the nearest remaining node.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample_neuron(n: &mut TreeNeuron, resample_to: f64) -> Result<()> {
    if resample_to.is_nan() || resample_to <= 0.0 {
        return Err(Error::Validation(format!(
            "resampling resolution must be positive, got {resample_to}"
        )));
    }
    let nodes = n.nodes();
    let fg = FastGraph::from_nodes(nodes);
    let key = key_rows(&fg);
    let keep: Vec<usize> = (0..fg.len()).filter(|&i| key[i]).collect();
    let mut out = nodes.take(&keep);
    let mut next_id = nodes.node_id.iter().max().map_or(0, |m| m + 1);

    for (out_row, &row) in keep.iter().enumerate() {
        if fg.parent[row].is_none() {
            continue;
        }
        // Proximal → distal polyline.
        let chain: Vec<usize> = chain_up(&fg, &key, row).into_iter().rev().collect();
        let mut cum = vec![0.0];
        for w in chain.windows(2) {
            let step = euclidean(nodes.position(w[0]), nodes.position(w[1]));
            cum.push(cum[cum.len() - 1] + step);
        }
        let total = cum[cum.len() - 1];
        let n_new = ((total / resample_to).ceil() as usize).saturating_sub(1);

        let mut parent = fg.ids[chain[0]];
        let mut j = 0;
        for k in 1..=n_new {
            let d = k as f64 * resample_to;
            while j + 2 < cum.len() && cum[j + 1] <= d {
                j += 1;
            }
            let span = cum[j + 1] - cum[j];
            let t = if span > 0.0 { (d - cum[j]) / span } else { 0.0 };
            let (a, b) = (chain[j], chain[j + 1]);
            let lerp = |u: f64, v: f64| u + (v - u) * t;
            let (pa, pb) = (nodes.position(a), nodes.position(b));
            out.push_unchecked(
                NodeRow::new(
                    next_id,
                    parent,
                    lerp(pa[0], pb[0]),
                    lerp(pa[1], pb[1]),
                    lerp(pa[2], pb[2]),
                )
                .with_radius(lerp(nodes.radius[a], nodes.radius[b])),
            );
            parent = next_id;
            next_id += 1;
        }
        out.parent_id[out_row] = parent;
    }

    let out = out.validated()?;
    reattach_connectors(n, &out);
    n.set_nodes(out);
    Ok(())
}

/// Moves connectors whose node no longer exists to the nearest node.
fn reattach_connectors(n: &mut TreeNeuron, nodes: &NodeTable) {
    if nodes.is_empty() {
        return;
    }
    let Some(c) = n.core_mut().connectors_mut() else {
        return;
    };
    let ids: HashSet<i64> = nodes.node_id.iter().copied().collect();
    for i in 0..c.len() {
        let Some(node) = c.node_id[i] else { continue };
        if ids.contains(&node) {
            continue;
        }
        let p = [c.x[i], c.y[i], c.z[i]];
        let nearest = (0..nodes.len())
            .min_by(|&a, &b| {
                euclidean(p, nodes.position(a)).total_cmp(&euclidean(p, nodes.position(b)))
            })
            .map(|r| nodes.node_id[r]);
        c.node_id[i] = nearest;
    }
}

/// Rows kept when downsampling by `factor`. Soma and connector nodes always stay.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn downsample_keep(n: &TreeNeuron, fg: &FastGraph, factor: f64) -> Vec<bool> {
    let key = key_rows(fg);
    let mut keep = key.clone();

    let mut preserve: HashSet<i64> = n.soma().unwrap_or_default().into_iter().collect();
    if let Some(c) = n.connectors() {
        preserve.extend(c.node_id.iter().flatten());
    }
    for (i, id) in fg.ids.iter().enumerate() {
        if preserve.contains(id) {
            keep[i] = true;
        }
    }

    if factor.is_finite() {
        let step = (factor.floor() as usize).max(1);
        for row in (0..fg.len()).filter(|&i| key[i]) {
            let chain = chain_up(fg, &key, row);
            let interior = chain.len().saturating_sub(1);
            for (k, &r) in chain.iter().enumerate().take(interior).skip(1) {
                if k % step == 0 {
                    keep[r] = true;
                }
            }
        }
    }
    keep
}

/// Kept rows, each re-parented to its nearest kept ancestor.
fn downsampled_nodes(nodes: &NodeTable, fg: &FastGraph, keep: &[bool]) -> NodeTable {
    let rows: Vec<usize> = (0..fg.len()).filter(|&i| keep[i]).collect();
    let mut out = nodes.take(&rows);
    for (k, &row) in rows.iter().enumerate() {
        let mut parent = -1;
        let mut current = fg.parent[row];
        let mut steps = 0;
        while let Some(p) = current {
            if keep[p] {
                parent = fg.ids[p];
                break;
            }
            steps += 1;
            if steps > fg.len() {
                break;
            }
            current = fg.parent[p];
        }
        out.parent_id[k] = parent;
    }
    out
}

/// Reduces the number of nodes by `factor`; `f64::INFINITY` keeps only
/// roots, branch points, leafs, soma and connector nodes.
pub fn downsample_neuron(n: &mut TreeNeuron, factor: f64) -> Result<()> {
    if factor.is_nan() || factor < 1.0 {
        return Err(Error::Validation(format!(
            "downsampling factor must be at least 1, got {factor}"
        )));
    }
    let fg = FastGraph::from_nodes(n.nodes());
    let keep = downsample_keep(n, &fg, factor);
    let nodes = downsampled_nodes(n.nodes(), &fg, &keep);
    n.set_nodes(nodes);
    Ok(())
}

/// The maximally downsampled copy backing [`TreeNeuron::simple`].
pub(crate) fn simplified(n: &TreeNeuron) -> TreeNeuron {
    let fg = FastGraph::from_nodes(n.nodes());
    let keep = downsample_keep(n, &fg, f64::INFINITY);
    n.derived(downsampled_nodes(n.nodes(), &fg, &keep))
}

/// Makes `new_root` the root of its tree by reversing the path to the old root.
pub fn reroot_neuron(n: &mut TreeNeuron, new_root: i64) -> Result<()> {
    let nodes = n.nodes();
    let row = nodes
        .index_of(new_root)
        .ok_or(Error::NodeNotFound(new_root))?;
    if nodes.parent_id[row] < 0 {
        return Ok(());
    }
    let fg = FastGraph::from_nodes(nodes);
    require_acyclic(&fg)?;
    let path = fg.path_to_root(row);
    let mut nodes = nodes.clone();
    nodes.parent_id[path[0]] = -1;
    for w in path.windows(2) {
        nodes.parent_id[w[1]] = fg.ids[w[0]];
    }
    n.set_nodes(nodes);
    Ok(())
}

/// Cuts at `node`, keeping one side. The cut node is part of both sides.
pub fn cut_in_place(n: &mut TreeNeuron, node: i64, side: Cut) -> Result<()> {
    let row = n.nodes().index_of(node).ok_or(Error::NodeNotFound(node))?;
    let fg = FastGraph::from_nodes(n.nodes());
    require_acyclic(&fg)?;
    let distal: HashSet<i64> = fg.subtree(row).into_iter().map(|i| fg.ids[i]).collect();
    let keep: HashSet<i64> = match side {
        Cut::KeepDistal => distal,
        Cut::KeepProximal => fg
            .ids
            .iter()
            .copied()
            .filter(|id| *id == node || !distal.contains(id))
            .collect(),
    };
    subset_in_place(n, &keep);
    Ok(())
}

/// Splits a neuron at `node` into `(distal, proximal)` copies.
pub fn cut_neuron(n: &TreeNeuron, node: i64) -> Result<(TreeNeuron, TreeNeuron)> {
    let mut distal = n.copy();
    cut_in_place(&mut distal, node, Cut::KeepDistal)?;
    let mut proximal = n.copy();
    cut_in_place(&mut proximal, node, Cut::KeepProximal)?;
    Ok((distal, proximal))
}

fn compute_strahler(fg: &FastGraph) -> Vec<i64> {
    let mut si = vec![1i64; fg.len()];
    for &i in fg.topological_order().iter().rev() {
        let children = fg.children(i);
        let Some(max) = children.iter().map(|&c| si[c]).max() else {
            continue;
        };
        let n_max = children.iter().filter(|&&c| si[c] == max).count();
        si[i] = if n_max > 1 { max + 1 } else { max };
    }
    si
}

/// Computes the Strahler index of every node and stores it in the
/// `strahler_index` node column.
pub fn strahler_index(n: &mut TreeNeuron) -> Result<Vec<i64>> {
    let si = compute_strahler(&FastGraph::from_nodes(n.nodes()));
    n.nodes_mut_unchecked()
        .set_extra_column("strahler_index", si.iter().map(|v| (*v).into()).collect())?;
    Ok(si)
}

/// Removes branches of the selected Strahler orders.
pub fn prune_by_strahler(
    n: &mut TreeNeuron,
    to_prune: &StrahlerSelection,
    reroot_soma: bool,
) -> Result<()> {
    if reroot_soma {
        if let Some(&soma) = n.soma().as_deref().and_then(<[i64]>::first) {
            reroot_neuron(n, soma)?;
        }
    }
    let fg = FastGraph::from_nodes(n.nodes());
    let si = compute_strahler(&fg);
    let Some(&max) = si.iter().max() else {
        return Ok(());
    };
    let prune = to_prune.resolve(max);
    let keep: HashSet<i64> = fg
        .ids
        .iter()
        .zip(&si)
        .filter(|(_, s)| !prune.contains(s))
        .map(|(id, _)| *id)
        .collect();
    subset_in_place(n, &keep);
    Ok(())
}

/// Removes terminal twigs shorter than `size`, repeating for up to `rounds`
/// rounds or until nothing changes.
///
/// A twig runs from a leaf up to, but excluding, the next branch point.
pub fn prune_twigs(n: &mut TreeNeuron, size: f64, rounds: usize) -> Result<()> {
    if size.is_nan() || size < 0.0 {
        return Err(Error::Validation(format!(
            "twig size must be non-negative, got {size}"
        )));
    }
    for _ in 0..rounds.max(1) {
        let fg = FastGraph::from_nodes(n.nodes());
        let mut remove: HashSet<i64> = HashSet::new();
        for leaf in (0..fg.len()).filter(|&i| fg.children(i).is_empty() && fg.parent[i].is_some()) {
            let mut twig = vec![leaf];
            let mut length = 0.0;
            let mut current = leaf;
            let mut at_branch = false;
            while let Some(p) = fg.parent[current] {
                length += fg.weight[current];
                if fg.children(p).len() > 1 {
                    at_branch = true;
                    break;
                }
                twig.push(p);
                current = p;
                if twig.len() > fg.len() {
                    break;
                }
            }
            if at_branch && length < size {
                remove.extend(twig.iter().map(|&i| fg.ids[i]));
            }
        }
        if remove.is_empty() {
            break;
        }
        let keep: HashSet<i64> = fg.ids.iter().copied().filter(|id| !remove.contains(id)).collect();
        subset_in_place(n, &keep);
    }
    Ok(())
}

/// Keeps the `count` longest neurites by cable length.
pub fn longest_neurite(n: &mut TreeNeuron, count: usize, reroot_to_soma: bool) -> Result<()> {
    if count == 0 {
        return Err(Error::Validation(
            "number of neurites must be at least 1".to_string(),
        ));
    }
    if reroot_to_soma {
        if let Some(&soma) = n.soma().as_deref().and_then(<[i64]>::first) {
            reroot_neuron(n, soma)?;
        }
    }
    let nodes = n.nodes();
    let rows = nodes.id_index();
    let mut segments: Vec<(f64, Vec<i64>)> = generate_segments(nodes)
        .into_iter()
        .map(|seg| {
            let length = seg
                .windows(2)
                .map(|w| euclidean(nodes.position(rows[&w[0]]), nodes.position(rows[&w[1]])))
                .sum();
            (length, seg)
        })
        .collect();
    if segments.is_empty() {
        return Ok(());
    }
    segments.sort_by(|a, b| b.0.total_cmp(&a.0));
    let keep: HashSet<i64> = segments
        .into_iter()
        .take(count)
        .flat_map(|(_, seg)| seg)
        .collect();
    subset_in_place(n, &keep);
    Ok(())
}

/// Adds the nodes needed to join kept nodes of the same tree.
fn connect_fragments(fg: &FastGraph, kept: &mut [bool]) {
    let order = fg.topological_order();
    let mut count = vec![0usize; fg.len()];
    for &i in order.iter().rev() {
        count[i] += usize::from(kept[i]);
        if let Some(p) = fg.parent[i] {
            count[p] += count[i];
        }
    }
    let mut root = vec![0usize; fg.len()];
    for &i in &order {
        root[i] = fg.parent[i].map_or(i, |p| root[p]);
    }
    for &i in &order {
        if count[i] == 0 {
            continue;
        }
        let branching = fg.children(i).iter().filter(|&&c| count[c] > 0).count() > 1;
        if count[i] < count[root[i]] || branching {
            kept[i] = true;
        }
    }
}

/// Keeps nodes inside (or outside) a volume.
///
/// With `prevent_fragments`, nodes that join the remaining pieces of a tree are
/// kept too.
pub fn in_volume(
    n: &mut TreeNeuron,
    volume: &dyn Volume,
    mode: VolumeMode,
    prevent_fragments: bool,
) -> Result<()> {
    let nodes = n.nodes();
    let points: Vec<[f64; 3]> = (0..nodes.len()).map(|i| nodes.position(i)).collect();
    let mut kept: Vec<bool> = points_in_volume(&points, volume)
        .into_iter()
        .map(|inside| inside == (mode == VolumeMode::Inside))
        .collect();
    let fg = FastGraph::from_nodes(nodes);
    if prevent_fragments {
        connect_fragments(&fg, &mut kept);
    }
    let keep: HashSet<i64> = fg
        .ids
        .iter()
        .zip(&kept)
        .filter(|(_, k)| **k)
        .map(|(id, _)| *id)
        .collect();
    subset_in_place(n, &keep);
    Ok(())
}

/// Geodesic distance of every node to its root, in node table order.
#[must_use]
pub fn dist_to_root(n: &TreeNeuron) -> Vec<f64> {
    n.fast_graph().map_or_else(
        || FastGraph::from_nodes(n.nodes()).dist_to_root(),
        |fg| fg.dist_to_root(),
    )
}

/// Geodesic distance between two nodes; infinite if they are not connected.
pub fn distance_along_tree(n: &TreeNeuron, a: i64, b: i64) -> Result<f64> {
    let nodes = n.nodes();
    let ra = nodes.index_of(a).ok_or(Error::NodeNotFound(a))?;
    let rb = nodes.index_of(b).ok_or(Error::NodeNotFound(b))?;
    let fg = FastGraph::from_nodes(nodes);
    let dist = fg.dist_to_root();
    let ancestors: HashSet<usize> = fg.path_to_root(ra).into_iter().collect();
    Ok(fg
        .path_to_root(rb)
        .into_iter()
        .find(|i| ancestors.contains(i))
        .map_or(f64::INFINITY, |lca| dist[ra] + dist[rb] - 2.0 * dist[lca]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{ConnectorRow, ConnectorTable};
    use approx::assert_relative_eq;

    /// 1 - 2 - 3 - 4 along x with a side branch 2 - 5 - 6 along y.
    fn neuron() -> TreeNeuron {
        TreeNeuron::new(
            NodeTable::from_rows([
                NodeRow::new(1, -1, 0.0, 0.0, 0.0),
                NodeRow::new(2, 1, 1.0, 0.0, 0.0),
                NodeRow::new(3, 2, 2.0, 0.0, 0.0),
                NodeRow::new(4, 3, 3.0, 0.0, 0.0),
                NodeRow::new(5, 2, 1.0, 1.0, 0.0),
                NodeRow::new(6, 5, 1.0, 2.0, 0.0),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_reroot() {
        let mut n = neuron();
        n.reroot(4).unwrap();
        assert_eq!(n.root(), [4]);
        assert_eq!(n.nodes().parent_id, [2, 3, 4, -1, 2, 5]);
        assert_relative_eq!(n.cable_length(), 5.0);
        assert!(matches!(n.reroot(99), Err(Error::NodeNotFound(99))));
    }

    #[test]
    fn test_cut() {
        let n = neuron();
        let (distal, proximal) = cut_neuron(&n, 5).unwrap();
        assert_eq!(distal.nodes().node_id, [5, 6]);
        assert_eq!(distal.root(), [5]);
        assert_eq!(proximal.nodes().node_id, [1, 2, 3, 4, 5]);
        assert_eq!(proximal.n_branches(), 1);
    }

    #[test]
    fn test_cut_rejects_cyclic_parents() {
        let nodes = NodeTable::from_rows([
            NodeRow::new(1, -1, 0.0, 0.0, 0.0),
            NodeRow::new(2, 3, 1.0, 0.0, 0.0),
            NodeRow::new(3, 2, 2.0, 0.0, 0.0),
        ])
        .unwrap();
        let mut n = TreeNeuron::new(nodes);
        assert!(matches!(n.prune_distal_to(&[2]), Err(Error::Validation(_))));
        assert!(matches!(n.prune_proximal_to(&[3]), Err(Error::Validation(_))));
        assert!(matches!(reroot_neuron(&mut n, 2), Err(Error::Validation(_))));
        assert_eq!(n.n_nodes(), 3);
    }

    #[test]
    fn test_strahler() {
        let mut n = neuron();
        let si = strahler_index(&mut n).unwrap();
        assert_eq!(si, [2, 2, 1, 1, 1, 1]);
        assert!(n.nodes().extra_column("strahler_index").is_some());

        n.prune_by_strahler(&StrahlerSelection::Order(1)).unwrap();
        assert_eq!(n.nodes().node_id, [1, 2]);
    }

    #[test]
    fn test_strahler_selection() {
        let all_but_top = StrahlerSelection::Range {
            start: None,
            end: Some(-1),
        };
        assert_eq!(all_but_top.resolve(3), [1, 2].into_iter().collect());
        assert_eq!(StrahlerSelection::Order(-1).resolve(3), [1, 2].into_iter().collect());
        assert_eq!(StrahlerSelection::Orders(vec![-1]).resolve(3), [3].into_iter().collect());
    }

    #[test]
    fn test_prune_twigs() {
        let mut n = neuron();
        n.prune_twigs(1.5, 1).unwrap();
        // Both twigs are 2.0 long.
        assert_eq!(n.n_nodes(), 6);
        n.prune_twigs(2.5, 1).unwrap();
        assert_eq!(n.nodes().node_id, [1, 2]);
    }

    #[test]
    fn test_longest_neurite() {
        let mut n = neuron();
        n.prune_by_longest_neurite(1, false).unwrap();
        assert_eq!(n.nodes().node_id, [1, 2, 3, 4]);
    }

    #[test]
    fn test_downsample_keeps_key_and_connector_nodes() {
        let mut n = neuron().with_connectors(ConnectorTable::from_rows([ConnectorRow {
            connector_id: Some(1),
            node_id: Some(3),
            x: 2.0,
            y: 0.0,
            z: 0.0,
            kind: "pre".into(),
        }]));
        let simple = n.simple();
        assert_eq!(simple.nodes().node_id, [1, 2, 3, 4, 6]);
        assert_eq!(simple.nodes().parent_id, [-1, 1, 2, 3, 2]);

        n.downsample(f64::INFINITY).unwrap();
        assert_eq!(n.n_nodes(), 5);
        assert!(n.downsample(0.5).is_err());
    }

    #[test]
    fn test_resample() {
        let mut n = neuron();
        n.resample(0.5).unwrap();
        assert_relative_eq!(n.cable_length(), 5.0, epsilon = 1e-9);
        assert_eq!(n.n_branches(), 1);
        assert_eq!(n.n_leafs(), 2);
        assert_eq!(n.n_nodes(), 11);
        assert!(n.resample(0.0).is_err());
    }

    #[test]
    fn test_in_volume() {
        let bbox = BoundingBox::new([-0.5, -0.5, -1.0], [2.5, 0.5, 1.0]);
        let mut inside = neuron();
        inside.prune_by_volume(&bbox, VolumeMode::Inside, false).unwrap();
        assert_eq!(inside.nodes().node_id, [1, 2, 3]);

        let mut outside = neuron();
        outside.prune_by_volume(&bbox, VolumeMode::Outside, false).unwrap();
        assert_eq!(outside.nodes().node_id, [4, 5, 6]);
        assert_eq!(outside.n_trees(), 2);

        let mut joined = neuron();
        joined.prune_by_volume(&bbox, VolumeMode::Outside, true).unwrap();
        assert_eq!(joined.nodes().node_id, [2, 3, 4, 5, 6]);
        assert_eq!(joined.n_trees(), 1);
    }

    #[test]
    fn test_distances() {
        let n = neuron();
        let d = dist_to_root(&n);
        assert_relative_eq!(d[5], 3.0);
        assert_relative_eq!(distance_along_tree(&n, 4, 6).unwrap(), 4.0);
        assert!(distance_along_tree(&n, 4, 42).is_err());
    }
}
