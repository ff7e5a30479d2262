//! Connected-component clustering of canvases linked by point matches.
//!
//! Each pairwise match record is an undirected edge between two canvases;
//! a cluster is a maximal transitively connected set. Clusters partition the
//! matched canvases (mutually disjoint) and are kept sorted largest first.
//! [`CanvasClusters::merge`] fuses clusterings computed independently by
//! separate workers over overlapping shards of the match data.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identity of one rendered canvas: its layer group and tile id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanvasId {
    pub group_id: String,
    pub id: String,
}

impl CanvasId {
    pub fn new(group_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.id)
    }
}

/// Connected canvas clusters, sorted by cluster size (largest to smallest).
///
/// Tie order among equally sized clusters is not guaranteed.
#[derive(Clone, Debug, Default)]
pub struct CanvasClusters {
    clusters: Vec<HashSet<CanvasId>>,
}

impl CanvasClusters {
    /// Builds the connected components of the match graph.
    ///
    /// Traversal is an explicit-stack depth-first walk that consumes nodes
    /// out of the adjacency map as they are visited, so the map shrinks
    /// monotonically and arbitrarily large components cannot overflow the
    /// call stack. O(V + E).
    pub fn from_matches<I>(matches: I) -> Self
    where
        I: IntoIterator<Item = (CanvasId, CanvasId)>,
    {
        let mut adjacency: HashMap<CanvasId, HashSet<CanvasId>> = HashMap::new();
        for (p, q) in matches {
            adjacency.entry(p.clone()).or_default().insert(q.clone());
            adjacency.entry(q).or_default().insert(p);
        }

        let mut clusters = Vec::new();
        while let Some(seed) = adjacency.keys().next().cloned() {
            let mut members = HashSet::new();
            let mut stack = vec![seed];
            while let Some(id) = stack.pop() {
                if members.insert(id.clone()) {
                    if let Some(neighbors) = adjacency.remove(&id) {
                        stack.extend(neighbors);
                    }
                }
            }
            clusters.push(members);
        }

        let mut built = Self { clusters };
        built.sort_by_size();
        built
    }

    /// Fuses this clustering with one computed independently over a possibly
    /// overlapping node set.
    ///
    /// Two clusters are fused whenever they share a node, transitively: after
    /// absorbing an overlapping cluster, the not-yet-checked clusters of
    /// `self` are re-scanned against the absorbed nodes, because a fusion can
    /// create new overlaps. `other` clusters touching nothing are appended
    /// unchanged; emptied clusters are dropped; the result is re-sorted.
    pub fn merge(mut self, other: CanvasClusters) -> CanvasClusters {
        let mut unmerged = other.clusters;

        for index in 0..self.clusters.len() {
            if self.clusters[index].is_empty() {
                continue;
            }
            let mut fused = std::mem::take(&mut self.clusters[index]);

            let mut i = 0;
            while i < unmerged.len() {
                if unmerged[i].iter().any(|id| fused.contains(id)) {
                    let absorbed = unmerged.swap_remove(i);

                    // A fused cluster may now bridge into later clusters of
                    // this clustering; pull those in as well.
                    for later in self.clusters.iter_mut().skip(index + 1) {
                        if !later.is_empty() && absorbed.iter().any(|id| later.contains(id)) {
                            fused.extend(later.drain());
                        }
                    }
                    fused.extend(absorbed);
                    // restart the scan: earlier-skipped clusters may overlap now
                    i = 0;
                } else {
                    i += 1;
                }
            }

            self.clusters[index] = fused;
        }

        self.clusters.retain(|cluster| !cluster.is_empty());
        self.clusters.extend(unmerged);
        self.sort_by_size();
        self
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashSet<CanvasId>> {
        self.clusters.iter()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(HashSet::len).collect()
    }

    /// Layer-group ids per cluster.
    pub fn group_id_sets(&self) -> Vec<HashSet<String>> {
        self.clusters
            .iter()
            .map(|cluster| cluster.iter().map(|id| id.group_id.clone()).collect())
            .collect()
    }

    /// Tile ids per cluster.
    pub fn tile_id_sets(&self) -> Vec<HashSet<String>> {
        self.clusters
            .iter()
            .map(|cluster| cluster.iter().map(|id| id.id.clone()).collect())
            .collect()
    }

    fn sort_by_size(&mut self) {
        self.clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    }
}

impl fmt::Display for CanvasClusters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} clusters with sizes {:?}", self.len(), self.cluster_sizes())
    }
}
