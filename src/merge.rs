//! # Fragment Merger / Deduplicator
//!
//! Multiple preprocessing variants and page-segmentation modes re-detect the
//! same physical text many times. This stage collapses fragments whose
//! bounding boxes overlap above an IoU threshold into clusters and elects
//! one representative fragment per cluster.
//!
//! Clustering is transitive (if A overlaps B and B overlaps C, all three
//! cluster together) and implemented with a union-find over fragment
//! indices, so the result does not depend on the order fragments arrive in.

use std::collections::HashMap;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fragment::Fragment;

/// A group of fragments judged to describe the same physical text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// The fragment elected to represent the region
    pub representative: Fragment,
    /// Number of fragments merged into this cluster
    pub size: usize,
    /// Number of distinct (engine, variant) sources that contributed.
    /// Carried into the output statistics; does not influence the
    /// representative choice.
    pub corroboration: usize,
}

/// Union-find over fragment indices with path compression and union by rank
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, index: usize) -> usize {
        let mut root = index;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut current = index;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }
}

/// Cluster fragments by bounding-box overlap and elect representatives.
///
/// Fragments with no overlapping neighbor form singleton clusters and pass
/// through unchanged. The returned clusters are sorted by representative
/// position, so the output is identical for any input ordering.
pub fn merge_fragments(fragments: Vec<Fragment>, iou_threshold: f32) -> Vec<Cluster> {
    if fragments.is_empty() {
        return Vec::new();
    }

    let mut set = DisjointSet::new(fragments.len());
    for i in 0..fragments.len() {
        for j in (i + 1)..fragments.len() {
            if fragments[i].bbox.iou(&fragments[j].bbox) > iou_threshold {
                set.union(i, j);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for index in 0..fragments.len() {
        groups.entry(set.find(index)).or_default().push(index);
    }

    let mut clusters: Vec<Cluster> = groups
        .into_values()
        .map(|members| build_cluster(&fragments, &members))
        .collect();

    // Deterministic output order regardless of arrival order
    clusters.sort_by(|a, b| {
        let ka = (a.representative.bbox.quantized(), a.representative.text.as_str());
        let kb = (b.representative.bbox.quantized(), b.representative.text.as_str());
        ka.cmp(&kb)
    });

    debug!(
        fragments = fragments.len(),
        clusters = clusters.len(),
        "Fragment merging completed"
    );
    clusters
}

fn build_cluster(fragments: &[Fragment], members: &[usize]) -> Cluster {
    let representative = members
        .iter()
        .map(|&index| &fragments[index])
        .min_by(|a, b| representative_order(a, b))
        .expect("cluster has at least one member")
        .clone();

    let sources: HashSet<_> = members
        .iter()
        .map(|&index| fragments[index].source.corroboration_key())
        .collect();

    Cluster {
        representative,
        size: members.len(),
        corroboration: sources.len(),
    }
}

/// Total order placing the preferred representative first: highest
/// confidence, then deep-engine provenance, then longer cleaned text. The
/// trailing text/position comparison only exists to keep the choice
/// deterministic for fully tied fragments.
fn representative_order(a: &Fragment, b: &Fragment) -> std::cmp::Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| {
            b.source
                .engine
                .reliability_rank()
                .cmp(&a.source.engine.reliability_rank())
        })
        .then_with(|| b.cleaned_text().len().cmp(&a.cleaned_text().len()))
        .then_with(|| a.text.cmp(&b.text))
        .then_with(|| a.bbox.quantized().cmp(&b.bbox.quantized()))
}
