//! Overlap clustering of alignments
//!
//! Two stages:
//! 1. Piling: segments tagged with their accession are swept in order of left
//!    coordinate. A segment starting at or before the furthest right end seen
//!    so far in the current pile joins it; otherwise it opens a new pile.
//! 2. Single linkage: consecutive accessions of each pile form pairs, and the
//!    transitive closure of those pairs gives the clusters. A multi-exon
//!    record appearing in several piles therefore bridges them.
//!
//! The clusterer works on records directly and is independent of validation.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::{AlignmentRecord, GenomicPos};

/// A genomic interval labelled with the accession it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedInterval {
    pub accession: String,
    pub left: GenomicPos,
    pub right: GenomicPos,
}

impl TaggedInterval {
    pub fn new<S: Into<String>>(accession: S, left: GenomicPos, right: GenomicPos) -> Self {
        Self {
            accession: accession.into(),
            left,
            right,
        }
    }
}

/// Accessions transitively connected by overlap on one scaffold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub scaffold: String,
    pub accessions: Vec<String>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.accessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessions.is_empty()
    }

    pub fn contains(&self, accession: &str) -> bool {
        self.accessions.iter().any(|a| a == accession)
    }
}

/// Disjoint-set forest with path halving and union by rank
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Group overlapping intervals into piles.
///
/// Each pile lists its accessions once, in the order they are met by the
/// sweep. Piles are returned in order of their leftmost interval.
pub fn pile(intervals: &[TaggedInterval]) -> Vec<Vec<String>> {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    order.sort_by_key(|&i| (intervals[i].left, intervals[i].right));

    let mut piles: Vec<Vec<String>> = Vec::new();
    let mut members: HashSet<&str> = HashSet::new();
    let mut max_right: Option<GenomicPos> = None;

    for &idx in &order {
        let interval = &intervals[idx];
        match max_right {
            Some(right) if interval.left <= right => {
                max_right = Some(right.max(interval.right));
            }
            _ => {
                piles.push(Vec::new());
                members.clear();
                max_right = Some(interval.right);
            }
        }
        if members.insert(interval.accession.as_str()) {
            if let Some(current) = piles.last_mut() {
                current.push(interval.accession.clone());
            }
        }
    }
    piles
}

/// Consecutive accession pairs of every pile
pub fn pile_pairs(piles: &[Vec<String>]) -> Vec<(String, String)> {
    piles
        .iter()
        .flat_map(|pile| pile.windows(2).map(|w| (w[0].clone(), w[1].clone())))
        .collect()
}

/// Transitive closure of `pairs` over `nodes`.
///
/// Nodes without any pair come back as singleton clusters. Accessions named
/// only in `pairs` are added after `nodes`. Clusters are ordered by their
/// first member, members by node order.
pub fn single_linkage(nodes: &[String], pairs: &[(String, String)]) -> Vec<Vec<String>> {
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut names: Vec<&str> = Vec::new();
    let all_names = nodes
        .iter()
        .map(String::as_str)
        .chain(pairs.iter().flat_map(|(a, b)| [a.as_str(), b.as_str()]));
    for name in all_names {
        ids.entry(name).or_insert_with(|| {
            names.push(name);
            names.len() - 1
        });
    }

    let mut sets = UnionFind::new(names.len());
    for (a, b) in pairs {
        sets.union(ids[a.as_str()], ids[b.as_str()]);
    }

    let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
    let mut clusters: Vec<Vec<String>> = Vec::new();
    for (id, name) in names.iter().enumerate() {
        let root = sets.find(id);
        let cluster_id = *cluster_of_root.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[cluster_id].push(name.to_string());
    }
    clusters
}

/// Cluster records that all lie on `scaffold`
pub fn cluster_scaffold(scaffold: &str, records: &[&AlignmentRecord]) -> Vec<Cluster> {
    let intervals: Vec<TaggedInterval> = records
        .iter()
        .flat_map(|record| {
            record
                .segments()
                .iter()
                .map(|s| TaggedInterval::new(record.accession.as_str(), s.left(), s.right()))
        })
        .collect();

    let piles = pile(&intervals);
    let pairs = pile_pairs(&piles);
    let nodes: Vec<String> = records.iter().map(|r| r.accession.clone()).collect();

    log::trace!(
        "{}: {} segments in {} piles, {} links",
        scaffold,
        intervals.len(),
        piles.len(),
        pairs.len()
    );

    single_linkage(&nodes, &pairs)
        .into_iter()
        .map(|accessions| Cluster {
            scaffold: scaffold.to_string(),
            accessions,
        })
        .collect()
}

/// Cluster records of every scaffold in parallel.
///
/// Scaffolds are reported in name order. Records on different scaffolds
/// never share a cluster.
pub fn cluster_by_scaffold(records: &[AlignmentRecord]) -> Vec<Cluster> {
    let mut by_scaffold: BTreeMap<&str, Vec<&AlignmentRecord>> = BTreeMap::new();
    for record in records {
        by_scaffold.entry(record.scaffold.as_str()).or_default().push(record);
    }

    let clusters: Vec<Cluster> = by_scaffold
        .into_par_iter()
        .map(|(scaffold, group)| cluster_scaffold(scaffold, &group))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    log::debug!("Clustered {} alignments into {} clusters", records.len(), clusters.len());
    clusters
}
