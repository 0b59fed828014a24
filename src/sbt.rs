//! Sequence Bloom Tree: a d-ary tree of Bloom filters over leaf signatures,
//! addressed by array position (children of node `i` sit at `i*d+1 ..=
//! i*d+d`), so the whole tree lives in two maps keyed by position rather
//! than a pointer structure. Internal nodes hold the union of every
//! descendant leaf's hashes; a search prunes a subtree as soon as its
//! node's Bloom filter proves too few hashes could match underneath it.

use std::collections::HashMap;

use log::debug;

use crate::collection::CollectionSet;
use crate::errors::{Error, Result};
use crate::index::{downsample_pair, PrefetchResult, SearchResult};
use crate::manifest::Record;
use crate::search::{BestOnlySearch, JaccardSearch, JaccardSearchType, SearchType};
use crate::signature::Signature;
use crate::sketch::nodegraph::Nodegraph;

const DEFAULT_TABLESIZE: usize = 1 << 18;
const DEFAULT_NTABLES: usize = 2;

/// Branching factor and Bloom-filter sizing for a tree; exposed so callers
/// building large trees can trade memory for false-positive rate.
#[derive(Debug, Clone, Copy)]
pub struct SBTParams {
    pub branching: usize,
    pub tablesize: usize,
    pub ntables: usize,
}

impl Default for SBTParams {
    fn default() -> Self {
        SBTParams {
            branching: 2,
            tablesize: DEFAULT_TABLESIZE,
            ntables: DEFAULT_NTABLES,
        }
    }
}

#[derive(Clone)]
pub struct SBT {
    params: SBTParams,
    nodes: HashMap<usize, Nodegraph>,
    leaves: HashMap<usize, (Signature, Record)>,
}

impl SBT {
    pub fn new(params: SBTParams) -> SBT {
        SBT {
            params,
            nodes: HashMap::new(),
            leaves: HashMap::new(),
        }
    }

    /// Build a tree by inserting every signature of `collection` as a leaf,
    /// in manifest order.
    pub fn from_collection(collection: &CollectionSet, params: SBTParams) -> Result<SBT> {
        let mut sbt = SBT::new(params);
        for (i, record) in collection.iter() {
            let sig = collection.sig_for_dataset(i)?;
            sbt.insert(sig, record.clone())?;
        }
        Ok(sbt)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn parent(&self, pos: usize) -> Option<usize> {
        if pos == 0 {
            None
        } else {
            Some((pos - 1) / self.params.branching)
        }
    }

    fn new_node(&self) -> Nodegraph {
        Nodegraph::with_tables(self.params.tablesize, self.params.ntables)
    }

    /// Insert a new leaf. Leaf and internal-node positions share one
    /// position space, so a naive "next free integer" scheme collides an
    /// internal node with a leaf the moment the tree grows past one level.
    /// Instead this mirrors the array layout directly: the candidate
    /// position for a new leaf is one past the highest leaf position seen so
    /// far, and whatever currently occupies that leaf's parent slot decides
    /// how the new leaf is actually placed.
    pub fn insert(&mut self, sig: Signature, record: Record) -> Result<()> {
        let mh = sig
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("signature carries no MinHash sketch".into()))?;
        let hashes = mh.mins();

        if self.leaves.is_empty() {
            self.leaves.insert(0, (sig, record));
            return Ok(());
        }

        let pos = self.leaves.keys().max().copied().unwrap() + 1;
        let parent_pos = self.parent(pos).expect("pos > 0 always has a parent");

        if let Some((old_sig, old_record)) = self.leaves.remove(&parent_pos) {
            // Case 1: the parent slot currently holds a leaf. Interpose a
            // new internal node there and push both the old leaf and the
            // new one down to its children.
            let mut node = self.new_node();
            let old_mh = old_sig
                .minhash()
                .ok_or_else(|| Error::IncompatibleSketch("leaf carries no MinHash sketch".into()))?;
            for h in old_mh.mins() {
                node.count(h);
            }
            for &h in &hashes {
                node.count(h);
            }

            let mut children = self.children(parent_pos);
            let c1 = children.next().unwrap();
            let c2 = children.next().unwrap();
            self.leaves.insert(c1, (old_sig, old_record));
            self.leaves.insert(c2, (sig, record));
            self.nodes.insert(parent_pos, node);
        } else if let Some(node) = self.nodes.get_mut(&parent_pos) {
            // Case 2: the parent is an existing internal node with a free
            // child slot.
            for &h in &hashes {
                node.count(h);
            }
            self.leaves.insert(pos, (sig, record));
        } else {
            // Case 3: the parent slot is entirely empty. Create its
            // internal node and place the new leaf at its first child.
            let mut node = self.new_node();
            for &h in &hashes {
                node.count(h);
            }
            let c_pos = self.children(parent_pos).next().unwrap();
            self.leaves.insert(c_pos, (sig, record));
            self.nodes.insert(parent_pos, node);
        }

        // Propagate the new hashes into every ancestor above `parent_pos`,
        // up to and including the root (whose own update, if any, already
        // happened above).
        let mut cur = parent_pos;
        while let Some(gp) = self.parent(cur) {
            let node = self
                .nodes
                .entry(gp)
                .or_insert_with(|| Nodegraph::with_tables(self.params.tablesize, self.params.ntables));
            for &h in &hashes {
                node.count(h);
            }
            cur = gp;
        }

        Ok(())
    }

    pub fn signatures(&self) -> Result<Vec<Signature>> {
        Ok(self.leaves.values().map(|(sig, _)| sig.clone()).collect())
    }

    fn children(&self, pos: usize) -> impl Iterator<Item = usize> + '_ {
        let base = pos * self.params.branching;
        (1..=self.params.branching).map(move |i| base + i)
    }

    /// Depth-first traversal from the root, pruning any subtree whose
    /// Bloom-filter upper bound on shared hashes can't possibly clear
    /// `min_containment` of the query.
    fn visit_leaves<F: FnMut(&Signature, &Record)>(
        &self,
        pos: usize,
        query_hashes: &[u64],
        query_size: usize,
        min_containment: f64,
        visit: &mut F,
    ) {
        if let Some((sig, record)) = self.leaves.get(&pos) {
            visit(sig, record);
            return;
        }
        let Some(node) = self.nodes.get(&pos) else {
            return;
        };
        if query_size > 0 {
            let upper_bound = node.count_matches(query_hashes) as f64 / query_size as f64;
            if upper_bound < min_containment {
                debug!("sbt: pruning subtree at position {}", pos);
                return;
            }
        }
        for child in self.children(pos) {
            self.visit_leaves(child, query_hashes, query_size, min_containment, visit);
        }
    }

    pub fn find<S: JaccardSearch>(&self, search: &mut S, query: &Signature) -> Result<Vec<SearchResult>> {
        let query_mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;

        // Prune on a lower bound appropriate to containment-style scoring;
        // similarity search still needs every leaf visited since a low
        // Bloom upper bound doesn't bound Jaccard similarity the same way.
        let min_containment = search.threshold().max(0.0);
        let mut matches = Vec::new();
        let mut err: Option<Error> = None;
        self.visit_leaves(0, &query_mh.mins(), query_mh.size(), min_containment, &mut |sig, record| {
            if err.is_some() {
                return;
            }
            match (|| -> Result<()> {
                search.check_is_compatible(query, sig)?;
                let subject_mh = sig.minhash().unwrap();
                let (q, s) = downsample_pair(query_mh, subject_mh)?;
                let score = search.score(&q, &s)?;
                if search.passes(score) {
                    search.collect(score);
                    matches.push(SearchResult::new(score, sig.clone(), record.clone()));
                }
                Ok(())
            })() {
                Ok(()) => {}
                Err(e) => err = Some(e),
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(matches)
    }

    pub fn search(
        &self,
        query: &Signature,
        threshold: f64,
        kind: SearchType,
        best_only: bool,
    ) -> Result<Vec<SearchResult>> {
        let mut matches = if best_only {
            let mut search = BestOnlySearch::new(JaccardSearchType::new(kind, threshold));
            self.find(&mut search, query)?
        } else {
            let mut search = JaccardSearchType::new(kind, threshold);
            self.find(&mut search, query)?
        };
        matches.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap());
        Ok(matches)
    }

    pub fn best_containment(&self, query: &Signature, threshold_bp: u64) -> Result<Option<SearchResult>> {
        let query_mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;
        let scaled = query_mh.scaled().max(1);
        let threshold = (threshold_bp as f64 / scaled as f64) / query_mh.size().max(1) as f64;
        let mut search = BestOnlySearch::new(JaccardSearchType::new(SearchType::Containment, threshold.min(1.0)));
        let mut matches = self.find(&mut search, query)?;
        matches.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap());
        Ok(matches.into_iter().next())
    }

    pub fn prefetch(&self, query: &Signature, threshold_bp: u64) -> Result<Vec<PrefetchResult>> {
        let query_mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;
        let scaled = query_mh.scaled().max(1);
        let min_containment = if query_mh.size() == 0 {
            0.0
        } else {
            (threshold_bp as f64 / scaled as f64) / query_mh.size() as f64
        };
        let mut out = Vec::new();
        let mut err: Option<Error> = None;
        self.visit_leaves(0, &query_mh.mins(), query_mh.size(), min_containment, &mut |sig, record| {
            if err.is_some() {
                return;
            }
            match (|| -> Result<PrefetchResult> {
                let subject_mh = sig
                    .minhash()
                    .ok_or_else(|| Error::IncompatibleSketch("subject carries no MinHash sketch".into()))?;
                let (q, s) = downsample_pair(query_mh, subject_mh)?;
                let shared = q.count_common(&s, false)?;
                let intersect_bp = shared * q.scaled().max(1);
                let f_containment = if q.size() == 0 { 0.0 } else { shared as f64 / q.size() as f64 };
                Ok(PrefetchResult::new(intersect_bp, f_containment, sig.clone(), record.clone()))
            })() {
                Ok(result) => {
                    if result.intersect_bp() >= threshold_bp && result.intersect_bp() / scaled.max(1) >= 5 {
                        out.push(result);
                    }
                }
                Err(e) => err = Some(e),
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collection::Collection;
    use crate::encodings::HashFunctions;
    use crate::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
    use crate::sketch::Sketch;

    fn make_sig(name: &str, hashes: &[u64]) -> Signature {
        let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(10), false);
        mh.add_many(hashes);
        Signature::builder()
            .name(name)
            .signatures(vec![Sketch::MinHash(mh)])
            .build()
    }

    fn make_tree() -> SBT {
        let sigs = vec![
            make_sig("a", &(0..100).collect::<Vec<_>>()),
            make_sig("b", &(50..150).collect::<Vec<_>>()),
            make_sig("c", &(1000..1010).collect::<Vec<_>>()),
        ];
        let collection = Collection::from_sigs(sigs).unwrap();
        let collection_set = collection.try_into().unwrap();
        SBT::from_collection(&collection_set, SBTParams::default()).unwrap()
    }

    #[test]
    fn tree_holds_every_inserted_leaf() {
        let tree = make_tree();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.signatures().unwrap().len(), 3);
    }

    #[test]
    fn pruned_search_matches_linear_search() {
        let tree = make_tree();
        let query = make_sig("q", &(0..100).collect::<Vec<_>>());
        let hits = tree.search(&query, 0.1, SearchType::Containment, false).unwrap();
        let names: Vec<String> = hits.iter().map(|r| r.signature().name()).collect();
        assert!(names.contains(&"a".to_string()));
        assert!(names.contains(&"b".to_string()));
        assert!(!names.contains(&"c".to_string()));
    }

    #[test]
    fn insert_does_not_collide_leaf_and_internal_positions() {
        let tree = make_tree();
        assert_eq!(tree.leaves.len(), 3);
        for pos in tree.leaves.keys() {
            assert!(
                !tree.nodes.contains_key(pos),
                "position {pos} is used by both a leaf and an internal node"
            );
        }
    }

    #[test]
    fn search_results_are_sorted_by_descending_score() {
        let sigs = vec![
            make_sig("low", &(0..10).collect::<Vec<_>>()),
            make_sig("high", &(0..95).collect::<Vec<_>>()),
            make_sig("mid", &(0..50).collect::<Vec<_>>()),
        ];
        let collection = Collection::from_sigs(sigs).unwrap();
        let collection_set = collection.try_into().unwrap();
        let tree = SBT::from_collection(&collection_set, SBTParams::default()).unwrap();
        let query = make_sig("q", &(0..100).collect::<Vec<_>>());

        let results = tree.search(&query, 0.01, SearchType::Containment, false).unwrap();
        assert!(results.len() >= 3);
        let scores: Vec<f64> = results.iter().map(|r| r.score()).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(scores, sorted);
        assert_eq!(results[0].signature().name(), "high");
    }

    #[test]
    fn best_containment_finds_best_match() {
        let tree = make_tree();
        let query = make_sig("q", &(0..100).collect::<Vec<_>>());
        let best = tree.best_containment(&query, 1).unwrap().unwrap();
        assert_eq!(best.signature().name(), "a");
    }
}
