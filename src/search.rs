//! Search predicates shared by [`crate::index::LinearIndex`] and
//! [`crate::sbt::SBT`]: "does this candidate pass", expressed as a trait so
//! both plain threshold search and the best-match-only variant (which
//! tightens its own threshold as better matches are found) share one
//! traversal.

use std::cell::Cell;

use crate::errors::{Error, Result};
use crate::signature::Signature;
use crate::sketch::minhash::KmerMinHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Jaccard,
    Containment,
    MaxContainment,
}

/// A running search: scores a candidate sketch against a query sketch and
/// decides whether it passes the current threshold.
pub trait JaccardSearch {
    fn threshold(&self) -> f64;

    fn score(&self, query: &KmerMinHash, subject: &KmerMinHash) -> Result<f64>;

    fn passes(&self, score: f64) -> bool {
        score >= self.threshold()
    }

    /// Called once per matching candidate; searches that track a running
    /// best score (see [`BestOnlySearch`]) use this to raise their own
    /// threshold.
    fn collect(&mut self, _score: f64) {}

    fn check_is_compatible(&self, _query: &Signature, subject: &Signature) -> Result<()> {
        if subject.minhash().is_none() {
            return Err(Error::IncompatibleSketch(
                "subject signature carries no MinHash sketch".into(),
            ));
        }
        Ok(())
    }
}

/// Plain threshold search over similarity, containment, or max-containment.
pub struct JaccardSearchType {
    kind: SearchType,
    threshold: f64,
}

impl JaccardSearchType {
    pub fn new(kind: SearchType, threshold: f64) -> JaccardSearchType {
        JaccardSearchType { kind, threshold }
    }
}

impl JaccardSearch for JaccardSearchType {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, query: &KmerMinHash, subject: &KmerMinHash) -> Result<f64> {
        match self.kind {
            SearchType::Jaccard => query.similarity(subject, true),
            SearchType::Containment => query.containment(subject),
            SearchType::MaxContainment => query.max_containment(subject),
        }
    }
}

/// Wraps another search, raising its effective threshold to the best score
/// seen so far: used by `best_containment`/`find(..., best_only=true)` to
/// prune the rest of an index once a strong match is on hand.
pub struct BestOnlySearch<S> {
    inner: S,
    best: Cell<f64>,
}

impl<S: JaccardSearch> BestOnlySearch<S> {
    pub fn new(inner: S) -> BestOnlySearch<S> {
        BestOnlySearch {
            inner,
            best: Cell::new(0.0),
        }
    }

    pub fn best_score(&self) -> f64 {
        self.best.get()
    }
}

impl<S: JaccardSearch> JaccardSearch for BestOnlySearch<S> {
    fn threshold(&self) -> f64 {
        self.inner.threshold().max(self.best.get())
    }

    fn score(&self, query: &KmerMinHash, subject: &KmerMinHash) -> Result<f64> {
        self.inner.score(query, subject)
    }

    fn collect(&mut self, score: f64) {
        if score > self.best.get() {
            self.best.set(score);
        }
    }

    fn check_is_compatible(&self, query: &Signature, subject: &Signature) -> Result<()> {
        self.inner.check_is_compatible(query, subject)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encodings::HashFunctions;
    use crate::sketch::minhash::max_hash_for_scaled;

    fn mh(hashes: &[u64]) -> KmerMinHash {
        let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1000), false);
        mh.add_many(hashes);
        mh
    }

    #[test]
    fn containment_search_passes_threshold() {
        let query = mh(&[1, 2, 3, 4]);
        let subject = mh(&[1, 2]);
        let search = JaccardSearchType::new(SearchType::Containment, 0.4);
        let score = search.score(&query, &subject).unwrap();
        assert!(search.passes(score));
    }

    #[test]
    fn best_only_raises_threshold_monotonically() {
        let mut search = BestOnlySearch::new(JaccardSearchType::new(SearchType::Containment, 0.0));
        search.collect(0.3);
        assert_eq!(search.threshold(), 0.3);
        search.collect(0.1);
        assert_eq!(search.threshold(), 0.3);
        search.collect(0.7);
        assert_eq!(search.threshold(), 0.7);
    }
}
