//! Query surface shared by every collection representation: given a query
//! sketch, find matching subjects above a threshold, the single best
//! containing subject, or every subject that shares enough material to be a
//! gather candidate.

use getset::{CopyGetters, Getters};

use crate::collection::CollectionSet;
use crate::errors::{Error, Result};
use crate::manifest::{Manifest, Record};
use crate::prelude::Select;
use crate::sbt::SBT;
use crate::search::{BestOnlySearch, JaccardSearch, JaccardSearchType, SearchType};
use crate::selection::Selection;
use crate::signature::Signature;

/// One subject signature that passed a threshold search, paired with its
/// score and its manifest row (for provenance: filename, md5, ...).
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct SearchResult {
    #[getset(get_copy = "pub")]
    score: f64,
    #[getset(get = "pub")]
    signature: Signature,
    #[getset(get = "pub")]
    record: Record,
}

impl SearchResult {
    pub(crate) fn new(score: f64, signature: Signature, record: Record) -> SearchResult {
        SearchResult { score, signature, record }
    }
}

/// One row of a prefetch/gather candidate pool: a subject that shares at
/// least `threshold_bp` worth of hashes (at the query's scaled resolution)
/// with the query, before any greedy selection has happened.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct PrefetchResult {
    #[getset(get_copy = "pub")]
    intersect_bp: u64,
    #[getset(get_copy = "pub")]
    f_containment: f64,
    #[getset(get = "pub")]
    signature: Signature,
    #[getset(get = "pub")]
    record: Record,
}

impl PrefetchResult {
    pub(crate) fn new(intersect_bp: u64, f_containment: f64, signature: Signature, record: Record) -> PrefetchResult {
        PrefetchResult {
            intersect_bp,
            f_containment,
            signature,
            record,
        }
    }
}

/// One row of a completed gather: the subject selected at this iteration,
/// plus the bookkeeping spec'd for a sourmash-style `gather` report.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct GatherResult {
    #[getset(get_copy = "pub")]
    intersect_bp: u64,
    #[getset(get_copy = "pub")]
    f_orig_query: f64,
    #[getset(get_copy = "pub")]
    f_match: f64,
    #[getset(get_copy = "pub")]
    f_unique_to_query: f64,
    #[getset(get_copy = "pub")]
    f_unique_weighted: f64,
    #[getset(get_copy = "pub")]
    average_abund: f64,
    #[getset(get_copy = "pub")]
    median_abund: f64,
    #[getset(get_copy = "pub")]
    std_abund: f64,
    #[getset(get_copy = "pub")]
    remaining_bp: u64,
    #[getset(get_copy = "pub")]
    rank: usize,
    /// Set when the estimated probability that two genomes at this match's
    /// ANI would share no sampled hashes by chance exceeds the configured
    /// threshold (spec §4.2/§4.7).
    #[getset(get_copy = "pub")]
    potential_false_negative: bool,
    /// Set when the Chernoff-bound cardinality check fails at 95%
    /// confidence within 20% relative error for either sketch involved.
    #[getset(get_copy = "pub")]
    size_may_be_inaccurate: bool,
    #[getset(get = "pub")]
    signature: Signature,
    #[getset(get = "pub")]
    record: Record,
}

#[allow(clippy::too_many_arguments)]
impl GatherResult {
    pub(crate) fn new(
        intersect_bp: u64,
        f_orig_query: f64,
        f_match: f64,
        f_unique_to_query: f64,
        f_unique_weighted: f64,
        average_abund: f64,
        median_abund: f64,
        std_abund: f64,
        remaining_bp: u64,
        rank: usize,
        potential_false_negative: bool,
        size_may_be_inaccurate: bool,
        signature: Signature,
        record: Record,
    ) -> GatherResult {
        GatherResult {
            intersect_bp,
            f_orig_query,
            f_match,
            f_unique_to_query,
            f_unique_weighted,
            average_abund,
            median_abund,
            std_abund,
            remaining_bp,
            rank,
            potential_false_negative,
            size_may_be_inaccurate,
            signature,
            record,
        }
    }
}

/// A flat (unpruned) collection searched by scanning every signature.
/// Backs every non-branching index representation (plain directory,
/// zipfile, in-memory set): the storage polymorphism already lives in
/// [`crate::storage::Storage`], so one implementation covers all three.
#[derive(Clone)]
pub struct LinearIndex {
    collection: CollectionSet,
}

impl LinearIndex {
    pub fn new(collection: CollectionSet) -> LinearIndex {
        LinearIndex { collection }
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn manifest(&self) -> &Manifest {
        self.collection.manifest()
    }

    pub fn signatures(&self) -> Result<Vec<Signature>> {
        (0..self.collection.len())
            .map(|i| self.collection.sig_for_dataset(i))
            .collect()
    }

    pub fn signatures_with_record(&self) -> Result<Vec<(Signature, Record)>> {
        self.collection
            .iter()
            .map(|(i, record)| Ok((self.collection.sig_for_dataset(i)?, record.clone())))
            .collect()
    }

    /// Find every subject passing `search` against `query`'s minhash,
    /// downsampling whichever side has finer resolution so the two are
    /// comparable.
    pub fn find<S: JaccardSearch>(&self, search: &mut S, query: &Signature) -> Result<Vec<SearchResult>> {
        let query_mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;
        let mut matches = Vec::new();
        for (subject, record) in self.signatures_with_record()? {
            search.check_is_compatible(query, &subject)?;
            let subject_mh = subject.minhash().unwrap();
            let (q, s) = downsample_pair(query_mh, subject_mh)?;
            let score = search.score(&q, &s)?;
            if search.passes(score) {
                search.collect(score);
                matches.push(SearchResult::new(score, subject, record));
            }
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
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        Ok(matches)
    }

    /// The single subject with the greatest containment of `query`, or
    /// `None` if nothing clears `threshold_bp` worth of shared hashes.
    pub fn best_containment(&self, query: &Signature, threshold_bp: u64) -> Result<Option<SearchResult>> {
        let query_mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;
        let scaled = query_mh.scaled().max(1);
        let threshold = (threshold_bp as f64 / scaled as f64) / query_mh.size().max(1) as f64;
        let mut search = BestOnlySearch::new(JaccardSearchType::new(SearchType::Containment, threshold.min(1.0)));
        let mut matches = self.find(&mut search, query)?;
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        Ok(matches.into_iter().next())
    }

    /// Every subject sharing at least `threshold_bp` of estimated shared
    /// base pairs with `query`, used as the candidate pool for gather.
    pub fn prefetch(&self, query: &Signature, threshold_bp: u64) -> Result<Vec<PrefetchResult>> {
        let query_mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;
        let mut out = Vec::new();
        for (subject, record) in self.signatures_with_record()? {
            let Some(subject_mh) = subject.minhash() else {
                continue;
            };
            let (q, s) = downsample_pair(query_mh, subject_mh)?;
            let shared = q.count_common(&s, false)?;
            let scaled = q.scaled().max(1);
            let intersect_bp = shared * scaled;
            if intersect_bp < threshold_bp || shared < 5 {
                continue;
            }
            let f_containment = if q.size() == 0 { 0.0 } else { shared as f64 / q.size() as f64 };
            out.push(PrefetchResult::new(intersect_bp, f_containment, subject, record));
        }
        Ok(out)
    }
}

impl Select for LinearIndex {
    fn select(self, selection: &Selection) -> Result<Self> {
        let collection = self.collection.into_inner().select(selection)?;
        Ok(LinearIndex::new(collection.try_into()?))
    }
}

/// Downsample whichever of `a`/`b` has the finer (smaller) scaled value so
/// both sides are comparable at a common resolution.
pub(crate) fn downsample_pair(
    a: &crate::sketch::minhash::KmerMinHash,
    b: &crate::sketch::minhash::KmerMinHash,
) -> Result<(crate::sketch::minhash::KmerMinHash, crate::sketch::minhash::KmerMinHash)> {
    let common_scaled = a.scaled().max(b.scaled());
    Ok((a.downsample_scaled(common_scaled)?, b.downsample_scaled(common_scaled)?))
}

/// Sum type over every index representation a search can run against.
/// Kept flat (rather than `dyn Trait`) so callers can match on concrete
/// capabilities (e.g. SBT pruning stats) without downcasting.
#[derive(Clone)]
pub enum Index {
    Linear(LinearIndex),
    Sbt(SBT),
}

impl Index {
    pub fn len(&self) -> usize {
        match self {
            Index::Linear(idx) => idx.len(),
            Index::Sbt(sbt) => sbt.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signatures(&self) -> Result<Vec<Signature>> {
        match self {
            Index::Linear(idx) => idx.signatures(),
            Index::Sbt(sbt) => sbt.signatures(),
        }
    }

    pub fn find<S: JaccardSearch>(&self, search: &mut S, query: &Signature) -> Result<Vec<SearchResult>> {
        match self {
            Index::Linear(idx) => idx.find(search, query),
            Index::Sbt(sbt) => sbt.find(search, query),
        }
    }

    pub fn search(
        &self,
        query: &Signature,
        threshold: f64,
        kind: SearchType,
        best_only: bool,
    ) -> Result<Vec<SearchResult>> {
        match self {
            Index::Linear(idx) => idx.search(query, threshold, kind, best_only),
            Index::Sbt(sbt) => sbt.search(query, threshold, kind, best_only),
        }
    }

    pub fn best_containment(&self, query: &Signature, threshold_bp: u64) -> Result<Option<SearchResult>> {
        match self {
            Index::Linear(idx) => idx.best_containment(query, threshold_bp),
            Index::Sbt(sbt) => sbt.best_containment(query, threshold_bp),
        }
    }

    pub fn prefetch(&self, query: &Signature, threshold_bp: u64) -> Result<Vec<PrefetchResult>> {
        match self {
            Index::Linear(idx) => idx.prefetch(query, threshold_bp),
            Index::Sbt(sbt) => sbt.prefetch(query, threshold_bp),
        }
    }
}
