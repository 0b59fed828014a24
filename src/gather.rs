//! Iterative greedy min-set-cover over a query's hashes: at each round, pick
//! the remaining candidate explaining the most still-unexplained query
//! material, subtract its hashes from the query, and repeat until nothing
//! clears `threshold_bp`.

use std::collections::HashSet;

use crate::ani_utils;
use crate::errors::{Error, Result};
use crate::index::{GatherResult, Index, PrefetchResult};
use crate::signature::Signature;
use crate::sketch::minhash::KmerMinHash;

/// Bookkeeping for one gather run: the original query's abundance-weighted
/// total, the still-unexplained remainder, and the prefetch candidate pool
/// still in play.
pub struct CounterGather {
    orig_query: KmerMinHash,
    remaining: KmerMinHash,
    orig_query_weighted_total: f64,
    candidates: Vec<PrefetchResult>,
    union_found: HashSet<u64>,
}

impl CounterGather {
    pub fn new(query: &KmerMinHash, candidates: Vec<PrefetchResult>) -> CounterGather {
        let orig_query_weighted_total = query
            .abunds()
            .map(|a| a.iter().sum::<u64>() as f64)
            .unwrap_or(query.size() as f64);
        CounterGather {
            orig_query: query.clone(),
            remaining: query.clone(),
            orig_query_weighted_total,
            candidates,
            union_found: HashSet::new(),
        }
    }

    pub fn remaining_size(&self) -> usize {
        self.remaining.size()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The candidate with the greatest remaining intersection, without
    /// removing it from the pool. Ties are broken by reference md5
    /// ascending, so the winner is deterministic regardless of prefetch
    /// order.
    pub fn peek(&self) -> Result<Option<(usize, u64)>> {
        let mut best: Option<(usize, u64, String)> = None;
        for (i, candidate) in self.candidates.iter().enumerate() {
            let subject_mh = candidate
                .signature()
                .minhash()
                .ok_or_else(|| Error::IncompatibleSketch("candidate carries no MinHash sketch".into()))?;
            let common_scaled = self.remaining.scaled().max(subject_mh.scaled());
            let remaining_ds = self.remaining.downsample_scaled(common_scaled)?;
            let subject_ds = subject_mh.downsample_scaled(common_scaled)?;
            let shared = remaining_ds.count_common(&subject_ds, false)?;
            if shared == 0 {
                continue;
            }
            let md5 = subject_ds.md5sum();
            let is_better = match &best {
                None => true,
                Some((_, best_shared, best_md5)) => {
                    shared > *best_shared || (shared == *best_shared && md5 < *best_md5)
                }
            };
            if is_better {
                best = Some((i, shared, md5));
            }
        }
        Ok(best.map(|(i, shared, _)| (i, shared)))
    }

    /// Remove the candidate at `idx`, subtract its hashes from the
    /// remaining query, and return the completed [`GatherResult`] row.
    pub fn consume(&mut self, idx: usize, threshold_bp: u64, rank: usize) -> Result<Option<GatherResult>> {
        let candidate = self.candidates.remove(idx);
        let subject_mh = candidate
            .signature()
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("candidate carries no MinHash sketch".into()))?;
        let common_scaled = self.remaining.scaled().max(subject_mh.scaled());
        let remaining_ds = self.remaining.downsample_scaled(common_scaled)?;
        let subject_ds = subject_mh.downsample_scaled(common_scaled)?;

        let shared_hashes: Vec<u64> = remaining_ds
            .mins()
            .into_iter()
            .filter(|h| subject_ds.mins().contains(h))
            .collect();

        let scaled = remaining_ds.scaled().max(1);
        let intersect_bp = shared_hashes.len() as u64 * scaled;
        if intersect_bp < threshold_bp || shared_hashes.len() < 5 {
            return Ok(None);
        }

        let orig_query_ds = self.orig_query.downsample_scaled(common_scaled)?;
        let orig_shared = orig_query_ds.count_common(&subject_ds, false)?;
        let f_orig_query = if orig_query_ds.size() == 0 {
            0.0
        } else {
            orig_shared as f64 / orig_query_ds.size() as f64
        };
        let f_match = if subject_ds.size() == 0 {
            0.0
        } else {
            shared_hashes.len() as f64 / subject_ds.size() as f64
        };
        let f_unique_to_query = if self.orig_query.size() == 0 {
            0.0
        } else {
            shared_hashes.len() as f64 / self.orig_query.size() as f64
        };

        let abunds: Vec<f64> = match self.remaining.abunds() {
            Some(abund_map) => {
                let lookup: std::collections::HashMap<u64, u64> =
                    self.remaining.mins().into_iter().zip(abund_map).collect();
                shared_hashes.iter().filter_map(|h| lookup.get(h).map(|a| *a as f64)).collect()
            }
            None => vec![1.0; shared_hashes.len()],
        };
        let (average_abund, median_abund, std_abund) = abundance_stats(&abunds);
        let f_unique_weighted = if self.orig_query_weighted_total == 0.0 {
            0.0
        } else {
            abunds.iter().sum::<f64>() / self.orig_query_weighted_total
        };

        let ani_estimate = remaining_ds.ani_from_containment(&subject_ds)?;
        let potential_false_negative = ani_estimate.potential_false_negative;
        let size_may_be_inaccurate =
            ani_estimate.size_may_be_inaccurate || !ani_utils::size_is_accurate(subject_ds.size(), scaled, 0.95, 0.2);

        for h in &shared_hashes {
            self.union_found.insert(*h);
            self.remaining.remove_hash(*h);
        }

        let remaining_bp = self.remaining.size() as u64 * scaled;

        Ok(Some(GatherResult::new(
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
            candidate.signature().clone(),
            candidate.record().clone(),
        )))
    }
}

fn abundance_stats(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = if sorted.len() % 2 == 0 {
        (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    };
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, median, variance.sqrt())
}

/// Run a full gather against `index`: repeatedly peel off the candidate
/// explaining the most remaining query material until none clears
/// `threshold_bp`, or fewer than 5 hashes would be shared.
pub fn gather(index: &Index, query: &Signature, threshold_bp: u64) -> Result<Vec<GatherResult>> {
    let query_mh = query
        .minhash()
        .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;

    let candidates = index.prefetch(query, threshold_bp)?;
    let mut counter = CounterGather::new(query_mh, candidates);

    let mut results = Vec::new();
    let mut rank = 0;
    while let Some((idx, _)) = counter.peek()? {
        match counter.consume(idx, threshold_bp, rank)? {
            Some(result) => {
                results.push(result);
                rank += 1;
            }
            None => break,
        }
    }
    Ok(results)
}
