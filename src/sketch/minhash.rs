//! Bottom-k / scaled MinHash sketch with optional abundance tracking.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use typed_builder::TypedBuilder;

use crate::ani_utils::{self, AniEstimate};
use crate::encodings::HashFunctions;
use crate::errors::{Error, Result};
use crate::HashIntoType;

/// `max_hash` corresponding to a given `scaled` factor: all hashes strictly
/// below this value are retained. `scaled == 0` means "no scaled sampling".
pub fn max_hash_for_scaled(scaled: u64) -> u64 {
    if scaled == 0 {
        0
    } else {
        (u64::MAX as f64 / scaled as f64) as u64
    }
}

/// Inverse of [`max_hash_for_scaled`].
pub fn scaled_for_max_hash(max_hash: u64) -> u64 {
    if max_hash == 0 {
        0
    } else {
        (u64::MAX as f64 / max_hash as f64) as u64
    }
}

/// A single MinHash sketch: either a bounded bottom-`num` sketch, or an
/// unbounded `scaled` (modulo) sketch. Exactly one of `num`/`scaled` is
/// nonzero, enforced at construction and by every mutating method.
#[derive(Debug, Clone, TypedBuilder)]
pub struct KmerMinHash {
    #[builder(default = 0)]
    num: u32,

    ksize: u32,

    #[builder(default = HashFunctions::Murmur64Dna)]
    hash_function: HashFunctions,

    #[builder(default = 42u64)]
    seed: u64,

    #[builder(default = 0u64)]
    max_hash: u64,

    #[builder(default)]
    mins: BTreeSet<HashIntoType>,

    #[builder(default)]
    abunds: Option<BTreeMap<HashIntoType, u64>>,
}

impl PartialEq for KmerMinHash {
    fn eq(&self, other: &Self) -> bool {
        self.ksize == other.ksize
            && self.num == other.num
            && self.max_hash == other.max_hash
            && self.seed == other.seed
            && self.hash_function == other.hash_function
            && self.mins == other.mins
            && self.abunds == other.abunds
    }
}

impl KmerMinHash {
    pub fn new(
        num: u32,
        ksize: u32,
        hash_function: HashFunctions,
        seed: u64,
        max_hash: u64,
        track_abundance: bool,
    ) -> KmerMinHash {
        KmerMinHash {
            num,
            ksize,
            hash_function,
            seed,
            max_hash,
            mins: Default::default(),
            abunds: if track_abundance {
                Some(Default::default())
            } else {
                None
            },
        }
    }

    pub fn ksize(&self) -> u32 {
        self.ksize
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn scaled(&self) -> u64 {
        scaled_for_max_hash(self.max_hash)
    }

    pub fn max_hash(&self) -> u64 {
        self.max_hash
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn hash_function(&self) -> HashFunctions {
        self.hash_function
    }

    pub fn track_abundance(&self) -> bool {
        self.abunds.is_some()
    }

    pub fn size(&self) -> usize {
        self.mins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mins.is_empty()
    }

    pub fn mins(&self) -> Vec<HashIntoType> {
        self.mins.iter().copied().collect()
    }

    pub fn abunds(&self) -> Option<Vec<u64>> {
        self.abunds
            .as_ref()
            .map(|a| self.mins.iter().map(|h| *a.get(h).unwrap_or(&0)).collect())
    }

    pub fn to_vec_abunds(&self) -> Vec<(HashIntoType, u64)> {
        match &self.abunds {
            Some(a) => self
                .mins
                .iter()
                .map(|h| (*h, *a.get(h).unwrap_or(&1)))
                .collect(),
            None => self.mins.iter().map(|h| (*h, 1)).collect(),
        }
    }

    /// Check that two sketches share the identity parameters required for
    /// any set operation between them.
    pub fn check_compatible(&self, other: &KmerMinHash) -> Result<()> {
        if self.ksize != other.ksize {
            return Err(Error::IncompatibleSketch(format!(
                "ksize mismatch: {} != {}",
                self.ksize, other.ksize
            )));
        }
        if self.hash_function != other.hash_function {
            return Err(Error::IncompatibleSketch(format!(
                "moltype mismatch: {} != {}",
                self.hash_function, other.hash_function
            )));
        }
        if self.seed != other.seed {
            return Err(Error::IncompatibleSketch(format!(
                "seed mismatch: {} != {}",
                self.seed, other.seed
            )));
        }
        if (self.num > 0) != (other.num > 0) {
            return Err(Error::IncompatibleSketch(
                "cannot compare a num sketch with a scaled sketch".into(),
            ));
        }
        Ok(())
    }

    fn evict_if_over_num(&mut self) {
        if self.num == 0 {
            return;
        }
        while self.mins.len() > self.num as usize {
            if let Some(&max) = self.mins.iter().next_back() {
                self.mins.remove(&max);
                if let Some(a) = self.abunds.as_mut() {
                    a.remove(&max);
                }
            } else {
                break;
            }
        }
    }

    /// Insert a single hash, honoring the `num`/`scaled` discipline.
    pub fn add_hash(&mut self, hash: HashIntoType) {
        self.add_hash_with_abundance(hash, 1);
    }

    pub fn add_hash_with_abundance(&mut self, hash: HashIntoType, abundance: u64) {
        if self.max_hash > 0 && hash >= self.max_hash {
            return;
        }
        if self.num > 0
            && self.mins.len() >= self.num as usize
            && !self.mins.contains(&hash)
            && self.mins.iter().next_back().map(|&max| hash >= max).unwrap_or(false)
        {
            // sketch is full and this hash would not make the cut
            return;
        }

        self.mins.insert(hash);
        if let Some(a) = self.abunds.as_mut() {
            if abundance == 0 {
                self.mins.remove(&hash);
                a.remove(&hash);
            } else {
                *a.entry(hash).or_insert(0) += abundance;
            }
        }

        self.evict_if_over_num();
    }

    /// Set (not add to) the abundance of a hash directly.
    pub fn set_hash_with_abundance(&mut self, hash: HashIntoType, abundance: u64) -> Result<()> {
        if self.abunds.is_none() {
            return Err(Error::AbundanceRequired);
        }
        if self.max_hash > 0 && hash >= self.max_hash {
            return Ok(());
        }
        if abundance == 0 {
            self.mins.remove(&hash);
            self.abunds.as_mut().unwrap().remove(&hash);
        } else {
            self.mins.insert(hash);
            self.abunds.as_mut().unwrap().insert(hash, abundance);
        }
        self.evict_if_over_num();
        Ok(())
    }

    pub fn remove_hash(&mut self, hash: HashIntoType) {
        self.mins.remove(&hash);
        if let Some(a) = self.abunds.as_mut() {
            a.remove(&hash);
        }
    }

    pub fn remove_many(&mut self, hashes: &[HashIntoType]) {
        for h in hashes {
            self.remove_hash(*h);
        }
    }

    pub fn add_many(&mut self, hashes: &[HashIntoType]) {
        for h in hashes {
            self.add_hash(*h);
        }
    }

    pub fn add_many_with_abund(&mut self, hashes_and_abunds: &[(HashIntoType, u64)]) {
        for (h, a) in hashes_and_abunds {
            self.add_hash_with_abundance(*h, *a);
        }
    }

    /// Union `other` into `self` in place.
    pub fn merge(&mut self, other: &KmerMinHash) -> Result<()> {
        self.check_compatible(other)?;

        if self.num > 0 && self.num != other.num {
            return Err(Error::IncompatibleSketch(
                "num sketches must have identical num to merge".into(),
            ));
        }
        if self.max_hash > 0 && other.max_hash > 0 && self.max_hash != other.max_hash {
            // merging at differing scaled resolutions: merge at the coarser (larger max_hash wins the
            // intersection, but set union requires matching resolution) -- downsample self to match.
            let coarser = self.max_hash.min(other.max_hash);
            if coarser != self.max_hash {
                *self = self.downsample_max_hash(coarser)?;
            }
        }

        let both_abund = self.track_abundance() && other.track_abundance();
        for h in other.mins.iter() {
            if self.max_hash > 0 && *h >= self.max_hash {
                continue;
            }
            let abund = if both_abund {
                *other.abunds.as_ref().unwrap().get(h).unwrap_or(&1)
            } else {
                1
            };
            self.add_hash_with_abundance(*h, if self.track_abundance() { abund } else { 1 });
        }
        Ok(())
    }

    pub fn add_from(&mut self, other: &KmerMinHash) -> Result<()> {
        self.merge(other)
    }

    /// Count of hashes shared between `self` and `other` (flattened).
    pub fn count_common(&self, other: &KmerMinHash, downsample: bool) -> Result<u64> {
        let (a, b) = self.compatible_pair(other, downsample)?;
        Ok(a.mins.intersection(&b.mins).count() as u64)
    }

    pub fn intersection_size(&self, other: &KmerMinHash) -> Result<u64> {
        self.count_common(other, true)
    }

    pub fn union_size(&self, other: &KmerMinHash) -> Result<u64> {
        let (a, b) = self.compatible_pair(other, true)?;
        Ok(a.mins.union(&b.mins).count() as u64)
    }

    /// Hash-set intersection as a new flattened sketch, at the coarser of
    /// the two resolutions.
    pub fn intersection(&self, other: &KmerMinHash) -> Result<KmerMinHash> {
        let (a, b) = self.compatible_pair(other, true)?;
        let mut out = a.flatten();
        out.mins = a.mins.intersection(&b.mins).copied().collect();
        Ok(out)
    }

    /// Make both sketches directly comparable: same moltype/ksize/seed, and
    /// (for scaled sketches) the coarser of the two max_hash values.
    fn compatible_pair(&self, other: &KmerMinHash, downsample: bool) -> Result<(KmerMinHash, KmerMinHash)> {
        self.check_compatible(other)?;

        if self.num > 0 {
            if self.num != other.num {
                return Err(Error::IncompatibleSketch(
                    "num sketches must share num to compare".into(),
                ));
            }
            return Ok((self.clone(), other.clone()));
        }

        if self.max_hash == other.max_hash {
            return Ok((self.clone(), other.clone()));
        }

        if !downsample {
            return Err(Error::IncompatibleSketch(
                "scaled mismatch; call with downsample to allow auto-downsampling".into(),
            ));
        }

        let coarser = self.max_hash.min(other.max_hash);
        let a = if self.max_hash != coarser {
            self.downsample_max_hash(coarser)?
        } else {
            self.clone()
        };
        let b = if other.max_hash != coarser {
            other.downsample_max_hash(coarser)?
        } else {
            other.clone()
        };
        Ok((a, b))
    }

    fn downsample_max_hash(&self, new_max_hash: u64) -> Result<KmerMinHash> {
        if new_max_hash > self.max_hash && self.max_hash != 0 {
            return Err(Error::CannotDownsample(
                "requested scaled is finer than current resolution".into(),
            ));
        }
        let mut out = self.clone();
        out.max_hash = new_max_hash;
        out.mins.retain(|h| *h < new_max_hash);
        if let Some(a) = out.abunds.as_mut() {
            a.retain(|h, _| *h < new_max_hash);
        }
        Ok(out)
    }

    /// Downsample to a coarser `scaled` (only an *increase* in `scaled` is
    /// permitted).
    pub fn downsample_scaled(&self, scaled: u64) -> Result<KmerMinHash> {
        if self.num > 0 {
            return Err(Error::IncompatibleSketch(
                "cannot downsample a num sketch by scaled".into(),
            ));
        }
        let new_max_hash = max_hash_for_scaled(scaled);
        if self.max_hash != 0 && new_max_hash > self.max_hash {
            return Err(Error::CannotDownsample(format!(
                "cannot increase resolution from scaled={} to scaled={}",
                self.scaled(),
                scaled
            )));
        }
        self.downsample_max_hash(new_max_hash)
    }

    /// Downsample to a smaller `num` (only a *decrease* is permitted).
    pub fn downsample_num(&self, num: u32) -> Result<KmerMinHash> {
        if self.max_hash > 0 {
            return Err(Error::IncompatibleSketch(
                "cannot downsample a scaled sketch by num".into(),
            ));
        }
        if num > self.num {
            return Err(Error::CannotDownsample(format!(
                "cannot increase num from {} to {}",
                self.num, num
            )));
        }
        let mut out = self.clone();
        out.num = num;
        out.evict_if_over_num();
        Ok(out)
    }

    pub fn downsample(&self, num: Option<u32>, scaled: Option<u64>) -> Result<KmerMinHash> {
        match (num, scaled) {
            (Some(n), None) => self.downsample_num(n),
            (None, Some(s)) => self.downsample_scaled(s),
            _ => Err(Error::InvalidArgument(
                "downsample requires exactly one of num/scaled".into(),
            )),
        }
    }

    /// Drop abundance tracking, returning a flat copy.
    pub fn flatten(&self) -> KmerMinHash {
        let mut out = self.clone();
        out.abunds = None;
        out
    }

    // --- similarity estimators -------------------------------------------------

    pub fn jaccard(&self, other: &KmerMinHash) -> Result<f64> {
        let (a, b) = self.compatible_pair(other, true)?;
        let union = a.mins.union(&b.mins).count();
        if union == 0 {
            return Ok(0.0);
        }
        let common = a.mins.intersection(&b.mins).count();
        Ok(common as f64 / union as f64)
    }

    /// `|A ∩ B| / |A|`; `0` if `A` is empty.
    pub fn containment(&self, other: &KmerMinHash) -> Result<f64> {
        let (a, b) = self.compatible_pair(other, true)?;
        if a.mins.is_empty() {
            return Ok(0.0);
        }
        let common = a.mins.intersection(&b.mins).count();
        Ok(common as f64 / a.mins.len() as f64)
    }

    pub fn max_containment(&self, other: &KmerMinHash) -> Result<f64> {
        let (a, b) = self.compatible_pair(other, true)?;
        let denom = a.mins.len().min(b.mins.len());
        if denom == 0 {
            return Ok(0.0);
        }
        let common = a.mins.intersection(&b.mins).count();
        Ok(common as f64 / denom as f64)
    }

    pub fn avg_containment(&self, other: &KmerMinHash) -> Result<f64> {
        Ok((self.containment(other)? + other.containment(self)?) / 2.0)
    }

    /// Containment corrected for scaled-sampling bias (spec §4.2).
    pub fn containment_corrected(&self, other: &KmerMinHash) -> Result<f64> {
        let raw = self.containment(other)?;
        let scaled = self.scaled();
        if scaled == 0 {
            return Ok(raw);
        }
        let n = self.size() as f64;
        let bias = 1.0 - (1.0 - 1.0 / scaled as f64).powf(n * scaled as f64);
        if bias <= 0.0 {
            return Ok(raw.clamp(0.0, 1.0));
        }
        Ok((raw / bias).clamp(0.0, 1.0))
    }

    /// Cosine similarity of abundance vectors over the shared hash union,
    /// mapped onto `[0, 1]` via `1 - arccos(cos)/(pi/2)`. Requires both
    /// sketches to track abundance.
    pub fn angular_similarity(&self, other: &KmerMinHash) -> Result<f64> {
        if !self.track_abundance() || !other.track_abundance() {
            return Err(Error::AbundanceRequired);
        }
        let (a, b) = self.compatible_pair(other, true)?;
        let a_abund = a.abunds.as_ref().unwrap();
        let b_abund = b.abunds.as_ref().unwrap();

        let union: BTreeSet<_> = a.mins.union(&b.mins).copied().collect();
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for h in &union {
            let va = *a_abund.get(h).unwrap_or(&0) as f64;
            let vb = *b_abund.get(h).unwrap_or(&0) as f64;
            dot += va * vb;
            norm_a += va * va;
            norm_b += vb * vb;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }
        let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
        Ok(1.0 - cos.acos() / (std::f64::consts::PI / 2.0))
    }

    /// `similarity` dispatches to angular (if both track abundance) or
    /// Jaccard otherwise, matching the teacher's convenience wrapper.
    pub fn similarity(&self, other: &KmerMinHash, ignore_abundance: bool) -> Result<f64> {
        if !ignore_abundance && self.track_abundance() && other.track_abundance() {
            self.angular_similarity(other)
        } else {
            self.jaccard(other)
        }
    }

    /// Average nucleotide identity estimated from this sketch's containment
    /// in `other`, with a confidence interval and the false-negative and
    /// cardinality-accuracy guard flags (spec §4.2).
    pub fn ani_from_containment(&self, other: &KmerMinHash) -> Result<AniEstimate> {
        let containment = self.containment(other)?;
        let ksize = self.ksize() as f64;
        let scaled = self.scaled().max(1);
        let n_unique_kmers = self.size() as u64;

        let (ani, ci_low, ci_high, prob_nothing_in_common) = ani_utils::ani_from_containment_ci(
            containment,
            ksize,
            scaled,
            n_unique_kmers,
            None,
            None,
        )?;

        Ok(AniEstimate {
            ani,
            ci_low,
            ci_high,
            potential_false_negative: prob_nothing_in_common > ani_utils::DEFAULT_PROB_THRESHOLD,
            size_may_be_inaccurate: !ani_utils::size_is_accurate(self.size(), scaled, 0.95, 0.2),
        })
    }

    /// Average nucleotide identity estimated from the Jaccard similarity of
    /// this sketch and `other` (spec §4.2's Jaccard→ANI inversion). No
    /// closed-form CI exists for this direction, so `ci_low`/`ci_high`
    /// equal the point estimate.
    pub fn ani_from_jaccard(&self, other: &KmerMinHash) -> Result<AniEstimate> {
        let jaccard = self.jaccard(other)?;
        let ksize = self.ksize() as f64;
        let scaled = self.scaled().max(1);
        let ani = ani_utils::ani_from_jaccard(jaccard, ksize);

        let prob_nothing_in_common =
            ani_utils::probability_nothing_common(ani, ksize, 1.0 / scaled as f64, self.size() as f64)?;

        Ok(AniEstimate {
            ani,
            ci_low: ani,
            ci_high: ani,
            potential_false_negative: prob_nothing_in_common > ani_utils::DEFAULT_PROB_THRESHOLD,
            size_may_be_inaccurate: !ani_utils::size_is_accurate(self.size(), scaled, 0.95, 0.2),
        })
    }

    /// Identity hash: `md5(ksize || sorted(hashes))`, independent of
    /// insertion order and abundance.
    pub fn md5sum(&self) -> String {
        let mut ctx = md5::Context::new();
        ctx.consume(self.ksize.to_string());
        for h in &self.mins {
            ctx.consume(h.to_string());
        }
        format!("{:x}", ctx.compute())
    }
}

impl Serialize for KmerMinHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let n_fields = if self.abunds.is_some() { 8 } else { 7 };
        let mut state = serializer.serialize_struct("KmerMinHash", n_fields)?;
        state.serialize_field("num", &self.num)?;
        state.serialize_field("ksize", &self.ksize)?;
        state.serialize_field("seed", &self.seed)?;
        state.serialize_field("max_hash", &self.max_hash)?;
        state.serialize_field("mins", &self.mins())?;
        if let Some(abunds) = self.abunds() {
            state.serialize_field("abundances", &abunds)?;
        }
        state.serialize_field("md5sum", &self.md5sum())?;
        state.serialize_field("molecule", &self.hash_function.to_string())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for KmerMinHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MHVisitor;

        impl<'de> Visitor<'de> for MHVisitor {
            type Value = KmerMinHash;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sourmash minhash sketch object")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut num = 0u32;
                let mut ksize = 0u32;
                let mut seed = 42u64;
                let mut max_hash = 0u64;
                let mut mins: Vec<HashIntoType> = Vec::new();
                let mut abundances: Option<Vec<u64>> = None;
                let mut molecule = "DNA".to_string();
                let mut md5sum: Option<String> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "num" => num = map.next_value()?,
                        "ksize" => ksize = map.next_value()?,
                        "seed" => seed = map.next_value()?,
                        "max_hash" => max_hash = map.next_value()?,
                        "mins" => mins = map.next_value()?,
                        "abundances" => abundances = Some(map.next_value()?),
                        "molecule" => molecule = map.next_value()?,
                        "md5sum" => md5sum = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let hash_function = molecule
                    .parse()
                    .unwrap_or(HashFunctions::Murmur64Dna);

                let mut mh = KmerMinHash::new(
                    num,
                    ksize,
                    hash_function,
                    seed,
                    max_hash,
                    abundances.is_some(),
                );
                match abundances {
                    Some(abunds) => {
                        for (h, a) in mins.into_iter().zip(abunds.into_iter()) {
                            mh.mins.insert(h);
                            mh.abunds.as_mut().unwrap().insert(h, a);
                        }
                    }
                    None => {
                        mh.mins = mins.into_iter().collect();
                    }
                }

                if let Some(expected) = md5sum {
                    let computed = mh.md5sum();
                    if expected != computed {
                        return Err(serde::de::Error::custom(format!(
                            "md5sum mismatch: expected {}, computed {}",
                            expected, computed
                        )));
                    }
                }

                Ok(mh)
            }
        }

        deserializer.deserialize_map(MHVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dna_mh(scaled: u64) -> KmerMinHash {
        KmerMinHash::new(
            0,
            21,
            HashFunctions::Murmur64Dna,
            42,
            max_hash_for_scaled(scaled),
            false,
        )
    }

    #[test]
    fn scaled_rejects_above_max_hash() {
        let mut mh = dna_mh(1000);
        let max_hash = mh.max_hash();
        mh.add_hash(max_hash - 1);
        mh.add_hash(max_hash);
        mh.add_hash(max_hash + 100);
        assert_eq!(mh.size(), 1);
    }

    #[test]
    fn num_sketch_bounded() {
        let mut mh = KmerMinHash::new(10, 21, HashFunctions::Murmur64Dna, 42, 0, false);
        for h in 0..100u64 {
            mh.add_hash(h);
        }
        assert_eq!(mh.size(), 10);
        assert_eq!(mh.mins(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn md5_independent_of_insertion_order() {
        let mut a = dna_mh(1000);
        let mut b = dna_mh(1000);
        for h in [5u64, 1, 3, 2, 4] {
            a.add_hash(h);
        }
        for h in [1u64, 2, 3, 4, 5] {
            b.add_hash(h);
        }
        assert_eq!(a.md5sum(), b.md5sum());
    }

    #[test]
    fn jaccard_self_is_one() {
        let mut a = dna_mh(1000);
        a.add_many(&[1, 2, 3, 4, 5]);
        assert_eq!(a.jaccard(&a).unwrap(), 1.0);
    }

    #[test]
    fn jaccard_symmetric() {
        let mut a = dna_mh(1000);
        a.add_many(&[1, 2, 3, 4]);
        let mut b = dna_mh(1000);
        b.add_many(&[3, 4, 5, 6]);
        assert_eq!(a.jaccard(&b).unwrap(), b.jaccard(&a).unwrap());
        assert_eq!(a.jaccard(&b).unwrap(), 2.0 / 6.0);
    }

    #[test]
    fn containment_bounds_max_containment() {
        let mut a = dna_mh(1000);
        a.add_many(&[1, 2, 3]);
        let mut b = dna_mh(1000);
        b.add_many(&[1, 2, 3, 4, 5, 6]);
        let cab = a.containment(&b).unwrap();
        let cba = b.containment(&a).unwrap();
        let maxc = a.max_containment(&b).unwrap();
        assert!(cab <= maxc + 1e-9);
        assert!(cab.min(cba) <= maxc + 1e-9);
        assert!(maxc <= 1.0);
    }

    #[test]
    fn downsample_scaled_only_coarsens() {
        let mut a = dna_mh(1000);
        a.add_many(&[1, 2, 3]);
        assert!(a.downsample_scaled(500).is_err());
        let coarser = a.downsample_scaled(2000).unwrap();
        assert_eq!(coarser.scaled(), 2000);
    }

    #[test]
    fn downsample_idempotent() {
        let mut a = dna_mh(1000);
        for h in 0..10_000u64 {
            a.add_hash(h);
        }
        let once = a.downsample_scaled(5000).unwrap();
        let twice = once.downsample_scaled(5000).unwrap();
        assert_eq!(once.mins(), twice.mins());
    }

    #[test]
    fn merge_commutative_and_associative() {
        let mut a = dna_mh(1000);
        a.add_many(&[1, 2, 3]);
        let mut b = dna_mh(1000);
        b.add_many(&[3, 4, 5]);
        let mut c = dna_mh(1000);
        c.add_many(&[5, 6, 7]);

        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();
        assert_eq!(ab.mins(), ba.mins());

        let mut ab_c = ab.clone();
        ab_c.merge(&c).unwrap();
        let mut bc = b.clone();
        bc.merge(&c).unwrap();
        let mut a_bc = a.clone();
        a_bc.merge(&bc).unwrap();
        assert_eq!(ab_c.mins(), a_bc.mins());
    }

    #[test]
    fn angular_similarity_requires_abundance() {
        let a = dna_mh(1000);
        let b = dna_mh(1000);
        assert!(a.angular_similarity(&b).is_err());
    }

    #[test]
    fn ani_estimates_agree_on_identical_sketches() {
        let mut a = dna_mh(1000);
        a.add_many(&(0..5000u64).collect::<Vec<_>>());
        let b = a.clone();

        let from_containment = a.ani_from_containment(&b).unwrap();
        assert!((from_containment.ani - 1.0).abs() < 1e-9);
        assert!(!from_containment.potential_false_negative);

        let from_jaccard = a.ani_from_jaccard(&b).unwrap();
        assert!((from_jaccard.ani - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ani_flags_false_negative_risk_on_tiny_sketches() {
        let mut a = dna_mh(1_000_000);
        a.add_many(&[1, 2]);
        let mut b = dna_mh(1_000_000);
        b.add_many(&[3, 4]);

        let estimate = a.ani_from_containment(&b).unwrap();
        assert_eq!(estimate.ani, 0.0);
        assert!(estimate.potential_false_negative);
    }

    #[test]
    fn serde_roundtrip() {
        let mut a = dna_mh(1000);
        a.add_many(&[1, 2, 3, 4, 5]);
        let json = serde_json::to_string(&a).unwrap();
        let b: KmerMinHash = serde_json::from_str(&json).unwrap();
        assert_eq!(a.mins(), b.mins());
        assert_eq!(a.md5sum(), b.md5sum());
    }
}
