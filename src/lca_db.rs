//! LCA reverse index: a hash-to-lineage inverted index used to assign a
//! taxonomic lineage to a query sketch, mirroring `sourmash lca index`/
//! `lca classify`/`lca summarize`.
//!
//! Unlike the SBT or the linear index, this module never stores sketch
//! payloads -- only the hash-to-signature-index and signature-to-lineage
//! mappings needed to vote on a classification.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::str::FromStr;

use counter::Counter;
use itertools::Itertools;
use log::warn;
use nohash_hasher::BuildNoHashHasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encodings::HashFunctions;
use crate::errors::{Error, Result};
use crate::signature::Signature;

/// A taxonomic assignment keyed by rank name, e.g.
/// `{"superkingdom": "Bacteria", "genus": "Escherichia"}`.
pub type Lineage = BTreeMap<String, String>;

/// Fixed rank order a [`Lineage`] is flattened into. Ranks absent from a
/// given lineage are simply skipped rather than padded.
pub const RANKS: [&str; 8] = [
    "superkingdom",
    "phylum",
    "class",
    "order",
    "family",
    "genus",
    "species",
    "strain",
];

/// `lineage` as the ordered `(rank, name)` pairs actually present, in
/// [`RANKS`] order -- the form classification math is done in, since a
/// straight `BTreeMap` iterates alphabetically rather than by rank depth.
pub fn lineage_to_vec(lineage: &Lineage) -> Vec<(String, String)> {
    RANKS
        .iter()
        .filter_map(|&rank| lineage.get(rank).map(|name| (rank.to_string(), name.clone())))
        .collect()
}

/// Inverse of [`lineage_to_vec`].
pub fn vec_to_lineage(pairs: &[(String, String)]) -> Lineage {
    pairs.iter().cloned().collect()
}

/// `lineage` rendered as a semicolon-joined display string in rank order.
pub fn zip_lineage(lineage: &Lineage) -> String {
    lineage_to_vec(lineage)
        .into_iter()
        .map(|(_, name)| name)
        .collect::<Vec<_>>()
        .join(";")
}

fn common_prefix(a: &[(String, String)], b: &[(String, String)]) -> Vec<(String, String)> {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.clone())
        .collect()
}

/// Outcome of [`LcaDb::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyStatus {
    /// A single lineage accounted for the qualifying hashes unambiguously.
    Found,
    /// Qualifying hashes disagreed; `lineage` is truncated to their common ancestor.
    Disagree,
    /// No query hash had a database match at all.
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct ClassifyResult {
    pub status: ClassifyStatus,
    pub lineage: Lineage,
    pub reason: Option<String>,
}

/// One row of [`LcaDb::summarize`]: the hash count supporting `lineage` as a
/// prefix (not the exact terminal assignment -- every ancestor of a deeper
/// lineage is counted too).
#[derive(Debug, Clone)]
pub struct LineageCount {
    pub lineage: Lineage,
    pub count: usize,
}

/// Inverted index from k-mer hash to the signature indices that contain it,
/// plus the bookkeeping to turn those indices into lineages.
#[derive(Debug, Clone)]
pub struct LcaDb {
    version: String,
    ksize: u32,
    scaled: u64,
    moltype: HashFunctions,
    filename: String,

    next_index: u32,
    next_lid: u32,

    ident_to_name: HashMap<String, String>,
    ident_to_idx: HashMap<String, u32>,
    idx_to_lid: HashMap<u32, u32>,
    lineage_to_lid: HashMap<Lineage, u32>,
    lid_to_lineage: HashMap<u32, Lineage>,
    /// Hash values are already well-distributed 64-bit murmur output, so
    /// rehashing them through SipHash buys nothing; this is the crate's one
    /// hot per-hash lookup, keyed with a pass-through hasher.
    hashval_to_idx: HashMap<u64, Vec<u32>, BuildNoHashHasher<u64>>,
}

impl LcaDb {
    pub fn new(ksize: u32, scaled: u64, moltype: HashFunctions) -> LcaDb {
        LcaDb {
            version: "2.1".into(),
            ksize,
            scaled,
            moltype,
            filename: String::new(),
            next_index: 0,
            next_lid: 0,
            ident_to_name: HashMap::new(),
            ident_to_idx: HashMap::new(),
            idx_to_lid: HashMap::new(),
            lineage_to_lid: HashMap::new(),
            lid_to_lineage: HashMap::new(),
            hashval_to_idx: HashMap::default(),
        }
    }

    pub fn ksize(&self) -> u32 {
        self.ksize
    }

    pub fn scaled(&self) -> u64 {
        self.scaled
    }

    pub fn moltype(&self) -> HashFunctions {
        self.moltype
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn set_filename(&mut self, filename: &str) {
        self.filename = filename.into();
    }

    pub fn len(&self) -> usize {
        self.ident_to_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ident_to_idx.is_empty()
    }

    fn get_ident_index(&mut self, ident: &str) -> u32 {
        if let Some(&idx) = self.ident_to_idx.get(ident) {
            return idx;
        }
        let idx = self.next_index;
        self.next_index += 1;
        self.ident_to_idx.insert(ident.to_string(), idx);
        idx
    }

    fn get_lineage_id(&mut self, lineage: &Lineage) -> u32 {
        if let Some(&lid) = self.lineage_to_lid.get(lineage) {
            return lid;
        }
        let lid = self.next_lid;
        self.next_lid += 1;
        self.lineage_to_lid.insert(lineage.clone(), lid);
        self.lid_to_lineage.insert(lid, lineage.clone());
        lid
    }

    /// Add one signature to the database: downsample it to the database's
    /// `scaled`, assign (or reuse) a lineage id for `lineage`, and record
    /// every one of its hashes against the resulting index. Returns the
    /// number of hashes inserted. A duplicate identifier is skipped with a
    /// warning, matching the build-time behavior of `lca index`.
    pub fn insert(&mut self, sig: &Signature, ident: Option<&str>, lineage: Option<Lineage>) -> Result<u32> {
        let ident = ident.map(|s| s.to_string()).unwrap_or_else(|| sig.name());

        if self.ident_to_name.contains_key(&ident) {
            warn!("duplicate identifier '{}', skipping", ident);
            return Ok(0);
        }

        let mh = sig
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("signature carries no MinHash sketch".into()))?;
        if mh.hash_function() != self.moltype || mh.ksize() != self.ksize {
            return Err(Error::IncompatibleIndex(
                "signature does not match LCA database (ksize, moltype)".into(),
            ));
        }
        let downsampled = mh.downsample_scaled(self.scaled)?;

        self.ident_to_name.insert(ident.clone(), sig.name());
        let idx = self.get_ident_index(&ident);

        if let Some(lineage) = lineage {
            let lid = self.get_lineage_id(&lineage);
            self.idx_to_lid.insert(idx, lid);
        }

        for hash in downsampled.mins() {
            self.hashval_to_idx.entry(hash).or_default().push(idx);
        }

        Ok(downsampled.size() as u32)
    }

    /// Build a database from a taxonomy (identifier -> lineage, typically
    /// loaded from a CSV) and the signatures it should cover. Signatures
    /// whose identifier has no taxonomy entry are still indexed, just
    /// without a lineage assignment.
    pub fn build(
        ksize: u32,
        scaled: u64,
        moltype: HashFunctions,
        signatures: &[Signature],
        taxonomy: &HashMap<String, Lineage>,
    ) -> Result<LcaDb> {
        let mut db = LcaDb::new(ksize, scaled, moltype);
        for sig in signatures {
            let ident = sig.name();
            let lineage = taxonomy.get(&ident).cloned();
            db.insert(sig, Some(&ident), lineage)?;
        }
        Ok(db)
    }

    /// The per-hash LCA: the deepest rank shared by every lineage of an
    /// indexed signature containing `hash`. `None` if the hash isn't in the
    /// database, or if none of its signatures carry a lineage.
    fn hash_lca(&self, hash: u64) -> Option<Vec<(String, String)>> {
        let idxs = self.hashval_to_idx.get(&hash)?;
        let mut lineages = idxs
            .iter()
            .filter_map(|idx| self.idx_to_lid.get(idx))
            .filter_map(|lid| self.lid_to_lineage.get(lid))
            .map(lineage_to_vec)
            .unique();

        let first = lineages.next()?;
        let common = lineages.fold(first, |acc, next| common_prefix(&acc, &next));
        if common.is_empty() {
            None
        } else {
            Some(common)
        }
    }

    /// Downsample `query` to this database's `scaled` and return the
    /// per-hash LCA for every hash that has one.
    fn matching_lcas(&self, query: &Signature) -> Result<Vec<Vec<(String, String)>>> {
        let mh = query
            .minhash()
            .ok_or_else(|| Error::IncompatibleSketch("query carries no MinHash sketch".into()))?;
        let downsampled = mh.downsample_scaled(self.scaled.max(mh.scaled()))?;
        Ok(downsampled
            .mins()
            .into_iter()
            .filter_map(|h| self.hash_lca(h))
            .collect())
    }

    /// Classify `query` against this database. Every per-hash LCA with count
    /// at least `threshold` "qualifies"; if `majority` is set, only the
    /// single most common LCA is considered, and qualifying on its own
    /// yields `Found` directly. Otherwise the final lineage is the common
    /// ancestor of every qualifying LCA, `Found` if they all agree on it
    /// exactly and `Disagree` (with the lineage truncated to that ancestor)
    /// if they don't.
    pub fn classify(&self, query: &Signature, threshold: usize, majority: bool) -> Result<ClassifyResult> {
        let contributions = self.matching_lcas(query)?;
        if contributions.is_empty() {
            return Ok(ClassifyResult {
                status: ClassifyStatus::NoMatch,
                lineage: Lineage::new(),
                reason: Some("no query hash matched the database".into()),
            });
        }

        let counter: Counter<Vec<(String, String)>> = contributions.into_iter().collect();
        let most_common = counter.most_common();

        if majority {
            let (top_lineage, top_count) = &most_common[0];
            if *top_count >= threshold {
                return Ok(ClassifyResult {
                    status: ClassifyStatus::Found,
                    lineage: vec_to_lineage(top_lineage),
                    reason: None,
                });
            }
            return Ok(ClassifyResult {
                status: ClassifyStatus::Disagree,
                lineage: Lineage::new(),
                reason: Some("no lineage reached the majority vote threshold".into()),
            });
        }

        let qualifying: Vec<&Vec<(String, String)>> = most_common
            .iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(lineage, _)| lineage)
            .collect();
        if qualifying.is_empty() {
            return Ok(ClassifyResult {
                status: ClassifyStatus::Disagree,
                lineage: Lineage::new(),
                reason: Some("no lineage reached the count threshold".into()),
            });
        }

        let common = qualifying
            .iter()
            .skip(1)
            .fold(qualifying[0].clone(), |acc, next| common_prefix(&acc, next));
        let unambiguous = qualifying.iter().all(|lineage| lineage.len() == common.len());
        let status = if unambiguous {
            ClassifyStatus::Found
        } else {
            ClassifyStatus::Disagree
        };
        Ok(ClassifyResult {
            status,
            lineage: vec_to_lineage(&common),
            reason: None,
        })
    }

    /// Full lineage-prefix counts for `query`'s matching hashes, instead of
    /// a single verdict: every rank-prefix of every per-hash LCA is counted,
    /// filtered to those reaching `threshold`, most-supported first.
    pub fn summarize(&self, query: &Signature, threshold: usize) -> Result<Vec<LineageCount>> {
        let contributions = self.matching_lcas(query)?;
        let mut prefix_counts: HashMap<Vec<(String, String)>, usize> = HashMap::new();
        for lca in &contributions {
            for depth in 1..=lca.len() {
                *prefix_counts.entry(lca[..depth].to_vec()).or_insert(0) += 1;
            }
        }

        let mut out: Vec<LineageCount> = prefix_counts
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(prefix, count)| LineageCount {
                lineage: vec_to_lineage(&prefix),
                count,
            })
            .collect();
        out.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| zip_lineage(&a.lineage).cmp(&zip_lineage(&b.lineage)))
        });
        Ok(out)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<LcaDb> {
        let (reader, _format) = niffler::get_reader(Box::new(reader))?;
        let db: LcaDb =
            serde_json::from_reader(reader).map_err(|e| Error::DeserializationError(e.to_string()))?;
        Ok(db)
    }
}

/// On-disk shape: `{version, type, ksize, scaled, moltype, lid_to_lineage,
/// hashval_to_idx, ident_to_idx, idx_to_lid}`. `ident_to_name` and the
/// `next_index`/`next_lid` counters are derived on load rather than stored.
#[derive(Serialize, Deserialize)]
struct LcaDbShape {
    version: String,
    #[serde(rename = "type")]
    kind: String,
    ksize: u32,
    scaled: u64,
    moltype: String,
    lid_to_lineage: HashMap<u32, Lineage>,
    hashval_to_idx: HashMap<u64, Vec<u32>, BuildNoHashHasher<u64>>,
    ident_to_idx: HashMap<String, u32>,
    idx_to_lid: HashMap<u32, u32>,
}

impl Serialize for LcaDb {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let shape = LcaDbShape {
            version: self.version.clone(),
            kind: "sourmash_lca".into(),
            ksize: self.ksize,
            scaled: self.scaled,
            moltype: self.moltype.to_string(),
            lid_to_lineage: self.lid_to_lineage.clone(),
            hashval_to_idx: self.hashval_to_idx.clone(),
            ident_to_idx: self.ident_to_idx.clone(),
            idx_to_lid: self.idx_to_lid.clone(),
        };
        shape.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LcaDb {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let shape = LcaDbShape::deserialize(deserializer)?;
        let moltype = HashFunctions::from_str(&shape.moltype).map_err(serde::de::Error::custom)?;
        let next_index = shape.ident_to_idx.values().copied().max().map(|m| m + 1).unwrap_or(0);
        let next_lid = shape.lid_to_lineage.keys().copied().max().map(|m| m + 1).unwrap_or(0);
        let lineage_to_lid = shape
            .lid_to_lineage
            .iter()
            .map(|(lid, lineage)| (lineage.clone(), *lid))
            .collect();

        Ok(LcaDb {
            version: shape.version,
            ksize: shape.ksize,
            scaled: shape.scaled,
            moltype,
            filename: String::new(),
            next_index,
            next_lid,
            ident_to_name: HashMap::new(),
            ident_to_idx: shape.ident_to_idx,
            idx_to_lid: shape.idx_to_lid,
            lineage_to_lid,
            lid_to_lineage: shape.lid_to_lineage,
            hashval_to_idx: shape.hashval_to_idx,
        })
    }
}
