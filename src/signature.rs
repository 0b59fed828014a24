//! The named container binding a single sketch to identifying metadata, and
//! the sequence-to-hash streaming machinery shared by every moltype.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encodings::{aa_to_dayhoff, aa_to_hp, is_valid_dna, revcomp, HashFunctions};
use crate::errors::{Error, Result};
use crate::prelude::{Select, ToWriter};
use crate::selection::Selection;
use crate::sketch::minhash::KmerMinHash;
use crate::sketch::Sketch;
use crate::{hash_murmur, HashIntoType};

/// Operations shared by anything that can accept sequence data: a bare
/// [`KmerMinHash`], a [`Sketch`], or (by delegation) a whole [`Signature`].
pub trait SigsTrait {
    fn size(&self) -> usize;
    fn to_vec(&self) -> Vec<HashIntoType>;
    fn ksize(&self) -> usize;
    fn check_compatible(&self, other: &Self) -> Result<()>;
    fn seed(&self) -> u64;
    fn hash_function(&self) -> HashFunctions;
    fn add_hash(&mut self, hash: HashIntoType);

    /// Stream canonical k-mers from `seq` (DNA alphabet) and hash each,
    /// translating to amino acids first if this sketch's moltype requires
    /// it. Non-alphabet characters are an error unless `force` is set, in
    /// which case the offending k-mer window is skipped.
    fn add_sequence(&mut self, seq: &[u8], force: bool) -> Result<()> {
        let hashes = seq_to_hashes(
            seq,
            self.ksize(),
            false,
            self.hash_function(),
            self.seed(),
            force,
        )?;
        for h in hashes {
            self.add_hash(h);
        }
        Ok(())
    }

    /// Stream amino-acid k-mers directly from a protein sequence (no
    /// translation), folding into dayhoff/hp alphabets if required.
    fn add_protein(&mut self, seq: &[u8]) -> Result<()> {
        let hashes = seq_to_hashes(
            seq,
            self.ksize(),
            true,
            self.hash_function(),
            self.seed(),
            true,
        )?;
        for h in hashes {
            self.add_hash(h);
        }
        Ok(())
    }
}

impl SigsTrait for KmerMinHash {
    fn size(&self) -> usize {
        KmerMinHash::size(self)
    }
    fn to_vec(&self) -> Vec<HashIntoType> {
        self.mins()
    }
    fn ksize(&self) -> usize {
        KmerMinHash::ksize(self) as usize
    }
    fn check_compatible(&self, other: &Self) -> Result<()> {
        KmerMinHash::check_compatible(self, other)
    }
    fn seed(&self) -> u64 {
        KmerMinHash::seed(self)
    }
    fn hash_function(&self) -> HashFunctions {
        KmerMinHash::hash_function(self)
    }
    fn add_hash(&mut self, hash: HashIntoType) {
        KmerMinHash::add_hash(self, hash)
    }
}

impl SigsTrait for Sketch {
    fn size(&self) -> usize {
        Sketch::size(self)
    }
    fn to_vec(&self) -> Vec<HashIntoType> {
        match self {
            Sketch::MinHash(mh) => mh.mins(),
        }
    }
    fn ksize(&self) -> usize {
        Sketch::ksize(self) as usize
    }
    fn check_compatible(&self, other: &Self) -> Result<()> {
        Sketch::check_compatible(self, other)
    }
    fn seed(&self) -> u64 {
        match self {
            Sketch::MinHash(mh) => mh.seed(),
        }
    }
    fn hash_function(&self) -> HashFunctions {
        Sketch::hash_function(self)
    }
    fn add_hash(&mut self, hash: HashIntoType) {
        match self {
            Sketch::MinHash(mh) => mh.add_hash(hash),
        }
    }
}

/// Given a raw sequence, produce the stream of hashes this sketch's moltype
/// would retain: canonical DNA k-mers, direct amino-acid k-mers, or (for
/// protein/dayhoff/hp sketches fed DNA) all six translated reading frames.
pub fn seq_to_hashes(
    seq: &[u8],
    ksize: usize,
    input_is_protein: bool,
    hash_function: HashFunctions,
    seed: u64,
    force: bool,
) -> Result<Vec<HashIntoType>> {
    if hash_function.dna() {
        return dna_hashes(seq, ksize, seed, force);
    }

    if input_is_protein {
        return Ok(protein_hashes(seq, ksize / 3, hash_function, seed));
    }

    // protein/dayhoff/hp sketch fed DNA: translate all six frames first.
    let aa_ksize = ksize / 3;
    let mut hashes = Vec::new();
    let rc = revcomp(seq);
    // Ambiguous bases fold to 'X' in `to_aa`/`translate_codon` rather than
    // erroring, so a stray N doesn't drop an entire frame's hashes.
    for frame in 0..3 {
        if seq.len() > frame {
            let aa = crate::encodings::to_aa(&seq[frame..], false, false)?;
            hashes.extend(protein_hashes(&aa, aa_ksize, hash_function, seed));
        }
        if rc.len() > frame {
            let aa = crate::encodings::to_aa(&rc[frame..], false, false)?;
            hashes.extend(protein_hashes(&aa, aa_ksize, hash_function, seed));
        }
    }
    Ok(hashes)
}

fn dna_hashes(seq: &[u8], ksize: usize, seed: u64, force: bool) -> Result<Vec<HashIntoType>> {
    if seq.len() < ksize || ksize == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(seq.len().saturating_sub(ksize) + 1);
    for window in seq.windows(ksize) {
        if !window.iter().all(|&b| is_valid_dna(b)) {
            if force {
                continue;
            }
            return Err(Error::InvalidKmer(
                "non-ACGT character in k-mer window".into(),
            ));
        }
        let rc = revcomp(window);
        let canonical: &[u8] = if rc.as_slice() < window { &rc } else { window };
        out.push(hash_murmur(canonical, seed));
    }
    Ok(out)
}

fn protein_hashes(
    aa: &[u8],
    aa_ksize: usize,
    hash_function: HashFunctions,
    seed: u64,
) -> Vec<HashIntoType> {
    if aa.len() < aa_ksize || aa_ksize == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(aa.len().saturating_sub(aa_ksize) + 1);
    for window in aa.windows(aa_ksize) {
        let folded: Vec<u8> = if hash_function.dayhoff() {
            window.iter().map(|&b| aa_to_dayhoff(b)).collect()
        } else if hash_function.hp() {
            window.iter().map(|&b| aa_to_hp(b)).collect()
        } else {
            window.to_vec()
        };
        out.push(hash_murmur(&folded, seed));
    }
    out
}

/// Named container binding one or more sketches sharing `(name, filename)`
/// to their source metadata. The on-disk JSON shape groups sketches of the
/// same dataset into one record; in memory we mirror that directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default = "default_class")]
    class: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,

    #[serde(rename = "hash_function", default = "default_hash_function")]
    hash_function: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    #[serde(default = "default_license")]
    license: String,

    pub(crate) signatures: Vec<Sketch>,

    #[serde(default = "default_version")]
    version: f64,
}

fn default_class() -> String {
    "sourmash_signature".into()
}
fn default_hash_function() -> String {
    "0.murmur64".into()
}
fn default_license() -> String {
    "CC0".into()
}
fn default_version() -> f64 {
    0.4
}

impl Default for Signature {
    fn default() -> Self {
        Signature {
            class: default_class(),
            email: None,
            hash_function: default_hash_function(),
            filename: None,
            name: None,
            license: default_license(),
            signatures: Vec::new(),
            version: default_version(),
        }
    }
}

impl Signature {
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.filename.clone())
            .unwrap_or_else(|| "".into())
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.into());
    }

    pub fn filename(&self) -> Option<String> {
        self.filename.clone()
    }

    pub fn set_filename(&mut self, filename: &str) {
        self.filename = Some(filename.into());
    }

    pub fn license(&self) -> &str {
        &self.license
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn hash_function(&self) -> &str {
        &self.hash_function
    }

    pub fn size(&self) -> usize {
        self.signatures.len()
    }

    pub fn sketches(&self) -> &[Sketch] {
        &self.signatures
    }

    pub fn reset_sketches(&mut self) {
        self.signatures.clear();
    }

    pub fn push(&mut self, sketch: Sketch) {
        self.signatures.push(sketch);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sketch> {
        self.signatures.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Sketch> {
        self.signatures.iter_mut()
    }

    /// The single sketch of this signature, if it has exactly one.
    pub fn get_sketch(&self) -> Option<&Sketch> {
        if self.signatures.len() == 1 {
            self.signatures.first()
        } else {
            None
        }
    }

    /// Convenience accessor for the common case of a single DNA MinHash
    /// sketch; returns `None` if there isn't exactly one `MinHash` sketch.
    pub fn minhash(&self) -> Option<&KmerMinHash> {
        self.get_sketch().and_then(Sketch::as_minhash)
    }

    /// The md5 of this signature's unique sketch, used as the index's
    /// identity key. If there's more than one sketch, the first is used.
    pub fn md5sum(&self) -> String {
        self.signatures
            .first()
            .map(Sketch::md5sum)
            .unwrap_or_default()
    }

    /// Pick the sketch compatible with `template`'s moltype/ksize, applying
    /// the x3 codon-length adjustment for amino-acid moltypes.
    pub fn select_sketch(&self, template: &Sketch) -> Option<&Sketch> {
        self.signatures.iter().find(|s| {
            s.hash_function() == template.hash_function() && s.ksize() == template.ksize()
        })
    }

    pub fn add_sequence(&mut self, seq: &[u8], force: bool) -> Result<()> {
        for sketch in self.signatures.iter_mut() {
            sketch.add_sequence(seq, force)?;
        }
        Ok(())
    }

    pub fn add_protein(&mut self, seq: &[u8]) -> Result<()> {
        for sketch in self.signatures.iter_mut() {
            sketch.add_protein(seq)?;
        }
        Ok(())
    }

    /// Load one or more signature records from a (possibly gzip-compressed)
    /// JSON document.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Signature>> {
        let (reader, _format) = niffler::get_reader(Box::new(reader))?;
        let sigs: Vec<Signature> = serde_json::from_reader(reader)
            .map_err(|e| Error::DeserializationError(e.to_string()))?;
        Ok(sigs)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Signature>> {
        let file = std::fs::File::open(path)?;
        Signature::from_reader(std::io::BufReader::new(file))
    }

    /// Filter a freshly-loaded list of signatures by ksize/moltype, as the
    /// loader commonly needs to before handing them to an index.
    pub fn load_signatures(
        sigs: Vec<Signature>,
        ksize: Option<u32>,
        moltype: Option<HashFunctions>,
    ) -> Vec<Signature> {
        sigs.into_iter()
            .filter(|sig| {
                sig.signatures.iter().any(|sketch| {
                    ksize.map(|k| sketch.ksize() == k).unwrap_or(true)
                        && moltype
                            .map(|m| sketch.hash_function() == m)
                            .unwrap_or(true)
                })
            })
            .collect()
    }
}

impl ToWriter for Signature {
    fn to_writer<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write,
    {
        serde_json::to_writer(writer, &vec![self])?;
        Ok(())
    }
}

impl Select for Signature {
    fn select(mut self, selection: &Selection) -> Result<Self> {
        self.signatures = self
            .signatures
            .into_iter()
            .filter_map(|sketch| {
                if let Some(ksize) = selection.ksize() {
                    let adjusted = if sketch.hash_function().is_amino_acid() {
                        ksize * 3
                    } else {
                        ksize
                    };
                    if sketch.ksize() != adjusted {
                        return None;
                    }
                }
                if let Some(moltype) = selection.moltype() {
                    if sketch.hash_function() != moltype {
                        return None;
                    }
                }
                if let Some(abund) = selection.abund() {
                    if sketch.track_abundance() != abund {
                        return None;
                    }
                }
                if let Some(scaled) = selection.scaled() {
                    let sketch_scaled = sketch.scaled();
                    if sketch_scaled == 0 || sketch_scaled > scaled as u64 {
                        return None;
                    }
                    if let Sketch::MinHash(mh) = &sketch {
                        if sketch_scaled < scaled as u64 {
                            return mh
                                .downsample_scaled(scaled as u64)
                                .ok()
                                .map(Sketch::MinHash);
                        }
                    }
                }
                if let Some(num) = selection.num() {
                    if sketch.num() != num {
                        return None;
                    }
                }
                Some(sketch)
            })
            .collect();

        if self.signatures.is_empty() {
            return Err(Error::EmptyIndex);
        }
        Ok(self)
    }
}

#[derive(Default)]
pub struct SignatureBuilder {
    name: Option<String>,
    filename: Option<String>,
    hash_function: Option<String>,
    signatures: Vec<Sketch>,
}

impl SignatureBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }
    pub fn hash_function(mut self, hash_function: impl Into<String>) -> Self {
        self.hash_function = Some(hash_function.into());
        self
    }
    pub fn signatures(mut self, signatures: Vec<Sketch>) -> Self {
        self.signatures = signatures;
        self
    }
    pub fn build(self) -> Signature {
        Signature {
            name: self.name,
            filename: self.filename,
            hash_function: self.hash_function.unwrap_or_else(default_hash_function),
            signatures: self.signatures,
            ..Signature::default()
        }
    }
}
