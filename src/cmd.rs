//! High-level signature construction from a set of sketching parameters.
//!
//! This mirrors the way `sourmash compute` turns a handful of CLI flags into
//! a batch of empty sketches ready to receive sequence: one [`Signature`]
//! gets a [`Sketch`] per `(ksize, moltype)` combination actually requested,
//! and callers stream sequence through [`Signature::add_sequence`]/
//! [`Signature::add_protein`] afterward.

use getset::{CopyGetters, Getters, Setters};
use typed_builder::TypedBuilder;

use crate::encodings::HashFunctions;
use crate::signature::Signature;
use crate::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
use crate::sketch::Sketch;

impl Signature {
    /// Build a new [`Signature`] from a set of [`ComputeParameters`], with
    /// one empty sketch per ksize/moltype combination the parameters enable.
    pub fn from_params(params: &ComputeParameters) -> Signature {
        let template = build_template(params);

        Signature::builder()
            .hash_function("0.murmur64")
            .name(params.merge.clone().unwrap_or_default())
            .filename(None)
            .signatures(template)
            .build()
    }
}

/// Parameters used to construct a batch of empty sketches, one per
/// `(ksize, moltype)` combination actually requested.
///
/// ## Combinational
///
/// - ksizes
/// - dna
/// - dayhoff
/// - hp
/// - protein
///
/// ## Exclusive
///
/// - scaled
/// - num_hashes
/// - singleton
/// - name_from_first
/// - seed
/// - input_is_protein
/// - track_abundance
/// - merge
/// - license
///
/// ## Behavior when adding sequences
///
/// - check_sequence
/// - force
#[derive(TypedBuilder, CopyGetters, Getters, Setters)]
pub struct ComputeParameters {
    /// List of k-mer sizes to generate.
    #[getset(get = "pub", set = "pub")]
    #[builder(default = vec![21, 31, 51])]
    ksizes: Vec<u32>,

    /// Complain if input sequence is invalid, rather than skipping the
    /// offending k-mer window.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    check_sequence: bool,

    /// Build nucleotide sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = true)]
    dna: bool,

    /// Build Dayhoff-encoded amino acid sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    dayhoff: bool,

    /// Build hydrophobic-polar-encoded amino acid sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    hp: bool,

    /// Compute a sketch for each sequence record individually, instead of
    /// merging every record in a file into one sketch.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    singleton: bool,

    /// Keep hashes below `u64::MAX / scaled`; 0 disables scaled sampling
    /// (bottom-`num_hashes` sketch instead).
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = 0u64)]
    scaled: u64,

    /// Number of hashes to keep in a bottom-`num` sketch (ignored when
    /// `scaled` is nonzero).
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = 500u32)]
    num_hashes: u32,

    /// Build a protein signature from translated DNA or, with
    /// `input_is_protein`, directly from an amino acid sequence.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    protein: bool,

    /// Name the signature using the name of the first sequence record.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    name_from_first: bool,

    /// Seed used by MurmurHash.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = 42u64)]
    seed: u64,

    /// Consume protein sequences directly -- no six-frame translation.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    input_is_protein: bool,

    /// Merge all input records into one signature with this name.
    #[getset(get = "pub", set = "pub")]
    #[builder(default)]
    merge: Option<String>,

    /// Track k-mer abundances in the generated sketches.
    #[getset(get_copy = "pub", set = "pub")]
    #[builder(default = false)]
    track_abundance: bool,

    /// Signature license. Currently only CC0 is supported.
    #[getset(get = "pub", set = "pub")]
    #[builder(default = "CC0".into())]
    license: String,
}

impl Default for ComputeParameters {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Build one empty [`Sketch`] per ksize times every moltype `params` enables.
pub fn build_template(params: &ComputeParameters) -> Vec<Sketch> {
    let max_hash = max_hash_for_scaled(params.scaled);

    params
        .ksizes
        .iter()
        .flat_map(|k| {
            let mut ksigs = vec![];

            if params.protein {
                ksigs.push(Sketch::MinHash(KmerMinHash::new(
                    params.num_hashes,
                    *k,
                    HashFunctions::Murmur64Protein,
                    params.seed,
                    max_hash,
                    params.track_abundance,
                )));
            }

            if params.dayhoff {
                ksigs.push(Sketch::MinHash(KmerMinHash::new(
                    params.num_hashes,
                    *k,
                    HashFunctions::Murmur64Dayhoff,
                    params.seed,
                    max_hash,
                    params.track_abundance,
                )));
            }

            if params.hp {
                ksigs.push(Sketch::MinHash(KmerMinHash::new(
                    params.num_hashes,
                    *k,
                    HashFunctions::Murmur64Hp,
                    params.seed,
                    max_hash,
                    params.track_abundance,
                )));
            }

            if params.dna {
                ksigs.push(Sketch::MinHash(KmerMinHash::new(
                    params.num_hashes,
                    *k,
                    HashFunctions::Murmur64Dna,
                    params.seed,
                    max_hash,
                    params.track_abundance,
                )));
            }

            ksigs
        })
        .collect()
}
