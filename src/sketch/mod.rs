pub mod minhash;
pub mod nodegraph;

use serde::{Deserialize, Serialize};

use crate::encodings::HashFunctions;
use crate::errors::Result;
use minhash::KmerMinHash;

/// Sum type over the sketch implementations this crate supports. Kept as an
/// enum (rather than `dyn Trait`) so serialization can stay untagged and
/// match the on-disk Signature JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Sketch {
    MinHash(KmerMinHash),
}

impl Sketch {
    pub fn ksize(&self) -> u32 {
        match self {
            Sketch::MinHash(mh) => mh.ksize(),
        }
    }

    pub fn hash_function(&self) -> HashFunctions {
        match self {
            Sketch::MinHash(mh) => mh.hash_function(),
        }
    }

    pub fn num(&self) -> u32 {
        match self {
            Sketch::MinHash(mh) => mh.num(),
        }
    }

    pub fn scaled(&self) -> u64 {
        match self {
            Sketch::MinHash(mh) => mh.scaled(),
        }
    }

    pub fn track_abundance(&self) -> bool {
        match self {
            Sketch::MinHash(mh) => mh.track_abundance(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Sketch::MinHash(mh) => mh.size(),
        }
    }

    pub fn md5sum(&self) -> String {
        match self {
            Sketch::MinHash(mh) => mh.md5sum(),
        }
    }

    pub fn as_minhash(&self) -> Option<&KmerMinHash> {
        match self {
            Sketch::MinHash(mh) => Some(mh),
        }
    }

    pub fn as_minhash_mut(&mut self) -> Option<&mut KmerMinHash> {
        match self {
            Sketch::MinHash(mh) => Some(mh),
        }
    }

    pub fn into_minhash(self) -> Option<KmerMinHash> {
        match self {
            Sketch::MinHash(mh) => Some(mh),
        }
    }

    pub fn check_compatible(&self, other: &Sketch) -> Result<()> {
        match (self, other) {
            (Sketch::MinHash(a), Sketch::MinHash(b)) => a.check_compatible(b),
        }
    }
}

impl From<KmerMinHash> for Sketch {
    fn from(mh: KmerMinHash) -> Self {
        Sketch::MinHash(mh)
    }
}
