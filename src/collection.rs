//! Collection: a [`Manifest`] paired with the [`InnerStorage`] that holds
//! the sketch payloads it describes.

use std::path::Path;

use crate::errors::{Error, Result};
use crate::manifest::{Manifest, Record};
use crate::prelude::Select;
use crate::selection::Selection;
use crate::signature::Signature;
use crate::storage::{FSStorage, InnerStorage, MemStorage, Storage, StorageArgs, ZipStorage};

/// A manifest plus the storage backing it. Construction never loads sketch
/// payloads; only [`Collection::sig_for_dataset`]/[`Collection::sig_for_record`]
/// touch storage.
#[derive(Clone)]
pub struct Collection {
    manifest: Manifest,
    storage: InnerStorage,
}

impl Collection {
    pub fn new(manifest: Manifest, storage: InnerStorage) -> Collection {
        Collection { manifest, storage }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn storage(&self) -> &InnerStorage {
        &self.storage
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.manifest.iter().enumerate()
    }

    /// Load every record into one in-memory `MemStorage`-backed collection;
    /// used to build a [`Collection`] programmatically from sketches already
    /// held in memory (tests, `compute`-style callers).
    pub fn from_sigs(sigs: Vec<Signature>) -> Result<Collection> {
        let storage = MemStorage::new();
        let mut records = Vec::new();
        for (i, sig) in sigs.into_iter().enumerate() {
            let path = format!("{}.sig", i);
            let mut buf = Vec::new();
            {
                use crate::prelude::ToWriter;
                sig.to_writer(&mut buf)?;
            }
            storage.save(&path, &buf)?;
            records.extend(Record::from_sig(&sig, &path));
        }
        Ok(Collection::new(records.into(), InnerStorage::new(storage)))
    }

    /// Load a collection from a directory of `.sig`/`.sig.gz` files, one
    /// manifest row generated per sketch found.
    pub fn from_paths(location: &str, paths: &[impl AsRef<Path>]) -> Result<Collection> {
        let storage = FSStorage::new(location, "");
        let inner = InnerStorage::new(storage);
        let mut records = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let rel = path
                .strip_prefix(location)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            let sigs = Signature::from_path(path)?;
            for sig in &sigs {
                records.extend(Record::from_sig(sig, &rel));
            }
        }
        Ok(Collection::new(records.into(), inner))
    }

    /// Load a collection from a `sourmash`-style zip, reading its embedded
    /// `SOURMASH-MANIFEST.csv` if present, or else indexing every `.sig`
    /// member found inside the archive.
    pub fn from_zipfile(location: &str) -> Result<Collection> {
        let zip = ZipStorage::from_file(location)?;
        let manifest = if zip.filenames().iter().any(|f| f.ends_with("SOURMASH-MANIFEST.csv")) {
            let manifest_path = zip
                .filenames()
                .into_iter()
                .find(|f| f.ends_with("SOURMASH-MANIFEST.csv"))
                .unwrap();
            let raw = zip.load(&manifest_path)?;
            Manifest::from_reader(&raw[..])?
        } else {
            let mut records = Vec::new();
            for name in zip.filenames() {
                if !name.ends_with(".sig") && !name.ends_with(".sig.gz") {
                    continue;
                }
                let raw = zip.load(&name)?;
                for sig in Signature::from_reader(&raw[..])? {
                    records.extend(Record::from_sig(&sig, &name));
                }
            }
            records.into()
        };
        Ok(Collection::new(manifest, InnerStorage::new(zip)))
    }

    /// Load and return the single sketch described by `record`, downsampling
    /// or selecting amongst several sketches in the same file as needed.
    pub fn sig_for_record(&self, record: &Record) -> Result<Signature> {
        let sig = self.storage.load_sig(record.internal_location().as_str())?;
        if sig.sketches().len() == 1 {
            return Ok(sig);
        }
        let selection = Selection::from_record(record)?;
        sig.select(&selection)
    }

    /// Load the sketch at manifest row `idx`.
    pub fn sig_for_dataset(&self, idx: usize) -> Result<Signature> {
        let record = self
            .manifest
            .get(idx)
            .ok_or_else(|| Error::InvalidArgument(format!("no such dataset: {}", idx)))?;
        self.sig_for_record(record)
    }

    pub fn check_superficial_compatibility(&self, other: &Collection) -> Result<()> {
        let (a, b) = (self.manifest.first(), other.manifest.first());
        match (a, b) {
            (Some(a), Some(b)) => a.check_compatible(b),
            _ => Ok(()),
        }
    }

    pub fn storage_args(&self) -> StorageArgs {
        self.storage.args()
    }
}

impl Select for Collection {
    fn select(mut self, selection: &Selection) -> Result<Self> {
        self.manifest = self.manifest.select(selection)?;
        Ok(self)
    }
}

/// A [`Collection`] known to hold only mutually-compatible sketches (same
/// ksize/moltype/scaled-or-num/abundance), checked once at construction so
/// every later search can skip per-pair compatibility checks.
#[derive(Clone)]
pub struct CollectionSet {
    collection: Collection,
}

impl CollectionSet {
    pub fn manifest(&self) -> &Manifest {
        self.collection.manifest()
    }

    pub fn storage(&self) -> &InnerStorage {
        self.collection.storage()
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.collection.iter()
    }

    pub fn sig_for_dataset(&self, idx: usize) -> Result<Signature> {
        self.collection.sig_for_dataset(idx)
    }

    pub fn into_inner(self) -> Collection {
        self.collection
    }
}

impl TryFrom<Collection> for CollectionSet {
    type Error = Error;

    fn try_from(collection: Collection) -> Result<Self> {
        if collection.is_empty() {
            return Err(Error::EmptyIndex);
        }
        let first = collection.manifest().first().unwrap().clone();
        for record in collection.manifest().iter().skip(1) {
            first.check_compatible(record)?;
        }
        Ok(CollectionSet { collection })
    }
}

impl Select for CollectionSet {
    fn select(self, selection: &Selection) -> Result<Self> {
        let collection = self.collection.select(selection)?;
        CollectionSet::try_from(collection)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encodings::HashFunctions;
    use crate::sketch::minhash::{max_hash_for_scaled, KmerMinHash};
    use crate::sketch::Sketch;

    fn make_sig(name: &str, hashes: &[u64]) -> Signature {
        let mut mh = KmerMinHash::new(0, 21, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1000), false);
        mh.add_many(hashes);
        Signature::builder()
            .name(name)
            .signatures(vec![Sketch::MinHash(mh)])
            .build()
    }

    #[test]
    fn from_sigs_builds_loadable_collection() {
        let sigs = vec![make_sig("a", &[1, 2, 3]), make_sig("b", &[4, 5, 6])];
        let collection = Collection::from_sigs(sigs).unwrap();
        assert_eq!(collection.len(), 2);
        let loaded = collection.sig_for_dataset(0).unwrap();
        assert_eq!(loaded.name(), "a");
        assert_eq!(loaded.minhash().unwrap().size(), 3);
    }

    #[test]
    fn collection_set_rejects_incompatible_sketches() {
        let mut incompatible = KmerMinHash::new(0, 31, HashFunctions::Murmur64Dna, 42, max_hash_for_scaled(1000), false);
        incompatible.add_many(&[1, 2, 3]);
        let sigs = vec![
            make_sig("a", &[1, 2, 3]),
            Signature::builder()
                .name("b")
                .signatures(vec![Sketch::MinHash(incompatible)])
                .build(),
        ];
        let collection = Collection::from_sigs(sigs).unwrap();
        assert!(CollectionSet::try_from(collection).is_err());
    }

    #[test]
    fn select_narrows_manifest() {
        let sigs = vec![make_sig("a", &[1, 2, 3]), make_sig("b", &[4, 5, 6])];
        let collection = Collection::from_sigs(sigs).unwrap();
        let selection = Selection::builder().ksize(21).build();
        let selected = collection.select(&selection).unwrap();
        assert_eq!(selected.len(), 2);
    }
}
