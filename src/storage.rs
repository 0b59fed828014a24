//! Abstraction over "any place where sketch payloads are stored": a
//! filesystem directory, a ZIP container, or (for tests / programmatic
//! construction) plain memory.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{DirBuilder, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::errors::{Error, Result};
use crate::prelude::ReadData;
use crate::signature::Signature;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path can't be empty")]
    EmptyPathError,

    #[error("path not found: {0}")]
    PathNotFoundError(String),

    #[error("error reading data from {0}")]
    DataReadError(String),
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Error {
        Error::StorageError(e.to_string())
    }
}

/// Anything that can save and load opaque byte blobs by path.
pub trait Storage: Send + Sync {
    fn save(&self, path: &str, content: &[u8]) -> Result<String>;
    fn load(&self, path: &str) -> Result<Vec<u8>>;
    fn args(&self) -> StorageArgs;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorageArgs {
    FSStorage { path: String },
    MemStorage,
    ZipStorage { path: String },
}

#[derive(Clone)]
pub struct InnerStorage(Arc<Mutex<dyn Storage>>);

impl InnerStorage {
    pub fn new(inner: impl Storage + 'static) -> InnerStorage {
        InnerStorage(Arc::new(Mutex::new(inner)))
    }

    /// Load the signature(s) stored at `path` and flatten them into a
    /// single [`Signature`] carrying every sketch found there (the common
    /// case, one sketch per path, returns a one-sketch Signature).
    pub fn load_sig(&self, path: &str) -> Result<Signature> {
        let raw = self.load(path)?;
        let sigs = Signature::from_reader(&raw[..])?;
        let mut iter = sigs.into_iter();
        let mut merged = iter
            .next()
            .ok_or_else(|| Error::DeserializationError(format!("no signatures at {}", path)))?;
        for other in iter {
            merged.signatures.extend(other.signatures);
        }
        Ok(merged)
    }

    pub fn save_sig(&self, path: &str, sig: Signature) -> Result<String> {
        use crate::prelude::ToWriter;
        let mut buf = Vec::new();
        sig.to_writer(&mut buf)?;
        self.save(path, &buf)
    }
}

impl Storage for InnerStorage {
    fn save(&self, path: &str, content: &[u8]) -> Result<String> {
        self.0.lock().unwrap().save(path, content)
    }
    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.0.lock().unwrap().load(path)
    }
    fn args(&self) -> StorageArgs {
        self.0.lock().unwrap().args()
    }
}

/// Store files locally under a directory.
#[derive(TypedBuilder, Debug, Clone, Default)]
pub struct FSStorage {
    fullpath: PathBuf,
    subdir: String,
}

impl FSStorage {
    pub fn new(location: &str, subdir: &str) -> FSStorage {
        let mut fullpath = PathBuf::new();
        fullpath.push(location);
        fullpath.push(subdir);
        FSStorage {
            fullpath,
            subdir: subdir.into(),
        }
    }

    pub fn set_base(&mut self, location: &str) {
        let mut fullpath = PathBuf::new();
        fullpath.push(location);
        fullpath.push(&self.subdir);
        self.fullpath = fullpath;
    }
}

impl Storage for FSStorage {
    fn save(&self, path: &str, content: &[u8]) -> Result<String> {
        if path.is_empty() {
            return Err(StorageError::EmptyPathError.into());
        }
        let fpath = self.fullpath.join(path);
        if let Some(parent) = fpath.parent() {
            DirBuilder::new().recursive(true).create(parent)?;
        }
        let file = File::create(&fpath)?;
        let mut buf_writer = BufWriter::new(file);
        buf_writer.write_all(content)?;
        Ok(path.into())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let path = self.fullpath.join(path);
        let file = File::open(&path)
            .map_err(|_| StorageError::PathNotFoundError(path.to_string_lossy().into_owned()))?;
        let mut buf_reader = BufReader::new(file);
        let mut contents = Vec::new();
        buf_reader.read_to_end(&mut contents)?;
        Ok(contents)
    }

    fn args(&self) -> StorageArgs {
        StorageArgs::FSStorage {
            path: self.subdir.clone(),
        }
    }
}

/// In-memory storage, for programmatically-built collections and tests.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }
}

impl Storage for MemStorage {
    fn save(&self, path: &str, content: &[u8]) -> Result<String> {
        if path.is_empty() {
            return Err(StorageError::EmptyPathError.into());
        }
        self.blobs
            .write()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        Ok(path.into())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::PathNotFoundError(path.into()).into())
    }

    fn args(&self) -> StorageArgs {
        StorageArgs::MemStorage
    }
}

type ZipMetadata<'a> = std::collections::BTreeMap<&'a OsStr, &'a piz::read::FileMetadata<'a>>;

#[ouroboros::self_referencing]
pub struct ZipStorage {
    mapping: Option<memmap2::Mmap>,

    #[borrows(mapping)]
    #[covariant]
    archive: piz::ZipArchive<'this>,

    subdir: Option<String>,
    path: Option<String>,

    #[borrows(archive)]
    #[covariant]
    metadata: ZipMetadata<'this>,
}

fn lookup<'a, P: AsRef<Path>>(
    metadata: &'a ZipMetadata,
    path: P,
) -> Result<&'a piz::read::FileMetadata<'a>> {
    let path = path.as_ref();
    metadata
        .get(&path.as_os_str())
        .copied()
        .ok_or_else(|| StorageError::PathNotFoundError(path.to_string_lossy().into_owned()).into())
}

fn find_subdir(archive: &piz::ZipArchive) -> Option<String> {
    let subdirs: Vec<_> = archive.entries().iter().filter(|e| e.is_dir()).collect();
    if subdirs.len() == 1 {
        subdirs[0].path.to_str().map(|s| s.to_string())
    } else {
        None
    }
}

impl Storage for ZipStorage {
    fn save(&self, _path: &str, _content: &[u8]) -> Result<String> {
        Err(Error::StorageError("ZipStorage is read-only".into()))
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let metadata = self.borrow_metadata();

        let entry = lookup(metadata, path).or_else(|_| {
            if let Some(subdir) = self.borrow_subdir() {
                lookup(metadata, subdir.to_owned() + path)
            } else {
                Err(StorageError::PathNotFoundError(path.into()).into())
            }
        })?;

        let mut reader = BufReader::new(
            self.borrow_archive()
                .read(entry)
                .map_err(|_| StorageError::DataReadError(path.into()))?,
        );
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents)?;
        Ok(contents)
    }

    fn args(&self) -> StorageArgs {
        StorageArgs::ZipStorage {
            path: self.borrow_path().clone().unwrap_or_default(),
        }
    }
}

impl ZipStorage {
    pub fn from_file(location: &str) -> Result<Self> {
        let zip_file = File::open(location)?;
        let mapping = unsafe { memmap2::Mmap::map(&zip_file)? };

        let mut storage = ZipStorageBuilder {
            mapping: Some(mapping),
            archive_builder: |mapping: &Option<memmap2::Mmap>| {
                piz::ZipArchive::new(mapping.as_ref().unwrap()).expect("corrupt zip archive")
            },
            metadata_builder: |archive: &piz::ZipArchive| {
                archive
                    .entries()
                    .iter()
                    .map(|entry| (entry.path.as_os_str(), entry))
                    .collect()
            },
            subdir: None,
            path: Some(location.to_owned()),
        }
        .build();

        let subdir = find_subdir(storage.borrow_archive());
        storage.with_mut(|fields| *fields.subdir = subdir);

        Ok(storage)
    }

    pub fn path(&self) -> Option<String> {
        self.borrow_path().clone()
    }

    pub fn subdir(&self) -> Option<String> {
        self.borrow_subdir().clone()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.borrow_archive()
            .entries()
            .iter()
            .filter_map(|entry| entry.path.to_str().map(String::from))
            .collect()
    }
}

/// Lazily-loaded signature payload, keyed by storage path, used by SBT
/// leaves and [`crate::collection::Collection`] entries.
pub struct SigStore<T = Signature> {
    location: String,
    storage: Option<InnerStorage>,
    data: OnceCell<T>,
}

impl<T> SigStore<T> {
    pub fn new(location: &str, storage: InnerStorage) -> SigStore<T> {
        SigStore {
            location: location.into(),
            storage: Some(storage),
            data: OnceCell::new(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Drop cached payload bytes, forcing a reload on next access.
    pub fn unload(&mut self) {
        self.data = OnceCell::new();
    }
}

impl SigStore<Signature> {
    pub fn preloaded(location: &str, sig: Signature) -> SigStore<Signature> {
        let cell = OnceCell::new();
        let _ = cell.set(sig);
        SigStore {
            location: location.into(),
            storage: None,
            data: cell,
        }
    }
}

impl ReadData<Signature> for SigStore<Signature> {
    fn data(&self) -> Result<&Signature> {
        self.data.get_or_try_init(|| match &self.storage {
            Some(storage) => storage.load_sig(&self.location),
            None => Err(Error::IndexNotLoaded),
        })
    }
}
