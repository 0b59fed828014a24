//! Shared trait surface used across signatures, storage, and indexes.

use std::io::Write;

use crate::errors::Result;

pub trait ToWriter {
    fn to_writer<W>(&self, writer: &mut W) -> Result<()>
    where
        W: Write;
}

/// Lazily-loaded payload data, owned by a cache/arena entry.
pub trait ReadData<D> {
    fn data(&self) -> Result<&D>;
}

/// Restrict a collection-like value to the constraints named by a
/// [`crate::selection::Selection`].
pub trait Select {
    fn select(self, selection: &crate::selection::Selection) -> Result<Self>
    where
        Self: Sized;
}

pub use crate::signature::Signature;
pub use crate::storage::Storage;
