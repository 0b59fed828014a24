use thiserror::Error;

/// Errors raised by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("index not loaded: {0}")]
    IndexLoadError(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("incompatible sketch: {0}")]
    IncompatibleSketch(String),

    #[error("incompatible index: {0}")]
    IncompatibleIndex(String),

    #[error("cannot downsample: {0}")]
    CannotDownsample(String),

    #[error("operation requires abundance tracking")]
    AbundanceRequired,

    #[error("operation forbids abundance tracking")]
    AbundanceForbidden,

    #[error("invalid k-mer: {0}")]
    InvalidKmer(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("md5 mismatch: expected {expected}, computed {computed}")]
    Md5Mismatch { expected: String, computed: String },

    #[error("index could not be loaded from any known format")]
    IndexNotLoaded,

    #[error("selection removed all signatures from the index")]
    EmptyIndex,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("ANI estimation error: {message}")]
    ANIEstimationError { message: String },

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    CsvError(#[from] csv::Error),

    #[error(transparent)]
    NifflerError(#[from] niffler::Error),

    #[error(transparent)]
    Utf8Error(#[from] std::str::Utf8Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
