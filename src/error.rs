use std::{io, path::PathBuf};

use thiserror::Error;

use crate::value::DataType;

/// Error type returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot open {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// A row's field count disagreed with the column schema. Only surfaced
    /// in strict mode; lenient parsers route these to the bad-row handler.
    #[error("Row {row_num}: expected {expected} field(s), found {found}")]
    MalformedRow {
        row_num: u64,
        expected: usize,
        found: usize,
    },

    #[error("Cannot convert a {actual} field to {requested}")]
    TypeMismatch {
        requested: &'static str,
        actual: DataType,
    },

    #[error("Value '{value}' overflows {target}")]
    Overflow { value: String, target: &'static str },

    #[error("No delimiter produced any rows for {path:?}")]
    BadDialect { path: PathBuf },

    #[error("Invalid dialect: {0}")]
    InvalidDialect(String),
}

pub type Result<T> = std::result::Result<T, Error>;
