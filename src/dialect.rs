use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const DEFAULT_QUOTE: u8 = b'"';

/// Parser configuration: how a delimited file should be interpreted.
///
/// A `Dialect` is immutable once parsing starts. `delimiter: None` asks the
/// reader to guess the delimiter (and possibly the header row) by probing the
/// first lines of the file; `header: None` means the file has no header row
/// and `column_names` must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialect {
    /// Field separator. `None` requests guessing.
    pub delimiter: Option<u8>,
    /// Quote byte enclosing fields that may contain metacharacters.
    pub quote: u8,
    /// Zero-based index of the header row, or `None` for headerless input.
    pub header: Option<usize>,
    /// Explicit column names. Empty means "take them from the header row".
    pub column_names: Vec<String>,
    /// When true, a malformed row surfaces as an error instead of being
    /// dropped.
    pub strict: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            delimiter: Some(DEFAULT_DELIMITER),
            quote: DEFAULT_QUOTE,
            header: Some(0),
            column_names: Vec::new(),
            strict: false,
        }
    }
}

impl Dialect {
    /// Default dialect with strict row-length enforcement.
    pub fn strict() -> Self {
        Dialect {
            strict: true,
            ..Dialect::default()
        }
    }

    /// Dialect that asks the reader to guess delimiter and header row.
    pub fn guess() -> Self {
        Dialect {
            delimiter: None,
            ..Dialect::default()
        }
    }

    /// Dialect whose delimiter is defaulted from the file extension:
    /// `.tsv` maps to TAB, everything else to comma.
    pub fn for_path(path: &Path) -> Self {
        let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
            _ => DEFAULT_DELIMITER,
        };
        Dialect {
            delimiter: Some(delimiter),
            ..Dialect::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_header(mut self, header: Option<usize>) -> Self {
        self.header = header;
        self
    }

    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// True when the delimiter should be guessed from file content.
    pub fn wants_guess(&self) -> bool {
        self.delimiter.is_none()
    }

    /// Returns the concrete `(delimiter, quote)` pair, verifying the dialect
    /// is usable for parsing.
    pub(crate) fn resolve(&self) -> Result<(u8, u8)> {
        let delimiter = self.delimiter.ok_or_else(|| {
            Error::InvalidDialect("delimiter is unset; run the guesser first".into())
        })?;
        if delimiter == self.quote {
            return Err(Error::InvalidDialect(format!(
                "delimiter and quote are both '{}'",
                printable_byte(delimiter)
            )));
        }
        if self.header.is_none() && self.column_names.is_empty() {
            return Err(Error::InvalidDialect(
                "headerless input requires explicit column names".into(),
            ));
        }
        Ok((delimiter, self.quote))
    }
}

pub(crate) fn printable_byte(byte: u8) -> String {
    match byte {
        b'\t' => "\\t".to_string(),
        b'\r' => "\\r".to_string(),
        b'\n' => "\\n".to_string(),
        other if other.is_ascii_graphic() || other == b' ' => (other as char).to_string(),
        other => format!("0x{other:02x}"),
    }
}
