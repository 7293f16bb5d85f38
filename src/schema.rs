use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered column names plus an optional projection onto a subset of them.
///
/// A schema is set exactly once per parse, either from explicit configuration
/// or from the header row, and is shared read-only by every emitted row
/// (rows hold an `Arc<Schema>`). When a projection is configured, emitted
/// rows carry only the projected columns, in projection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subset: Option<Vec<usize>>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Builds a schema from source-column names and an optional projection.
    ///
    /// Projection indices must be unique and in range; order is preserved.
    pub fn new(names: Vec<String>, subset: Option<Vec<usize>>) -> Result<Self> {
        if let Some(subset) = &subset {
            if !subset.iter().all_unique() {
                return Err(Error::InvalidDialect(
                    "projection contains duplicate column indices".into(),
                ));
            }
            if let Some(&bad) = subset.iter().find(|&&i| i >= names.len()) {
                return Err(Error::InvalidDialect(format!(
                    "projection index {bad} is out of range for {} column(s)",
                    names.len()
                )));
            }
        }
        let by_name = Self::build_name_map(&names, subset.as_deref());
        Ok(Schema {
            names,
            subset,
            by_name,
        })
    }

    fn build_name_map(names: &[String], subset: Option<&[usize]>) -> HashMap<String, usize> {
        // Keys are projected names; values are positions within an emitted row.
        match subset {
            Some(subset) => subset
                .iter()
                .enumerate()
                .map(|(pos, &src)| (names[src].clone(), pos))
                .collect(),
            None => names
                .iter()
                .enumerate()
                .map(|(pos, name)| (name.clone(), pos))
                .collect(),
        }
    }

    /// Source-column names, before projection.
    pub fn source_names(&self) -> &[String] {
        &self.names
    }

    /// Names of the columns emitted rows actually carry, in emission order.
    pub fn projected_names(&self) -> Vec<&str> {
        match &self.subset {
            Some(subset) => subset.iter().map(|&i| self.names[i].as_str()).collect(),
            None => self.names.iter().map(String::as_str).collect(),
        }
    }

    /// Number of columns in the source file.
    pub fn source_len(&self) -> usize {
        self.names.len()
    }

    /// Number of fields each emitted row carries.
    pub fn projected_len(&self) -> usize {
        match &self.subset {
            Some(subset) => subset.len(),
            None => self.names.len(),
        }
    }

    /// Position of `name` within emitted rows, or `None` if the column does
    /// not exist or was projected away.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn subset(&self) -> Option<&[usize]> {
        self.subset.as_deref()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(file, self).map_err(|e| Error::Io(std::io::Error::other(e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let loaded: Schema =
            serde_json::from_reader(reader).map_err(|e| Error::Io(std::io::Error::other(e)))?;
        // The lookup map is not serialized; rebuild it.
        Schema::new(loaded.names, loaded.subset)
    }
}
