use std::{borrow::Cow, fmt, ops::Index, sync::Arc};

use crate::{
    error::{Error, Result},
    schema::Schema,
    value::{classify, DataType, Parsed},
};

/// One emitted record: an owned byte buffer, the end offset of every field,
/// and a shared handle to the column schema.
///
/// Fields borrow from the row's buffer; nothing is copied until a caller
/// asks for an owned value.
#[derive(Clone)]
pub struct Row {
    buf: Vec<u8>,
    ends: Vec<usize>,
    schema: Arc<Schema>,
}

impl Row {
    pub(crate) fn from_parts(buf: Vec<u8>, ends: Vec<usize>, schema: Arc<Schema>) -> Self {
        debug_assert!(ends.windows(2).all(|w| w[0] <= w[1]));
        debug_assert_eq!(ends.last().copied().unwrap_or(0), buf.len());
        Row { buf, ends, schema }
    }

    /// Number of fields in this row.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn byte_range(&self, idx: usize) -> Option<(usize, usize)> {
        let end = *self.ends.get(idx)?;
        let start = if idx == 0 { 0 } else { self.ends[idx - 1] };
        Some((start, end))
    }

    /// Field at position `idx` within the emitted (projected) row.
    pub fn get(&self, idx: usize) -> Option<Field<'_>> {
        self.byte_range(idx)
            .map(|(start, end)| Field::new(&self.buf[start..end]))
    }

    /// Field addressed by column name, resolved through the schema.
    pub fn field(&self, name: &str) -> Option<Field<'_>> {
        self.get(self.schema.index_of(name)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = Field<'_>> {
        self.ends.iter().enumerate().map(|(i, &end)| {
            let start = if i == 0 { 0 } else { self.ends[i - 1] };
            Field::new(&self.buf[start..end])
        })
    }

    /// Copies every field out as an owned string.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(|f| f.as_str().into_owned()).collect()
    }
}

impl Index<usize> for Row {
    type Output = [u8];

    fn index(&self, idx: usize) -> &[u8] {
        let (start, end) = self
            .byte_range(idx)
            .unwrap_or_else(|| panic!("field index {idx} out of range for {}-field row", self.len()));
        &self.buf[start..end]
    }
}

impl Index<&str> for Row {
    type Output = [u8];

    fn index(&self, name: &str) -> &[u8] {
        let idx = self
            .schema
            .index_of(name)
            .unwrap_or_else(|| panic!("no column named '{name}'"));
        &self[idx]
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|field| field.as_str().into_owned()))
            .finish()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf && self.ends == other.ends
    }
}

/// A single parsed cell, borrowing the owning row's buffer. Type resolution
/// happens on demand: nothing is classified until an accessor asks.
#[derive(Debug, Clone, Copy)]
pub struct Field<'r> {
    bytes: &'r [u8],
}

impl<'r> Field<'r> {
    pub(crate) fn new(bytes: &'r [u8]) -> Self {
        Field { bytes }
    }

    pub fn bytes(&self) -> &'r [u8] {
        self.bytes
    }

    /// The field's original text. Always succeeds; invalid UTF-8 is replaced.
    pub fn as_str(&self) -> Cow<'r, str> {
        String::from_utf8_lossy(self.bytes)
    }

    pub fn parsed(&self) -> Parsed {
        classify(self.bytes)
    }

    pub fn data_type(&self) -> DataType {
        self.parsed().data_type()
    }

    pub fn is_null(&self) -> bool {
        self.data_type() == DataType::Null
    }

    pub fn is_str(&self) -> bool {
        self.data_type() == DataType::String
    }

    pub fn is_int(&self) -> bool {
        self.data_type() == DataType::Integer
    }

    pub fn is_float(&self) -> bool {
        self.data_type() == DataType::Float
    }

    pub fn is_num(&self) -> bool {
        matches!(self.data_type(), DataType::Integer | DataType::Float)
    }

    /// Converts the field to `T`, failing with `TypeMismatch` when the
    /// classified type is incompatible and `Overflow` when the value does
    /// not fit the destination.
    pub fn get<T: FromField>(&self) -> Result<T> {
        T::from_field(self)
    }
}

impl fmt::Display for Field<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Numeric fields render from their parsed value, everything else
        // from the raw bytes.
        match self.parsed() {
            Parsed::Int(v) => write!(f, "{v}"),
            Parsed::Float(v) => write!(f, "{v}"),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Conversion from a parsed field into a concrete Rust type.
pub trait FromField: Sized {
    fn from_field(field: &Field<'_>) -> Result<Self>;

    /// Name used in error messages.
    fn type_name() -> &'static str;
}

impl FromField for String {
    fn from_field(field: &Field<'_>) -> Result<Self> {
        Ok(field.as_str().into_owned())
    }

    fn type_name() -> &'static str {
        "string"
    }
}

impl FromField for i64 {
    fn from_field(field: &Field<'_>) -> Result<Self> {
        match field.parsed() {
            Parsed::Int(v) => Ok(v),
            Parsed::Str { overflow: true } => Err(Error::Overflow {
                value: field.as_str().into_owned(),
                target: Self::type_name(),
            }),
            other => Err(Error::TypeMismatch {
                requested: Self::type_name(),
                actual: other.data_type(),
            }),
        }
    }

    fn type_name() -> &'static str {
        "i64"
    }
}

impl FromField for i32 {
    fn from_field(field: &Field<'_>) -> Result<Self> {
        match field.parsed() {
            Parsed::Int(v) => v.try_into().map_err(|_| Error::Overflow {
                value: field.as_str().into_owned(),
                target: Self::type_name(),
            }),
            Parsed::Str { overflow: true } => Err(Error::Overflow {
                value: field.as_str().into_owned(),
                target: Self::type_name(),
            }),
            other => Err(Error::TypeMismatch {
                requested: Self::type_name(),
                actual: other.data_type(),
            }),
        }
    }

    fn type_name() -> &'static str {
        "i32"
    }
}

impl FromField for f64 {
    fn from_field(field: &Field<'_>) -> Result<Self> {
        match field.parsed() {
            Parsed::Float(v) => Ok(v),
            Parsed::Int(v) => Ok(v as f64),
            Parsed::Str { overflow: true } => Err(Error::Overflow {
                value: field.as_str().into_owned(),
                target: Self::type_name(),
            }),
            other => Err(Error::TypeMismatch {
                requested: Self::type_name(),
                actual: other.data_type(),
            }),
        }
    }

    fn type_name() -> &'static str {
        "f64"
    }
}
