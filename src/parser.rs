use std::{collections::VecDeque, mem, sync::Arc};

use log::debug;

use crate::{
    dialect::Dialect,
    error::{Error, Result},
    row::Row,
    schema::Schema,
};

/// Per-byte dispatch for the state machine. Every input byte is exactly one
/// of these as far as parsing is concerned; everything else is field data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteClass {
    Delimiter,
    Quote,
    CarriageReturn,
    LineFeed,
    Other,
}

/// A rejected row, handed to the bad-row handler. Borrows the parser's
/// row-in-progress; copy out whatever outlives the callback.
pub struct BadRow<'a> {
    row_num: u64,
    buf: &'a [u8],
    ends: &'a [usize],
}

impl BadRow<'_> {
    /// Zero-based record index within the file.
    pub fn row_num(&self) -> u64 {
        self.row_num
    }

    pub fn field_count(&self) -> usize {
        self.ends.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.ends.iter().enumerate().map(|(i, &end)| {
            let start = if i == 0 { 0 } else { self.ends[i - 1] };
            &self.buf[start..end]
        })
    }
}

/// Callback slot for rows whose field count disagrees with the schema.
pub type BadRowHandler = Box<dyn FnMut(BadRow<'_>) + Send>;

/// Resumable byte-level CSV parser.
///
/// Feed it arbitrary fragments of input with [`feed`](Parser::feed), finish
/// with [`end_feed`](Parser::end_feed), and drain completed rows with
/// [`pop`](Parser::pop). State persists between fragments, so any partition
/// of the input produces the same row sequence. The quoting model is
/// RFC 4180 with two leniencies: a quote in the middle of an unquoted field
/// is dropped, and a stray quote inside a quoted field is kept as data.
pub struct Parser {
    delimiter: u8,
    quote: u8,
    header: Option<usize>,
    strict: bool,

    // Row in progress: one growing buffer plus the end offset of each
    // closed field.
    buf: Vec<u8>,
    ends: Vec<usize>,
    quoted: bool,
    pending_quote: bool,
    skip_lf: bool,
    prev: Option<u8>,

    schema: Option<Arc<Schema>>,
    projection: Option<Vec<usize>>,

    row_num: u64,
    correct_rows: u64,
    records: VecDeque<Row>,
    bad_row: Option<BadRowHandler>,
}

impl Parser {
    /// Builds a parser for a concrete dialect, optionally projecting emitted
    /// rows onto a subset of source columns.
    pub fn new(dialect: &Dialect, projection: Option<Vec<usize>>) -> Result<Self> {
        let (delimiter, quote) = dialect.resolve()?;

        let mut schema = None;
        let mut header = dialect.header;
        let mut pending_projection = projection;
        if !dialect.column_names.is_empty() {
            // Explicit names win: the header setting is ignored and every
            // record is data.
            schema = Some(Arc::new(Schema::new(
                dialect.column_names.clone(),
                pending_projection.take(),
            )?));
            header = None;
        }

        Ok(Parser {
            delimiter,
            quote,
            header,
            strict: dialect.strict,
            buf: Vec::new(),
            ends: Vec::new(),
            quoted: false,
            pending_quote: false,
            skip_lf: false,
            prev: None,
            schema,
            projection: pending_projection,
            row_num: 0,
            correct_rows: 0,
            records: VecDeque::new(),
            bad_row: None,
        })
    }

    /// Installs a handler for rows the materializer rejects. The default is
    /// to drop them.
    pub fn set_bad_row_handler(&mut self, handler: BadRowHandler) {
        self.bad_row = Some(handler);
    }

    fn class_of(&self, byte: u8) -> ByteClass {
        if byte == self.delimiter {
            ByteClass::Delimiter
        } else if byte == self.quote {
            ByteClass::Quote
        } else if byte == b'\r' {
            ByteClass::CarriageReturn
        } else if byte == b'\n' {
            ByteClass::LineFeed
        } else {
            ByteClass::Other
        }
    }

    /// Parses one fragment of input. Fragments may split records, fields,
    /// escaped quotes, and CRLF pairs at any byte.
    ///
    /// Returns an error only in strict mode (malformed row) or if the header
    /// row violates the configured projection.
    pub fn feed(&mut self, input: &[u8]) -> Result<()> {
        let mut i = 0usize;

        // A quote ended the previous fragment while inside a quoted field;
        // its meaning depends on this fragment's first byte.
        if self.pending_quote {
            match input.first() {
                None => return Ok(()),
                Some(&next) => {
                    self.pending_quote = false;
                    match self.class_of(next) {
                        ByteClass::Delimiter
                        | ByteClass::CarriageReturn
                        | ByteClass::LineFeed => self.quoted = false,
                        ByteClass::Quote => {
                            self.buf.push(self.quote);
                            i = 1;
                        }
                        ByteClass::Other => self.buf.push(self.quote),
                    }
                }
            }
        }

        while i < input.len() {
            let byte = input[i];

            if self.quoted {
                if byte == self.quote {
                    match input.get(i + 1) {
                        None => self.pending_quote = true,
                        Some(&next) => match self.class_of(next) {
                            ByteClass::Delimiter
                            | ByteClass::CarriageReturn
                            | ByteClass::LineFeed => self.quoted = false,
                            ByteClass::Quote => {
                                self.buf.push(self.quote);
                                i += 1;
                            }
                            ByteClass::Other => self.buf.push(self.quote),
                        },
                    }
                } else {
                    // Delimiters, CR, and LF are ordinary data inside quotes.
                    self.buf.push(byte);
                }
                self.prev = Some(byte);
                i += 1;
                continue;
            }

            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    // Second half of a CRLF whose CR already closed the record.
                    i += 1;
                    continue;
                }
            }

            match self.class_of(byte) {
                ByteClass::Delimiter => {
                    self.ends.push(self.buf.len());
                    self.prev = Some(byte);
                }
                ByteClass::Quote => {
                    // A quote opens a field only at the start of a row or
                    // right after a delimiter; anywhere else it is noise.
                    if self.prev.is_none() || self.prev == Some(self.delimiter) {
                        self.quoted = true;
                    }
                    self.prev = Some(byte);
                }
                ByteClass::CarriageReturn => {
                    self.skip_lf = true;
                    self.close_record()?;
                }
                ByteClass::LineFeed => {
                    self.close_record()?;
                }
                ByteClass::Other => {
                    self.buf.push(byte);
                    self.prev = Some(byte);
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Signals end of input: an open quoted field closes, and a non-empty
    /// row-in-progress is terminated as if by a final newline.
    pub fn end_feed(&mut self) -> Result<()> {
        if self.pending_quote {
            // The lookahead the quote was waiting for is end-of-input.
            self.pending_quote = false;
            self.quoted = false;
        }
        if self.quoted {
            // Unterminated quoted field: close it at EOF.
            self.quoted = false;
        }
        if !self.buf.is_empty() || !self.ends.is_empty() {
            self.close_record()?;
        }
        Ok(())
    }

    /// Closes the current field and record, then routes the record through
    /// the materializer.
    fn close_record(&mut self) -> Result<()> {
        self.ends.push(self.buf.len());
        let row_num = self.row_num;
        self.row_num += 1;

        let schema = match &self.schema {
            None => {
                // Schema comes from the file; everything before the header
                // row is preamble.
                let header = self.header.unwrap_or(0) as u64;
                if row_num == header {
                    let names = self.field_strings();
                    let schema = Schema::new(names, self.projection.take())?;
                    self.schema = Some(Arc::new(schema));
                }
                self.reset_row();
                return Ok(());
            }
            Some(schema) => Arc::clone(schema),
        };

        let expected = schema.source_len();
        let found = self.ends.len();
        if found == expected {
            self.correct_rows += 1;
            let row = self.materialize(&schema);
            self.records.push_back(row);
        } else {
            if self.strict {
                self.reset_row();
                return Err(Error::MalformedRow {
                    row_num,
                    expected,
                    found,
                });
            }
            debug!("Dropping row {row_num}: expected {expected} field(s), found {found}");
            if let Some(mut handler) = self.bad_row.take() {
                handler(BadRow {
                    row_num,
                    buf: &self.buf,
                    ends: &self.ends,
                });
                self.bad_row = Some(handler);
            }
        }
        self.reset_row();
        Ok(())
    }

    fn materialize(&mut self, schema: &Arc<Schema>) -> Row {
        match schema.subset() {
            None => {
                let buf = mem::take(&mut self.buf);
                let ends = mem::take(&mut self.ends);
                Row::from_parts(buf, ends, Arc::clone(schema))
            }
            Some(subset) => {
                let mut buf = Vec::new();
                let mut ends = Vec::with_capacity(subset.len());
                for &src in subset {
                    let start = if src == 0 { 0 } else { self.ends[src - 1] };
                    buf.extend_from_slice(&self.buf[start..self.ends[src]]);
                    ends.push(buf.len());
                }
                Row::from_parts(buf, ends, Arc::clone(schema))
            }
        }
    }

    fn field_strings(&self) -> Vec<String> {
        self.ends
            .iter()
            .enumerate()
            .map(|(i, &end)| {
                let start = if i == 0 { 0 } else { self.ends[i - 1] };
                String::from_utf8_lossy(&self.buf[start..end]).into_owned()
            })
            .collect()
    }

    fn reset_row(&mut self) {
        self.buf.clear();
        self.ends.clear();
        self.quoted = false;
        self.pending_quote = false;
        self.prev = None;
    }

    /// Removes and returns the oldest completed row.
    pub fn pop(&mut self) -> Option<Row> {
        self.records.pop_front()
    }

    /// Number of completed rows waiting to be popped.
    pub fn queued(&self) -> usize {
        self.records.len()
    }

    /// Column schema, available once the header row has been parsed (or
    /// immediately when explicit names were configured).
    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    /// Records closed so far, including the header and rejected rows.
    pub fn row_num(&self) -> u64 {
        self.row_num
    }

    /// Rows emitted so far.
    pub fn correct_rows(&self) -> u64 {
        self.correct_rows
    }
}

/// Parses a complete in-memory input and collects every emitted row.
pub fn parse(input: &str, dialect: &Dialect) -> Result<Vec<Row>> {
    let mut parser = Parser::new(dialect, None)?;
    parser.feed(input.as_bytes())?;
    parser.end_feed()?;
    let mut rows = Vec::with_capacity(parser.queued());
    while let Some(row) = parser.pop() {
        rows.push(row);
    }
    Ok(rows)
}
