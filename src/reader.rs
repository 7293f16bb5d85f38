use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use log::{debug, info};
use memchr::memchr_iter;
use serde::{Deserialize, Serialize};

use crate::{
    dialect::{printable_byte, Dialect, DEFAULT_DELIMITER},
    error::{Error, Result},
    guess,
    parser::{BadRowHandler, Parser},
    row::Row,
    schema::Schema,
};

/// Size of each read the producer hands to the worker.
const CHUNK_BYTES: usize = 1 << 20;

/// Rows parsed by the constructor so column names and counters are
/// available before iteration starts.
const PRIMING_ROWS: usize = 100;

/// Rows read per lazy-iteration refill.
pub const ITERATION_CHUNK_ROWS: usize = 100_000;

/// Maximum byte chunks in flight between producer and worker. A full queue
/// blocks the producer.
const FEED_QUEUE_DEPTH: usize = 8;

/// Message from the I/O producer to the parser worker. `Done` is the
/// end-of-file sentinel and is always the last message sent.
enum Feed {
    Chunk(Vec<u8>),
    Done,
}

/// Basic facts about a parsed file, for downstream serializers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub col_names: Vec<String>,
    pub delimiter: u8,
    pub row_count: u64,
    pub col_count: usize,
}

/// Configures and opens a [`Reader`].
#[derive(Default)]
pub struct ReaderBuilder {
    dialect: Dialect,
    projection: Option<Vec<usize>>,
    bad_row: Option<BadRowHandler>,
}

impl ReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Keep only these source columns, in this order.
    pub fn projection<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.projection = Some(columns.into_iter().collect());
        self
    }

    /// Callback for rows whose field count disagrees with the schema.
    pub fn bad_row_handler(mut self, handler: BadRowHandler) -> Self {
        self.bad_row = Some(handler);
        self
    }

    /// Opens `path`, guessing the dialect first if one was requested, and
    /// parses a priming chunk so metadata accessors answer immediately.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Reader> {
        let path = path.as_ref();
        let mut dialect = self.dialect;
        if dialect.wants_guess() {
            let guess = guess::guess_dialect(path)?;
            info!(
                "Guessed delimiter '{}' and header row {} for {}",
                printable_byte(guess.delimiter),
                guess.header,
                path.display()
            );
            dialect.delimiter = Some(guess.delimiter);
            dialect.header = Some(guess.header);
        }

        let mut core = Parser::new(&dialect, self.projection)?;
        if let Some(handler) = self.bad_row {
            core.set_bad_row_handler(handler);
        }

        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = Reader {
            path: path.to_path_buf(),
            dialect,
            file: Some(file),
            core: Some(core),
            eof: false,
            error: None,
        };
        reader.read_chunk(PRIMING_ROWS);
        if let Some(err) = reader.error.take() {
            return Err(err);
        }
        Ok(reader)
    }
}

/// Streaming CSV reader: yields rows in file order while overlapping disk
/// reads with parsing.
///
/// Each refill runs a small pipeline: the calling thread reads the file in
/// 1 MiB chunks and sends them through a bounded channel; a worker thread
/// drains the channel and feeds the parser. The worker is joined before the
/// refill returns, so rows are always observed from a single thread.
/// Dropping the reader at any point releases the file handle and all queued
/// rows.
pub struct Reader {
    path: PathBuf,
    dialect: Dialect,
    file: Option<File>,
    core: Option<Parser>,
    eof: bool,
    error: Option<Error>,
}

impl Reader {
    /// Opens `path` with the default comma dialect.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader> {
        ReaderBuilder::new().open(path)
    }

    /// Opens `path`, guessing delimiter and header row from content.
    pub fn open_guessed<P: AsRef<Path>>(path: P) -> Result<Reader> {
        ReaderBuilder::new().dialect(Dialect::guess()).open(path)
    }

    /// Reads from the file until roughly `target_rows` more records have
    /// been seen (counted as line terminators), feeding the parser through
    /// the bounded queue. Any failure is stashed in `self.error`.
    fn read_chunk(&mut self, target_rows: usize) {
        if self.eof || self.error.is_some() {
            return;
        }
        let Some(mut core) = self.core.take() else {
            return;
        };
        // The parser core moves into the worker for the duration of the
        // refill and comes back through join().
        let (tx, rx) = mpsc::sync_channel::<Feed>(FEED_QUEUE_DEPTH);
        let spawned = thread::Builder::new()
            .name("csv-feed-worker".into())
            .spawn(move || -> (Parser, Option<Error>) {
                while let Ok(feed) = rx.recv() {
                    match feed {
                        Feed::Chunk(bytes) => {
                            if let Err(err) = core.feed(&bytes) {
                                return (core, Some(err));
                            }
                        }
                        Feed::Done => {
                            let err = core.end_feed().err();
                            return (core, err);
                        }
                    }
                }
                (core, None)
            });
        let worker = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.error = Some(Error::Io(err));
                return;
            }
        };

        let mut io_error = None;
        let mut lines = 0usize;
        loop {
            let mut chunk = vec![0u8; CHUNK_BYTES];
            let read = match self.file.as_mut() {
                Some(file) => file.read(&mut chunk),
                None => Ok(0),
            };
            match read {
                Ok(0) => {
                    self.eof = true;
                    self.file = None;
                    let _ = tx.send(Feed::Done);
                    break;
                }
                Ok(n) => {
                    chunk.truncate(n);
                    lines += memchr_iter(b'\n', &chunk).count();
                    if tx.send(Feed::Chunk(chunk)).is_err() {
                        // Worker already bailed with an error.
                        break;
                    }
                    if lines >= target_rows {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    io_error = Some(Error::Io(err));
                    break;
                }
            }
        }
        drop(tx);

        match worker.join() {
            Ok((core, worker_error)) => {
                debug!(
                    "Refilled {} row(s) from {}",
                    core.queued(),
                    self.path.display()
                );
                self.core = Some(core);
                if let Some(err) = worker_error.or(io_error) {
                    self.error = Some(err);
                }
            }
            Err(_) => {
                self.error = Some(Error::Io(io::Error::other("parser worker panicked")));
            }
        }
    }

    /// Returns the next row, reading more of the file as needed. `None`
    /// means the file is exhausted or a fatal error was recorded.
    pub fn next_row(&mut self) -> Option<Row> {
        loop {
            if let Some(row) = self.core.as_mut().and_then(Parser::pop) {
                return Some(row);
            }
            if self.eof || self.error.is_some() {
                return None;
            }
            self.read_chunk(ITERATION_CHUNK_ROWS);
        }
    }

    /// Iterator over the remaining rows.
    pub fn rows(&mut self) -> Rows<'_> {
        Rows { reader: self }
    }

    /// The resolved dialect this file is being parsed with.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn delimiter(&self) -> u8 {
        self.dialect.delimiter.unwrap_or(DEFAULT_DELIMITER)
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.core.as_ref().and_then(|c| c.schema()).map(|s| &**s)
    }

    /// Projected column names; empty until the header row has been parsed.
    pub fn col_names(&self) -> Vec<String> {
        self.schema()
            .map(|s| s.projected_names().iter().map(|n| n.to_string()).collect())
            .unwrap_or_default()
    }

    /// Records closed so far, including header and rejected rows.
    pub fn row_num(&self) -> u64 {
        self.core.as_ref().map_or(0, Parser::row_num)
    }

    /// Rows emitted so far.
    pub fn correct_rows(&self) -> u64 {
        self.core.as_ref().map_or(0, Parser::correct_rows)
    }

    /// True once the file has been read to the end.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Fatal error recorded during iteration, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }
}

/// Iterator over a reader's remaining rows. Fatal errors end the iteration;
/// check [`Reader::error`] afterwards.
pub struct Rows<'r> {
    reader: &'r mut Reader,
}

impl Iterator for Rows<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.reader.next_row()
    }
}

/// Parses the whole file (guessing its dialect) and reports its shape.
pub fn read_file_info<P: AsRef<Path>>(path: P) -> Result<FileInfo> {
    let path = path.as_ref();
    let mut reader = Reader::open_guessed(path)?;
    while reader.next_row().is_some() {}
    if let Some(err) = reader.take_error() {
        return Err(err);
    }
    let col_names = reader.col_names();
    Ok(FileInfo {
        filename: path.display().to_string(),
        col_count: col_names.len(),
        col_names,
        delimiter: reader.delimiter(),
        row_count: reader.correct_rows(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(name);
        let mut file = File::create(&path).expect("create test file");
        file.write_all(contents.as_bytes()).expect("write test file");
        (dir, path)
    }

    #[test]
    fn priming_read_exposes_metadata_before_iteration() {
        let (_dir, path) = write_file("basic.csv", "A,B,C\r\n1,2,3\r\n4,5,6\r\n");
        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.col_names(), vec!["A", "B", "C"]);
        assert_eq!(reader.delimiter(), b',');
        assert_eq!(reader.correct_rows(), 2);
        assert!(reader.eof());
    }

    #[test]
    fn rows_come_out_in_file_order() {
        let mut contents = String::from("id,value\n");
        for i in 0..500 {
            contents.push_str(&format!("{i},v{i}\n"));
        }
        let (_dir, path) = write_file("ordered.csv", &contents);

        let mut reader = Reader::open(&path).unwrap();
        for (i, row) in reader.rows().enumerate() {
            assert_eq!(row.get(0).unwrap().get::<i64>().unwrap(), i as i64);
        }
    }

    #[test]
    fn missing_file_fails_at_open() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = Reader::open(dir.path().join("absent.csv"));
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[test]
    fn strict_error_in_priming_chunk_surfaces_at_open() {
        let (_dir, path) = write_file("bad.csv", "A,B,C\r\n1,2\r\n");
        let result = ReaderBuilder::new().dialect(Dialect::strict()).open(&path);
        assert!(matches!(result, Err(Error::MalformedRow { row_num: 1, .. })));
    }

    #[test]
    fn projection_applies_during_streaming() {
        let (_dir, path) = write_file("proj.csv", "A,B,C\r\n1,2,3\r\n4,5,6\r\n");
        let mut reader = ReaderBuilder::new().projection([2, 0]).open(&path).unwrap();
        assert_eq!(reader.col_names(), vec!["C", "A"]);
        let rows: Vec<Vec<String>> = reader.rows().map(|r| r.to_vec()).collect();
        assert_eq!(rows, vec![vec!["3", "1"], vec!["6", "4"]]);
    }

    #[test]
    fn guessed_dialect_reaches_the_reader() {
        let mut contents = String::new();
        for _ in 0..100 {
            contents.push_str("x\ty\tz\n");
        }
        let (_dir, path) = write_file("tabs.txt", &contents);

        let reader = Reader::open_guessed(&path).unwrap();
        assert_eq!(reader.delimiter(), b'\t');
        assert_eq!(reader.col_names(), vec!["x", "y", "z"]);
    }

    #[test]
    fn abandoning_iteration_mid_file_is_clean() {
        let mut contents = String::from("a,b\n");
        for i in 0..1000 {
            contents.push_str(&format!("{i},{i}\n"));
        }
        let (_dir, path) = write_file("partial.csv", &contents);

        let mut reader = Reader::open(&path).unwrap();
        let first = reader.rows().take(3).count();
        assert_eq!(first, 3);
        drop(reader); // file handle and queued rows released here
    }

    #[test]
    fn file_info_reports_shape() {
        let mut contents = String::from("a,b,c\n");
        for i in 0..40 {
            contents.push_str(&format!("{i},{i},{i}\n"));
        }
        let (_dir, path) = write_file("info.csv", &contents);

        let info = read_file_info(&path).unwrap();
        assert_eq!(info.col_names, vec!["a", "b", "c"]);
        assert_eq!(info.col_count, 3);
        assert_eq!(info.delimiter, b',');
        assert_eq!(info.row_count, 40);
    }

    #[test]
    fn bad_row_handler_runs_on_the_worker() {
        use std::sync::{Arc, Mutex};

        let (_dir, path) = write_file("bad_rows.csv", "a,b\n1\n1,2\n3,4,5\n6,7\n");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut reader = ReaderBuilder::new()
            .bad_row_handler(Box::new(move |bad: crate::parser::BadRow<'_>| {
                sink.lock().expect("seen lock").push(bad.field_count());
            }))
            .open(&path)
            .unwrap();

        let rows: Vec<_> = reader.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(*seen.lock().expect("seen lock"), vec![1, 3]);
    }
}
