//! Streaming ingestion of delimiter-separated files.
//!
//! The crate parses possibly-large CSV files into a lazy sequence of typed
//! rows: a resumable byte-level state machine handles RFC 4180 quoting (with
//! lenient repair of common dialect damage), an I/O producer overlaps disk
//! reads with parsing through a bounded queue, and a guesser infers the
//! delimiter and header row when asked.
//!
//! Typical use:
//!
//! ```no_run
//! use csv_feed::Reader;
//!
//! # fn main() -> csv_feed::Result<()> {
//! let mut reader = Reader::open_guessed("data.csv")?;
//! println!("columns: {:?}", reader.col_names());
//! for row in reader.rows() {
//!     let id: i64 = row.get(0).expect("id field").get()?;
//!     let name = &row["name"];
//!     let _ = (id, name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! In-memory fragments can be parsed directly with [`Parser`] /
//! [`parse`]; the parser's state persists between `feed` calls, so input
//! may be split at any byte.

pub mod dialect;
pub mod error;
pub mod guess;
pub mod parser;
pub mod reader;
pub mod row;
pub mod schema;
pub mod value;

pub use dialect::Dialect;
pub use error::{Error, Result};
pub use guess::guess_format;
pub use parser::{parse, BadRow, BadRowHandler, Parser};
pub use reader::{read_file_info, FileInfo, Reader, ReaderBuilder, Rows, ITERATION_CHUNK_ROWS};
pub use row::{Field, FromField, Row};
pub use schema::Schema;
pub use value::{classify, DataType, Parsed};
