use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::{Arc, Mutex},
};

use log::debug;

use crate::{
    dialect::{printable_byte, Dialect},
    error::{Error, Result},
    parser::Parser,
};

/// Delimiters the guesser will consider.
pub const CANDIDATE_DELIMITERS: [u8; 5] = [b',', b'|', b'\t', b';', b'^'];

/// How many lines of the file are probed.
const PROBE_LINES: usize = 100;

/// First-pass acceptance thresholds.
const MIN_ROWS: u64 = 10;
const MIN_COLS: usize = 3;

/// Outcome of delimiter/header guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guess {
    pub delimiter: u8,
    pub header: usize,
}

/// Guesses the dialect of `path` and returns it as a ready-to-use `Dialect`.
pub fn guess_format(path: &Path) -> Result<Dialect> {
    let guess = guess_dialect(path)?;
    Ok(Dialect::default()
        .with_delimiter(guess.delimiter)
        .with_header(Some(guess.header)))
}

/// What one probe of the file under a candidate delimiter observed.
struct Measurement {
    delimiter: u8,
    correct_rows: u64,
    cols: usize,
    /// field count -> number of rejected rows with that count
    tally: HashMap<usize, u64>,
    /// field count -> record index where that count first appeared
    first_seen: HashMap<usize, u64>,
}

/// Chooses a delimiter from the candidate set and a header row index by
/// probing the first lines of the file.
///
/// The first pass scores each candidate by `(correct_rows, column_count)`
/// and accepts the best one if it parsed enough well-shaped rows. The
/// second pass looks at the rejected rows instead: a file that opens with
/// commentary parses its real data as "malformed" rows sharing one length,
/// so the modal rejected length marks the data and its first occurrence
/// marks the header.
pub(crate) fn guess_dialect(path: &Path) -> Result<Guess> {
    let head = read_probe(path, PROBE_LINES)?;
    let measurements: Vec<Measurement> = CANDIDATE_DELIMITERS
        .iter()
        .map(|&delimiter| measure(&head, delimiter))
        .collect::<Result<_>>()?;

    // First pass: most correct rows, then widest schema.
    let mut first_best: Option<&Measurement> = None;
    for m in &measurements {
        debug!(
            "Delimiter '{}': {} correct row(s), {} column(s)",
            printable_byte(m.delimiter),
            m.correct_rows,
            m.cols
        );
        let better = match first_best {
            Some(best) => (m.correct_rows, m.cols) > (best.correct_rows, best.cols),
            None => true,
        };
        if better {
            first_best = Some(m);
        }
    }
    if let Some(best) = first_best {
        if best.correct_rows >= MIN_ROWS && best.cols >= MIN_COLS {
            return Ok(Guess {
                delimiter: best.delimiter,
                header: 0,
            });
        }
    }

    // Second pass: rejected-row tallies.
    let mut second_best: Option<Guess> = None;
    let mut best_mode_len = 0usize;
    for m in &measurements {
        let Some((&mode_len, &mode_count)) =
            m.tally.iter().max_by_key(|&(&len, &count)| (count, len))
        else {
            continue;
        };
        debug!(
            "Delimiter '{}': modal rejected length {} seen {} time(s)",
            printable_byte(m.delimiter),
            mode_len,
            mode_count
        );
        if mode_count > m.correct_rows && mode_len > best_mode_len {
            best_mode_len = mode_len;
            second_best = Some(Guess {
                delimiter: m.delimiter,
                header: m.first_seen[&mode_len] as usize,
            });
        }
    }
    if let Some(guess) = second_best {
        return Ok(guess);
    }

    // Neither pass was confident; fall back to the best raw score as long
    // as it produced anything at all.
    match first_best {
        Some(best) if best.correct_rows > 0 => Ok(Guess {
            delimiter: best.delimiter,
            header: 0,
        }),
        _ => Err(Error::BadDialect {
            path: path.to_path_buf(),
        }),
    }
}

fn read_probe(path: &Path, max_lines: usize) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut head = Vec::new();
    for _ in 0..max_lines {
        if reader.read_until(b'\n', &mut head)? == 0 {
            break;
        }
    }
    Ok(head)
}

/// Runs the parser over the probe bytes in measurement mode: header at row
/// zero, no projection, and a bad-row handler that tallies rejected lengths.
fn measure(head: &[u8], delimiter: u8) -> Result<Measurement> {
    let dialect = Dialect::default().with_delimiter(delimiter);
    let mut parser = Parser::new(&dialect, None)?;

    type Tally = (HashMap<usize, u64>, HashMap<usize, u64>);
    let shared: Arc<Mutex<Tally>> = Arc::new(Mutex::new((HashMap::new(), HashMap::new())));
    let sink = Arc::clone(&shared);
    parser.set_bad_row_handler(Box::new(move |bad: crate::parser::BadRow<'_>| {
        let mut guard = sink.lock().expect("tally lock");
        let (tally, first_seen) = &mut *guard;
        *tally.entry(bad.field_count()).or_insert(0) += 1;
        first_seen.entry(bad.field_count()).or_insert(bad.row_num());
    }));

    parser.feed(head)?;
    parser.end_feed()?;

    let cols = parser.schema().map_or(0, |s| s.source_len());
    let correct_rows = parser.correct_rows();
    drop(parser); // release the handler's Arc clone
    let (tally, first_seen) = match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().expect("tally lock"),
        Err(shared) => shared.lock().expect("tally lock").clone(),
    };

    Ok(Measurement {
        delimiter,
        correct_rows,
        cols,
        tally,
        first_seen,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("probe.csv");
        let mut file = File::create(&path).expect("create probe file");
        file.write_all(contents.as_bytes()).expect("write probe");
        (dir, path)
    }

    #[test]
    fn picks_tab_for_tab_separated_input() {
        let mut contents = String::new();
        for _ in 0..100 {
            contents.push_str("x\ty\tz\n");
        }
        let (_dir, path) = write_file(&contents);

        let guess = guess_dialect(&path).unwrap();
        assert_eq!(guess.delimiter, b'\t');
        assert_eq!(guess.header, 0);
    }

    #[test]
    fn picks_comma_for_ordinary_csv() {
        let mut contents = String::from("a,b,c\n");
        for i in 0..50 {
            contents.push_str(&format!("{i},{i},{i}\n"));
        }
        let (_dir, path) = write_file(&contents);

        let guess = guess_dialect(&path).unwrap();
        assert_eq!(guess.delimiter, b',');
        assert_eq!(guess.header, 0);
    }

    #[test]
    fn leading_comments_shift_the_header_row() {
        let mut contents = String::new();
        for _ in 0..3 {
            contents.push_str("# comment\n");
        }
        for _ in 0..100 {
            contents.push_str("a,b,c,d\n");
        }
        let (_dir, path) = write_file(&contents);

        let guess = guess_dialect(&path).unwrap();
        assert_eq!(guess.delimiter, b',');
        assert_eq!(guess.header, 3);
    }

    #[test]
    fn empty_file_is_a_bad_dialect() {
        let (_dir, path) = write_file("");
        assert!(matches!(
            guess_dialect(&path),
            Err(Error::BadDialect { .. })
        ));
    }

    #[test]
    fn missing_file_is_open_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nope.csv");
        assert!(matches!(guess_dialect(&path), Err(Error::Open { .. })));
    }

    #[test]
    fn guess_format_returns_usable_dialect() {
        let mut contents = String::from("a;b;c\n");
        for i in 0..30 {
            contents.push_str(&format!("{i};{i};{i}\n"));
        }
        let (_dir, path) = write_file(&contents);

        let dialect = guess_format(&path).unwrap();
        assert_eq!(dialect.delimiter, Some(b';'));
        assert!(!dialect.wants_guess());
    }
}
