//! Text decoding and delimiter detection for the publisher's CSV files.
//!
//! The publisher serves Latin-1 text. It switched its field delimiter from
//! `;` to `|` in February 2026, so the delimiter is detected per file unless
//! the caller forces one.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

/// Delimiters considered by detection, in preference order.
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b'|', b';', b',', b'\t'];

/// Used when detection finds nothing better.
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Minimum header columns for a header split to count as a detection.
const MIN_COLUMNS: usize = 2;

/// Data lines inspected by the multi-line sniff.
const SNIFF_LINES: usize = 5;

/// UTF-8 byte-order mark after a Latin-1 decode.
const MISDECODED_BOM: &str = "\u{ef}\u{bb}\u{bf}";

/// Decode ISO-8859-1 bytes. Every byte maps to the code point of equal value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode text as ISO-8859-1. Characters outside the range become `?`.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Strip a leading byte-order mark, whether decoded correctly or as Latin-1.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}')
        .or_else(|| text.strip_prefix(MISDECODED_BOM))
        .unwrap_or(text)
}

/// How the field delimiter is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelimiterChoice {
    /// Detect from the text.
    #[default]
    Auto,
    /// Always use this delimiter.
    Forced(u8),
}

impl DelimiterChoice {
    /// Resolve to a concrete delimiter for `text`.
    pub fn resolve(self, text: &str) -> u8 {
        match self {
            DelimiterChoice::Auto => detect_delimiter(text),
            DelimiterChoice::Forced(d) => d,
        }
    }
}

/// Error returned when parsing an unsupported delimiter setting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported delimiter {0:?} (expected auto, |, ;, , or tab)")]
pub struct InvalidDelimiter(String);

impl FromStr for DelimiterChoice {
    type Err = InvalidDelimiter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_matches(|c| c == ' ') {
            "" | "auto" => Ok(DelimiterChoice::Auto),
            "|" => Ok(DelimiterChoice::Forced(b'|')),
            ";" => Ok(DelimiterChoice::Forced(b';')),
            "," => Ok(DelimiterChoice::Forced(b',')),
            "\t" | "tab" => Ok(DelimiterChoice::Forced(b'\t')),
            other => Err(InvalidDelimiter(other.to_string())),
        }
    }
}

impl fmt::Display for DelimiterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimiterChoice::Auto => f.write_str("auto"),
            DelimiterChoice::Forced(b'\t') => f.write_str("tab"),
            DelimiterChoice::Forced(d) => write!(f, "{}", char::from(*d)),
        }
    }
}

/// Pick the field delimiter for `text`.
///
/// The header line is split on each candidate and the one producing the
/// most columns wins, provided it yields at least two. Otherwise the data
/// lines are sniffed for a delimiter that occurs the same number of times on
/// each of them, and failing that [`DEFAULT_DELIMITER`] is returned.
pub fn detect_delimiter(text: &str) -> u8 {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return DEFAULT_DELIMITER;
    };

    let mut best = DEFAULT_DELIMITER;
    let mut best_count = 0;
    for &d in &CANDIDATE_DELIMITERS {
        let count = header.bytes().filter(|&b| b == d).count() + 1;
        if count > best_count {
            best = d;
            best_count = count;
        }
    }
    if best_count >= MIN_COLUMNS {
        debug!(
            delimiter = %char::from(best),
            columns = best_count,
            "detected CSV delimiter from header"
        );
        return best;
    }

    let sample: Vec<&str> = lines.take(SNIFF_LINES).collect();
    match sniff(&sample) {
        Some(d) => {
            debug!(delimiter = %char::from(d), "sniffed CSV delimiter from data lines");
            d
        }
        None => {
            debug!("could not sniff CSV delimiter, using default");
            DEFAULT_DELIMITER
        }
    }
}

/// Candidate with a consistent, non-zero per-line count; highest count wins.
fn sniff(lines: &[&str]) -> Option<u8> {
    if lines.is_empty() {
        return None;
    }
    CANDIDATE_DELIMITERS
        .iter()
        .filter_map(|&d| {
            let mut counts = lines.iter().map(|l| l.bytes().filter(|&b| b == d).count());
            let first = counts.next()?;
            (first > 0 && counts.all(|c| c == first)).then_some((d, first))
        })
        .fold(None, |best: Option<(u8, usize)>, (d, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((d, count)),
        })
        .map(|(d, _)| d)
}

/// Data rows of `text` (header excluded), split on `delimiter`.
///
/// Rows the CSV reader cannot decode are logged and skipped.
pub fn read_rows(text: &str, delimiter: u8) -> Vec<csv::StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) => warn!(row = idx + 1, error = %e, "skipping unreadable CSV row"),
        }
    }
    rows
}
