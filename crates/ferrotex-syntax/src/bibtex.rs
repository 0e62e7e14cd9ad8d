//! BibTeX file parsing utilities.
//!
//! ## Overview
//!
//! This module provides a lightweight parser for BibTeX bibliography files (`.bib`)
//! embedded in LaTeX bundles. It extracts structured data (entries, keys, fields)
//! rather than producing a syntax tree.
//!
//! ## Parsing Strategy
//!
//! The parser uses a **best-effort approach**:
//!
//! - It scans for `@type{key, ...}` and `@type(key, ...)` patterns
//! - It is resilient to comments and garbage text outside entries
//! - It handles brace `{...}`, quote `"..."` and bare (comma-terminated) values
//! - The first entry seen for a key wins; later duplicates are discarded
//!
//! ## Examples
//!
//! ```
//! use ferrotex_syntax::bibtex::parse_bibtex;
//!
//! let input = r#"
//!     @article{knuth84,
//!         author = {Donald Knuth},
//!         title = {Literate Programming},
//!         year = 1984
//!     }
//! "#;
//!
//! let file = parse_bibtex(input);
//! assert_eq!(file.entries.len(), 1);
//! assert_eq!(file.entries[0].key, "knuth84");
//! assert_eq!(file.entries[0].fields["year"], "1984");
//! ```

use rowan::{TextRange, TextSize};
use std::collections::{HashMap, HashSet};

/// Block types that share the `@type{...}` syntax but are not bibliography entries.
const NON_ENTRY_TYPES: &[&str] = &["comment", "string", "preamble"];

/// Represents a single BibTeX entry (e.g., `@article{...}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    /// The type of the entry, lowercased (e.g., "article", "book").
    pub entry_type: String,
    /// The citation key (e.g., "knuth1984").
    pub key: String,
    /// Lowercased field name -> trimmed value, delimiters stripped.
    pub fields: HashMap<String, String>,
    /// The full range of the entry in the source file, from `@` to the closing delimiter.
    pub range: TextRange,
}

impl BibEntry {
    /// Returns a field value, ignoring empty values.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Represents a parsed BibTeX file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BibFile {
    /// Entries in source order, unique by key.
    pub entries: Vec<BibEntry>,
}

impl BibFile {
    /// Looks up an entry by its exact citation key.
    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Builds a key -> entry index for repeated lookups.
    pub fn by_key(&self) -> HashMap<&str, &BibEntry> {
        self.entries.iter().map(|e| (e.key.as_str(), e)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses a BibTeX input string into a structured [`BibFile`].
///
/// This function is tolerant of common errors and non-standard formatting.
/// Unterminated entries are dropped and scanning resumes right after their `@`,
/// so a well-formed entry following a broken one is still found.
pub fn parse_bibtex(input: &str) -> BibFile {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find('@') {
        let at = cursor + offset;
        match parse_block(input, at) {
            Some((end, entry)) => {
                cursor = end;
                if let Some(entry) = entry
                    && seen.insert(entry.key.clone())
                {
                    entries.push(entry);
                }
            }
            None => cursor = at + 1,
        }
    }

    BibFile { entries }
}

/// Parses the block starting at the `@` found at byte `at`.
///
/// Returns the byte offset just past the block and the entry it held, if any.
/// `None` means the `@` did not start a block at all.
fn parse_block(input: &str, at: usize) -> Option<(usize, Option<BibEntry>)> {
    let rest = &input[at + 1..];
    let type_len = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    if type_len == 0 {
        return None;
    }
    let entry_type = rest[..type_len].to_ascii_lowercase();

    let after_type = &rest[type_len..];
    let open_idx = at + 1 + type_len + (after_type.len() - after_type.trim_start().len());
    let close = match input[open_idx..].chars().next()? {
        '{' => b'}',
        '(' => b')',
        _ => return None,
    };
    let open = input.as_bytes()[open_idx];

    let body_start = open_idx + 1;
    let body_end = find_closing(input.as_bytes(), body_start, open, close)?;
    let end = body_end + 1;

    if NON_ENTRY_TYPES.contains(&entry_type.as_str()) {
        return Some((end, None));
    }

    let body = &input[body_start..body_end];
    let (key, fields_src) = match body.find(',') {
        Some(comma) => (&body[..comma], &body[comma + 1..]),
        None => (body, ""),
    };
    let key = key.trim();
    if key.is_empty() {
        return Some((end, None));
    }

    Some((
        end,
        Some(BibEntry {
            entry_type,
            key: key.to_string(),
            fields: parse_fields(fields_src),
            range: TextRange::new(TextSize::from(at as u32), TextSize::from(end as u32)),
        }),
    ))
}

/// Finds the byte index of the delimiter closing the one just before `start`,
/// counting nested occurrences of the same pair.
fn find_closing(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 1usize;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn parse_fields(src: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut rest = src;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        let Some(eq) = rest.find('=') else {
            break;
        };
        let name = rest[..eq].trim().to_lowercase();
        let (value, remainder) = read_value(rest[eq + 1..].trim_start());
        rest = remainder;

        if !name.is_empty() {
            fields
                .entry(name)
                .or_insert_with(|| value.trim().to_string());
        }
    }

    fields
}

/// Reads one field value and returns it along with the unread remainder.
///
/// Anything between a delimited value and the next comma (string
/// concatenation, stray text) is dropped.
fn read_value(src: &str) -> (&str, &str) {
    let bytes = src.as_bytes();
    match bytes.first() {
        Some(b'{') => match find_closing(bytes, 1, b'{', b'}') {
            Some(close) => (&src[1..close], skip_to_separator(&src[close + 1..])),
            None => (&src[1..], ""),
        },
        Some(b'"') => {
            let mut escaped = false;
            for (i, &b) in bytes.iter().enumerate().skip(1) {
                match b {
                    b'\\' if !escaped => escaped = true,
                    b'"' if !escaped => {
                        return (&src[1..i], skip_to_separator(&src[i + 1..]));
                    }
                    _ => escaped = false,
                }
            }
            (&src[1..], "")
        }
        _ => match src.find(',') {
            Some(comma) => (&src[..comma], &src[comma..]),
            None => (src, ""),
        },
    }
}

fn skip_to_separator(src: &str) -> &str {
    match src.find(',') {
        Some(comma) => &src[comma..],
        None => "",
    }
}
