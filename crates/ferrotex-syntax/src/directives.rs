//! Scanners for the directives that tie a LaTeX bundle together:
//! file inclusion (`\input`, `\include`, `\subfile`) and figure references
//! (`\includegraphics` pointing into the `assets/` store).

use once_cell::sync::Lazy;
use regex::Regex;
use rowan::{TextRange, TextSize};
use std::collections::HashSet;

/// The path prefix every stored figure reference starts with.
pub const ASSET_PREFIX: &str = "assets/";

// Braced argument, or a bare token after whitespace. The trailing alternatives
// keep \includegraphics, \includeonly and \inputencoding from matching.
static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(input|include|subfile)(?:\s*\{([^{}]*)\}|\s+([^\s{}\\%]+))")
        .expect("include pattern is valid")
});

static DETOKENIZED_GRAPHICS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\includegraphics\*?\s*(?:\[[^\]]*\]\s*)?\{\s*\\detokenize\s*\{\s*assets/([^{}\s]+)\s*\}\s*\}",
    )
    .expect("detokenized graphics pattern is valid")
});

static PLAIN_GRAPHICS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\includegraphics\*?\s*(?:\[[^\]]*\]\s*)?\{\s*assets/([^{}\s]+)\s*\}")
        .expect("plain graphics pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncludeCommand {
    Input,
    Include,
    Subfile,
}

impl IncludeCommand {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "input" => Some(Self::Input),
            "include" => Some(Self::Include),
            "subfile" => Some(Self::Subfile),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Include => "include",
            Self::Subfile => "subfile",
        }
    }
}

/// One include directive found in a LaTeX source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub command: IncludeCommand,
    /// The raw argument, untrimmed, exactly as written between the braces
    /// (or the bare token).
    pub argument: String,
    /// Range of the whole directive, command name included.
    pub range: TextRange,
}

/// Whether byte offset `pos` lies inside a `%` line comment, i.e. an
/// unescaped `%` precedes it on the same line. `\%` is a literal percent sign;
/// `\\%` is a line break followed by a comment.
pub fn is_commented(text: &str, pos: usize) -> bool {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let mut escaped = false;
    for &b in &text.as_bytes()[line_start..pos] {
        match b {
            b'\\' => escaped = !escaped,
            b'%' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

/// Finds include directives in occurrence order. Directives inside `%`
/// comments are not reported.
pub fn find_include_directives(text: &str) -> Vec<IncludeDirective> {
    INCLUDE_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            if is_commented(text, whole.start()) {
                return None;
            }
            let command = IncludeCommand::from_name(cap.get(1)?.as_str())?;
            let argument = cap.get(2).or_else(|| cap.get(3))?.as_str().to_string();
            Some(IncludeDirective {
                command,
                argument,
                range: TextRange::new(
                    TextSize::from(whole.start() as u32),
                    TextSize::from(whole.end() as u32),
                ),
            })
        })
        .collect()
}

/// Extracts every `assets/<key>` figure key referenced by `\includegraphics`.
///
/// Both the `\detokenize{assets/<key>}` wrapper (used so underscores survive
/// LaTeX's special-character handling) and the plain `{assets/<key>}` form are
/// recognised. Keys come back in source order, each once; commented-out
/// figures are skipped.
///
/// ```
/// use ferrotex_syntax::directives::extract_asset_keys;
///
/// let text = r"\includegraphics[width=3cm]{\detokenize{assets/doc1__a.png}}";
/// assert_eq!(extract_asset_keys(text), vec!["doc1__a.png"]);
/// ```
pub fn extract_asset_keys(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, &str)> = DETOKENIZED_GRAPHICS_RE
        .captures_iter(text)
        .chain(PLAIN_GRAPHICS_RE.captures_iter(text))
        .filter(|cap| cap.get(0).is_some_and(|m| !is_commented(text, m.start())))
        .filter_map(|cap| cap.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    found.sort_by_key(|(start, _)| *start);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, key)| seen.insert(*key))
        .map(|(_, key)| key.to_string())
        .collect()
}
