//! Include expansion: flattens `\input`, `\include` and `\subfile` into a
//! single LaTeX source.
//!
//! ## Overview
//!
//! Expansion works on a preloaded `path -> text` map, so it never touches
//! storage. Each directive is resolved relative to the directory of the file it
//! appears in (see [`resolve_include`]) and replaced by the expanded text of
//! the target, wrapped in marker comments:
//!
//! ```text
//! % >>> ferrotex: begin include chapters/one.tex
//! ...
//! % <<< ferrotex: end include chapters/one.tex
//! ```
//!
//! ## Safety Valves
//!
//! - A directive whose target is already being expanded further up the chain
//!   is replaced by a single skip marker (one per cycle edge).
//! - Past `max_depth` nested levels the text is returned unexpanded.
//! - Every splice is charged against a byte budget (`max_expanded_bytes`);
//!   once it is spent, remaining directives are left verbatim. A file may be
//!   included from several places, so without the budget a handful of files
//!   that each include the next one twice would grow the output exponentially.
//! - A directive whose target is not in the map is left verbatim, so partial
//!   bundles still render.

use crate::paths::{parent_dir, resolve_include};
use ferrotex_syntax::find_include_directives;
use std::collections::HashMap;

pub const DEFAULT_MAX_DEPTH: usize = 25;
pub const DEFAULT_MAX_EXPANDED_BYTES: usize = 8 * 1024 * 1024;

pub fn begin_marker(path: &str) -> String {
    format!("% >>> ferrotex: begin include {path}")
}

pub fn end_marker(path: &str) -> String {
    format!("% <<< ferrotex: end include {path}")
}

pub fn skip_marker(path: &str) -> String {
    format!("% ferrotex: skipped recursive include {path}")
}

/// The flattened source plus a record of what happened along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    /// Resolved paths spliced in, in expansion order (repeats included).
    pub included: Vec<String>,
    /// Resolved paths of cycle edges replaced by a skip marker.
    pub skipped_cycles: Vec<String>,
    /// Resolved paths of directives left verbatim because the file was absent.
    pub missing: Vec<String>,
    /// Whether the depth ceiling cut expansion short somewhere.
    pub depth_limited: bool,
    /// Bytes charged against the expansion budget.
    pub spliced_bytes: usize,
    /// Whether the budget ran out and directives were left verbatim.
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct IncludeExpander<'a> {
    sources: &'a HashMap<String, String>,
    max_depth: usize,
    max_expanded_bytes: usize,
}

impl<'a> IncludeExpander<'a> {
    pub fn new(sources: &'a HashMap<String, String>) -> Self {
        Self {
            sources,
            max_depth: DEFAULT_MAX_DEPTH,
            max_expanded_bytes: DEFAULT_MAX_EXPANDED_BYTES,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_expanded_bytes(mut self, max_expanded_bytes: usize) -> Self {
        self.max_expanded_bytes = max_expanded_bytes;
        self
    }

    /// Expands `text`, the content of the file at `path`.
    pub fn expand(&self, path: &str, text: &str) -> Expansion {
        let mut report = Expansion::default();
        let mut ancestors = vec![path.to_string()];
        report.text = self.expand_inner(text, parent_dir(path), &mut ancestors, 0, &mut report);
        report
    }

    fn expand_inner(
        &self,
        text: &str,
        current_dir: &str,
        ancestors: &mut Vec<String>,
        depth: usize,
        report: &mut Expansion,
    ) -> String {
        if depth > self.max_depth {
            log::warn!(
                "Include depth limit ({}) reached; leaving {} unexpanded",
                self.max_depth,
                ancestors.last().map(String::as_str).unwrap_or("<root>")
            );
            report.depth_limited = true;
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for directive in find_include_directives(text) {
            let start = u32::from(directive.range.start()) as usize;
            let end = u32::from(directive.range.end()) as usize;
            let resolved = resolve_include(current_dir, &directive.argument);

            let source = if resolved.is_empty() {
                None
            } else {
                self.sources.get(&resolved)
            };
            let Some(source) = source else {
                log::debug!(
                    "\\{}{{{}}} -> {:?} not in bundle, left as is",
                    directive.command.as_str(),
                    directive.argument,
                    resolved
                );
                report.missing.push(resolved);
                continue;
            };

            let following = &text[end..];

            if ancestors.contains(&resolved) {
                log::debug!("Skipping recursive include of {}", resolved);
                out.push_str(&text[last..start]);
                push_line(&mut out, &skip_marker(&resolved), following);
                report.skipped_cycles.push(resolved);
                last = end;
                continue;
            }

            let begin = begin_marker(&resolved);
            let end_line = end_marker(&resolved);
            // Body, both markers and up to four line breaks.
            let charge = source.len() + begin.len() + end_line.len() + 4;
            if report.spliced_bytes + charge > self.max_expanded_bytes {
                if !report.budget_exhausted {
                    log::warn!(
                        "Include expansion budget ({} bytes) spent; leaving {} and later includes as is",
                        self.max_expanded_bytes,
                        resolved
                    );
                }
                report.budget_exhausted = true;
                continue;
            }
            report.spliced_bytes += charge;

            ancestors.push(resolved.clone());
            report.included.push(resolved.clone());
            let body = self.expand_inner(source, parent_dir(&resolved), ancestors, depth + 1, report);
            ancestors.pop();

            let mut block = begin;
            block.push('\n');
            block.push_str(&body);
            if !body.is_empty() && !body.ends_with('\n') {
                block.push('\n');
            }
            block.push_str(&end_line);
            out.push_str(&text[last..start]);
            push_line(&mut out, &block, following);
            last = end;
        }

        out.push_str(&text[last..]);
        out
    }
}

/// Appends `block` so that it starts and ends on its own line without
/// introducing a blank line (a paragraph break) around it.
fn push_line(out: &mut String, block: &str, following: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(block);
    if !following.is_empty() && !following.starts_with('\n') && !following.starts_with("\r\n") {
        out.push('\n');
    }
}

/// Expands with the default depth ceiling.
pub fn expand_includes(entry_path: &str, text: &str, sources: &HashMap<String, String>) -> String {
    IncludeExpander::new(sources).expand(entry_path, text).text
}
