//! # FerroTeX Syntax
//!
//! Fault-tolerant scanners for the pieces of LaTeX and BibTeX that bundle
//! resolution depends on. Nothing here performs I/O; every function takes text
//! and returns plain data.
//!
//! - [`bibtex`] - lenient `.bib` entry parser
//! - [`citations`] - `\cite`-family key extraction
//! - [`directives`] - include directives and `\includegraphics` asset keys

pub mod bibtex;
pub mod citations;
pub mod directives;

pub use bibtex::{parse_bibtex, BibEntry, BibFile};
pub use citations::extract_cited_keys;
pub use directives::{
    extract_asset_keys, find_include_directives, is_commented, IncludeCommand, IncludeDirective,
};
pub use rowan::{TextRange, TextSize};
