//! Synthesized "References" section for previews and outlines.
//!
//! The bundle's own bibliography is never typeset during preview, so cited
//! entries are rendered here as plain one-line citations:
//!
//! ```text
//! [key] title — author — year
//! ```

use crate::config::BundleConfig;
use crate::ir::IrNode;
use ferrotex_syntax::{BibEntry, BibFile};
use serde::{Deserialize, Serialize};

pub const REFERENCES_TITLE: &str = "References";
const SEPARATOR: &str = " — ";
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSection {
    pub id: String,
    pub title: String,
    pub lines: Vec<String>,
}

impl ReferenceSection {
    pub fn to_ir(&self) -> IrNode {
        IrNode::Section {
            id: self.id.clone(),
            title: self.title.clone(),
            level: 1,
            children: self.lines.iter().map(IrNode::paragraph).collect(),
        }
    }
}

/// Builds the references section, or `None` when there is nothing to list.
///
/// With citations, only cited keys that have an entry are listed, in citation
/// order. Without citations, the first `reference_fallback_limit` entries are
/// listed so an imported bibliography still shows up.
pub fn build_reference_section(
    doc_id: &str,
    cited_keys: &[String],
    bib: &BibFile,
    config: &BundleConfig,
) -> Option<ReferenceSection> {
    let entries: Vec<&BibEntry> = if cited_keys.is_empty() {
        bib.entries
            .iter()
            .take(config.reference_fallback_limit)
            .collect()
    } else {
        let index = bib.by_key();
        cited_keys
            .iter()
            .filter_map(|key| index.get(key.as_str()).copied())
            .collect()
    };

    if entries.is_empty() {
        return None;
    }

    Some(ReferenceSection {
        id: format!("{doc_id}-references"),
        title: REFERENCES_TITLE.to_string(),
        lines: entries.iter().map(|e| format_entry(e, config)).collect(),
    })
}

/// One citation line; missing parts are left out together with their separator.
pub fn format_entry(entry: &BibEntry, config: &BundleConfig) -> String {
    let year = entry
        .field("year")
        .or_else(|| entry.field("date").map(|d| d.get(..4).unwrap_or(d)));

    let parts: Vec<String> = [
        (entry.field("title"), config.title_limit),
        (entry.field("author"), config.author_limit),
        (year, config.year_limit),
    ]
    .into_iter()
    .filter_map(|(value, limit)| value.map(|v| clamp(v, limit)))
    .filter(|v| !v.is_empty())
    .collect();

    if parts.is_empty() {
        format!("[{}]", entry.key)
    } else {
        format!("[{}] {}", entry.key, parts.join(SEPARATOR))
    }
}

/// Drops grouping braces, collapses whitespace and truncates to `limit`
/// characters, the ellipsis included.
fn clamp(value: &str, limit: usize) -> String {
    let cleaned: String = value.chars().filter(|c| !matches!(c, '{' | '}')).collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    if limit == 0 {
        return String::new();
    }
    let mut truncated: String = collapsed.chars().take(limit - 1).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use ferrotex_syntax::parse_bibtex;

    const BIB: &str = r#"
@article{a, title = {Alpha {Results}}, author = {Doe, J. and Roe, R.}, year = 2020}
@book{b, title = "Beta", date = {2019-05-01}}
@misc{c}
"#;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cited_subset_in_citation_order() {
        let bib = parse_bibtex(BIB);
        let section =
            build_reference_section("doc1", &keys(&["c", "zzz", "a"]), &bib, &BundleConfig::default())
                .unwrap();
        expect![[r#"
            ReferenceSection {
                id: "doc1-references",
                title: "References",
                lines: [
                    "[c]",
                    "[a] Alpha Results — Doe, J. and Roe, R. — 2020",
                ],
            }
        "#]]
        .assert_debug_eq(&section);
    }

    #[test]
    fn test_missing_entry_dropped() {
        let bib = parse_bibtex("@article{a, title={A}}");
        let section =
            build_reference_section("d", &keys(&["a", "b"]), &bib, &BundleConfig::default()).unwrap();
        assert_eq!(section.lines, vec!["[a] A"]);
    }

    #[test]
    fn test_no_match_is_none() {
        let bib = parse_bibtex(BIB);
        let config = BundleConfig::default();
        assert!(build_reference_section("d", &keys(&["nope"]), &bib, &config).is_none());
        assert!(build_reference_section("d", &[], &BibFile::default(), &config).is_none());
    }

    #[test]
    fn test_fallback_to_first_entries() {
        let bib = parse_bibtex(BIB);
        let config = BundleConfig {
            reference_fallback_limit: 2,
            ..BundleConfig::default()
        };
        let section = build_reference_section("d", &[], &bib, &config).unwrap();
        assert_eq!(section.lines.len(), 2);
        assert_eq!(section.lines[1], "[b] Beta — 2019");
    }

    #[test]
    fn test_fallback_limit_default_is_fifty() {
        let bib_text: String = (0..60).map(|i| format!("@misc{{k{i}, title={{T{i}}}}}\n")).collect();
        let bib = parse_bibtex(&bib_text);
        let section = build_reference_section("d", &[], &bib, &BundleConfig::default()).unwrap();
        assert_eq!(section.lines.len(), 50);
        assert_eq!(section.lines[49], "[k49] T49");
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp("  a \n  b ", 10), "a b");
        assert_eq!(clamp("abcdef", 4), "abc…");
        assert_eq!(clamp("ab  cdef", 4), "ab…");
        assert_eq!(clamp("abc", 3), "abc");
        assert_eq!(clamp("abc", 0), "");
    }

    #[test]
    fn test_long_fields_are_clamped() {
        let title = "word ".repeat(100);
        let bib = parse_bibtex(&format!("@misc{{k, title = {{{title}}}, year = {{2020 (reprinted 2021 with corrections)}}}}"));
        let line = format_entry(&bib.entries[0], &BundleConfig::default());
        let (_, rest) = line.split_once("] ").unwrap();
        let parts: Vec<&str> = rest.split(SEPARATOR).collect();
        assert_eq!(parts[0].chars().count(), 200);
        assert!(parts[0].ends_with(ELLIPSIS));
        assert_eq!(parts[1].chars().count(), 16);
    }

    #[test]
    fn test_to_ir() {
        let section = ReferenceSection {
            id: "d-references".into(),
            title: REFERENCES_TITLE.into(),
            lines: vec!["[a] A".into()],
        };
        let IrNode::Section { children, level, .. } = section.to_ir() else {
            panic!("expected a section");
        };
        assert_eq!(level, 1);
        assert_eq!(children, vec![IrNode::paragraph("[a] A")]);
    }
}
