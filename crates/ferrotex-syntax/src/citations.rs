//! Citation key extraction for `\cite`-family commands.

use crate::directives::is_commented;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

// \cite, \citep, \citet*, \parencite, \textcite, \autocite, \nocite, \Citep, ...
// with up to two optional [..] arguments before the braced key list.
static CITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\[A-Za-z]*[cC]ite[A-Za-z]*\*?\s*(?:\[[^\]]*\]\s*){0,2}\{([^}]*)\}")
        .expect("citation pattern is valid")
});

/// Extracts cited keys in first-appearance order, without duplicates.
/// Citations inside `%` comments are ignored.
///
/// ```
/// use ferrotex_syntax::citations::extract_cited_keys;
///
/// let keys = extract_cited_keys(r"\cite{a, b} and \citep[p.~2]{b,c}");
/// assert_eq!(keys, vec!["a", "b", "c"]);
/// ```
pub fn extract_cited_keys(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for cap in CITE_RE.captures_iter(text) {
        let Some(list) = cap.get(1) else { continue };
        if cap.get(0).is_some_and(|m| is_commented(text, m.start())) {
            continue;
        }
        for key in list.as_str().split(',').map(str::trim) {
            // \nocite{*} pulls in the whole bibliography, it names no key.
            if key.is_empty() || key == "*" {
                continue;
            }
            if seen.insert(key.to_string()) {
                keys.push(key.to_string());
            }
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_cite() {
        assert_eq!(extract_cited_keys(r"see \cite{knuth84}."), vec!["knuth84"]);
    }

    #[test]
    fn test_variants_and_options() {
        let text = r"
            \citet*{a} \parencite[see][12]{b} \textcite{c}
            \autocite[p.~3]{d} \Citep{e} \footcite{f}
        ";
        assert_eq!(extract_cited_keys(text), vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_duplicates_collapse_in_first_order() {
        let text = r"\cite{z, a} \cite{a} \cite{ m ,z }";
        assert_eq!(extract_cited_keys(text), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_nocite_star_and_empty_ignored() {
        let text = r"\nocite{*} \cite{} \cite{,x,}";
        assert_eq!(extract_cited_keys(text), vec!["x"]);
    }

    #[test]
    fn test_commented_citations_ignored() {
        let text = "\\cite{a} % \\cite{b}\n%\\cite{c}\n\\cite{d}";
        assert_eq!(extract_cited_keys(text), vec!["a", "d"]);
    }

    #[test]
    fn test_non_cite_commands_ignored() {
        let text = r"\ref{fig:1} \label{a} \citation";
        assert!(extract_cited_keys(text).is_empty());
    }
}
