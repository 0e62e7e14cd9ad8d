//! Maps a requested bundle path to the file actually stored in the manifest.
//!
//! LaTeX sources routinely reference figures without an extension
//! (`\includegraphics{Figures/plot}`) and with whatever casing the author's
//! filesystem tolerated, so lookups are case-insensitive and extension-less
//! requests are completed from the manifest.

use crate::error::{BundleError, Result};
use crate::manifest::ManifestFile;
use crate::paths::{contains_traversal, has_extension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBundleFile {
    pub requested_path: String,
    pub resolved_relative_path: String,
}

/// Resolves `requested` against the manifest file list.
///
/// The result is always one of the manifest's own paths, in its original case.
///
/// ```
/// use ferrotex_bundle::manifest::ManifestFile;
/// use ferrotex_bundle::resolve::resolve_bundle_file;
///
/// let files = vec![ManifestFile::new("Figures/foo.png"), ManifestFile::new("Figures/foo.pdf")];
/// let preferred = vec!["pdf".to_string(), "png".to_string()];
/// assert_eq!(resolve_bundle_file(&files, "figures/FOO", &preferred).unwrap(), "Figures/foo.pdf");
/// ```
pub fn resolve_bundle_file(
    files: &[ManifestFile],
    requested: &str,
    preferred_extensions: &[String],
) -> Result<String> {
    if contains_traversal(requested) {
        log::warn!("Rejected bundle file request {:?}: path traversal", requested);
        return Err(BundleError::TraversalAttempt {
            path: requested.to_string(),
        });
    }

    let not_found = || BundleError::FileNotFound {
        path: requested.to_string(),
    };

    let wanted = requested
        .trim()
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_lowercase();
    if wanted.is_empty() {
        return Err(not_found());
    }

    let mut by_lower: BTreeMap<String, &str> = BTreeMap::new();
    for file in files {
        by_lower
            .entry(file.path.to_lowercase())
            .or_insert(file.path.as_str());
    }

    if let Some(path) = by_lower.get(&wanted) {
        return Ok(path.to_string());
    }

    if has_extension(&wanted) {
        return Err(not_found());
    }

    let stem = format!("{wanted}.");
    let candidates: Vec<(&str, &str)> = by_lower
        .range(stem.clone()..)
        .take_while(|(lower, _)| lower.starts_with(&stem))
        .map(|(lower, original)| (&lower[stem.len()..], *original))
        .collect();

    let preferred = preferred_extensions.iter().find_map(|ext| {
        candidates
            .iter()
            .find(|(rest, _)| rest.eq_ignore_ascii_case(ext))
            .map(|(_, original)| *original)
    });

    // Fallback compares the stored paths as written, not their lowercased keys.
    preferred
        .or_else(|| candidates.iter().map(|(_, original)| *original).min())
        .map(str::to_string)
        .ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BundleConfig;

    fn files(paths: &[&str]) -> Vec<ManifestFile> {
        paths.iter().map(|p| ManifestFile::new(*p)).collect()
    }

    fn resolve(paths: &[&str], requested: &str) -> Result<String> {
        resolve_bundle_file(
            &files(paths),
            requested,
            &BundleConfig::default().preferred_extensions,
        )
    }

    #[test]
    fn test_pdf_outranks_png() {
        let found = resolve(&["Figures/foo.png", "Figures/foo.pdf"], "Figures/foo").unwrap();
        assert_eq!(found, "Figures/foo.pdf");
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let found = resolve(&["Figures/Plot.PNG"], "figures/plot.png").unwrap();
        assert_eq!(found, "Figures/Plot.PNG");
    }

    #[test]
    fn test_exact_match_beats_completion() {
        let found = resolve(&["data", "data.pdf"], "data").unwrap();
        assert_eq!(found, "data");
    }

    #[test]
    fn test_lexicographic_fallback() {
        assert_eq!(resolve(&["notes.txt"], "notes").unwrap(), "notes.txt");
        assert_eq!(
            resolve(&["notes.zzz", "notes.md", "notes.txt"], "notes").unwrap(),
            "notes.md"
        );
    }

    #[test]
    fn test_fallback_orders_stored_paths() {
        assert_eq!(resolve(&["notes.md", "notes.Txt"], "notes").unwrap(), "notes.Txt");
        assert_eq!(resolve(&["notes.Txt", "notes.md"], "NOTES").unwrap(), "notes.Txt");
    }

    #[test]
    fn test_priority_order_among_images() {
        let found = resolve(&["f.gif", "f.webp", "f.jpeg", "f.eps"], "f").unwrap();
        assert_eq!(found, "f.jpeg");
    }

    #[test]
    fn test_prefix_sibling_not_a_candidate() {
        // "foobar.pdf" does not complete "foo".
        assert!(matches!(
            resolve(&["foobar.pdf"], "foo"),
            Err(BundleError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_double_extension_candidates() {
        let found = resolve(&["plot.tar.gz", "plot.svg"], "plot").unwrap();
        assert_eq!(found, "plot.svg");
        let found = resolve(&["plot.tar.gz"], "plot").unwrap();
        assert_eq!(found, "plot.tar.gz");
    }

    #[test]
    fn test_request_with_extension_not_completed() {
        assert!(matches!(
            resolve(&["foo.pdf"], "foo.png"),
            Err(BundleError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_leading_separators_ignored() {
        assert_eq!(resolve(&["a/b.tex"], "./a/b.tex").unwrap(), "a/b.tex");
        assert_eq!(resolve(&["a/b.tex"], "/a/b").unwrap(), "a/b.tex");
    }

    #[test]
    fn test_traversal_rejected_before_lookup() {
        // Even with an empty manifest the request is classified as traversal, not not-found.
        for request in ["../secret", "a/../../b", "..", "figures/..\\x"] {
            assert!(
                matches!(resolve(&[], request), Err(BundleError::TraversalAttempt { .. })),
                "{request} should be rejected"
            );
        }
    }

    #[test]
    fn test_empty_request() {
        assert!(matches!(
            resolve(&["a.tex"], "  "),
            Err(BundleError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_case_collision_is_deterministic() {
        let a = resolve(&["Fig.png", "FIG.png"], "fig.png").unwrap();
        let b = resolve(&["Fig.png", "FIG.png"], "fig.png").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "Fig.png");
    }
}
