use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for bundle resolution. Every field has a default, so a config file
/// only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundleConfig {
    /// Nesting levels of `\input`/`\include`/`\subfile` followed before giving up.
    pub max_include_depth: usize,
    /// Entries shown when a bibliography exists but nothing is cited.
    pub reference_fallback_limit: usize,
    pub title_limit: usize,
    pub author_limit: usize,
    pub year_limit: usize,
    /// Extensions tried, in order, for an extension-less file request.
    pub preferred_extensions: Vec<String>,
    /// Upper bound on the bytes an include expansion may splice in, markers
    /// included. Directives past the budget are left verbatim.
    pub max_expanded_bytes: usize,
    /// Bucket used when a manifest does not name one.
    pub default_bucket: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_include_depth: 25,
            reference_fallback_limit: 50,
            title_limit: 200,
            author_limit: 160,
            year_limit: 16,
            preferred_extensions: ["pdf", "png", "jpg", "jpeg", "svg", "webp", "gif", "eps"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_expanded_bytes: crate::expand::DEFAULT_MAX_EXPANDED_BYTES,
            default_bucket: "latex-bundles".to_string(),
        }
    }
}

impl BundleConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        log::debug!("Loaded bundle config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
