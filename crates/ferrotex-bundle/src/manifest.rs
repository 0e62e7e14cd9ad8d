//! The stored description of a multi-file LaTeX bundle.

use crate::error::{BundleError, Result};
use crate::paths::{extension, join_key};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a bundle lives and what it contains.
///
/// Serialized as `{bucket, basePrefix, entryPath, files: [{path, sha256?, size?}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub bucket: String,
    pub base_prefix: String,
    pub entry_path: String,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ManifestFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sha256: None,
            size: None,
        }
    }

    /// Checks `bytes` against the recorded digest. Files without a digest
    /// always verify.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        match &self.sha256 {
            Some(expected) => sha256_hex(bytes).eq_ignore_ascii_case(expected.trim()),
            None => true,
        }
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        extension(&self.path).is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

impl Manifest {
    pub fn new(
        bucket: impl Into<String>,
        base_prefix: impl Into<String>,
        entry_path: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            base_prefix: base_prefix.into(),
            entry_path: entry_path.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: ManifestFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BundleError::ManifestInvalid(e.to_string()))
    }

    /// Checks the invariants every operation relies on.
    pub fn validate(&self) -> Result<()> {
        if self.base_prefix.trim().is_empty() {
            return Err(BundleError::ManifestInvalid("basePrefix is empty".into()));
        }
        if self.entry_path.trim().is_empty() {
            return Err(BundleError::ManifestInvalid("entryPath is empty".into()));
        }
        if self.entry_path.starts_with('/') {
            return Err(BundleError::ManifestInvalid(format!(
                "entryPath must be relative: {}",
                self.entry_path
            )));
        }
        if let Some(file) = self.files.iter().find(|f| f.path.starts_with('/')) {
            return Err(BundleError::ManifestInvalid(format!(
                "file path must be relative: {}",
                file.path
            )));
        }
        Ok(())
    }

    /// Storage key of a bundle file.
    pub fn storage_key(&self, relative: &str) -> String {
        join_key(&self.base_prefix, relative)
    }

    /// The bucket to read from, falling back to `default` when unset.
    pub fn bucket_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.bucket.trim().is_empty() {
            default
        } else {
            &self.bucket
        }
    }

    pub fn file(&self, path: &str) -> Option<&ManifestFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Files other than the entry.
    pub fn bundle_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.files.iter().filter(move |f| f.path != self.entry_path)
    }

    /// LaTeX sources that may be pulled in by include directives.
    pub fn tex_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.bundle_files().filter(|f| f.has_extension("tex"))
    }

    pub fn bibliography_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.bundle_files().filter(|f| f.has_extension("bib"))
    }

    /// Everything a compiler needs besides LaTeX sources: bibliographies, figures, styles.
    pub fn resource_files(&self) -> impl Iterator<Item = &ManifestFile> {
        self.bundle_files().filter(|f| !f.has_extension("tex"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        Manifest::new("docs", "bundles/42", "main.tex")
            .with_file(ManifestFile::new("main.tex"))
            .with_file(ManifestFile::new("chapters/one.tex"))
            .with_file(ManifestFile::new("refs.BIB"))
            .with_file(ManifestFile::new("Figures/plot.pdf"))
    }

    #[test]
    fn test_manifest_json_shape() {
        let json = r#"{
            "bucket": "docs",
            "basePrefix": "bundles/42",
            "entryPath": "main.tex",
            "files": [
                {"path": "main.tex", "sha256": "abc", "size": 12},
                {"path": "refs.bib"}
            ]
        }"#;
        let manifest = Manifest::from_json(json).unwrap();
        assert_eq!(manifest.entry_path, "main.tex");
        assert_eq!(manifest.files[0].size, Some(12));
        assert_eq!(manifest.files[1].sha256, None);

        let out = serde_json::to_value(&manifest).unwrap();
        assert_eq!(out["basePrefix"], "bundles/42");
        assert!(out["files"][1].get("sha256").is_none());
    }

    #[test]
    fn test_malformed_json_is_invalid_manifest() {
        let err = Manifest::from_json("{}").unwrap_err();
        assert!(matches!(err, BundleError::ManifestInvalid(_)));
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate().is_ok());
        assert!(Manifest::new("b", "", "main.tex").validate().is_err());
        assert!(Manifest::new("b", "p", " ").validate().is_err());
        assert!(Manifest::new("b", "p", "/main.tex").validate().is_err());
        let absolute = sample().with_file(ManifestFile::new("/etc/passwd"));
        assert!(absolute.validate().is_err());
    }

    #[test]
    fn test_file_groups() {
        let m = sample();
        let tex: Vec<_> = m.tex_files().map(|f| f.path.as_str()).collect();
        assert_eq!(tex, vec!["chapters/one.tex"]);
        let bib: Vec<_> = m.bibliography_files().map(|f| f.path.as_str()).collect();
        assert_eq!(bib, vec!["refs.BIB"]);
        let res: Vec<_> = m.resource_files().map(|f| f.path.as_str()).collect();
        assert_eq!(res, vec!["refs.BIB", "Figures/plot.pdf"]);
    }

    #[test]
    fn test_storage_key_and_bucket() {
        let m = sample();
        assert_eq!(m.storage_key("chapters/one.tex"), "bundles/42/chapters/one.tex");
        assert_eq!(m.bucket_or("fallback"), "docs");
        assert_eq!(Manifest::new("", "p", "e").bucket_or("fallback"), "fallback");
    }

    #[test]
    fn test_checksum_verification() {
        let mut file = ManifestFile::new("a.txt");
        assert!(file.verify(b"anything"));
        file.sha256 = Some(sha256_hex(b"hello"));
        assert!(file.verify(b"hello"));
        assert!(!file.verify(b"hello!"));
        file.sha256 = Some(sha256_hex(b"hello").to_uppercase());
        assert!(file.verify(b"hello"));
    }
}
