//! Figure asset validation and collection.
//!
//! Figures uploaded through the editor are stored under `assets/<key>` where
//! `<key>` is `<documentId>__<suffix>`. A bundle may only pull in its own
//! document's assets; everything referenced is checked and downloaded, and
//! every problem is reported together so a user sees all broken figures at once.

use crate::paths::join_key;
use crate::storage::BlobStore;
use ferrotex_syntax::directives::ASSET_PREFIX;
use ferrotex_syntax::extract_asset_keys;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log target for rejected asset keys, kept apart for security review.
pub const SECURITY_LOG_TARGET: &str = "ferrotex::security";

/// A figure key pulled from `\includegraphics`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetReference {
    pub key: String,
}

impl AssetReference {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Path of the asset in the store and inside a package: `assets/<key>`,
    /// the same path the source references.
    pub fn rel_path(&self) -> String {
        join_key(ASSET_PREFIX, &self.key)
    }

    /// Whether the key is `<doc_id>__<suffix>` with a non-empty suffix.
    pub fn is_owned_by(&self, doc_id: &str) -> bool {
        !doc_id.is_empty()
            && self
                .key
                .strip_prefix(doc_id)
                .and_then(|rest| rest.strip_prefix("__"))
                .is_some_and(|suffix| !suffix.is_empty())
    }

    /// Keys are single path segments, so they cannot address another object.
    pub fn is_well_formed(&self) -> bool {
        !self.key.is_empty() && !self.key.contains(['/', '\\'])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingAssetKind {
    /// The key does not carry the requesting document's prefix.
    OwnershipMismatch,
    /// The key could address something outside `assets/`.
    InvalidKey,
    DownloadFailed,
    EmptyPayload,
    /// The stored bytes do not match the manifest's recorded digest.
    ChecksumMismatch,
}

impl MissingAssetKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::OwnershipMismatch => "asset does not belong to this document",
            Self::InvalidKey => "invalid asset key",
            Self::DownloadFailed => "download failed",
            Self::EmptyPayload => "stored file is empty",
            Self::ChecksumMismatch => "checksum mismatch",
        }
    }
}

impl fmt::Display for MissingAssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// One problem found while collecting a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAsset {
    /// Asset key, or the bundle-relative path for manifest files.
    pub key: String,
    pub kind: MissingAssetKind,
    pub reason: String,
}

impl MissingAsset {
    pub fn new(key: impl Into<String>, kind: MissingAssetKind) -> Self {
        Self::with_reason(key, kind, kind.describe())
    }

    pub fn with_reason(
        key: impl Into<String>,
        kind: MissingAssetKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            kind,
            reason: reason.into(),
        }
    }
}

/// A file shipped alongside the main source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageFile {
    pub rel_path: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PackageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageFile")
            .field("rel_path", &self.rel_path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Downloads one object, turning every failure into a diagnostic for `label`.
pub(crate) fn fetch(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
    label: &str,
) -> Result<Vec<u8>, MissingAsset> {
    match store.download(bucket, key) {
        Ok(bytes) if bytes.is_empty() => Err(MissingAsset::new(label, MissingAssetKind::EmptyPayload)),
        Ok(bytes) => Ok(bytes),
        Err(e) => Err(MissingAsset::with_reason(
            label,
            MissingAssetKind::DownloadFailed,
            format!("download failed: {e}"),
        )),
    }
}

/// Checks and downloads every asset referenced by `latex`.
#[derive(Debug, Clone, Copy)]
pub struct AssetCollector<'a> {
    store: &'a dyn BlobStore,
    bucket: &'a str,
}

impl<'a> AssetCollector<'a> {
    pub fn new(store: &'a dyn BlobStore, bucket: &'a str) -> Self {
        Self { store, bucket }
    }

    /// Returns every asset on success, or every problem on failure; never a mix.
    /// Diagnostics follow extraction order.
    pub fn collect(&self, latex: &str, doc_id: &str) -> Result<Vec<PackageFile>, Vec<MissingAsset>> {
        let mut files = Vec::new();
        let mut missing = Vec::new();

        for asset in extract_asset_keys(latex).into_iter().map(AssetReference::new) {
            if !asset.is_owned_by(doc_id) {
                log::warn!(
                    target: SECURITY_LOG_TARGET,
                    "Rejected asset {:?} referenced from document {:?}: ownership mismatch",
                    asset.key,
                    doc_id
                );
                missing.push(MissingAsset::new(asset.key, MissingAssetKind::OwnershipMismatch));
                continue;
            }
            if !asset.is_well_formed() {
                log::warn!(
                    target: SECURITY_LOG_TARGET,
                    "Rejected malformed asset key {:?} in document {:?}",
                    asset.key,
                    doc_id
                );
                missing.push(MissingAsset::new(asset.key, MissingAssetKind::InvalidKey));
                continue;
            }

            let rel_path = asset.rel_path();
            match fetch(self.store, self.bucket, &rel_path, &asset.key) {
                Ok(bytes) => files.push(PackageFile { rel_path, bytes }),
                Err(problem) => {
                    log::debug!("Asset {} unavailable: {}", rel_path, problem.reason);
                    missing.push(problem);
                }
            }
        }

        if missing.is_empty() {
            Ok(files)
        } else {
            Err(missing)
        }
    }
}

/// Validates the assets of `latex` for `doc_id` against `bucket`.
pub fn validate_assets(
    latex: &str,
    doc_id: &str,
    bucket: &str,
    store: &dyn BlobStore,
) -> Result<Vec<PackageFile>, Vec<MissingAsset>> {
    AssetCollector::new(store, bucket).collect(latex, doc_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn store_with(files: &[(&str, &str)]) -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        for (key, content) in files {
            store.insert("b", key, content.as_bytes());
        }
        store
    }

    #[test]
    fn test_ownership() {
        assert!(AssetReference::new("doc1__a.png").is_owned_by("doc1"));
        assert!(!AssetReference::new("doc1__").is_owned_by("doc1"));
        assert!(!AssetReference::new("doc2__a.png").is_owned_by("doc1"));
        assert!(!AssetReference::new("doc1_a.png").is_owned_by("doc1"));
        assert!(!AssetReference::new("doc10__a.png").is_owned_by("doc1"));
        assert!(!AssetReference::new("__a.png").is_owned_by(""));
    }

    #[test]
    fn test_all_present() {
        let store = store_with(&[("assets/doc1__x.png", "X"), ("assets/doc1__y.pdf", "Y")]);
        let latex = r"\includegraphics{assets/doc1__x.png} \includegraphics{\detokenize{assets/doc1__y.pdf}}";
        let files = validate_assets(latex, "doc1", "b", &store).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].rel_path, "assets/doc1__x.png");
        assert_eq!(files[0].bytes, b"X");
        assert_eq!(files[1].rel_path, "assets/doc1__y.pdf");
    }

    #[test]
    fn test_only_missing_key_reported() {
        let store = store_with(&[("assets/doc1__x.png", "X")]);
        let latex = r"\includegraphics{assets/doc1__x.png} \includegraphics{assets/doc1__y.png}";
        let missing = validate_assets(latex, "doc1", "b", &store).unwrap_err();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key, "doc1__y.png");
        assert_eq!(missing[0].kind, MissingAssetKind::DownloadFailed);
    }

    #[test]
    fn test_foreign_key_never_downloaded() {
        // Present in storage, but owned by another document.
        let store = store_with(&[("assets/doc2__x.png", "X")]);
        let latex = r"\includegraphics{assets/doc2__x.png}";
        let missing = validate_assets(latex, "doc1", "b", &store).unwrap_err();
        assert_eq!(
            missing,
            vec![MissingAsset::new("doc2__x.png", MissingAssetKind::OwnershipMismatch)]
        );
    }

    #[test]
    fn test_all_problems_batched_in_extraction_order() {
        let store = store_with(&[("assets/doc1__empty.png", ""), ("assets/doc1__ok.png", "ok")]);
        let latex = r"
            \includegraphics{assets/other__a.png}
            \includegraphics{assets/doc1__ok.png}
            \includegraphics{assets/doc1__empty.png}
            \includegraphics{assets/doc1__x\y.png}
            \includegraphics{assets/doc1__gone.png}
        ";
        let missing = validate_assets(latex, "doc1", "b", &store).unwrap_err();
        let kinds: Vec<_> = missing.iter().map(|m| (m.key.as_str(), &m.kind)).collect();
        assert_eq!(kinds.len(), 4);
        assert_eq!(kinds[0], ("other__a.png", &MissingAssetKind::OwnershipMismatch));
        assert_eq!(kinds[1], ("doc1__empty.png", &MissingAssetKind::EmptyPayload));
        assert_eq!(kinds[2], ("doc1__x\\y.png", &MissingAssetKind::InvalidKey));
        assert_eq!(kinds[3].0, "doc1__gone.png");
    }

    #[test]
    fn test_dots_inside_a_key_are_fine() {
        assert!(AssetReference::new("doc1__fig..v2.png").is_well_formed());
        assert!(!AssetReference::new("doc1__a/b.png").is_well_formed());

        let store = store_with(&[("assets/doc1__fig..v2.png", "F")]);
        let files =
            validate_assets(r"\includegraphics{assets/doc1__fig..v2.png}", "doc1", "b", &store)
                .unwrap();
        assert_eq!(files[0].rel_path, "assets/doc1__fig..v2.png");
    }

    #[test]
    fn test_package_path_matches_source_reference() {
        let store = store_with(&[("assets/doc1__p.png", "P")]);
        let reference = "assets/doc1__p.png";
        let latex = format!(r"\includegraphics[width=2cm]{{{reference}}}");
        let files = validate_assets(&latex, "doc1", "b", &store).unwrap();
        assert_eq!(files[0].rel_path, reference);
    }

    #[test]
    fn test_no_assets_is_ok() {
        let store = MemoryBlobStore::new();
        assert_eq!(validate_assets("plain text", "d", "b", &store).unwrap(), vec![]);
    }

    #[test]
    fn test_diagnostic_json() {
        let json = serde_json::to_value(MissingAsset::with_reason(
            "k",
            MissingAssetKind::DownloadFailed,
            "download failed: object not found: b/assets/k",
        ))
        .unwrap();
        assert_eq!(json["key"], "k");
        assert_eq!(json["kind"], "downloadFailed");
        assert_eq!(json["reason"], "download failed: object not found: b/assets/k");
    }
}
