//! High-level facade tying bundle resolution to the document and blob stores.
//!
//! ## Overview
//!
//! [`BundleService`] serves the four questions the editor asks about a
//! document's LaTeX view:
//!
//! - [`merged_source`](BundleService::merged_source) - one flattened source for outline/preview
//! - [`reference_section`](BundleService::reference_section) - the synthesized "References"
//! - [`build_package`](BundleService::build_package) - source plus every file compilation needs
//! - [`resolve_file`](BundleService::resolve_file) - which stored file a request means
//!
//! Every call reads fresh from storage; nothing is cached or written back.
//!
//! ## Examples
//!
//! ```
//! use ferrotex_bundle::documents::{Document, MemoryDocumentStore};
//! use ferrotex_bundle::manifest::{Manifest, ManifestFile};
//! use ferrotex_bundle::service::BundleService;
//! use ferrotex_bundle::storage::MemoryBlobStore;
//! use std::sync::Arc;
//!
//! let blobs = Arc::new(MemoryBlobStore::new());
//! blobs.insert("b", "doc1/main.tex", r"\input{intro}");
//! blobs.insert("b", "doc1/intro.tex", "Hello");
//!
//! let manifest = Manifest::new("b", "doc1", "main.tex")
//!     .with_file(ManifestFile::new("main.tex"))
//!     .with_file(ManifestFile::new("intro.tex"));
//! let documents: MemoryDocumentStore =
//!     [Document::new("doc1", "Paper").with_manifest(manifest)].into_iter().collect();
//!
//! let service = BundleService::new(blobs, Arc::new(documents));
//! let source = service.merged_source("doc1")?;
//! assert!(source.contains("Hello"));
//! # Ok::<(), ferrotex_bundle::BundleError>(())
//! ```

use crate::assets::{
    fetch, AssetCollector, MissingAsset, MissingAssetKind, PackageFile, SECURITY_LOG_TARGET,
};
use crate::config::BundleConfig;
use crate::documents::{Document, DocumentStore};
use crate::error::{BundleError, Result};
use crate::expand::IncludeExpander;
use crate::manifest::Manifest;
use crate::paths::contains_traversal;
use crate::references::{build_reference_section, ReferenceSection};
use crate::resolve::{resolve_bundle_file, ResolvedBundleFile};
use crate::storage::{BlobStore, BucketGuard, BucketOptions};
use ferrotex_syntax::{extract_cited_keys, parse_bibtex, BibFile};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Flattened source plus references, computed in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub source: String,
    pub references: Option<ReferenceSection>,
}

/// A self-contained unit for compilation or download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePackage {
    pub main_source: String,
    pub files: Vec<PackageFile>,
}

/// Where a document's LaTeX comes from.
enum Source<'d> {
    Bundle(&'d Manifest),
    Inline(&'d str),
}

#[derive(Debug)]
pub struct BundleService {
    blobs: Arc<dyn BlobStore>,
    documents: Arc<dyn DocumentStore>,
    config: BundleConfig,
    default_bucket: BucketGuard,
}

impl BundleService {
    pub fn new(blobs: Arc<dyn BlobStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(blobs, documents, BundleConfig::default())
    }

    pub fn with_config(
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        config: BundleConfig,
    ) -> Self {
        let default_bucket = BucketGuard::new(&config.default_bucket, BucketOptions { public: false });
        Self {
            blobs,
            documents,
            config,
            default_bucket,
        }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn load_document(&self, doc_id: &str) -> Result<Document> {
        self.documents
            .get(doc_id)?
            .ok_or_else(|| BundleError::DocumentNotFound(doc_id.to_string()))
    }

    /// The flattened LaTeX source of a document.
    pub fn merged_source(&self, doc_id: &str) -> Result<String> {
        let document = self.load_document(doc_id)?;
        self.merge(&document)
    }

    /// The synthesized references section, if the document has anything to cite.
    pub fn reference_section(&self, doc_id: &str) -> Result<Option<ReferenceSection>> {
        Ok(self.preview(doc_id)?.references)
    }

    pub fn preview(&self, doc_id: &str) -> Result<Preview> {
        let document = self.load_document(doc_id)?;
        let source = self.merge(&document)?;
        let bib = match source_of(&document)? {
            Source::Bundle(manifest) => self.load_bibliography(manifest)?,
            Source::Inline(_) => BibFile::default(),
        };

        let cited = extract_cited_keys(&source);
        let references = build_reference_section(&document.id, &cited, &bib, &self.config);
        info!(
            "Preview for {}: {} bytes, {} citation(s), references {}",
            document.id,
            source.len(),
            cited.len(),
            if references.is_some() { "present" } else { "absent" }
        );
        Ok(Preview { source, references })
    }

    /// Builds the compile/download package.
    ///
    /// Fails with [`BundleError::MissingAssets`] carrying every problem found,
    /// never with a partial package.
    pub fn build_package(&self, doc_id: &str) -> Result<BundlePackage> {
        let document = self.load_document(doc_id)?;
        let main_source = self.merge(&document)?;

        let mut files = Vec::new();
        let mut missing = Vec::new();
        let bucket = match source_of(&document)? {
            Source::Bundle(manifest) => {
                let bucket = self.bucket_for(manifest)?;
                self.collect_resource_files(manifest, &bucket, &mut files, &mut missing);
                bucket
            }
            Source::Inline(_) => self.bucket_for_inline()?,
        };

        let packaged: HashSet<String> = files.iter().map(|f| f.rel_path.clone()).collect();
        match AssetCollector::new(self.blobs.as_ref(), &bucket).collect(&main_source, &document.id)
        {
            Ok(assets) => files.extend(
                assets
                    .into_iter()
                    .filter(|asset| !packaged.contains(&asset.rel_path)),
            ),
            Err(problems) => missing.extend(problems),
        }

        if !missing.is_empty() {
            warn!(
                "Package for {} incomplete: {} problem(s)",
                document.id,
                missing.len()
            );
            return Err(BundleError::MissingAssets(missing));
        }

        info!(
            "Built package for {}: {} bytes of source, {} file(s)",
            document.id,
            main_source.len(),
            files.len()
        );
        Ok(BundlePackage { main_source, files })
    }

    /// Resolves a requested path to a file listed in the document's manifest.
    pub fn resolve_file(&self, doc_id: &str, requested: &str) -> Result<ResolvedBundleFile> {
        // Refuse traversal before even loading the document.
        if contains_traversal(requested) {
            warn!(
                target: SECURITY_LOG_TARGET,
                "Rejected file request {:?} for document {:?}: path traversal", requested, doc_id
            );
            return Err(BundleError::TraversalAttempt {
                path: requested.to_string(),
            });
        }
        let document = self.load_document(doc_id)?;
        let (_, resolved) = self.resolve_in(&document, requested)?;
        Ok(resolved)
    }

    /// Resolves and downloads a single bundle file.
    pub fn read_file(&self, doc_id: &str, requested: &str) -> Result<(ResolvedBundleFile, Vec<u8>)> {
        if contains_traversal(requested) {
            return Err(BundleError::TraversalAttempt {
                path: requested.to_string(),
            });
        }
        let document = self.load_document(doc_id)?;
        let (manifest, resolved) = self.resolve_in(&document, requested)?;
        let bucket = self.bucket_for(manifest)?;
        let key = manifest.storage_key(&resolved.resolved_relative_path);
        let bytes = self.blobs.download(&bucket, &key).map_err(|e| {
            debug!("Download of {} failed: {}", key, e);
            BundleError::FileNotFound {
                path: resolved.resolved_relative_path.clone(),
            }
        })?;
        Ok((resolved, bytes))
    }

    fn resolve_in<'d>(
        &self,
        document: &'d Document,
        requested: &str,
    ) -> Result<(&'d Manifest, ResolvedBundleFile)> {
        let manifest = document
            .latex_manifest
            .as_ref()
            .ok_or_else(|| BundleError::FileNotFound {
                path: requested.to_string(),
            })?;
        manifest.validate()?;

        let resolved =
            resolve_bundle_file(&manifest.files, requested, &self.config.preferred_extensions)?;
        debug!("Resolved {:?} to {:?} in {}", requested, resolved, document.id);
        Ok((
            manifest,
            ResolvedBundleFile {
                requested_path: requested.to_string(),
                resolved_relative_path: resolved,
            },
        ))
    }

    fn merge(&self, document: &Document) -> Result<String> {
        match source_of(document)? {
            Source::Inline(latex) => Ok(latex.to_string()),
            Source::Bundle(manifest) => {
                let bucket = self.bucket_for(manifest)?;
                let entry_key = manifest.storage_key(&manifest.entry_path);
                let entry = self
                    .blobs
                    .download(&bucket, &entry_key)
                    .map_err(|e| {
                        debug!("Entry download {} failed: {}", entry_key, e);
                        BundleError::EntryNotFound {
                            path: manifest.entry_path.clone(),
                        }
                    })
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())?;

                let sources = self.load_tex_sources(manifest, &bucket);
                let expansion = IncludeExpander::new(&sources)
                    .with_max_depth(self.config.max_include_depth)
                    .with_max_expanded_bytes(self.config.max_expanded_bytes)
                    .expand(&manifest.entry_path, &entry);

                if !expansion.missing.is_empty() {
                    debug!(
                        "{}: {} include(s) not found in bundle: {:?}",
                        document.id,
                        expansion.missing.len(),
                        expansion.missing
                    );
                }
                if expansion.depth_limited {
                    warn!("{}: include depth limit reached", document.id);
                }
                if expansion.budget_exhausted {
                    warn!(
                        "{}: include expansion stopped after {} bytes",
                        document.id, expansion.spliced_bytes
                    );
                }
                debug!(
                    "{}: expanded {} include(s), skipped {} cycle(s)",
                    document.id,
                    expansion.included.len(),
                    expansion.skipped_cycles.len()
                );
                Ok(expansion.text)
            }
        }
    }

    /// Downloads every `.tex` file except the entry. Failures are skipped so the
    /// corresponding directives stay verbatim.
    fn load_tex_sources(&self, manifest: &Manifest, bucket: &str) -> HashMap<String, String> {
        let mut sources = HashMap::new();
        for file in manifest.tex_files() {
            let key = manifest.storage_key(&file.path);
            match self.blobs.download(bucket, &key) {
                Ok(bytes) => {
                    if !file.verify(&bytes) {
                        warn!("Checksum mismatch for {}", file.path);
                    }
                    sources.insert(file.path.clone(), String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(e) => warn!("Could not load {}: {}", file.path, e),
            }
        }
        sources
    }

    fn load_bibliography(&self, manifest: &Manifest) -> Result<BibFile> {
        let bucket = self.bucket_for(manifest)?;
        let mut text = String::new();
        for file in manifest.bibliography_files() {
            let key = manifest.storage_key(&file.path);
            match self.blobs.download(&bucket, &key) {
                Ok(bytes) => {
                    text.push_str(&String::from_utf8_lossy(&bytes));
                    text.push('\n');
                }
                Err(e) => warn!("Could not load bibliography {}: {}", file.path, e),
            }
        }
        Ok(parse_bibtex(&text))
    }

    fn collect_resource_files(
        &self,
        manifest: &Manifest,
        bucket: &str,
        files: &mut Vec<PackageFile>,
        missing: &mut Vec<MissingAsset>,
    ) {
        for file in manifest.resource_files() {
            let key = manifest.storage_key(&file.path);
            match fetch(self.blobs.as_ref(), bucket, &key, &file.path) {
                Ok(bytes) if !file.verify(&bytes) => {
                    missing.push(MissingAsset::new(&file.path, MissingAssetKind::ChecksumMismatch));
                }
                Ok(bytes) => files.push(PackageFile {
                    rel_path: file.path.clone(),
                    bytes,
                }),
                Err(problem) => missing.push(problem),
            }
        }
    }

    fn bucket_for(&self, manifest: &Manifest) -> Result<String> {
        let bucket = manifest.bucket_or(self.default_bucket.bucket());
        if bucket == self.default_bucket.bucket() {
            self.default_bucket.ensure(self.blobs.as_ref())?;
        }
        Ok(bucket.to_string())
    }

    /// The configured default bucket, created on first use.
    fn bucket_for_inline(&self) -> Result<String> {
        self.default_bucket.ensure(self.blobs.as_ref())?;
        Ok(self.default_bucket.bucket().to_string())
    }
}

fn source_of(document: &Document) -> Result<Source<'_>> {
    if let Some(manifest) = &document.latex_manifest {
        manifest.validate()?;
        return Ok(Source::Bundle(manifest));
    }
    match document.metadata.latex.as_deref() {
        Some(latex) => Ok(Source::Inline(latex)),
        None => Err(BundleError::ManifestInvalid(format!(
            "document {} has no LaTeX manifest",
            document.id
        ))),
    }
}
