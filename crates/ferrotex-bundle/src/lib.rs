//! # FerroTeX Bundle
//!
//! Resolution and packaging of multi-file LaTeX bundles kept in object storage.
//!
//! ## Overview
//!
//! A bundle is a set of LaTeX sources, bibliographies and figures stored under a
//! common prefix and described by a [`Manifest`]. This crate turns such a bundle
//! into the views an editor needs:
//!
//! - a single flattened source with every `\input`/`\include`/`\subfile` spliced in
//! - a synthesized "References" section from the bundle's `.bib` files
//! - a self-contained package of source plus assets for compilation or download
//! - resolution of extension-less, case-mismatched file requests
//!
//! ## Modules
//!
//! - [`service`] - [`BundleService`], the facade over the stores
//! - [`expand`] - include expansion with cycle and depth guards
//! - [`references`] - reference section building
//! - [`assets`] - figure ownership checks and collection
//! - [`resolve`] - bundle file lookup
//! - [`storage`] / [`documents`] - the store traits and in-memory/filesystem backends
//! - [`manifest`], [`paths`], [`config`], [`error`], [`ir`] - supporting types
//!
//! ## Design Philosophy
//!
//! - **Lenient reads**: a missing include or an unparsable bib entry degrades
//!   the output, it never fails the request
//! - **Strict packaging**: a package is either complete or refused with every
//!   problem listed
//! - **Pluggable storage**: all I/O goes through [`BlobStore`] and [`DocumentStore`]

pub mod assets;
pub mod config;
pub mod documents;
pub mod error;
pub mod expand;
pub mod ir;
pub mod manifest;
pub mod paths;
pub mod references;
pub mod resolve;
pub mod service;
pub mod storage;

pub use assets::{validate_assets, AssetCollector, MissingAsset, MissingAssetKind, PackageFile};
pub use config::BundleConfig;
pub use documents::{Document, DocumentStore, MemoryDocumentStore};
pub use error::{BundleError, ErrorKind, Result};
pub use expand::{expand_includes, Expansion, IncludeExpander};
pub use manifest::{Manifest, ManifestFile};
pub use references::{build_reference_section, ReferenceSection};
pub use resolve::{resolve_bundle_file, ResolvedBundleFile};
pub use service::{BundlePackage, BundleService, Preview};
pub use storage::{BlobStore, BucketGuard, FsBlobStore, MemoryBlobStore, StorageError};
