//! Source packager: synthesizes the tiny build project and archives it.
//!
//! No network access and no filesystem writes. The same recipe always
//! yields the same archive bytes, so the digest identifies the build input.

pub mod archive;
pub mod buildspec;

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

pub use archive::{ArchiveFormat, Archiver, TarGzArchiver, ZipArchiver};
pub use buildspec::{render_buildspec, render_manifest};

use crate::domain::{ProvisionError, Result};

/// Build instructions file name expected by the build service.
pub const BUILDSPEC_FILE: &str = "buildspec.yml";
/// Package manifest file name.
pub const MANIFEST_FILE: &str = "package.json";
/// 10 MiB ceiling on the curated data files shipped in the layer.
pub const DATA_BUDGET_BYTES: u64 = 10 * 1024 * 1024;

/// What native module to build and which of its files the layer keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRecipe {
    pub module_name: String,
    /// Exact version, never a range
    pub module_version: String,
    pub node_major: u32,
    /// Directory of platform data files inside the module
    pub data_dir: String,
    /// Curated subset of `data_dir` shipped in the layer
    pub data_files: Vec<String>,
    /// Library code copied verbatim, relative to the module root
    pub library_paths: Vec<String>,
    pub data_budget_bytes: u64,
    /// File the build declares as its artifact
    pub output_file: String,
}

impl Default for LayerRecipe {
    fn default() -> Self {
        Self {
            module_name: "swisseph".to_string(),
            module_version: "0.5.17".to_string(),
            node_major: 18,
            data_dir: "ephe".to_string(),
            data_files: ["sepl_18.se1", "semo_18.se1", "seas_18.se1"]
                .into_iter()
                .map(String::from)
                .collect(),
            library_paths: ["package.json", "lib", "build/Release"]
                .into_iter()
                .map(String::from)
                .collect(),
            data_budget_bytes: DATA_BUDGET_BYTES,
            output_file: "layer.zip".to_string(),
        }
    }
}

impl LayerRecipe {
    /// Human-readable layer description, e.g. `swisseph 0.5.17 (source sha256 ab12...)`.
    pub fn layer_description(&self, source_digest: &str) -> String {
        format!(
            "{} {} (source sha256 {})",
            self.module_name, self.module_version, source_digest
        )
    }
}

/// Relative path to text contents, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSourcePackage {
    files: BTreeMap<String, String>,
}

impl BuildSourcePackage {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

/// A serialized build source, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedSource {
    pub archive: Vec<u8>,
    /// Lowercase hex SHA-256 of `archive`
    pub digest: String,
    pub format: ArchiveFormat,
}

/// Produces the build source package with a swappable archive strategy.
pub struct SourcePackager {
    archiver: Box<dyn Archiver>,
}

impl std::fmt::Debug for SourcePackager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePackager")
            .field("format", &self.archiver.format())
            .finish()
    }
}

impl Default for SourcePackager {
    fn default() -> Self {
        Self::new(ArchiveFormat::Zip)
    }
}

impl SourcePackager {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            archiver: format.archiver(),
        }
    }

    pub fn with_archiver(archiver: Box<dyn Archiver>) -> Self {
        Self { archiver }
    }

    /// Build instructions plus manifest, in memory.
    pub fn synthesize(&self, recipe: &LayerRecipe) -> Result<BuildSourcePackage> {
        let mut files = BTreeMap::new();
        files.insert(BUILDSPEC_FILE.to_string(), render_buildspec(recipe));
        files.insert(MANIFEST_FILE.to_string(), render_manifest(recipe)?);
        Ok(BuildSourcePackage::new(files))
    }

    /// Synthesize and archive.
    pub fn package(&self, recipe: &LayerRecipe) -> Result<PackagedSource> {
        let package = self.synthesize(recipe)?;
        let archive = self
            .archiver
            .archive(&package)
            .map_err(|e| ProvisionError::Packaging(e.to_string()))?;
        let digest = hex::encode(Sha256::digest(&archive));
        Ok(PackagedSource {
            archive,
            digest,
            format: self.archiver.format(),
        })
    }
}
