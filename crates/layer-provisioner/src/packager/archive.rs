//! Archive strategies for the build source package.
//!
//! Both formats are written in memory and are deterministic: entries in path
//! order, fixed timestamps, fixed permissions. Identical packages produce
//! identical bytes.

use std::io::{Cursor, Write};
use std::str::FromStr;

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::BuildSourcePackage;
use crate::domain::ProvisionError;

/// Serialized form of the build source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// What S3-sourced build projects consume
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar-gz",
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    pub fn archiver(&self) -> Box<dyn Archiver> {
        match self {
            ArchiveFormat::Zip => Box::new(ZipArchiver),
            ArchiveFormat::TarGz => Box::new(TarGzArchiver),
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar-gz" | "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => Err(ProvisionError::Config(format!(
                "unknown archive format {other:?} (expected zip or tar-gz)"
            ))),
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns a source package into a single archive.
pub trait Archiver: Send + Sync {
    fn format(&self) -> ArchiveFormat;

    fn archive(&self, package: &BuildSourcePackage) -> std::io::Result<Vec<u8>>;
}

/// Deflated zip, timestamps pinned to the zip epoch (1980-01-01).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn archive(&self, package: &BuildSourcePackage) -> std::io::Result<Vec<u8>> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(0o644);

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, contents) in package.files() {
            writer.start_file(path.as_str(), options)?;
            writer.write_all(contents.as_bytes())?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Gzipped tar with zero mtimes and root ownership.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::TarGz
    }

    fn archive(&self, package: &BuildSourcePackage) -> std::io::Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in package.files() {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            builder.append_data(&mut header, path, contents.as_bytes())?;
        }
        builder.into_inner()?.finish()
    }
}
