//! Gzip-compressed tar archive assembly.
//!
//! The archive is built fully in memory: entries are appended in the order they
//! arrive, the stream is finished, and the result is read back once to confirm
//! that every header records exactly the bytes that were supplied. Only a
//! verified [`Archive`] can reach the uploader.

use std::io::Read;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::error::{ArchiverError, ArchiverResult};

/// One file to be placed in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    path: String,
    data: Bytes,
    declared_size: u64,
}

impl ArchiveEntry {
    /// An entry whose declared size is the length of `data`.
    #[must_use]
    pub fn new(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            path: path.into(),
            declared_size: data.len() as u64,
            data,
        }
    }

    /// Override the declared size, e.g. with a `Content-Length` announced by the server.
    #[must_use]
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }

    /// Relative, forward-slash path inside the archive.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Entry content.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The size the entry claims to have.
    #[must_use]
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Actual content length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Path and size of an entry stored in a finished [`Archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    /// Path inside the archive.
    pub path: String,
    /// Size recorded in the tar header.
    pub size: u64,
}

/// Incrementally builds a `.tar.gz` archive.
pub struct ArchiveBuilder {
    builder: tar::Builder<GzEncoder<Vec<u8>>>,
    appended: Vec<ArchivedFile>,
    mtime: u64,
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("appended", &self.appended)
            .field("mtime", &self.mtime)
            .finish_non_exhaustive()
    }
}

impl ArchiveBuilder {
    /// Start an empty archive whose entries carry `mtime` as modification time.
    #[must_use]
    pub fn new(mtime: DateTime<Utc>) -> Self {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        Self {
            builder: tar::Builder::new(encoder),
            appended: Vec::new(),
            mtime: u64::try_from(mtime.timestamp()).unwrap_or_default(),
        }
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.appended.len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appended.is_empty()
    }

    /// Append `entry` at the end of the archive.
    ///
    /// Duplicate paths are not detected.
    ///
    /// # Errors
    ///
    /// - [`ArchiverError::ArchiveCorruption`] if the declared size differs from the content
    /// - [`ArchiverError::Io`] if the path cannot be stored in a tar header
    pub fn append(&mut self, entry: &ArchiveEntry) -> ArchiverResult<()> {
        let actual = entry.len();
        if entry.declared_size() != actual {
            return Err(ArchiverError::ArchiveCorruption {
                path: entry.path().to_owned(),
                declared: entry.declared_size(),
                actual,
            });
        }

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(actual);
        header.set_mode(0o644);
        header.set_mtime(self.mtime);
        self.builder
            .append_data(&mut header, entry.path(), entry.data().as_ref())?;

        debug!(path = %entry.path(), size = actual, "Appended archive entry");
        self.appended.push(ArchivedFile {
            path: entry.path().to_owned(),
            size: actual,
        });
        Ok(())
    }

    /// Flush the tar and gzip streams and verify the result.
    ///
    /// # Errors
    ///
    /// - [`ArchiverError::Io`] if either stream cannot be finished
    /// - [`ArchiverError::ArchiveCorruption`] if the archive does not read back
    ///   with the entries and sizes that were appended
    pub fn finish(self) -> ArchiverResult<Archive> {
        let encoder = self.builder.into_inner()?;
        let bytes = Bytes::from(encoder.finish()?);

        let archive = Archive {
            bytes,
            entries: self.appended,
        };
        archive.verify()?;
        Ok(archive)
    }
}

/// A finished, verified `.tar.gz` archive.
#[derive(Debug, Clone)]
pub struct Archive {
    bytes: Bytes,
    entries: Vec<ArchivedFile>,
}

impl Archive {
    /// Open an existing `.tar.gz`, such as a local copy written by an earlier run.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Io`] if `bytes` is not a readable gzip-compressed tar.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> ArchiverResult<Self> {
        let mut archive = Self {
            bytes: bytes.into(),
            entries: Vec::new(),
        };
        archive.entries = archive
            .extract()?
            .iter()
            .map(|entry| ArchivedFile {
                path: entry.path().to_owned(),
                size: entry.len(),
            })
            .collect();
        Ok(archive)
    }

    /// Compressed archive bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Total compressed length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the archive has no bytes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Entries in archive order.
    #[must_use]
    pub fn entries(&self) -> &[ArchivedFile] {
        &self.entries
    }

    /// Number of files in the archive.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Decompress and read back every entry.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiverError::Io`] if the stream cannot be decoded.
    pub fn extract(&self) -> ArchiverResult<Vec<ArchiveEntry>> {
        let mut tar = tar::Archive::new(GzDecoder::new(self.bytes.as_ref()));
        let mut out = Vec::with_capacity(self.entries.len());
        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let declared = entry.header().size()?;
            let mut data = Vec::with_capacity(usize::try_from(declared).unwrap_or_default());
            entry.read_to_end(&mut data)?;
            out.push(ArchiveEntry::new(path, data).with_declared_size(declared));
        }
        Ok(out)
    }

    fn verify(&self) -> ArchiverResult<()> {
        let extracted = self.extract()?;
        if extracted.len() != self.entries.len() {
            return Err(anyhow::anyhow!(
                "archive holds {} entries, expected {}",
                extracted.len(),
                self.entries.len()
            )
            .into());
        }
        for (expected, found) in self.entries.iter().zip(&extracted) {
            if found.path() != expected.path
                || found.declared_size() != expected.size
                || found.len() != expected.size
            {
                return Err(ArchiverError::ArchiveCorruption {
                    path: expected.path.clone(),
                    declared: expected.size,
                    actual: found.len(),
                });
            }
        }
        Ok(())
    }
}
