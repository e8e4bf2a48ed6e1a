//! Filesystem strategy used while materialising an archive

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Destination of a byte copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyTarget {
    /// Downloaded archive on disk
    Download,
    /// Per-entry digest accumulator
    Digest,
    /// Extracted entry on disk
    File,
}

/// File operations performed by [`super::ZipSource`].
///
/// Every method defaults to the standard library; substitutes override only
/// the operations they need to change.
pub trait ExtractFs: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    /// Create the local file the archive is downloaded into
    fn create_archive_file(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(path)?))
    }

    /// Create the destination file of an extracted entry
    fn create_entry_file(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(path)?))
    }

    fn copy(&self, _target: CopyTarget, reader: &mut dyn Read, writer: &mut dyn Write) -> io::Result<u64> {
        io::copy(reader, writer)
    }
}

/// Plain standard-library filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl ExtractFs for StdFs {}
