use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::checksum::combined_checksum;
use super::fs::{CopyTarget, ExtractFs, StdFs};
use super::http::HttpClient;
use super::{Result, SourceError, SourceFetcher};

/// File name the downloaded archive is stored under
pub const SOURCE_FILENAME: &str = "source.zip";

/// Directory below the destination that entries are extracted into
pub const FILES_DIR: &str = "files";

/// Entries are streamed through a buffer of this size
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Extracted entries with their digests, positionally aligned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub files: Vec<PathBuf>,
    pub checksums: Vec<String>,
}

/// Extract every entry of `source` below `destination`, hashing each one.
///
/// Entries are streamed chunk by chunk into the digest and the target file;
/// no entry is held in memory whole.
///
/// Any entry failure fails the whole extraction; files already written stay
/// on disk but are not reported.
pub fn unzip(source: &Path, destination: &Path, fs: &dyn ExtractFs) -> Result<Extracted> {
    debug!(?source, ?destination, "Extracting archive");

    let reader = std::fs::File::open(source)?;
    let mut archive = ::zip::ZipArchive::new(reader)
        .map_err(|e| SourceError::InvalidArchive(format!("{}: {}", source.display(), e)))?;

    let mut extracted = Extracted::default();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| SourceError::InvalidArchive(format!("entry {}: {}", index, e)))?;

        let path = match entry.enclosed_name() {
            Some(name) => destination.join(name),
            None => {
                warn!(name = entry.name(), "Skipping entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            fs.create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs.create_dir_all(parent)?;
        }

        let mut hasher = Sha256::new();
        let mut file = fs.create_entry_file(&path)?;

        loop {
            let read = match entry.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SourceError::InvalidArchive(format!("{}: {}", path.display(), e)));
                }
            };
            let chunk = &buffer[..read];
            fs.copy(CopyTarget::Digest, &mut &chunk[..], &mut hasher)?;
            fs.copy(CopyTarget::File, &mut &chunk[..], &mut *file)?;
        }
        file.flush()?;

        extracted.files.push(path);
        extracted.checksums.push(format!("{:x}", hasher.finalize()));
    }

    info!(?source, extracted_count = extracted.files.len(), "Archive extracted");
    Ok(extracted)
}

/// Zip archive fetched over HTTP
pub struct ZipSource {
    url: String,
    dest: PathBuf,
    files: Vec<PathBuf>,
    checksum: String,
    http: HttpClient,
    fs: Arc<dyn ExtractFs>,
}

impl ZipSource {
    pub fn new(url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            url: url.into(),
            dest: PathBuf::new(),
            files: Vec::new(),
            checksum: String::new(),
            http,
            fs: Arc::new(StdFs),
        }
    }

    /// Replace the filesystem strategy
    pub fn with_fs(mut self, fs: Arc<dyn ExtractFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Destination of the last successful `prepare_files`
    pub fn destination(&self) -> &Path {
        &self.dest
    }
}

#[async_trait]
impl SourceFetcher for ZipSource {
    async fn prepare_files(&mut self, destination: &Path) -> Result<()> {
        self.fs.create_dir_all(destination)?;

        let archive_path = destination.join(SOURCE_FILENAME);
        self.http
            .download_to(&self.url, &archive_path, self.fs.clone())
            .await?;

        let files_dir = destination.join(FILES_DIR);
        let fs = self.fs.clone();
        let extracted = spawn_blocking(move || unzip(&archive_path, &files_dir, fs.as_ref()))
            .await
            .map_err(|e| SourceError::Join(e.to_string()))??;

        self.checksum = combined_checksum(&extracted.checksums);
        self.files = extracted.files;
        self.dest = destination.to_path_buf();

        info!(url = %self.url, checksum = %self.checksum, files = self.files.len(), "Source prepared");
        Ok(())
    }

    fn checksum(&self) -> &str {
        &self.checksum
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }
}
