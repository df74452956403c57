use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hands a finished payload to the operator as a named file.
pub trait Downloader {
    /// Returns where the file ended up.
    fn trigger_download(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf, DownloadError>;
}

/// Saves downloads into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectoryDownloader {
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Downloader for DirectoryDownloader {
    fn trigger_download(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf, DownloadError> {
        // Only a bare file name may land in the download directory.
        let bare = Path::new(file_name).file_name().and_then(|n| n.to_str());
        if bare != Some(file_name) {
            return Err(DownloadError::InvalidFileName(file_name.to_string()));
        }

        let path = self.dir.join(file_name);
        let write_err = |source| DownloadError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(write_err)?;
        std::fs::write(&path, bytes).map_err(write_err)?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "download saved");
        Ok(path)
    }
}
