use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::ZipArchive;

use crate::compress::{validate_level, CompressorFactory};
use crate::error::{PzipError, Result};
use crate::format::consts::UINT16_MAX;
use crate::format::FileHeader;

/// Include/exclude logic is the caller's; the pipeline only asks
/// whether a path should be skipped.
pub type SkipPredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Invoked by the write worker after each successfully archived entry.
/// Runs on a single thread.
pub type AfterArchiveEntry = Arc<dyn Fn(&FileHeader) + Send + Sync>;

/// Invoked once before extraction starts, with the opened reader.
pub type BeforeExtract = Arc<dyn Fn(&Path, &ZipArchive<File>) + Send + Sync>;

/// Invoked by extraction workers after each materialized entry.
pub type AfterExtractEntry = Arc<dyn Fn(&ExtractEntryInfo, &ExtractTarget) + Send + Sync>;

#[derive(Clone)]
pub struct ArchiveOptions {
    pub files: Vec<PathBuf>,
    /// Compression level in [-2, 9]; -1 is the codec default.
    pub level: i32,
    pub concurrency: usize,
    /// Tree walk when true; a single lstat per input otherwise.
    pub recurse: bool,
    /// Follow symlinks, re-rooting entries under the link's own path.
    pub dereference: bool,
    /// End-of-central-directory comment.
    pub comment: String,
    pub skip: Option<SkipPredicate>,
    pub after: Option<AfterArchiveEntry>,
    /// Replacement DEFLATE codec; the flate2-backed default otherwise.
    pub new_compressor: Option<CompressorFactory>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            level: -1,
            concurrency: 1,
            recurse: true,
            dereference: false,
            comment: String::new(),
            skip: None,
            after: None,
            new_compressor: None,
        }
    }
}

impl ArchiveOptions {
    pub(crate) fn validate(&mut self) -> Result<()> {
        if !self.recurse {
            self.files.retain(|f| f.as_os_str() != ".");
        }
        if self.files.is_empty() {
            return Err(PzipError::InvalidOptions("no files to archive".to_string()));
        }
        if self.concurrency < 1 {
            return Err(PzipError::InvalidOptions(format!(
                "concurrency must be at least 1, got {}",
                self.concurrency
            )));
        }
        if self.comment.len() as u64 > UINT16_MAX {
            return Err(PzipError::InvalidOptions(
                "archive comment too long".to_string(),
            ));
        }
        validate_level(self.level)
    }

    pub(crate) fn skip(&self, path: &Path) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(path))
    }
}

#[derive(Clone)]
pub struct ExtractOptions {
    /// Destination directory; entries land relative to the current
    /// directory when unset.
    pub out_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub skip: Option<SkipPredicate>,
    pub before: Option<BeforeExtract>,
    pub after: Option<AfterExtractEntry>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            out_dir: None,
            concurrency: 1,
            skip: None,
            before: None,
            after: None,
        }
    }
}

impl ExtractOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(PzipError::InvalidOptions(format!(
                "concurrency must be at least 1, got {}",
                self.concurrency
            )));
        }
        Ok(())
    }

    pub(crate) fn skip(&self, path: &Path) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(path))
    }
}

/// What an extraction worker learned about an entry, for callbacks.
#[derive(Debug, Clone)]
pub struct ExtractEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub deflated: bool,
}

/// Where an entry was materialized.
#[derive(Debug, Clone)]
pub struct ExtractTarget {
    pub path: PathBuf,
    pub symlink: Option<String>,
}

impl fmt::Display for ExtractTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(link) = &self.symlink {
            write!(f, " -> {link}")?;
        }
        Ok(())
    }
}

/// Central directory summary of one entry, for listings.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub name: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub deflated: bool,
    pub crc32: u32,
    /// `YYYY-MM-DD HH:MM:SS`, from the entry's DOS timestamp.
    pub modified: String,
}
