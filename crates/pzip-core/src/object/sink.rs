use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Prefix for per-entry overflow files created inside the archive's
/// sibling temp directory.
pub const OVERFLOW_PREFIX: &str = "pzip-overflow";

/// Default in-memory capacity per entry: 2 MiB.
pub const DEFAULT_BUF_SIZE: usize = 1 << 21;

/// Byte sink for one entry's compressed output.
///
/// Fills a fixed-capacity in-memory buffer first and spills the
/// remainder into a lazily created temp file. The caller always
/// observes a full write; `written` tracks the total across both
/// destinations.
#[derive(Debug)]
pub struct SpillBuffer {
    root: PathBuf,
    buf: Vec<u8>,
    cap: usize,
    overflow: Option<NamedTempFile>,
    written: u64,
}

impl SpillBuffer {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            root: PathBuf::new(),
            buf: Vec::with_capacity(cap),
            cap,
            overflow: None,
            written: 0,
        }
    }

    /// Zero-capacity stand-in used to park a compressor between runs.
    pub fn placeholder() -> Self {
        Self {
            root: PathBuf::new(),
            buf: Vec::new(),
            cap: 0,
            overflow: None,
            written: 0,
        }
    }

    /// Re-arms the sink for a new entry. The in-memory buffer keeps its
    /// allocation; any previous overflow file is dropped (and thereby
    /// unlinked).
    pub fn reset(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.buf.clear();
        self.overflow = None;
        self.written = 0;
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn overflowed(&self) -> bool {
        self.overflow.is_some()
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Streams the captured bytes (buffer, then overflow file from the
    /// start) into `w`.
    pub fn copy_to<W: Write>(&mut self, w: &mut W) -> io::Result<u64> {
        w.write_all(&self.buf)?;
        let mut copied = self.buf.len() as u64;
        if let Some(overflow) = self.overflow.as_mut() {
            let file = overflow.as_file_mut();
            file.flush()?;
            file.seek(SeekFrom::Start(0))?;
            copied += io::copy(file, w)?;
        }
        Ok(copied)
    }

    /// Drops the overflow file (unlinking it) and empties the buffer
    /// while keeping its allocation for reuse.
    pub fn release(&mut self) {
        self.overflow = None;
        self.buf.clear();
        self.written = 0;
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let total = data.len();
        let mut rest = data;

        let available = self.cap.saturating_sub(self.buf.len());
        if available > 0 {
            let take = available.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            self.written += take as u64;
            rest = &rest[take..];
        }

        if !rest.is_empty() {
            if self.overflow.is_none() {
                let file = tempfile::Builder::new()
                    .prefix(OVERFLOW_PREFIX)
                    .tempfile_in(&self.root)?;
                self.overflow = Some(file);
            }
            if let Some(overflow) = self.overflow.as_mut() {
                overflow.as_file_mut().write_all(rest)?;
                self.written += rest.len() as u64;
            }
        }

        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(overflow) = self.overflow.as_mut() {
            overflow.as_file_mut().flush()?;
        }
        Ok(())
    }
}
