mod pool;
mod sink;

use std::fs::{self, File, Metadata};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub use pool::ObjectPool;
pub use sink::{SpillBuffer, DEFAULT_BUF_SIZE, OVERFLOW_PREFIX};

use crate::compress::{validate_level, Compressor, CompressorFactory};
use crate::error::{PzipError, Result};
use crate::format::consts::{FLAG_DATA_DESCRIPTOR, ZIP_VERSION_20};
use crate::format::writer::ZipWriter;
use crate::format::{header_name, is_compressed_file, FileHeader, Method};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Reusable staging record for one archive entry.
///
/// Owns the entry's header, the spill sink for compressed bytes, and a
/// resettable compressor. Acquired from an [`ObjectPool`], compressed
/// by a fan-out worker, serialized by the single write worker, then
/// closed and recycled.
pub struct Object {
    path: PathBuf,
    meta: Option<Metadata>,
    link: Option<String>,
    level: i32,
    compress_min_size: u64,
    header: FileHeader,
    sink: SpillBuffer,
    compressor: Option<Box<dyn Compressor>>,
    compressor_level: i32,
}

impl Object {
    fn new(buf_size: usize) -> Self {
        Self {
            path: PathBuf::new(),
            meta: None,
            link: None,
            level: 0,
            compress_min_size: 0,
            header: FileHeader::default(),
            sink: SpillBuffer::with_capacity(buf_size),
            compressor: None,
            compressor_level: i32::MIN,
        }
    }

    /// Re-arms the object for a new entry: reads the symlink target if
    /// any, rebuilds the header from metadata, clears the sink, and
    /// installs or keeps the compressor for `level`.
    fn reset(
        &mut self,
        path: &Path,
        meta: Metadata,
        level: i32,
        root: &Path,
        factory: &CompressorFactory,
    ) -> Result<()> {
        validate_level(level)?;

        self.link = if meta.file_type().is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| PzipError::from(e).with_context(format!("read link {path:?}")))?;
            Some(target.to_string_lossy().into_owned())
        } else {
            None
        };

        self.header = FileHeader::from_metadata(header_name(path), &meta);
        self.path = path.to_path_buf();
        self.meta = Some(meta);
        self.level = level;
        self.sink.reset(root);
        self.compress_min_size = if level > 6 { 44 } else { 128 };

        if self.compressor.is_none() || self.compressor_level != level {
            self.compressor = Some(factory(SpillBuffer::placeholder(), level)?);
            self.compressor_level = level;
        }
        Ok(())
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total compressed bytes captured by the sink so far.
    pub fn written(&self) -> u64 {
        self.sink.written()
    }

    pub fn overflowed(&self) -> bool {
        self.sink.overflowed()
    }

    fn is_dir(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.is_dir())
    }

    /// Finalizes the header fields that do not depend on payload bytes:
    /// UTF-8 flag, extended timestamp, version forcing, directory and
    /// symlink shaping, and the store-vs-deflate election.
    pub fn prepare_header(&mut self) -> Result<()> {
        self.header.apply_utf8_flag();
        self.header.append_extended_timestamp();

        // Preserve the host byte of creatorVersion; sizes and CRC land
        // in the local header directly, so no data descriptor.
        self.header.creator_version = (self.header.creator_version & 0xff00) | ZIP_VERSION_20;
        self.header.reader_version = ZIP_VERSION_20;
        self.header.flags &= !FLAG_DATA_DESCRIPTOR;

        if self.is_dir() {
            if !self.header.name.ends_with('/') {
                self.header.name.push('/');
            }
            self.header.method = Method::Store;
            self.header.compressed_size64 = 0;
            self.header.uncompressed_size64 = 0;
            return Ok(());
        }

        if let Some(link) = &self.link {
            self.header.uncompressed_size64 = link.len() as u64;
        }

        if self.header.uncompressed_size64 <= self.compress_min_size
            || is_compressed_file(&self.path)
        {
            self.header.method = Method::Store;
        } else {
            self.header.method = Method::Deflate;
        }
        Ok(())
    }

    /// Runs header preparation and captures the entry's payload:
    /// CRC-only for stored entries, compressor + CRC tee for deflated
    /// ones. Fills `crc32` and `compressed_size64`.
    pub fn compress(&mut self) -> Result<()> {
        self.prepare_header()?;

        if self.is_dir() {
            return Ok(());
        }

        tracing::trace!(name = %self.header.name, method = ?self.header.method, "compressing entry");
        match self.header.method {
            Method::Store => self.store(),
            Method::Deflate => self.deflate(),
        }
    }

    fn store(&mut self) -> Result<()> {
        let mut crc = crc32fast::Hasher::new();
        if let Some(link) = &self.link {
            crc.update(link.as_bytes());
        } else {
            let mut file = open_for_entry(&self.path)?;
            let mut buf = vec![0u8; READ_BUF_SIZE];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                crc.update(&buf[..n]);
            }
        }
        self.header.compressed_size64 = self.header.uncompressed_size64;
        self.header.crc32 = crc.finalize();
        Ok(())
    }

    fn deflate(&mut self) -> Result<()> {
        let compressor = self
            .compressor
            .as_mut()
            .ok_or(PzipError::InvalidState("object has no compressor"))?;

        // The sink moves into the compressor for the run and comes back
        // on the trailing reset; a placeholder parks the compressor in
        // between.
        let sink = std::mem::replace(&mut self.sink, SpillBuffer::placeholder());
        let _ = compressor.reset(sink)?;

        let mut crc = crc32fast::Hasher::new();
        let run = (|| -> Result<()> {
            if let Some(link) = &self.link {
                crc.update(link.as_bytes());
                compressor.write_all(link.as_bytes())?;
            } else {
                let mut file = open_for_entry(&self.path)?;
                let mut buf = vec![0u8; READ_BUF_SIZE];
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    crc.update(&buf[..n]);
                    compressor.write_all(&buf[..n])?;
                }
            }
            compressor.finish().map_err(|e| {
                PzipError::from(e).with_context(format!("close compressor for {:?}", self.path))
            })
        })();
        self.sink = compressor.reset(SpillBuffer::placeholder())?;
        run?;

        self.header.compressed_size64 = self.sink.written();
        self.header.crc32 = crc.finalize();
        Ok(())
    }

    /// Serializes the entry through `writer`: local header first, then
    /// the payload (nothing for directories, raw file bytes for stored
    /// entries, the captured sink for deflated ones). Called only by
    /// the single write worker.
    pub fn archive<W: Write>(&mut self, writer: &mut ZipWriter<W>) -> Result<()> {
        let mut entry = writer
            .create_raw(&mut self.header)
            .map_err(|e| e.with_context(format!("create raw for {:?}", self.path)))?;

        if self.is_dir() {
            return Ok(());
        }

        if self.header.method == Method::Store {
            if let Some(link) = &self.link {
                entry.write_all(link.as_bytes()).map_err(|e| {
                    PzipError::from(e).with_context(format!("store {:?}", self.path))
                })?;
                return Ok(());
            }
            let mut file = open_for_entry(&self.path)?;
            std::io::copy(&mut file, &mut entry)
                .map_err(|e| PzipError::from(e).with_context(format!("store {:?}", self.path)))?;
        } else {
            self.sink.copy_to(&mut entry).map_err(|e| {
                PzipError::from(e)
                    .with_context(format!("write compressed data for {:?}", self.path))
            })?;
        }
        Ok(())
    }

    /// Releases the overflow file (closing and unlinking it) and the
    /// buffered bytes. Runs on every completion path, success or error.
    pub fn close(&mut self) {
        self.sink.release();
    }
}

fn open_for_entry(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| PzipError::from(e).with_context(format!("open {path:?}")))
}
