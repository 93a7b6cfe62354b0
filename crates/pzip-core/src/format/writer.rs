use std::io::{self, Write};

use super::consts::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, EOCD_LEN, EOCD_SIGNATURE, LOCAL_HEADER_LEN,
    LOCAL_HEADER_SIGNATURE, UINT16_MAX, UINT32_MAX, ZIP64_EOCD_LEN, ZIP64_EOCD_LOCATOR_LEN,
    ZIP64_EOCD_LOCATOR_SIGNATURE, ZIP64_EOCD_SIGNATURE, ZIP64_EXTRA_ID, ZIP_VERSION_45,
};
use super::fields::WriteBuf;
use super::header::FileHeader;
use crate::error::{PzipError, Result};

/// Write-through counter; `count` is the stream offset recorded into
/// central directory entries.
#[derive(Debug)]
pub struct CountWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write> Write for CountWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// 32-bit projections of the sizes and offset as they appear in the
/// fixed header fields. Promoted fields carry the `0xFFFFFFFF`
/// sentinel and the real values live in the ZIP64 extra block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Projections {
    offset32: u32,
    compressed32: u32,
    uncompressed32: u32,
}

struct DirEntry {
    header: FileHeader,
    offset: u64,
    proj: Projections,
}

/// Serializes ZIP local file headers as entries arrive and the central
/// directory plus end records on close.
///
/// The writer is fed by a single consumer; payload bytes go through the
/// writer returned by [`ZipWriter::create_raw`]. Callers hand in an
/// already-buffered sink (`BufWriter` over the staged output file).
pub struct ZipWriter<W: Write> {
    cw: CountWriter<W>,
    dir: Vec<DirEntry>,
    comment: String,
    closed: bool,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            cw: CountWriter::new(inner),
            dir: Vec::new(),
            comment: String::new(),
            closed: false,
        }
    }

    /// Bytes emitted so far.
    pub fn count(&self) -> u64 {
        self.cw.count()
    }

    /// Sets the end-of-central-directory comment. Only valid before
    /// [`ZipWriter::close`].
    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        let comment = comment.into();
        if comment.len() as u64 > UINT16_MAX {
            return Err(PzipError::InvalidHeader("archive comment too long"));
        }
        self.comment = comment;
        Ok(())
    }

    /// Emits the local file header for `header` (whose sizes and CRC
    /// must already be final) and returns a writer for the payload
    /// bytes, which are copied through uncompressed.
    ///
    /// ZIP64 promotion happens here: `header` gains the extra block and
    /// the reader version bump, so the caller's copy matches what the
    /// central directory will record.
    pub fn create_raw(&mut self, header: &mut FileHeader) -> Result<EntryWriter<'_, W>> {
        if self.closed {
            return Err(PzipError::InvalidState("zip writer is closed"));
        }
        if self.dir.last().is_some_and(|e| e.header.name == header.name) {
            return Err(PzipError::DuplicateHeader);
        }

        let offset = self.cw.count();
        let proj = promote_zip64(header, offset);

        if header.name.len() as u64 > UINT16_MAX {
            return Err(PzipError::InvalidHeader("header name too long"));
        }
        if header.extra.len() as u64 > UINT16_MAX {
            return Err(PzipError::InvalidHeader("header extra too long"));
        }
        if header.comment.len() as u64 > UINT16_MAX {
            return Err(PzipError::InvalidHeader("header comment too long"));
        }

        // APPNOTE 4.3.7, local file header.
        let mut raw = [0u8; LOCAL_HEADER_LEN];
        let mut b = WriteBuf::new(&mut raw);
        b.put_u32(LOCAL_HEADER_SIGNATURE);
        b.put_u16(header.reader_version);
        b.put_u16(header.flags);
        b.put_u16(header.method.as_u16());
        b.put_u16(header.modified_time);
        b.put_u16(header.modified_date);
        b.put_u32(header.crc32);
        b.put_u32(proj.compressed32);
        b.put_u32(proj.uncompressed32);
        b.put_u16(header.name.len() as u16);
        b.put_u16(header.extra.len() as u16);
        self.cw.write_all(&raw)?;
        self.cw.write_all(header.name.as_bytes())?;
        self.cw.write_all(&header.extra)?;

        let is_dir = header.name.ends_with('/');
        self.dir.push(DirEntry {
            header: header.clone(),
            offset,
            proj,
        });

        if is_dir {
            Ok(EntryWriter::Directory)
        } else {
            Ok(EntryWriter::Payload(&mut self.cw))
        }
    }

    /// Writes the central directory, the ZIP64 end records when any
    /// limit is exceeded, and the end-of-central-directory record.
    /// Closing twice is an error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(PzipError::InvalidState("zip writer closed twice"));
        }
        self.closed = true;

        let start = self.cw.count();

        // APPNOTE 4.3.12, central directory structure.
        for entry in &self.dir {
            let h = &entry.header;
            let mut raw = [0u8; CENTRAL_HEADER_LEN];
            let mut b = WriteBuf::new(&mut raw);
            b.put_u32(CENTRAL_HEADER_SIGNATURE);
            b.put_u16(h.creator_version);
            b.put_u16(h.reader_version);
            b.put_u16(h.flags);
            b.put_u16(h.method.as_u16());
            b.put_u16(h.modified_time);
            b.put_u16(h.modified_date);
            b.put_u32(h.crc32);
            b.put_u32(entry.proj.compressed32);
            b.put_u32(entry.proj.uncompressed32);
            b.put_u16(h.name.len() as u16);
            b.put_u16(h.extra.len() as u16);
            b.put_u16(h.comment.len() as u16);
            b.skip(4); // disk number start + internal attrs stay zero
            b.put_u32(h.external_attrs);
            b.put_u32(entry.proj.offset32);
            self.cw.write_all(&raw)?;
            self.cw.write_all(h.name.as_bytes())?;
            self.cw.write_all(&h.extra)?;
            self.cw.write_all(h.comment.as_bytes())?;
        }
        let end = self.cw.count();

        let mut records = self.dir.len() as u64;
        let mut size = end - start;
        let mut offset = start;

        if records >= UINT16_MAX || size >= UINT32_MAX || offset >= UINT32_MAX {
            // APPNOTE 4.3.14 + 4.3.15, ZIP64 end of central directory
            // record and locator.
            let mut raw = [0u8; ZIP64_EOCD_LEN + ZIP64_EOCD_LOCATOR_LEN];
            let mut b = WriteBuf::new(&mut raw);
            b.put_u32(ZIP64_EOCD_SIGNATURE);
            b.put_u64((ZIP64_EOCD_LEN - 12) as u64); // length minus signature and this field
            b.put_u16(ZIP_VERSION_45); // version made by
            b.put_u16(ZIP_VERSION_45); // version needed to extract
            b.put_u32(0); // number of this disk
            b.put_u32(0); // disk with the start of the central directory
            b.put_u64(records); // entries on this disk
            b.put_u64(records); // entries total
            b.put_u64(size);
            b.put_u64(offset);

            b.put_u32(ZIP64_EOCD_LOCATOR_SIGNATURE);
            b.put_u32(0); // disk with the ZIP64 EOCD
            b.put_u64(end); // ZIP64 EOCD offset
            b.put_u32(1); // total disks
            self.cw.write_all(&raw)?;

            // Sentinels in the regular end record signal that the
            // ZIP64 values are authoritative.
            records = UINT16_MAX;
            size = UINT32_MAX;
            offset = UINT32_MAX;
        }

        // APPNOTE 4.3.16, end of central directory record.
        let mut raw = [0u8; EOCD_LEN];
        let mut b = WriteBuf::new(&mut raw);
        b.put_u32(EOCD_SIGNATURE);
        b.skip(4); // disk number + first disk number stay zero
        b.put_u16(records as u16);
        b.put_u16(records as u16);
        b.put_u32(size as u32);
        b.put_u32(offset as u32);
        b.put_u16(self.comment.len() as u16);
        self.cw.write_all(&raw)?;
        self.cw.write_all(self.comment.as_bytes())?;

        self.cw.flush()?;
        Ok(())
    }

    /// Flushes buffered bytes to the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.cw.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.cw.inner
    }
}

/// Payload writer handed out per entry. Directory entries get a
/// sentinel that rejects any payload bytes.
pub enum EntryWriter<'a, W: Write> {
    Payload(&'a mut CountWriter<W>),
    Directory,
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntryWriter::Payload(w) => w.write(buf),
            EntryWriter::Directory => {
                if buf.is_empty() {
                    Ok(0)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "write to directory entry",
                    ))
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntryWriter::Payload(w) => w.flush(),
            EntryWriter::Directory => Ok(()),
        }
    }
}

/// Applies ZIP64 promotion in place and returns the 32-bit projections
/// for the fixed header fields. The extra block carries, in order and
/// only when needed: uncompressed size, compressed size, offset.
fn promote_zip64(header: &mut FileHeader, offset: u64) -> Projections {
    let mut proj = Projections {
        offset32: offset as u32,
        compressed32: header.compressed_size64.min(UINT32_MAX) as u32,
        uncompressed32: header.uncompressed_size64.min(UINT32_MAX) as u32,
    };

    if header.is_zip64() || offset >= UINT32_MAX {
        header.reader_version = ZIP_VERSION_45;

        let mut raw = [0u8; 28]; // 2x u16 + 3x u64 at most
        let mut b = WriteBuf::new(&mut raw);
        b.put_u16(ZIP64_EXTRA_ID);
        if header.is_zip64() && offset >= UINT32_MAX {
            b.put_u16(24);
            b.put_u64(header.uncompressed_size64);
            b.put_u64(header.compressed_size64);
            b.put_u64(offset);
            proj.uncompressed32 = UINT32_MAX as u32;
            proj.compressed32 = UINT32_MAX as u32;
            proj.offset32 = UINT32_MAX as u32;
        } else if header.is_zip64() {
            b.put_u16(16);
            b.put_u64(header.uncompressed_size64);
            b.put_u64(header.compressed_size64);
            proj.uncompressed32 = UINT32_MAX as u32;
            proj.compressed32 = UINT32_MAX as u32;
        } else {
            b.put_u16(8);
            b.put_u64(offset);
            proj.offset32 = UINT32_MAX as u32;
        }
        let len = b.position();
        header.extra.extend_from_slice(&raw[..len]);
    }

    proj
}

/// Alternate promotion strategy building the extra block by appending
/// to a growable buffer. Kept to pin the fixed-buffer strategy: both
/// must produce bitwise-identical header records.
#[cfg(test)]
fn promote_zip64_by_append(header: &mut FileHeader, offset: u64) -> Projections {
    let mut proj = Projections {
        offset32: offset as u32,
        compressed32: header.compressed_size64.min(UINT32_MAX) as u32,
        uncompressed32: header.uncompressed_size64.min(UINT32_MAX) as u32,
    };

    if header.is_zip64() || offset >= UINT32_MAX {
        header.reader_version = ZIP_VERSION_45;

        let mut data: Vec<u8> = Vec::with_capacity(24);
        if header.is_zip64() {
            data.extend_from_slice(&header.uncompressed_size64.to_le_bytes());
            data.extend_from_slice(&header.compressed_size64.to_le_bytes());
            proj.uncompressed32 = UINT32_MAX as u32;
            proj.compressed32 = UINT32_MAX as u32;
        }
        if offset >= UINT32_MAX {
            data.extend_from_slice(&offset.to_le_bytes());
            proj.offset32 = UINT32_MAX as u32;
        }

        let mut block: Vec<u8> = Vec::with_capacity(data.len() + 4);
        block.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
        block.extend_from_slice(&(data.len() as u16).to_le_bytes());
        block.extend_from_slice(&data);
        header.extra.extend_from_slice(&block);
    }

    proj
}
