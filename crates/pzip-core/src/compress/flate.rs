use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::{validate_level, Compressor};
use crate::error::Result;
use crate::object::SpillBuffer;

/// Raw DEFLATE writer over a [`SpillBuffer`], reusable across entries
/// via [`Compressor::reset`].
pub struct FlateCompressor {
    inner: DeflateEncoder<SpillBuffer>,
}

impl FlateCompressor {
    pub fn new(sink: SpillBuffer, level: i32) -> Result<Self> {
        let level = compression_for_level(level)?;
        Ok(Self {
            inner: DeflateEncoder::new(sink, level),
        })
    }
}

impl Write for FlateCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Compressor for FlateCompressor {
    fn reset(&mut self, sink: SpillBuffer) -> io::Result<SpillBuffer> {
        self.inner.reset(sink)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.inner.try_finish()
    }
}

/// Maps the [-2, 9] level range onto flate2. flate2 has no
/// Huffman-only mode, so -2 falls back to the fastest setting.
fn compression_for_level(level: i32) -> Result<Compression> {
    validate_level(level)?;
    Ok(match level {
        -2 => Compression::fast(),
        -1 => Compression::default(),
        n => Compression::new(n as u32),
    })
}
