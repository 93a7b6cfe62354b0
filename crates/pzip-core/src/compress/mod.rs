mod flate;

use std::io::{self, Write};
use std::sync::Arc;

pub use flate::FlateCompressor;

use crate::error::{PzipError, Result};
use crate::object::SpillBuffer;

/// Streaming raw-DEFLATE writer with replaceable sink.
///
/// The archive pipeline keeps one compressor per pooled object and
/// swaps the object's [`SpillBuffer`] in for each compression run, so
/// the compressor never holds a back-reference to its owner.
pub trait Compressor: Write + Send {
    /// Installs a fresh sink, resetting stream state, and returns the
    /// previous sink.
    fn reset(&mut self, sink: SpillBuffer) -> io::Result<SpillBuffer>;

    /// Flushes the stream epilogue into the current sink. The
    /// compressor must be `reset` before it can be written to again.
    fn finish(&mut self) -> io::Result<()>;
}

/// Factory producing a compressor bound to an initial sink, at the
/// given level. Injectable so callers can swap the codec.
pub type CompressorFactory = Arc<dyn Fn(SpillBuffer, i32) -> Result<Box<dyn Compressor>> + Send + Sync>;

/// Compression levels follow zlib conventions: -1 selects the default,
/// -2 the fastest mode, 0 stores the stream uncompressed (still
/// deflate-framed), 1-9 trade speed for ratio.
pub fn validate_level(level: i32) -> Result<()> {
    if !(-2..=9).contains(&level) {
        return Err(PzipError::InvalidLevel(level));
    }
    Ok(())
}

/// The default factory, backed by flate2's raw deflate encoder.
pub fn default_factory() -> CompressorFactory {
    Arc::new(|sink, level| {
        Ok(Box::new(FlateCompressor::new(sink, level)?) as Box<dyn Compressor>)
    })
}
