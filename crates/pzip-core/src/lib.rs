pub mod compress;
pub mod core;
pub mod error;
pub mod format;
pub mod object;
pub mod pipeline;

/// Re-exported so callers can name the reader type in `before`
/// callbacks without a direct dependency.
pub use zip;

pub use compress::{default_factory, Compressor, CompressorFactory};
pub use core::{CancelToken, FailFastWorker};
pub use error::{PzipError, Result};
pub use format::{header_name, FileHeader, Method, ZipWriter};
pub use object::{Object, ObjectPool, SpillBuffer, DEFAULT_BUF_SIZE};
pub use pipeline::{
    archive, extract, list_entries, read_comment, ArchiveOptions, EntrySummary, ExtractEntryInfo,
    ExtractOptions, ExtractTarget, TEMP_DIR_PREFIX,
};

/// Appends the `.zip` suffix when the name doesn't already carry it.
pub fn format_name(name: &str) -> String {
    if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    {
        name.to_string()
    } else {
        format!("{name}.zip")
    }
}
