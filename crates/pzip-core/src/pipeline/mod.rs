pub mod archive;
pub mod extract;
pub mod types;

pub use archive::{archive, TEMP_DIR_PREFIX};
pub use extract::{extract, list_entries, read_comment};
pub use types::{
    AfterArchiveEntry, AfterExtractEntry, ArchiveOptions, BeforeExtract, EntrySummary,
    ExtractEntryInfo, ExtractOptions, ExtractTarget, SkipPredicate,
};
