//! On-disk constants for the ZIP format (APPNOTE.TXT).

pub const LOCAL_HEADER_SIGNATURE: u32 = 0x04034b50;
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x02014b50;
pub const EOCD_SIGNATURE: u32 = 0x06054b50;
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064b50;
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x06064b50;

/// Fixed portion sizes; name/extra/comment bytes follow.
pub const LOCAL_HEADER_LEN: usize = 30;
pub const CENTRAL_HEADER_LEN: usize = 46;
pub const EOCD_LEN: usize = 22;
pub const ZIP64_EOCD_LEN: usize = 56;
pub const ZIP64_EOCD_LOCATOR_LEN: usize = 20;

/// Host system codes for the high byte of `creator_version`.
pub const CREATOR_FAT: u16 = 0;
pub const CREATOR_UNIX: u16 = 3;

pub const ZIP_VERSION_20: u16 = 20;
pub const ZIP_VERSION_45: u16 = 45;

/// Limits for non-ZIP64 archives.
pub const UINT16_MAX: u64 = (1 << 16) - 1;
pub const UINT32_MAX: u64 = (1 << 32) - 1;

/// Extra field IDs. 0..=31 are reserved by PKWARE; the extended
/// timestamp is an Info-ZIP field that pervasive use made standard.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;
pub const EXT_TIME_EXTRA_ID: u16 = 0x5455;

/// General purpose bit flags.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x8;
pub const FLAG_UTF8: u16 = 0x800;

/// MS-DOS external attribute bits.
pub const MSDOS_DIR: u32 = 0x10;
pub const MSDOS_READONLY: u32 = 0x01;

/// Unix file type bits carried in the high 16 bits of `external_attrs`.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFDIR: u32 = 0o040000;
