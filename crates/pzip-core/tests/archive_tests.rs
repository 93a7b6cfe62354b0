use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pzip_core::{
    archive, ArchiveOptions, CancelToken, Compressor, CompressorFactory, PzipError, SpillBuffer,
};

fn read_archive(path: &Path) -> zip::ZipArchive<fs::File> {
    zip::ZipArchive::new(fs::File::open(path).expect("open archive")).expect("parse archive")
}

fn entry_names(archive: &mut zip::ZipArchive<fs::File>) -> Vec<String> {
    (0..archive.len())
        .map(|i| archive.by_index_raw(i).expect("entry").name().to_string())
        .collect()
}

fn pseudo_random(len: usize, mut state: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

fn no_staging_leftovers(dir: &Path) {
    let leftovers: Vec<_> = fs::read_dir(dir)
        .expect("read parent dir")
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(pzip_core::TEMP_DIR_PREFIX)
        })
        .collect();
    assert!(leftovers.is_empty(), "staging directories left behind");
}

#[test]
fn small_file_is_stored_with_matching_crc() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let tree = work.path().join("tree");
    fs::create_dir(&tree)?;
    fs::write(tree.join("note.txt"), b"0123456789")?;

    let out = work.path().join("out.zip");
    let opts = ArchiveOptions {
        files: vec![tree.clone()],
        level: 6,
        concurrency: 2,
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    let note = names
        .iter()
        .find(|n| n.ends_with("note.txt"))
        .expect("note.txt entry")
        .clone();

    let mut entry = za.by_name(&note)?;
    assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    assert_eq!(entry.size(), 10);
    assert_eq!(entry.compressed_size(), 10);
    assert_eq!(entry.crc32(), crc32fast::hash(b"0123456789"));
    let mut body = Vec::new();
    entry.read_to_end(&mut body)?;
    assert_eq!(body, b"0123456789");

    no_staging_leftovers(work.path());
    Ok(())
}

#[test]
fn large_file_deflates_and_spills_through_overflow() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("noise.bin");
    // Incompressible input well past the 2 MiB staging buffer.
    let body = pseudo_random(10 * 1024 * 1024, 0xdead_beef);
    fs::write(&source, &body)?;

    let out = work.path().join("noise.zip");
    let opts = ArchiveOptions {
        files: vec![source.clone()],
        level: 6,
        concurrency: 2,
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    let mut entry = za.by_name(&names[0])?;
    assert_eq!(entry.compression(), zip::CompressionMethod::Deflated);
    assert_eq!(entry.size(), body.len() as u64);

    let mut round_tripped = Vec::with_capacity(body.len());
    entry.read_to_end(&mut round_tripped)?;
    assert_eq!(round_tripped, body);

    no_staging_leftovers(work.path());
    Ok(())
}

#[test]
fn utf8_names_set_the_flag_bit_in_the_local_header() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let source = work.path().join("日本語.txt");
    fs::write(&source, b"nihongo")?;

    let out = work.path().join("utf8.zip");
    let opts = ArchiveOptions {
        files: vec![source],
        level: 6,
        concurrency: 1,
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    // Single entry, so its local header starts the stream; the general
    // purpose flags sit at offset 6.
    let raw = fs::read(&out)?;
    assert_eq!(&raw[0..4], &0x04034b50u32.to_le_bytes());
    let flags = u16::from_le_bytes([raw[6], raw[7]]);
    assert_ne!(flags & 0x800, 0, "UTF-8 flag must be set");

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    assert!(names[0].ends_with("日本語.txt"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinks_without_dereference_store_the_target() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let tree = work.path().join("tree");
    fs::create_dir(&tree)?;
    fs::write(tree.join("real.txt"), b"the real bytes")?;
    std::os::unix::fs::symlink("real.txt", tree.join("alias"))?;

    let out = work.path().join("links.zip");
    let opts = ArchiveOptions {
        files: vec![tree],
        level: 6,
        concurrency: 2,
        dereference: false,
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    let alias = names
        .iter()
        .find(|n| n.ends_with("alias"))
        .expect("alias entry")
        .clone();

    let mut entry = za.by_name(&alias)?;
    assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
    assert_eq!(entry.size(), "real.txt".len() as u64);
    let mode = entry.unix_mode().expect("unix mode");
    assert_eq!(mode & 0o170000, 0o120000, "entry must be a symlink");
    let mut target = String::new();
    entry.read_to_string(&mut target)?;
    assert_eq!(target, "real.txt");
    Ok(())
}

#[cfg(unix)]
#[test]
fn dereference_renames_entries_under_the_link() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let data = work.path().join("data");
    fs::create_dir(&data)?;
    fs::write(data.join("inner.txt"), b"followed")?;

    let tree = work.path().join("tree");
    fs::create_dir(&tree)?;
    std::os::unix::fs::symlink(data.clone(), tree.join("portal"))?;

    let out = work.path().join("deref.zip");
    let opts = ArchiveOptions {
        files: vec![tree],
        level: 6,
        concurrency: 2,
        dereference: true,
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    assert!(
        names.iter().any(|n| n.contains("tree/portal/inner.txt")),
        "entries must be rooted under the link path, got {names:?}"
    );
    assert!(
        !names.iter().any(|n| n.contains("data/inner.txt")),
        "target path must not leak into entry names, got {names:?}"
    );
    Ok(())
}

#[test]
fn skip_predicate_filters_entries() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let tree = work.path().join("tree");
    fs::create_dir(&tree)?;
    fs::write(tree.join("keep.txt"), b"keep me around")?;
    fs::write(tree.join("drop.log"), b"drop me please")?;

    let out = work.path().join("skip.zip");
    let opts = ArchiveOptions {
        files: vec![tree],
        level: 6,
        concurrency: 2,
        skip: Some(Arc::new(|path: &Path| {
            path.extension().is_some_and(|e| e == "log")
        })),
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    assert!(names.iter().any(|n| n.ends_with("keep.txt")));
    assert!(!names.iter().any(|n| n.ends_with("drop.log")));
    Ok(())
}

#[test]
fn existing_output_archive_is_not_archived_into_itself(
) -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let tree = work.path().join("tree");
    fs::create_dir(&tree)?;
    fs::write(tree.join("file.txt"), b"body body body")?;
    let out = tree.join("out.zip");
    fs::write(&out, b"stale archive from a previous run")?;

    let opts = ArchiveOptions {
        files: vec![tree.clone()],
        level: 6,
        concurrency: 2,
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    let names = entry_names(&mut za);
    assert!(names.iter().any(|n| n.ends_with("file.txt")));
    assert!(
        !names.iter().any(|n| n.ends_with("out.zip")),
        "output archive leaked into itself: {names:?}"
    );
    Ok(())
}

#[test]
fn directories_become_slash_terminated_entries() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let tree = work.path().join("tree");
    fs::create_dir_all(tree.join("sub"))?;
    fs::write(tree.join("sub/deep.txt"), b"down here")?;

    let out = work.path().join("dirs.zip");
    let opts = ArchiveOptions {
        files: vec![tree],
        level: 6,
        concurrency: 2,
        comment: "tree snapshot".to_string(),
        ..ArchiveOptions::default()
    };
    archive(&out, opts, &CancelToken::new())?;

    let mut za = read_archive(&out);
    assert_eq!(za.comment(), b"tree snapshot");
    let names = entry_names(&mut za);
    assert!(names.iter().any(|n| n.ends_with("sub/")));
    assert!(names.iter().any(|n| n.ends_with("sub/deep.txt")));
    Ok(())
}

#[test]
fn invalid_options_are_rejected_up_front() {
    let cancel = CancelToken::new();

    let err = archive(
        Path::new("nope.zip"),
        ArchiveOptions {
            files: vec![],
            ..ArchiveOptions::default()
        },
        &cancel,
    )
    .expect_err("empty inputs");
    assert!(matches!(err, PzipError::InvalidOptions(_)));

    let err = archive(
        Path::new("nope.zip"),
        ArchiveOptions {
            files: vec![PathBuf::from("x")],
            concurrency: 0,
            ..ArchiveOptions::default()
        },
        &cancel,
    )
    .expect_err("zero concurrency");
    assert!(matches!(err, PzipError::InvalidOptions(_)));

    let err = archive(
        Path::new("nope.zip"),
        ArchiveOptions {
            files: vec![PathBuf::from("x")],
            level: 11,
            ..ArchiveOptions::default()
        },
        &cancel,
    )
    .expect_err("level out of range");
    assert!(matches!(err, PzipError::InvalidLevel(11)));
}

struct ExplodingCompressor {
    sink: Option<SpillBuffer>,
}

impl Write for ExplodingCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Compressor for ExplodingCompressor {
    fn reset(&mut self, sink: SpillBuffer) -> io::Result<SpillBuffer> {
        Ok(self.sink.replace(sink).unwrap_or_else(SpillBuffer::placeholder))
    }

    fn finish(&mut self) -> io::Result<()> {
        Err(io::Error::other("synthetic compressor failure"))
    }
}

#[test]
fn compression_failure_publishes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempfile::tempdir()?;
    let tree = work.path().join("tree");
    fs::create_dir(&tree)?;
    for i in 0..100u8 {
        // Large enough to elect deflate, so the failing codec runs.
        fs::write(tree.join(format!("f{i:03}.txt")), vec![b'a' + (i % 26); 512])?;
    }

    let factory: CompressorFactory =
        Arc::new(|sink, _level| Ok(Box::new(ExplodingCompressor { sink: Some(sink) }) as _));

    let out = work.path().join("never.zip");
    let opts = ArchiveOptions {
        files: vec![tree],
        level: 6,
        concurrency: 4,
        new_compressor: Some(factory),
        ..ArchiveOptions::default()
    };
    let err = archive(&out, opts, &CancelToken::new()).expect_err("archive must fail");
    assert!(err.to_string().contains("synthetic compressor failure"));

    assert!(!out.exists(), "no output may appear on failure");
    no_staging_leftovers(work.path());
    Ok(())
}
