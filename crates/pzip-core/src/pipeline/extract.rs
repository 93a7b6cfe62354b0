use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crossbeam_channel::{bounded, Receiver, Sender};
use zip::ZipArchive;

use super::types::{EntrySummary, ExtractEntryInfo, ExtractOptions, ExtractTarget};
use crate::core::{CancelToken, FailFastWorker};
use crate::error::{PzipError, Result};
use crate::format::consts::{S_IFLNK, S_IFMT};

/// Extracts `archive_path` using the external ZIP reader, dispatching
/// entries in central directory order across `opts.concurrency`
/// workers. Each worker leases a reader handle from a small pool, so
/// decompression proceeds in parallel.
pub fn extract(archive_path: &Path, opts: ExtractOptions, cancel: &CancelToken) -> Result<()> {
    opts.validate()?;

    let mut archive = open_reader(archive_path)?;
    if let Some(before) = &opts.before {
        before(archive_path, &archive);
    }

    let names: Vec<String> = {
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            names.push(archive.by_index_raw(index)?.name().to_string());
        }
        names
    };

    tracing::debug!(
        archive = %archive_path.display(),
        entries = names.len(),
        concurrency = opts.concurrency,
        "extract started"
    );

    let (reader_tx, reader_rx): (Sender<ZipArchive<File>>, Receiver<ZipArchive<File>>) =
        bounded(opts.concurrency);
    reader_tx
        .send(archive)
        .map_err(|_| PzipError::InvalidState("reader pool closed before start"))?;
    for _ in 1..opts.concurrency {
        reader_tx
            .send(open_reader(archive_path)?)
            .map_err(|_| PzipError::InvalidState("reader pool closed before start"))?;
    }

    let concurrency = opts.concurrency;
    let worker = {
        let opts = opts.clone();
        let reader_tx = reader_tx.clone();
        FailFastWorker::new(
            move |index: usize| {
                let mut archive = reader_rx
                    .recv()
                    .map_err(|_| PzipError::InvalidState("reader pool closed"))?;
                let extracted = extract_entry(&mut archive, index, &opts);
                let _ = reader_tx.send(archive);
                let (info, target) = extracted?;
                if let Some(after) = &opts.after {
                    after(&info, &target);
                }
                Ok(())
            },
            concurrency,
            concurrency,
        )
    };

    worker.start(cancel);
    for (index, name) in names.iter().enumerate() {
        if opts.skip(Path::new(name)) {
            continue;
        }
        if worker.submit(index).is_err() {
            // Stop dispatching; wait() surfaces the worker error.
            break;
        }
    }
    worker.wait()
}

/// Reads the archive-wide end-of-central-directory comment.
pub fn read_comment(archive_path: &Path) -> Result<String> {
    let archive = open_reader(archive_path)?;
    Ok(String::from_utf8_lossy(archive.comment()).into_owned())
}

/// Central directory listing, for `punzip -l`.
pub fn list_entries(archive_path: &Path) -> Result<Vec<EntrySummary>> {
    let mut archive = open_reader(archive_path)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let m = entry.last_modified();
        entries.push(EntrySummary {
            name: entry.name().to_string(),
            uncompressed_size: entry.size(),
            compressed_size: entry.compressed_size(),
            deflated: entry.compression() == zip::CompressionMethod::Deflated,
            crc32: entry.crc32(),
            modified: format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                m.year(),
                m.month(),
                m.day(),
                m.hour(),
                m.minute(),
                m.second()
            ),
        });
    }
    Ok(entries)
}

fn open_reader(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path)
        .map_err(|e| PzipError::from(e).with_context(format!("open archive {archive_path:?}")))?;
    Ok(ZipArchive::new(file)?)
}

fn extract_entry(
    archive: &mut ZipArchive<File>,
    index: usize,
    opts: &ExtractOptions,
) -> Result<(ExtractEntryInfo, ExtractTarget)> {
    let mut entry = archive.by_index(index)?;
    let name = entry.name().to_string();
    let enclosed = entry
        .enclosed_name()
        .map(|p| p.to_path_buf())
        .ok_or(PzipError::InvalidHeader("entry path escapes output root"))?;
    let out_path = match &opts.out_dir {
        Some(dir) => dir.join(enclosed),
        None => enclosed,
    };

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| PzipError::from(e).with_context(format!("create directory {parent:?}")))?;
    }

    let mode = entry.unix_mode();
    let is_symlink = mode.is_some_and(|m| m & S_IFMT == S_IFLNK);
    let info = ExtractEntryInfo {
        name: name.clone(),
        is_dir: entry.is_dir(),
        is_symlink,
        deflated: entry.compression() == zip::CompressionMethod::Deflated,
    };
    let mut target = ExtractTarget {
        path: out_path.clone(),
        symlink: None,
    };

    if info.is_dir {
        write_dir(&out_path, mode)?;
    } else if is_symlink {
        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut raw)
            .map_err(|e| PzipError::from(e).with_context(format!("read link entry {name:?}")))?;
        let link = String::from_utf8_lossy(&raw).into_owned();
        write_link(&out_path, &link)?;
        target.symlink = Some(link);
    } else {
        write_file(&mut entry, &out_path, mode)
            .map_err(|e| e.with_context(format!("extract {name:?}")))?;
    }

    Ok((info, target))
}

/// Creates the directory with the entry's mode; an already existing
/// directory just has its permissions aligned.
fn write_dir(out_path: &Path, mode: Option<u32>) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode & 0o7777);
    }
    match builder.create(out_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            #[cfg(unix)]
            if let Some(mode) = mode {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(out_path, fs::Permissions::from_mode(mode & 0o7777)).map_err(
                    |e| {
                        PzipError::from(e).with_context(format!("chmod directory {out_path:?}"))
                    },
                )?;
            }
            #[cfg(not(unix))]
            let _ = mode;
            Ok(())
        }
        Err(e) => {
            Err(PzipError::from(e).with_context(format!("create directory {out_path:?}")))
        }
    }
}

#[cfg(unix)]
fn write_link(out_path: &Path, link: &str) -> Result<()> {
    std::os::unix::fs::symlink(link, out_path)
        .map_err(|e| PzipError::from(e).with_context(format!("symlink {out_path:?}")))
}

#[cfg(not(unix))]
fn write_link(out_path: &Path, _link: &str) -> Result<()> {
    let _ = out_path;
    Err(PzipError::InvalidState(
        "symlink entries are not supported on this platform",
    ))
}

fn write_file(entry: &mut zip::read::ZipFile<'_>, out_path: &Path, mode: Option<u32>) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o7777);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut out = options.open(out_path)?;
    std::io::copy(entry, &mut out)?;
    Ok(())
}
