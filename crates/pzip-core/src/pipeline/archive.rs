use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::types::ArchiveOptions;
use crate::compress::{default_factory, CompressorFactory};
use crate::core::{CancelToken, FailFastWorker};
use crate::error::{PzipError, Result};
use crate::format::ZipWriter;
use crate::object::{Object, ObjectPool, DEFAULT_BUF_SIZE};

/// The write stage is a single consumer behind a depth-1 queue; this
/// is what serializes entry emission.
const SEQUENTIAL_WRITES: usize = 1;

/// Prefix of the sibling staging directory created next to the output.
pub const TEMP_DIR_PREFIX: &str = ".pzip-";

/// Archives `opts.files` into a ZIP at `output`.
///
/// Entries are compressed by `opts.concurrency` workers into pooled
/// staging objects and serialized by a single write worker. The
/// archive is staged in a sibling `.pzip-` temp directory and renamed
/// into place only after both stages and the writer shut down cleanly;
/// on any failure nothing appears at `output` and the staging
/// directory is removed.
///
/// Entries are written in the order compression finishes, which can
/// differ from submission order across parallel workers.
pub fn archive(output: &Path, mut opts: ArchiveOptions, cancel: &CancelToken) -> Result<()> {
    opts.validate()?;
    let factory = opts
        .new_compressor
        .clone()
        .unwrap_or_else(default_factory);

    let abs_output = absolutize(output)?;
    let out_parent = abs_output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let temp_dir = tempfile::Builder::new()
        .prefix(TEMP_DIR_PREFIX)
        .tempdir_in(&out_parent)
        .map_err(|e| PzipError::from(e).with_context("create staging directory"))?;
    let temp_root = temp_dir.path().to_path_buf();

    let staged_name = abs_output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive.zip".to_string());
    let staged = tempfile::Builder::new()
        .prefix(staged_name.as_str())
        .tempfile_in(temp_dir.path())
        .map_err(|e| PzipError::from(e).with_context("create staged archive"))?;

    let mut zip_writer = ZipWriter::new(BufWriter::new(
        staged
            .as_file()
            .try_clone()
            .map_err(|e| PzipError::from(e).with_context("clone staged archive handle"))?,
    ));
    zip_writer.set_comment(opts.comment.clone())?;
    let writer = Arc::new(Mutex::new(zip_writer));

    let pool = Arc::new(ObjectPool::new(
        DEFAULT_BUF_SIZE,
        opts.concurrency * 2 + SEQUENTIAL_WRITES,
    ));

    let write_worker = {
        let writer = Arc::clone(&writer);
        let pool = Arc::clone(&pool);
        let after = opts.after.clone();
        Arc::new(FailFastWorker::new(
            move |mut object: Object| {
                let archived = {
                    let mut writer = writer.lock();
                    object.archive(&mut writer)
                };
                if archived.is_ok() {
                    if let Some(after) = &after {
                        after(object.header());
                    }
                }
                pool.release(object);
                archived
            },
            SEQUENTIAL_WRITES,
            SEQUENTIAL_WRITES,
        ))
    };

    let compress_worker = {
        let write_worker = Arc::clone(&write_worker);
        FailFastWorker::new(
            move |mut object: Object| {
                if let Err(err) = object.compress() {
                    object.close();
                    return Err(err);
                }
                write_worker.submit(object)
            },
            opts.concurrency,
            opts.concurrency,
        )
    };

    compress_worker.start(cancel);
    write_worker.start(cancel);

    tracing::debug!(
        output = %abs_output.display(),
        concurrency = opts.concurrency,
        level = opts.level,
        "archive started"
    );

    let walked = submit_inputs(
        &opts,
        &abs_output,
        &temp_root,
        pool.as_ref(),
        &factory,
        &compress_worker,
    );

    let mut errors: Vec<PzipError> = Vec::new();
    if let Err(err) = walked {
        errors.push(err);
    }
    if let Err(err) = compress_worker.wait() {
        errors.push(err.with_context("compress"));
    }
    if let Err(err) = write_worker.wait() {
        errors.push(err.with_context("write"));
    }

    // Workers hold the remaining clones of the writer and pool.
    drop(compress_worker);
    drop(write_worker);

    match Arc::try_unwrap(writer) {
        Ok(writer) => {
            let mut writer = writer.into_inner();
            if let Err(err) = writer.close() {
                errors.push(err.with_context("header end write"));
            }
        }
        Err(_) => errors.push(PzipError::InvalidState(
            "zip writer still shared after worker shutdown",
        )),
    }

    match PzipError::join(errors) {
        None => {
            staged.persist(&abs_output).map_err(|e| {
                PzipError::from(e.error)
                    .with_context(format!("rename archive to {:?}", abs_output))
            })?;
            tracing::debug!(output = %abs_output.display(), "archive complete");
            Ok(())
        }
        Some(err) => {
            // Dropping `staged` and `temp_dir` removes all staging
            // state; nothing reaches the output path.
            tracing::debug!(error = %err, "archive failed");
            Err(err)
        }
    }
}

struct WalkContext<'a> {
    opts: &'a ArchiveOptions,
    abs_output: &'a Path,
    temp_root: &'a Path,
    pool: &'a ObjectPool,
    factory: &'a CompressorFactory,
    worker: &'a FailFastWorker<Object>,
}

/// Feeds every input into the compression stage. `Ok(())` means the
/// walk finished or stopped because a submit failed (the workers hold
/// that error); `Err` is a filesystem error that aborts the walk.
fn submit_inputs(
    opts: &ArchiveOptions,
    abs_output: &Path,
    temp_root: &Path,
    pool: &ObjectPool,
    factory: &CompressorFactory,
    worker: &FailFastWorker<Object>,
) -> Result<()> {
    let ctx = WalkContext {
        opts,
        abs_output,
        temp_root,
        pool,
        factory,
        worker,
    };

    for file in &opts.files {
        let keep_going = if opts.recurse {
            visit(&ctx, file, None)?
        } else {
            submit_single(&ctx, file)?
        };
        if !keep_going {
            // Stop submitting; wait() surfaces the worker error.
            break;
        }
    }
    Ok(())
}

fn submit_single(ctx: &WalkContext<'_>, file: &Path) -> Result<bool> {
    let meta = fs::symlink_metadata(file)
        .map_err(|e| PzipError::from(e).with_context(format!("stat {file:?}")))?;
    let abs = absolutize(file)?;
    if abs == ctx.abs_output {
        return Ok(true);
    }
    let object = ctx
        .pool
        .acquire(file, meta, ctx.opts.level, ctx.temp_root, ctx.factory)?;
    Ok(ctx.worker.submit(object).is_ok())
}

/// Depth-first visit of one path. `rename` maps a dereferenced link
/// target's subtree back under the link's own path so entry names
/// preserve the link as root.
///
/// Returns false when a submit failed and the walk should stop.
fn visit(ctx: &WalkContext<'_>, path: &Path, rename: Option<&(PathBuf, PathBuf)>) -> Result<bool> {
    let raw = path.as_os_str();
    let special = raw == "." || raw == ".." || raw == "./";

    let abs = absolutize(path)?;
    if abs == ctx.temp_root || abs.parent() == Some(ctx.temp_root) {
        return Ok(true);
    }

    let shown: PathBuf = match rename {
        Some((from, to)) => match path.strip_prefix(from) {
            Ok(rest) if rest.as_os_str().is_empty() => to.clone(),
            Ok(rest) => to.join(rest),
            Err(_) => path.to_path_buf(),
        },
        None => path.to_path_buf(),
    };
    let skipped = ctx.opts.skip(&shown);

    let meta = fs::symlink_metadata(path)
        .map_err(|e| PzipError::from(e).with_context(format!("stat {path:?}")))?;

    if ctx.opts.dereference && meta.file_type().is_symlink() {
        if skipped {
            return Ok(true);
        }
        let target = fs::read_link(path)
            .map_err(|e| PzipError::from(e).with_context(format!("read link {path:?}")))?;
        let resolved = if target.is_absolute() {
            target
        } else {
            path.parent().unwrap_or(Path::new(".")).join(target)
        };
        let pair = (resolved.clone(), path.to_path_buf());
        return visit(ctx, &resolved, Some(&pair)).map_err(|e| {
            e.with_context(format!("{} -> {}", path.display(), resolved.display()))
        });
    }

    if !special && !skipped && abs != ctx.abs_output {
        let object = ctx.pool.acquire(
            &shown,
            meta.clone(),
            ctx.opts.level,
            ctx.temp_root,
            ctx.factory,
        )?;
        if ctx.worker.submit(object).is_err() {
            return Ok(false);
        }
    }

    if meta.is_dir() {
        let mut children: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| PzipError::from(e).with_context(format!("read dir {path:?}")))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()
            .map_err(|e| PzipError::from(e).with_context(format!("read dir {path:?}")))?;
        children.sort();
        for child in children {
            if !visit(ctx, &child, rename)? {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| PzipError::from(e).with_context(format!("resolve {path:?}")))
}
