use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use pzip_core::pipeline::{AfterExtractEntry, BeforeExtract};
use pzip_core::{extract, list_entries, read_comment, CancelToken, ExtractOptions};
use pzip_cli::SkipRule;

#[derive(Parser)]
#[command(
    name = "punzip",
    version,
    about = "Extract a ZIP archive concurrently",
    arg_required_else_help = true
)]
struct Cli {
    /// Archive to extract; a .zip suffix is added when missing.
    archive: String,

    /// Number of concurrent extraction workers.
    #[arg(long, default_value_t = num_cpus::get())]
    concurrency: usize,

    /// Destination directory.
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// List the archive contents and exit.
    #[arg(short = 'l', long)]
    list: bool,

    /// Print the archive comment and exit.
    #[arg(short = 'z', long = "display-comment")]
    display_comment: bool,

    /// Skip entries matching the pattern; repeatable.
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// Take only entries matching the pattern; repeatable.
    #[arg(short = 'i', long = "include", value_name = "GLOB")]
    includes: Vec<String>,

    /// Suppress per-entry output.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    pzip_cli::init_logging();
    if let Err(err) = run() {
        eprintln!("punzip error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let name = pzip_core::format_name(&cli.archive);
    let path = PathBuf::from(&name);

    if cli.display_comment {
        print!("{}", read_comment(&path).map_err(|e| format!("{e} ({name})"))?);
        return Ok(());
    }

    if cli.list {
        print_list(&name, &path)?;
        return Ok(());
    }

    let skip = SkipRule::compile(&cli.includes, &cli.excludes)?;
    let (before, after) = if cli.quiet {
        (None, None)
    } else {
        let before = Arc::new(|path: &Path, archive: &pzip_core::zip::ZipArchive<std::fs::File>| {
            println!("Archive: {}", path.display());
            println!("Comment: {}", String::from_utf8_lossy(archive.comment()));
        }) as BeforeExtract;
        let after = Arc::new(
            |info: &pzip_core::ExtractEntryInfo, target: &pzip_core::ExtractTarget| {
                let mut action = "extracting";
                if info.is_dir {
                    action = "creating";
                }
                if info.deflated {
                    action = "inflating";
                }
                if info.is_symlink {
                    action = "symlinking";
                }
                println!("  {action}: {target}");
            },
        ) as AfterExtractEntry;
        (Some(before), Some(after))
    };

    let opts = ExtractOptions {
        out_dir: cli.dir,
        concurrency: cli.concurrency,
        skip: Some(skip.into_predicate()),
        before,
        after,
    };

    let cancel = CancelToken::new();
    extract(&path, opts, &cancel).map_err(|err| format!("{err} ({name})"))?;
    Ok(())
}

fn print_list(name: &str, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let entries = list_entries(path).map_err(|e| format!("{e} ({name})"))?;
    println!("Archive: {name}");
    println!("Comment: {}", read_comment(path)?);
    println!("Files:");
    println!(
        "{:>10}  {:<6} {:>10} {:>5}  {:<10} {:<8} {:<8} Name",
        "Length", "Method", "Size", "Cmpr", "Date", "Time", "CRC-32"
    );

    let mut total_length = 0u64;
    let mut total_size = 0u64;
    let mut files = 0usize;
    let mut dirs = 0usize;
    for entry in &entries {
        if entry.name.ends_with('/') {
            dirs += 1;
        } else {
            files += 1;
        }
        total_length += entry.uncompressed_size;
        total_size += entry.compressed_size;

        let ratio = if entry.uncompressed_size > entry.compressed_size {
            ((entry.uncompressed_size - entry.compressed_size) as f64
                / entry.uncompressed_size as f64
                * 100.0)
                .round()
        } else {
            0.0
        };
        let (date, time) = entry
            .modified
            .split_once(' ')
            .unwrap_or((entry.modified.as_str(), ""));
        println!(
            "{:>10}  {:<6} {:>10} {:>4}%  {:<10} {:<8} {:08x} {}",
            entry.uncompressed_size,
            if entry.deflated { "Defl:N" } else { "Stored" },
            entry.compressed_size,
            ratio as u64,
            date,
            time,
            entry.crc32,
            entry.name,
        );
    }

    let total_ratio = if total_length > total_size {
        ((total_length - total_size) as f64 / total_length as f64 * 100.0).round()
    } else {
        0.0
    };
    println!(
        "{:>10}  {:<6} {:>10} {:>4}%  {:<10} {:<8} {:<8} {} files, {} folders",
        total_length,
        "",
        total_size,
        total_ratio as u64,
        "",
        "",
        "",
        files,
        dirs,
    );
    Ok(())
}
