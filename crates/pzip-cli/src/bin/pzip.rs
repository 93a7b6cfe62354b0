use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use pzip_core::{archive, ArchiveOptions, CancelToken, Method};
use pzip_cli::SkipRule;

#[derive(Parser)]
#[command(
    name = "pzip",
    version,
    about = "Compress files into a ZIP archive concurrently",
    arg_required_else_help = true
)]
struct Cli {
    /// Output archive name; a .zip suffix is added when missing.
    archive: String,

    /// Files and directories to add.
    files: Vec<PathBuf>,

    /// Number of concurrent compression workers.
    #[arg(long, default_value_t = num_cpus::get())]
    concurrency: usize,

    /// Compression level, -2 to 9 (-1 selects the default).
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    level: i32,

    /// Add only the named paths, without descending into directories.
    #[arg(long)]
    no_recurse: bool,

    /// Store symlinks as links instead of the files they point to.
    #[arg(short = 'y', long)]
    no_dereference: bool,

    /// Skip files matching the pattern; repeatable.
    #[arg(short = 'x', long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// Take only files matching the pattern; repeatable.
    #[arg(short = 'i', long = "include", value_name = "GLOB")]
    includes: Vec<String>,

    /// Suppress per-entry output.
    #[arg(short, long)]
    quiet: bool,

    /// Archive-wide comment.
    #[arg(short = 'z', long)]
    comment: Option<String>,
}

fn main() {
    pzip_cli::init_logging();
    if let Err(err) = run() {
        eprintln!("pzip error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let name = pzip_core::format_name(&cli.archive);
    if cli.files.is_empty() {
        return Err(format!("nothing to do! ({name})").into());
    }

    let skip = SkipRule::compile(&cli.includes, &cli.excludes)?;
    let after = if cli.quiet {
        None
    } else {
        Some(Arc::new(|header: &pzip_core::FileHeader| {
            let method = match header.method {
                Method::Deflate => "deflated",
                Method::Store => "stored",
            };
            println!("  adding: {} ({method})", header.name);
        }) as pzip_core::pipeline::AfterArchiveEntry)
    };

    let opts = ArchiveOptions {
        files: cli.files,
        level: cli.level,
        concurrency: cli.concurrency,
        recurse: !cli.no_recurse,
        dereference: !cli.no_dereference,
        comment: cli.comment.unwrap_or_default(),
        skip: Some(skip.into_predicate()),
        after,
        new_compressor: None,
    };

    let cancel = CancelToken::new();
    archive(Path::new(&name), opts, &cancel).map_err(|err| format!("{err} ({name})"))?;
    Ok(())
}
