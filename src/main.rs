//! Main entry point for the buddyzip CLI application.
//!
//! This binary lists, extracts, adds and removes ZIP entries in place,
//! without rewriting the rest of the archive.

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{Level, debug, warn};
use tracing_subscriber::EnvFilter;

use buddyzip::cli::{Command, ExtractArgs};
use buddyzip::{ArchiveEntry, ArchiveOptions, Cli, EntrySource, ProgressSink, ZipArchive};

/// Application entry point.
///
/// Parses command-line arguments, installs logging and dispatches to the
/// handler for the chosen subcommand.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose_log { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::List { file, verbose } => {
            let archive = ZipArchive::open_read_only(file)
                .with_context(|| format!("cannot open {}", file))?;
            list_files(&archive, *verbose);
        }
        Command::Add {
            file,
            paths,
            prefix,
            level,
        } => add_files(&cli, file, paths, prefix.as_deref(), *level)?,
        Command::Remove { file, files } => remove_files(&cli, file, files)?,
        Command::Extract(args) => extract_files(&cli, args)?,
        Command::Repair { file } => repair(&cli, file)?,
    }

    Ok(())
}

/// Progress bar for batch additions, hidden in quiet mode.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(len: u64, enable: bool) -> Self {
        if !enable {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        Self { bar }
    }
}

impl ProgressSink for CliProgress {
    fn update(&mut self, current: usize, max: usize, name: &str) {
        debug!(current, max, name, "stored entry");
        self.bar.set_length(max as u64);
        self.bar.set_position(current as u64);
        self.bar.set_message(name.to_string());
    }
}

/// List entries in the archive.
///
/// Supports two output formats:
/// - Simple format: just entry names, one per line
/// - Verbose format (`-v`): table with size, compression ratio and timestamps
fn list_files(archive: &ZipArchive, verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in archive.entries() {
        if !verbose {
            println!("{}", entry.name());
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size(),
            entry.compressed_size(),
            ratio(entry.compressed_size(), entry.uncompressed_size()),
            year,
            month,
            day,
            hour,
            minute,
            entry.name()
        );

        if !entry.is_directory() {
            total_uncompressed += entry.uncompressed_size();
            total_compressed += entry.compressed_size();
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }
}

/// Space saved by compression, as a percentage column.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

fn add_files(cli: &Cli, file: &str, paths: &[String], prefix: Option<&str>, level: u32) -> Result<()> {
    let mut sources = Vec::new();
    for path in paths {
        let path = Path::new(path);
        let base = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .with_context(|| format!("cannot derive an entry name from {}", path.display()))?;
        let base = match prefix.map(|p| p.trim_end_matches('/')) {
            Some(p) if !p.is_empty() => format!("{}/{}", p, base),
            _ => base,
        };
        collect_sources(path, &base, &mut sources)?;
    }
    if sources.is_empty() {
        bail!("nothing to add");
    }

    let options = ArchiveOptions::default().compression_level(level);
    let mut archive =
        ZipArchive::open_with(file, options).with_context(|| format!("cannot open {}", file))?;
    let mut progress = CliProgress::new(sources.len() as u64, !cli.is_quiet());
    let added = match archive.add_all_with_progress(sources, &mut progress) {
        Ok(added) => added,
        Err(err) => {
            progress.bar.abandon();
            return Err(err.into());
        }
    };
    progress
        .bar
        .finish_with_message(format!("added {} entries", added.len()));
    archive.close()?;
    Ok(())
}

/// Walk `path` and queue every regular file under entry name `name`.
fn collect_sources(path: &Path, name: &str, sources: &mut Vec<EntrySource>) -> Result<()> {
    let metadata = fs::metadata(path).with_context(|| format!("cannot read {}", path.display()))?;
    if metadata.is_file() {
        sources.push(EntrySource::from_file(name, path)?);
        return Ok(());
    }
    if !metadata.is_dir() {
        warn!(path = %path.display(), "skipping special file");
        return Ok(());
    }

    let mut children: Vec<_> = fs::read_dir(path)?.collect::<std::io::Result<Vec<_>>>()?;
    children.sort_by_key(|c| c.file_name());
    for child in children {
        let child_name = format!("{}/{}", name, child.file_name().to_string_lossy());
        collect_sources(&child.path(), &child_name, sources)?;
    }
    Ok(())
}

fn remove_files(cli: &Cli, file: &str, patterns: &[String]) -> Result<()> {
    let mut archive = ZipArchive::open(file).with_context(|| format!("cannot open {}", file))?;

    let selected: Vec<ArchiveEntry> = archive
        .entries()
        .filter(|e| patterns.iter().any(|p| matches_pattern(p, e.name())))
        .cloned()
        .collect();
    for pattern in patterns {
        if !selected.iter().any(|e| matches_pattern(pattern, e.name())) && !cli.is_very_quiet() {
            eprintln!("buddyzip: {} not matched", pattern);
        }
    }
    if selected.is_empty() {
        bail!("no entries to remove");
    }

    archive.remove_all(&selected)?;
    if !cli.is_quiet() {
        for entry in &selected {
            println!("  deleting: {}", entry.name());
        }
    }
    archive.close()?;
    Ok(())
}

/// Extract every entry selected by `args`.
///
/// Directory entries are skipped; their directories are created on demand.
fn extract_files(cli: &Cli, args: &ExtractArgs) -> Result<()> {
    let mut archive =
        ZipArchive::open_read_only(&args.file).with_context(|| format!("cannot open {}", args.file))?;

    let files_to_extract: Vec<ArchiveEntry> = archive
        .entries()
        .filter(|e| {
            if e.is_directory() {
                return false;
            }
            if !args.files.is_empty() && !args.files.iter().any(|f| matches_pattern(f, e.name())) {
                return false;
            }
            !args
                .exclude
                .iter()
                .any(|x| e.name().contains(x.as_str()) || glob_match(x, e.name()))
        })
        .cloned()
        .collect();

    let multiple_files = args.pipe && files_to_extract.len() > 1;
    for entry in &files_to_extract {
        extract_file(&mut archive, entry, cli, args, multiple_files)?;
    }

    Ok(())
}

/// Extract a single entry.
///
/// Handles pipe mode (`-p`), the output directory (`-d`), junked paths (`-j`)
/// and the overwrite controls (`-n`, `-o`).
fn extract_file(
    archive: &mut ZipArchive,
    entry: &ArchiveEntry,
    cli: &Cli,
    args: &ExtractArgs,
    show_filename: bool,
) -> Result<()> {
    if args.pipe {
        let data = archive.extract(entry)?;
        let mut stdout = std::io::stdout().lock();
        if show_filename {
            stdout.write_all(format!("--- {} ---\n", entry.name()).as_bytes())?;
        }
        stdout.write_all(&data)?;
        return Ok(());
    }

    let relative = if args.junk_paths {
        Path::new(entry.name())
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(entry.name()))
    } else {
        PathBuf::from(entry.name())
    };
    if !is_safe_path(&relative) {
        warn!(name = entry.name(), "skipping entry with unsafe path");
        return Ok(());
    }
    let output_path = match &args.extract_dir {
        Some(dir) => PathBuf::from(dir).join(&relative),
        None => relative,
    };

    if output_path.exists() {
        if args.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.name());
            }
            return Ok(());
        }
        if !args.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.name());
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.name());
    }

    let data = archive.extract(entry)?;
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output_path, data)
        .with_context(|| format!("cannot write {}", output_path.display()))?;
    Ok(())
}

fn repair(cli: &Cli, file: &str) -> Result<()> {
    let archive = ZipArchive::open(file).with_context(|| format!("cannot open {}", file))?;
    if !cli.is_quiet() {
        let free = archive.allocator().free_bytes();
        println!("{}: {} entries", file, archive.len());
        println!(
            "  central directory: {}..{}",
            archive.directory_start(),
            archive.directory_end()
        );
        println!(
            "  allocated: {}, free: {}",
            format_size(archive.allocated_extent()),
            format_size(free)
        );
    }
    archive.close()?;
    Ok(())
}

/// Relative path without parent or root components.
fn is_safe_path(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Match an entry name against a glob pattern, or exactly against the full
/// name or its base name when the pattern has no wildcards.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    if has_glob_chars(pattern) {
        return glob_match(pattern, name);
    }
    let basename = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    name == pattern || basename == pattern
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one and stays
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
