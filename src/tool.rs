//! `arki`: the core-owned CLI surface (spec §6.5) — `dump`, `scan`, `query`
//! and `check`. Everything here is built on `arkimet_store`'s public API
//! only, the way an external embedder would use it; format-specific
//! scanning and the matcher/alias expression language stay out of scope
//! (spec §1), so `scan` consumes an already-produced metadata bundle
//! rather than sniffing raw messages itself, and `query`'s predicate is
//! limited to the one clause shape (`reftime` range) simple enough to
//! expose as flags without building the expression parser.

use arkimet_store::cache::ReaderCache;
use arkimet_store::dataset::Dataset;
use arkimet_store::index::Manifest;
use arkimet_store::maintenance::fixer::{Fixer, MockFixer, RealFixer};
use arkimet_store::maintenance::repacker::{MockRepacker, RealRepacker, Repacker};
use arkimet_store::matcher::Matcher;
use arkimet_store::metadata::Metadata;
use arkimet_store::query::data_query::{query_dataset, DataQuery};
use arkimet_store::types::reftime::Reftime;
use arkimet_store::types::time::Time;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arki")]
#[command(about = "Dataset storage engine tool: dump, scan, query, check")]
struct Cli {
    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a binary metadata stream to YAML/JSON, or reverse with --from-yaml
    Dump {
        /// Input file; stdin if omitted
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
        /// Read YAML/JSON documents from input and re-encode as binary bundles
        #[arg(long)]
        from_yaml: bool,
    },
    /// Acquire every record in a pre-scanned metadata bundle into a dataset
    Scan {
        #[arg(long)]
        dataset: PathBuf,
        /// A `.metadata`-shaped bundle of already-scanned records
        metadata: PathBuf,
        /// The raw data those records' BLOB sources point into
        data: PathBuf,
    },
    /// Run a query against a dataset
    Query {
        #[arg(long)]
        dataset: PathBuf,
        /// Only records with reftime >= this date (YYYY-MM-DD)
        #[arg(long)]
        reftime_from: Option<String>,
        /// Only records with reftime <= this date (YYYY-MM-DD)
        #[arg(long)]
        reftime_to: Option<String>,
        /// Pull each record's raw data inline
        #[arg(long)]
        data: bool,
        /// Alias for --data, matching `arki-query`'s own flag name
        #[arg(long)]
        inline: bool,
        /// Print matches as YAML instead of one-line summaries
        #[arg(long)]
        yaml: bool,
    },
    /// Run the maintenance engine
    Check {
        #[arg(long)]
        dataset: PathBuf,
        /// Use RealFixer instead of MockFixer (TO_INDEX/TO_RESCAN/TO_DEINDEX/TO_DELETE)
        #[arg(long)]
        fix: bool,
        /// Use RealRepacker instead of MockRepacker (TO_PACK/TO_DEINDEX/TO_ARCHIVE)
        #[arg(long)]
        repack: bool,
        /// Unconditionally wipe every segment and the manifest
        #[arg(long)]
        remove_all: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Dump { input, format, from_yaml } => dump(input, format, from_yaml),
        Commands::Scan { dataset, metadata, data } => scan(&dataset, &metadata, &data),
        Commands::Query { dataset, reftime_from, reftime_to, data, inline, yaml } => {
            query(&dataset, reftime_from, reftime_to, data || inline, yaml)
        }
        Commands::Check { dataset, fix, repack, remove_all } => check(&dataset, fix, repack, remove_all),
    };

    if let Err(e) = result {
        eprintln!("arki: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!("arki={level}")))
        .try_init();
}

fn read_all(input: &Option<PathBuf>) -> std::io::Result<Vec<u8>> {
    match input {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn dump(input: Option<PathBuf>, format: OutputFormat, from_yaml: bool) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = read_all(&input)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if from_yaml {
        for doc in serde_yaml::Deserializer::from_slice(&bytes) {
            let md = Metadata::deserialize(doc)?;
            out.write_all(&md.encode()?)?;
        }
        return Ok(());
    }

    let mut remaining: &[u8] = &bytes;
    while !remaining.is_empty() {
        let md = Metadata::decode_from(&mut remaining)?;
        match format {
            OutputFormat::Yaml => {
                out.write_all(serde_yaml::to_string(&md)?.as_bytes())?;
                out.write_all(b"---\n")?;
            }
            OutputFormat::Json => {
                writeln!(out, "{}", serde_json::to_string(&md)?)?;
            }
        }
    }
    Ok(())
}

fn scan(dataset_root: &std::path::Path, metadata_path: &std::path::Path, data_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::open(dataset_root)?;
    let data = std::fs::read(data_path)?;
    let bundle = std::fs::read(metadata_path)?;

    let mut remaining: &[u8] = &bundle;
    let mut count = 0usize;
    while !remaining.is_empty() {
        let mut md = Metadata::decode_from(&mut remaining)?;
        let source = md.source()?.clone();
        let slice = match source {
            arkimet_store::types::source::Source::Blob { offset, size, .. } => {
                let start = offset as usize;
                let end = start + size as usize;
                data.get(start..end).ok_or("record's blob source runs past the data file")?
            }
            _ => return Err("scanned metadata must carry a BLOB source".into()),
        };
        arkimet_store::writer::acquire(&dataset, &mut md, slice)?;
        count += 1;
    }
    println!("acquired {count} record(s) into {}", dataset.config().name);
    Ok(())
}

fn parse_date(s: &str) -> Result<Time, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return Err(format!("invalid date {s:?}, expected YYYY-MM-DD").into());
    }
    let year: u16 = parts[0].parse()?;
    let month: u8 = parts[1].parse()?;
    let day: u8 = parts[2].parse()?;
    Ok(Time::new(year, month, day, 0, 0, 0)?)
}

fn query(
    dataset_root: &std::path::Path,
    reftime_from: Option<String>,
    reftime_to: Option<String>,
    with_data: bool,
    yaml: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::open(dataset_root)?;
    let cache = ReaderCache::new(dataset.root(), 64);

    let from = reftime_from.as_deref().map(parse_date).transpose()?;
    let to = reftime_to.as_deref().map(parse_date).transpose()?;
    let matcher = Matcher::new().with_reftime_range(from, to);

    let hits = query_dataset(&dataset, &cache, &DataQuery { matcher, with_data, sorter: None })?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for hit in &hits {
        if yaml {
            out.write_all(serde_yaml::to_string(&hit.metadata)?.as_bytes())?;
            out.write_all(b"---\n")?;
        } else {
            let reftime = hit.metadata.reftime().map(Reftime::representative);
            let size = hit.data.as_ref().map_or(0, Vec::len);
            println!("{reftime:?} ({size} bytes inline)");
        }
    }
    println!("{} hit(s)", hits.len());
    Ok(())
}

fn check(dataset_root: &std::path::Path, fix: bool, repack: bool, remove_all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::open(dataset_root)?;

    if remove_all {
        for entry in std::fs::read_dir(dataset.root())? {
            let entry = entry?;
            let name = entry.file_name();
            if name == "config" || name == "lock" {
                continue;
            }
            if entry.path().is_dir() {
                std::fs::remove_dir_all(entry.path())?;
            } else {
                std::fs::remove_file(entry.path())?;
            }
        }
        dataset.save_manifest(&Manifest::new())?;
        println!("removed every segment from {}", dataset.config().name);
        return Ok(());
    }

    let fix_reports = if fix { RealFixer::new().run(&dataset)? } else { MockFixer.run(&dataset)? };
    for r in &fix_reports {
        println!("{}", r.detail);
    }

    let repack_reports = if repack { RealRepacker.run(&dataset)? } else { MockRepacker.run(&dataset)? };
    for r in &repack_reports {
        println!("{}", r.detail);
    }

    Ok(())
}
