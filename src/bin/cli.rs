//! Binary entry point for the tierhash administrative CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tierhash::{
    admin::{
        create, open_table, recover, stats, verify, AdminOpenOptions, CreateReport, StatsReport,
        VerifyLevel, VerifyReport,
    },
    recovery::RecoveryReport,
    storage::TableOptions,
};
use tracing_subscriber::EnvFilter;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tierhash",
    version,
    about = "Administrative CLI for tierhash tables",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "CLI config file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter (overrides RUST_LOG and the config file)"
    )]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CreateCmd {
    #[arg(value_name = "DB")]
    db_path: Option<PathBuf>,

    #[arg(long, help = "Number of segments")]
    segments: Option<u32>,

    #[arg(long, help = "Entry slots per tier")]
    entries_per_tier: Option<u32>,

    #[arg(long, help = "Bytes per entry slot, 8-byte entry header included")]
    entry_size: Option<u32>,

    #[arg(long, help = "Overflow tiers per bulk")]
    tiers_per_bulk: Option<u32>,

    #[arg(long, help = "Bulks laid out at creation")]
    initial_bulks: Option<u32>,

    #[arg(long, help = "Bulk allocation ceiling")]
    max_bulks: Option<u32>,

    #[arg(long, help = "Key hashing seed (random when omitted)")]
    seed: Option<u64>,

    #[arg(long, help = "Overwrite an existing file")]
    force: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Create an empty table")]
    Create(CreateCmd),

    #[command(about = "Repair a table after an unclean shutdown")]
    Recover {
        #[arg(value_name = "DB")]
        db_path: Option<PathBuf>,
    },

    #[command(about = "Print geometry and pool statistics")]
    Stats {
        #[arg(value_name = "DB")]
        db_path: Option<PathBuf>,
    },

    #[command(about = "Verify on-disk structures without modifying them")]
    Verify {
        #[arg(value_name = "DB")]
        db_path: Option<PathBuf>,

        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Full,
            help = "Verification level"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "Insert or replace a key")]
    Put {
        #[arg(long = "db", value_name = "DB")]
        db_path: Option<PathBuf>,

        key: String,

        value: String,
    },

    #[command(about = "Print the value stored for a key")]
    Get {
        #[arg(long = "db", value_name = "DB")]
        db_path: Option<PathBuf>,

        key: String,
    },

    #[command(about = "Remove a key")]
    Remove {
        #[arg(long = "db", value_name = "DB")]
        db_path: Option<PathBuf>,

        key: String,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    install_tracing(cli.log.as_deref().or(config.log_filter()));
    tracing::debug!(config = ?config.path(), "cli.config_loaded");

    match cli.command {
        Command::Create(cmd) => {
            let db_path = resolve_db(cmd.db_path.clone(), &config)?;
            let opts = build_table_options(&cmd, config.table_options());
            let report = create(&db_path, &opts, cmd.force)?;
            emit(&cli.format, &report, |_| print_create_text(&report))?;
        }
        Command::Recover { db_path } => {
            let db_path = resolve_db(db_path, &config)?;
            let report = recover(&db_path)?;
            emit(&cli.format, &report, |_| print_recover_text(&report))?;
        }
        Command::Stats { db_path } => {
            let db_path = resolve_db(db_path, &config)?;
            let report = stats(&db_path, &AdminOpenOptions::default())?;
            emit(&cli.format, &report, |_| print_stats_text(&report))?;
        }
        Command::Verify { db_path, level } => {
            let db_path = resolve_db(db_path, &config)?;
            let report = verify(&db_path, level.into())?;
            emit(&cli.format, &report, |_| print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Put {
            db_path,
            key,
            value,
        } => {
            let db_path = resolve_db(db_path, &config)?;
            let mut table = open_table(&db_path, &AdminOpenOptions::default())?;
            table.put(key.as_bytes(), value.as_bytes())?;
            table.flush()?;
        }
        Command::Get { db_path, key } => {
            let db_path = resolve_db(db_path, &config)?;
            let table = open_table(&db_path, &AdminOpenOptions::default())?;
            match table.get(key.as_bytes())? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => {
                    eprintln!("key not found: {key}");
                    std::process::exit(3);
                }
            }
        }
        Command::Remove { db_path, key } => {
            let db_path = resolve_db(db_path, &config)?;
            let mut table = open_table(&db_path, &AdminOpenOptions::default())?;
            let removed = table.remove(key.as_bytes())?;
            table.flush()?;
            if removed.is_none() {
                eprintln!("key not found: {key}");
                std::process::exit(3);
            }
        }
    }

    Ok(())
}

fn install_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_db(explicit: Option<PathBuf>, config: &CliConfig) -> Result<PathBuf, Box<dyn Error>> {
    explicit
        .or_else(|| config.default_db_path().cloned())
        .ok_or_else(|| {
            "no table path given; pass DB or set [database] default in the config file".into()
        })
}

fn build_table_options(cmd: &CreateCmd, base: TableOptions) -> TableOptions {
    let mut opts = base;
    if let Some(segments) = cmd.segments {
        opts = opts.segments(segments);
    }
    if let Some(entries) = cmd.entries_per_tier {
        opts = opts.entries_per_tier(entries);
    }
    if let Some(bytes) = cmd.entry_size {
        opts = opts.entry_size(bytes);
    }
    if let Some(tiers) = cmd.tiers_per_bulk {
        opts = opts.tiers_per_bulk(tiers);
    }
    if let Some(bulks) = cmd.initial_bulks {
        opts = opts.initial_bulks(bulks);
    }
    if let Some(bulks) = cmd.max_bulks {
        opts = opts.max_bulks(bulks);
    }
    if let Some(seed) = cmd.seed {
        opts = opts.hash_seed(seed);
    }
    opts
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_create_text(report: &CreateReport) {
    println!(
        "Created {} ({} bytes): segments={} entries_per_tier={} entry_size={}",
        report.path, report.size_bytes, report.segments, report.entries_per_tier, report.entry_size
    );
    println!(
        "  tiers_per_bulk={} allocated_bulks={} max_bulks={} hash_seed={:#018x}",
        report.tiers_per_bulk, report.allocated_bulks, report.max_bulks, report.hash_seed
    );
}

fn print_recover_text(report: &RecoveryReport) {
    let counts = &report.counts;
    println!(
        "Recovery => clean={} corrections={} segments={} scanned={} linked={} free={} invalid={} duplicates={}",
        report.is_clean(),
        report.corrections.len(),
        counts.segments,
        counts.extra_tiers_scanned,
        counts.tiers_linked,
        counts.free_tiers,
        counts.invalid_entries,
        counts.duplicates_removed,
    );
    for correction in &report.corrections {
        let mut location = String::new();
        if let Some(segment) = correction.segment {
            location.push_str(&format!(" segment={segment}"));
        }
        if let Some(tier) = correction.tier {
            location.push_str(&format!(" tier={tier}"));
        }
        println!(
            "- {}{}: {}",
            correction.kind.as_str(),
            location,
            correction.detail
        );
    }
    println!(
        "Global: allocated_bulks={} extra_tiers_in_use={} first_free_tier_index={}",
        report.global.allocated_bulks,
        report.global.extra_tiers_in_use,
        report.global.first_free_tier_index
    );
}

fn print_stats_text(report: &StatsReport) {
    let g = &report.geometry;
    println!("Geometry:");
    println!(
        "  segments={} entries_per_tier={} entry_size={} payload_capacity={} tiers_per_bulk={} max_bulks={}",
        g.segments, g.entries_per_tier, g.entry_size, g.payload_capacity, g.tiers_per_bulk, g.max_bulks
    );
    println!("  hash_seed={:#018x}", g.hash_seed);
    println!();
    let p = &report.pool;
    println!(
        "Pool: allocated_bulks={} tiers={} in_use={} free={} first_free_tier_index={}",
        p.allocated_bulks, p.pool_tiers, p.extra_tiers_in_use, p.free_tiers, p.first_free_tier_index
    );
    println!();
    println!(
        "Segments: live_entries={} longest_chain={}",
        report.segments.live_entries, report.segments.longest_chain
    );
    println!();
    println!(
        "Filesystem: db_size={} db_path={}",
        report.filesystem.db_size_bytes, report.filesystem.db_path
    );
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify ({:?}) => success={} segments={} tiers={} entries={} free_tiers={}",
        report.level,
        report.success,
        report.counts.segments_checked,
        report.counts.tiers_walked,
        report.counts.entries_checked,
        report.counts.free_tiers_walked,
    );
    for finding in &report.findings {
        println!("- {:?}: {}", finding.severity, finding.message);
    }
}
