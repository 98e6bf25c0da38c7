//! media-categorizer CLI: assign taxonomy terms to media assets by filename.
//!
//! Usage:
//!   media-categorizer [--config config.yml] [--db path] [--dry-run | --export] [--backup]

use clap::Parser;
use media_categorizer::apply::{WpCli, WpCliBackup, WpCliCacheFlush};
use media_categorizer::plan::PlannedTerm;
use media_categorizer::{
    AssetStatus, AuditLog, AuditRow, Categorizer, CategorizerError, Config, ConfigError, CreationPolicy, OpenStore, RunMode,
    RunOutcome, SqliteStore,
};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(
    name = "media-categorizer",
    version,
    about = "Assign taxonomy terms to media assets by filename rules"
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = media_categorizer::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Path to SQLite database file (overrides settings.db_path)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Show what would be done, no database writes
    #[arg(long, conflicts_with = "export")]
    dry_run: bool,
    /// Generate CSV report only, no changes
    #[arg(long)]
    export: bool,
    /// Run 'wp db export' before modifying the database
    #[arg(long)]
    backup: bool,
    /// Process at most this many assets (overrides settings.limit)
    #[arg(long)]
    limit: Option<usize>,
    /// Write the assignment plan as JSON
    #[arg(long)]
    plan_json: Option<PathBuf>,
    /// Mirror audit events as JSON lines
    #[arg(long)]
    audit_jsonl: Option<PathBuf>,
    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.export {
            RunMode::Export
        } else {
            RunMode::Apply
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn create_file(path: &Path) -> Result<File, CategorizerError> {
    let export = |source| CategorizerError::Export {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(export)?;
    }
    File::create(path).map_err(export)
}

/// Ask on the terminal before creating terms
fn confirm_on_terminal(terms: &[PlannedTerm]) -> bool {
    eprintln!("{} new term(s) will be created:", terms.len());
    for term in terms {
        eprintln!("  + {}", term.path);
    }
    eprint!("Create them? [y/N] ");
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn build(cli: &Cli, config: Arc<Config>) -> Result<Categorizer, CategorizerError> {
    let settings = &config.settings;
    let db_path = cli
        .db
        .clone()
        .or_else(|| settings.db_path.clone())
        .ok_or_else(|| ConfigError::MissingField("settings.db_path (or --db)".into()))?;
    let store = SqliteStore::open(&db_path)?.with_taxonomy(settings.taxonomy.clone());
    info!(db = %db_path.display(), taxonomy = %settings.taxonomy, "opened term store");

    let mut categorizer = Categorizer::new(config.clone(), Arc::new(store)).with_limit(cli.limit);

    let wp = settings.wp_path.as_ref().map(WpCli::new);
    if cli.backup && cli.mode() == RunMode::Apply {
        match (settings.backup.enabled, &wp) {
            (true, Some(wp)) => {
                let output = settings
                    .backup_path(chrono::Utc::now())
                    .ok_or_else(|| ConfigError::MissingField("settings.backup.output_path".into()))?;
                categorizer = categorizer.with_backup(WpCliBackup::new(wp.clone(), output));
            }
            _ => info!("backup requested but disabled in configuration"),
        }
    }
    if settings.flush_cache {
        if let Some(wp) = wp {
            categorizer = categorizer.with_invalidator(WpCliCacheFlush::new(wp));
        }
    }
    if settings.term_creation == CreationPolicy::Confirm {
        categorizer = categorizer.with_confirmer(confirm_on_terminal);
    }
    Ok(categorizer)
}

/// Join a list for a table cell, cutting it to `width` characters
fn cell(items: &[String], width: usize) -> String {
    let joined = items.join(", ");
    if joined.chars().count() <= width {
        return joined;
    }
    let mut cut: String = joined.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn print_summary(outcome: &RunOutcome) {
    let rows: std::collections::HashMap<_, &AuditRow> = outcome.rows.iter().map(|row| (row.asset_id, row)).collect();

    println!(
        "{:>8}  {:<32}  {:<12}  {:<20}  {:<40}  {:<40}",
        "ASSET", "FILENAME", "STATUS", "KEYWORDS", "ASSIGN", "CREATE"
    );
    println!("{}", "-".repeat(164));
    for asset in &outcome.report.assets {
        let status = match asset.status {
            AssetStatus::Applied => "applied",
            AssetStatus::WouldApply => "would apply",
            AssetStatus::NoOp => "no-op",
            AssetStatus::Failed => "failed",
        };
        let (filename, keywords, assigned, created) = match rows.get(&asset.asset_id) {
            Some(row) => (
                row.filename.as_str(),
                row.matched_keywords.as_slice(),
                row.terms_assigned.as_slice(),
                row.terms_created.as_slice(),
            ),
            None => ("", &[][..], &[][..], &[][..]),
        };
        println!(
            "{:>8}  {:<32}  {:<12}  {:<20}  {:<40}  {:<40}",
            asset.asset_id,
            filename,
            status,
            cell(keywords, 20),
            cell(assigned, 40),
            cell(created, 40)
        );
        if !asset.skipped.is_empty() {
            println!("{:>8}  = {} assignment(s) already present", "", asset.skipped.len());
        }
        for error in &asset.errors {
            println!("{:>8}  ! {}", "", error);
        }
    }
    println!("{}", "-".repeat(164));

    let verb = if outcome.report.dry_run { "would be" } else { "were" };
    println!(
        "{} asset(s) scanned, {} matched; {} assignment(s) planned; {} term(s) {} created, {} relationship(s) {} added",
        outcome.assets_scanned,
        outcome.assets_matched,
        outcome.plan.assignment_count(),
        outcome.report.terms_created.len(),
        verb,
        outcome.report.new_relationships,
        verb
    );
    if !outcome.skipped_rules.is_empty() {
        println!("Skipped rules (invalid pattern): {}", outcome.skipped_rules.join(", "));
    }
}

fn run(cli: Cli) -> Result<(), CategorizerError> {
    let config = Arc::new(Config::load(&cli.config)?);
    let categorizer = build(&cli, config)?;

    let mut audit = AuditLog::new();
    if let Some(path) = &cli.audit_jsonl {
        audit = audit.with_stream(BufWriter::new(create_file(path)?));
    }

    let mode = cli.mode();
    let outcome = categorizer.run(mode, &mut audit)?;

    if let Some(path) = &cli.plan_json {
        let file = create_file(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &outcome.plan).map_err(|e| CategorizerError::Export {
            path: path.clone(),
            source: io::Error::from(e),
        })?;
    }
    if audit.stream_failures() > 0 {
        warn!(failures = audit.stream_failures(), "some audit events were not streamed");
    }

    match mode {
        RunMode::DryRun => print_summary(&outcome),
        RunMode::Export => {
            if let Some(path) = &outcome.csv_path {
                println!("Report written to {}", path.display());
            }
            println!("Export complete. No changes were made.");
        }
        RunMode::Apply => {
            print_summary(&outcome);
            if let Some(path) = &outcome.csv_path {
                println!("Report written to {}", path.display());
            }
            println!("Apply completed successfully");
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
