use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use decisions_core::changes::{detect_changes, load_state, save_state};
use decisions_core::config::ImporterConfig;
use decisions_core::db::{self, SqliteRecordImporter, SqliteVersionStore};
use decisions_core::fetch::{extract_xml, DocumentFetcher, HttpArchive};
use decisions_core::scanner::{ScanOptions, Scanner};
use decisions_core::schema::Severity;
use decisions_core::sync::{SyncDriver, SyncSettings};
use decisions_core::xml;
use schemars::schema_for;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "decisions")]
#[command(about = "Ahjo decision archive importer", long_about = None)]
struct Cli {
    /// Directory holding importer.toml and skip_lists.yaml
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// SQLite database (overrides [database] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Archive server (overrides [source] base_url)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Recursion limit below the root (overrides [source] max_depth)
    #[arg(long, global = true)]
    max_depth: Option<u32>,

    /// More log output (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import new and changed minutes into the database
    Import {
        /// Archive path to start from (default: [source] root)
        root: Option<String>,
    },
    /// List the documents the scanner finds
    Scan { root: Option<String> },
    /// Compare a fresh scan with a state file and write the next state
    Changes {
        root: Option<String>,
        #[arg(long, default_value = "scan_state.json")]
        state: PathBuf,
    },
    /// Parse a local .xml or .zip minutes file and print it as JSON
    Parse {
        file: PathBuf,
        /// Fail on diagnostics at or above this severity
        #[arg(long)]
        threshold: Option<Severity>,
    },
    /// Download a remote ZIP, parse it and print it as JSON
    Fetch {
        url: String,
        #[arg(long)]
        threshold: Option<Severity>,
    },
    /// Export JSON Schemas for the document types
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for the document types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Schema { command } = &cli.command {
        return match command {
            SchemaCommands::Export { out_dir } => schema_export(out_dir),
        };
    }

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Import { root } => import(&config, root),
        Commands::Scan { root } => scan(&config, root),
        Commands::Changes { root, state } => changes(&config, root, &state),
        Commands::Parse { file, threshold } => {
            parse_local(&file, threshold.unwrap_or(config.parser.failure_threshold))
        }
        Commands::Fetch { url, threshold } => {
            fetch(&config, &url, threshold.unwrap_or(config.parser.failure_threshold))
        }
        Commands::Schema { .. } => Ok(()),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},reqwest=warn,hyper=warn,hyper_util=warn")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<ImporterConfig> {
    let mut config = ImporterConfig::load_from_dir(&cli.config_dir)?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.source.base_url = base_url.clone();
    }
    if let Some(max_depth) = cli.max_depth {
        config.source.max_depth = max_depth;
    }
    Ok(config)
}

fn archive(config: &ImporterConfig) -> Result<HttpArchive> {
    HttpArchive::new(config.http_config()).context("building HTTP client")
}

fn scan_options(config: &ImporterConfig, archive: &HttpArchive) -> ScanOptions {
    ScanOptions::new(archive.base_url(), &config.scan, config.skip_lists.clone())
}

fn import(config: &ImporterConfig, root: Option<String>) -> Result<()> {
    let root = root.unwrap_or_else(|| config.source.root.clone());
    let archive = archive(config)?;
    let conn = db::open(&config.database.path)?;
    let mut versions = SqliteVersionStore::new(&conn);
    let mut importer = SqliteRecordImporter::new(&conn, &config.source.data_source);

    let settings = SyncSettings {
        data_source: config.source.data_source.clone(),
        max_depth: config.source.max_depth,
        failure_threshold: config.parser.failure_threshold,
    };
    let driver = SyncDriver::new(&archive, scan_options(config, &archive), settings);
    let summary = driver.import_changes(&root, &mut versions, &mut importer)?;

    println!(
        "imported {}, updated {}, unchanged {}, skipped {}, failed {}, deleted {}",
        summary.imported,
        summary.updated,
        summary.unchanged,
        summary.skipped,
        summary.failed,
        summary.deleted.len()
    );
    Ok(())
}

fn scan(config: &ImporterConfig, root: Option<String>) -> Result<()> {
    let root = root.unwrap_or_else(|| config.source.root.clone());
    let archive = archive(config)?;
    let scanner = Scanner::new(&archive, scan_options(config, &archive));
    for descriptor in scanner.scan(&root, config.source.max_depth) {
        println!("{}", serde_json::to_string(&descriptor?)?);
    }
    Ok(())
}

fn changes(config: &ImporterConfig, root: Option<String>, state_path: &Path) -> Result<()> {
    let root = root.unwrap_or_else(|| config.source.root.clone());
    let archive = archive(config)?;
    let scanner = Scanner::new(&archive, scan_options(config, &archive));

    let previous = load_state(state_path)?;
    let changes = detect_changes(scanner.scan(&root, config.source.max_depth), &previous)?;
    for descriptor in &changes.changed {
        println!("changed\t{}\t{}", descriptor.last_modified_text, descriptor.path);
    }
    for path in &changes.deleted {
        println!("deleted\t{path}");
    }
    save_state(state_path, &changes.next_state)?;
    println!(
        "{} changed, {} deleted, state written to {}",
        changes.changed.len(),
        changes.deleted.len(),
        state_path.display()
    );
    Ok(())
}

fn parse_local(file: &Path, threshold: Severity) -> Result<()> {
    let name = file.display().to_string();
    let document = if file.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zip")) {
        let archive = File::open(file).with_context(|| format!("opening {name}"))?;
        let payload = extract_xml(&name, BufReader::new(archive))?;
        xml::parse_payload(&payload, threshold)?
    } else {
        let bytes = fs::read(file).with_context(|| format!("reading {name}"))?;
        xml::parse(bytes.as_slice(), &name, threshold)?
    };
    println!("{}", document.to_json_pretty()?);
    Ok(())
}

fn fetch(config: &ImporterConfig, url: &str, threshold: Severity) -> Result<()> {
    let payload = archive(config)?.open_remote_xml(url)?;
    let document = xml::parse_payload(&payload, threshold)?;
    println!("{}", document.to_json_pretty()?);
    Ok(())
}

fn schema_export(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)?;

    let document_schema = schema_for!(decisions_core::schema::DecisionDocument);
    let document_json = serde_json::to_string_pretty(&document_schema)?;
    fs::write(out_dir.join("DecisionDocument.schema.json"), document_json)?;

    let descriptor_schema = schema_for!(decisions_core::schema::DocumentDescriptor);
    let descriptor_json = serde_json::to_string_pretty(&descriptor_schema)?;
    fs::write(out_dir.join("DocumentDescriptor.schema.json"), descriptor_json)?;

    let entry_schema = schema_for!(decisions_core::schema::DirectoryEntry);
    let entry_json = serde_json::to_string_pretty(&entry_schema)?;
    fs::write(out_dir.join("DirectoryEntry.schema.json"), entry_json)?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}
