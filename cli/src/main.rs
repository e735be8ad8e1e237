use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tablebridge_providers::{ProviderEntry, ProvidersConfig};
use tablebridge_sqlite::{ProviderConnection, from_value_ref};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tablebridge")]
#[command(about = "Query SQLite with table providers installed", version)]
struct Cli {
    /// Log filter for stderr output (e.g. warn, debug, tablebridge_sqlite=trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run SQL statements and print result rows as JSON lines.
    Query(QueryArgs),
    /// List the providers a configuration installs.
    Providers(ProvidersArgs),
    /// Write the default provider configuration to a file.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Database file (default: a private in-memory database).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Provider configuration YAML (default: built-in providers).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Extra provider to register, as name=kind. May be repeated.
    #[arg(long = "provider", value_name = "NAME=KIND")]
    providers: Vec<String>,
    /// SQL statements, run in order.
    #[arg(required = true)]
    sql: Vec<String>,
}

#[derive(Debug, Args)]
struct ProvidersArgs {
    /// Provider configuration YAML (default: built-in providers).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// Output YAML path.
    path: PathBuf,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("error: {err}");
        std::process::exit(2);
    }

    let result = match cli.command {
        Command::Query(args) => run_query(args),
        Command::Providers(args) => run_providers(args),
        Command::InitConfig(args) => run_init_config(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) -> Result<(), String> {
    let filter =
        EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{level}': {e}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ProvidersConfig, String> {
    match path {
        Some(path) => ProvidersConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display())),
        None => Ok(ProvidersConfig::default()),
    }
}

fn run_query(args: QueryArgs) -> Result<(), String> {
    let mut config = load_config(args.config.as_deref())?;
    for raw in &args.providers {
        let entry: ProviderEntry = raw.parse().map_err(|e| format!("{e}"))?;
        config.providers.push(entry);
    }

    let mut conn = match &args.db {
        Some(path) => ProviderConnection::open(path)
            .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?,
        None => ProviderConnection::open_in_memory()
            .map_err(|e| format!("Failed to open in-memory database: {e}"))?,
    };
    config
        .apply(&mut conn)
        .map_err(|e| format!("Failed to register providers: {e}"))?;

    for sql in &args.sql {
        run_statement(&conn, sql)?;
    }

    let ledger = conn.ledger();
    conn.close()
        .map_err(|e| format!("Failed to close database: {e}"))?;
    debug!(stats = ?ledger.stats(), "connection closed");
    Ok(())
}

fn run_statement(conn: &ProviderConnection, sql: &str) -> Result<(), String> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| format!("Failed to prepare '{sql}': {e}"))?;
    if stmt.column_count() == 0 {
        let changed = stmt
            .execute([])
            .map_err(|e| format!("Failed to execute '{sql}': {e}"))?;
        debug!(changed, "statement executed");
        return Ok(());
    }

    print_rows(&mut stmt).map_err(|e| format!("Failed to execute '{sql}': {e}"))
}

/// Prints each result row as one JSON object keyed by column name.
fn print_rows(stmt: &mut rusqlite::Statement<'_>) -> Result<(), String> {
    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
    let mut rows = stmt.query([]).map_err(|e| e.to_string())?;
    while let Some(row) = rows
        .next()
        .map_err(|e| format!("Failed to read row: {e}"))?
    {
        let mut object = serde_json::Map::new();
        for (i, name) in names.iter().enumerate() {
            let value = row
                .get_ref(i)
                .map_err(|e| format!("Failed to read column '{name}': {e}"))
                .and_then(|v| from_value_ref(v).map_err(|e| format!("{e}")))?;
            object.insert(name.clone(), value.to_json());
        }
        println!("{}", serde_json::Value::Object(object));
    }
    Ok(())
}

fn run_providers(args: ProvidersArgs) -> Result<(), String> {
    let config = load_config(args.config.as_deref())?;
    for entry in &config.providers {
        let table = if entry.eponymous_only {
            "eponymous-only"
        } else {
            "creatable"
        };
        println!("{}\t{}\t{table}", entry.name, entry.kind);
    }
    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<(), String> {
    if args.path.exists() && !args.force {
        return Err(format!(
            "'{}' already exists (use --force to overwrite)",
            args.path.display()
        ));
    }
    ProvidersConfig::default()
        .save(&args.path)
        .map_err(|e| format!("Failed to write config '{}': {e}", args.path.display()))?;
    println!("Wrote default provider config to '{}'.", args.path.display());
    Ok(())
}
