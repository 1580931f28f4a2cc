mod config;
mod error;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use policy::{MemoryConnection, Resolver};
use serde_json::Value;
use session::Session;
use storage::{Document, DocumentStore, Query};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "strongroom.toml";

#[derive(Parser)]
#[command(name = "strongroom")]
#[command(about = "An embedded document store with role-based access", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables with their schema and size
    Tables,
    /// Print documents of a table as JSON
    Get {
        table: String,
        /// Keep documents whose field equals a value (field=value)
        #[arg(short = 'w', long = "where", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
        /// Order by a field
        #[arg(short, long)]
        sort: Option<String>,
        /// Reverse the order
        #[arg(long, requires = "sort")]
        desc: bool,
        /// Read through the access gate as this role
        #[arg(long = "as", value_name = "ROLE")]
        role: Option<String>,
    },
    /// Insert a JSON document into a table
    Insert {
        table: String,
        document: String,
        /// Write through the access gate as this role
        #[arg(long = "as", value_name = "ROLE")]
        role: Option<String>,
    },
    /// Create an empty table
    CreateTable {
        name: String,
        /// Schema name; defaults to the table name
        #[arg(short, long)]
        schema: Option<String>,
    },
    /// Drop a table and delete its file
    DropTable { name: String },
    /// Seed the configured actions, roles and groups
    Seed,
    /// Check whether a role holds an action
    Can {
        #[arg(short, long)]
        role: String,
        #[arg(short, long)]
        action: String,
        #[arg(short, long)]
        domain: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = DocumentStore::open(config.store.clone(), config.schema_registry()?).await?;
    let report = store.ready().await;
    for path in &report.failed {
        eprintln!("warning: could not load {}", path.display());
    }

    let result = match cli.command {
        Commands::Tables => cmd_tables(&store),
        Commands::Get {
            table,
            filters,
            sort,
            desc,
            role,
        } => cmd_get(&store, &config, &table, &filters, sort.as_deref(), desc, role.as_deref()),
        Commands::Insert {
            table,
            document,
            role,
        } => cmd_insert(&store, &config, &table, &document, role.as_deref()),
        Commands::CreateTable { name, schema } => cmd_create_table(&store, &name, schema.as_deref()),
        Commands::DropTable { name } => cmd_drop_table(&store, &name),
        Commands::Seed => cmd_seed(&store, &config).await,
        Commands::Can {
            role,
            action,
            domain,
        } => cmd_can(&store, &role, &action, domain.as_deref().or(config.domain.as_deref())),
    };

    store.close().await;
    result
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        info!(path = %path.display(), "loading config");
        Ok(Config::load(path)?)
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

fn cmd_tables(store: &DocumentStore) -> Result<()> {
    let tables = store.tables();
    if tables.is_empty() {
        println!("No tables found.");
        return Ok(());
    }

    println!("{:<24} {:<16} DOCUMENTS", "TABLE", "SCHEMA");
    for table in tables {
        println!("{:<24} {:<16} {}", table.name, table.schema, table.documents);
    }
    Ok(())
}

fn cmd_get(
    store: &DocumentStore,
    config: &Config,
    table: &str,
    filters: &[String],
    sort: Option<&str>,
    desc: bool,
    role: Option<&str>,
) -> Result<()> {
    if !store.has_table(table) {
        return Err(Error::TableNotFound(table.to_string()));
    }

    let filters = filters
        .iter()
        .map(|f| parse_filter(f))
        .collect::<Result<Vec<_>>>()?;
    let mut query = Query::all();
    for (field, value) in &filters {
        query = query.field_eq(field, value.clone());
    }
    if let Some(field) = sort {
        query = query.order_by(move |a, b| {
            let ord = compare(a.get(field), b.get(field));
            if desc { ord.reverse() } else { ord }
        });
    }

    let documents = match role {
        Some(role) => gate(store, config, role)?.read(table, &query)?,
        None => store.get(table, &query),
    };
    println!("{}", serde_json::to_string_pretty(&documents)?);
    Ok(())
}

fn cmd_insert(
    store: &DocumentStore,
    config: &Config,
    table: &str,
    document: &str,
    role: Option<&str>,
) -> Result<()> {
    if !store.has_table(table) {
        return Err(Error::TableNotFound(table.to_string()));
    }
    let candidate = Document::from_value(serde_json::from_str(document)?)
        .ok_or_else(|| Error::Argument("document must be a JSON object".to_string()))?;

    let stored = match role {
        Some(role) => gate(store, config, role)?.insert(table, &candidate)?,
        None => store.set(table, &candidate),
    };
    let stored = stored.ok_or_else(|| Error::Rejected(table.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

fn cmd_create_table(store: &DocumentStore, name: &str, schema: Option<&str>) -> Result<()> {
    let schema = schema.unwrap_or(name);
    if !store.new_table_with(name, schema) {
        return Err(Error::TableNotCreated {
            table: name.to_string(),
            schema: schema.to_string(),
        });
    }
    println!("Created table '{name}' ({schema})");
    Ok(())
}

fn cmd_drop_table(store: &DocumentStore, name: &str) -> Result<()> {
    if !store.drop_table(name) {
        return Err(Error::TableNotFound(name.to_string()));
    }
    println!("Dropped table '{name}'");
    Ok(())
}

async fn cmd_seed(store: &DocumentStore, config: &Config) -> Result<()> {
    if config.access.is_empty() {
        println!("Nothing to seed.");
        return Ok(());
    }
    let report = config.access.seed(store).await?;
    println!(
        "Seeded {} record(s), {} already present",
        report.inserted, report.existing
    );
    Ok(())
}

fn cmd_can(store: &DocumentStore, role: &str, action: &str, domain: Option<&str>) -> Result<()> {
    let resolver = Resolver::new(store.clone());
    let record = resolver.role(role, domain);
    if record.is_none() {
        eprintln!("warning: role '{role}' not found");
    }
    let allowed = resolver.can(record.as_ref(), action, domain);
    println!("{}", if allowed { "allow" } else { "deny" });
    Ok(())
}

/// Session logged in as `role`, with the configured domain and guards.
fn gate(store: &DocumentStore, config: &Config, role: &str) -> Result<Session<MemoryConnection>> {
    let mut session = Session::new(store.clone(), MemoryConnection::new());
    if let Some(domain) = &config.domain {
        session = session.with_domain(domain);
    }
    for (table, model) in &config.guarded {
        session = session.guard_table(table, model);
    }
    session.login(role)?;
    Ok(session)
}

/// Split `field=value`; the value is read as JSON when it parses, else
/// as a plain string.
fn parse_filter(filter: &str) -> Result<(String, Value)> {
    let (field, raw) = filter
        .split_once('=')
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| Error::Argument(format!("expected FIELD=VALUE, got '{filter}'")))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.to_string(), value))
}

/// Order JSON values: missing first, then numbers, then strings, then the rest
/// by their text.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("id=3").unwrap(), ("id".to_string(), json!(3)));
        assert_eq!(parse_filter("name=tea").unwrap(), ("name".to_string(), json!("tea")));
        assert_eq!(parse_filter("active=true").unwrap(), ("active".to_string(), json!(true)));
        assert_eq!(parse_filter("note=a=b").unwrap(), ("note".to_string(), json!("a=b")));
        assert!(parse_filter("=3").is_err());
        assert!(parse_filter("novalue").is_err());
    }

    #[test]
    fn test_compare_orders_mixed_values() {
        assert_eq!(compare(Some(&json!(2)), Some(&json!(10))), Ordering::Less);
        assert_eq!(compare(Some(&json!("b")), Some(&json!("a"))), Ordering::Greater);
        assert_eq!(compare(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare(Some(&json!(1.5)), Some(&json!(1.5))), Ordering::Equal);
    }

    #[test]
    fn test_cli_parses_where_and_sort() {
        let cli = Cli::try_parse_from([
            "strongroom", "get", "orders", "--where", "item=tea", "-w", "id=1", "--sort", "id",
            "--desc", "--as", "clerk",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE));
        match cli.command {
            Commands::Get {
                table,
                filters,
                sort,
                desc,
                role,
            } => {
                assert_eq!(table, "orders");
                assert_eq!(filters, ["item=tea", "id=1"]);
                assert_eq!(sort.as_deref(), Some("id"));
                assert!(desc);
                assert_eq!(role.as_deref(), Some("clerk"));
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_cli_desc_requires_sort() {
        assert!(Cli::try_parse_from(["strongroom", "get", "orders", "--desc"]).is_err());
    }
}
