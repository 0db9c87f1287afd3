//! Painel CLI - Serve and render dashboards
//!
//! Usage:
//!   painel serve [--bind <addr>] [--port <port>]
//!   painel render <instance> [--filter <field__op=value>]...
//!   painel block <block> [--instance <instance>] [--user <principal>]
//!   painel compile <block> [--instance <instance>] [--dialect <dialect>]
//!   painel inspect <dataset> [--refresh]
//!   painel preview <dataset> [--instance <instance>] [--user <principal>] [--limit <n>]
//!
//! Examples:
//!   painel --config painel.toml serve --port 9000
//!   painel render vendas-norte --filter data_venda__gte=2024-01-01
//!   painel compile vendas-por-mes --dialect sqlite

use clap::{Parser, Subcommand, ValueEnum};
use painel::config::Settings;
use painel::dashboard::{parse_filter_args, Engine, StaticCatalog};
use painel::sql::Dialect;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "painel")]
#[command(about = "Painel - A read-only semantic query engine for dashboards")]
#[command(version)]
struct Cli {
    /// Path to painel.toml (defaults to PAINEL_CONFIG, ./painel.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render every block of a dashboard instance as JSON
    Render {
        /// Dashboard instance id
        instance: String,

        /// Filter as field__op=value (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Principal the instance must be visible to
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Render a single block as JSON
    Block {
        /// Dashboard block id
        block: String,

        /// Instance whose tenant scope applies
        #[arg(short, long)]
        instance: Option<String>,

        /// Principal the instance must be visible to (a catalog admin
        /// when no instance is given)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Print the SQL a block compiles to, without running it
    Compile {
        /// Dashboard block id
        block: String,

        /// Instance whose tenant scope applies
        #[arg(short, long)]
        instance: Option<String>,

        /// SQL dialect to generate (defaults to the connection's)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// Show the column metadata of a dataset
    Inspect {
        /// Dataset id
        dataset: String,

        /// Drop the cached metadata first
        #[arg(short, long)]
        refresh: bool,
    },

    /// Show the first rows of a dataset
    Preview {
        /// Dataset id
        dataset: String,

        /// Instance whose tenant scope applies
        #[arg(short, long)]
        instance: Option<String>,

        /// Principal the instance must be visible to (a catalog admin
        /// when no instance is given)
        #[arg(short, long)]
        user: Option<String>,

        /// Number of rows to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Duckdb,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load_from(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings.logging.level);

    let engine = match build_engine(&settings) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(engine, &settings, bind, port).await,
        Commands::Render {
            instance,
            filters,
            user,
        } => cmd_render(&engine, &instance, &filters, user.as_deref()).await,
        Commands::Block {
            block,
            instance,
            user,
        } => cmd_block(&engine, &block, instance.as_deref(), user.as_deref()).await,
        Commands::Compile {
            block,
            instance,
            dialect,
        } => cmd_compile(&engine, &block, instance.as_deref(), dialect.map(Into::into)).await,
        Commands::Inspect { dataset, refresh } => cmd_inspect(&engine, &dataset, refresh).await,
        Commands::Preview {
            dataset,
            instance,
            user,
            limit,
        } => cmd_preview(&engine, &dataset, instance.as_deref(), user.as_deref(), limit).await,
    }
}

/// Log to stderr, filtered by PAINEL_LOG, then RUST_LOG, then `logging.level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("PAINEL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_engine(settings: &Settings) -> Result<Engine, Box<dyn std::error::Error>> {
    let connections = settings.connection_records()?;
    let catalog = match settings.catalog_path()? {
        Some(path) => StaticCatalog::from_file(&path, connections)?,
        None => {
            tracing::warn!("no catalog configured, serving an empty catalog");
            let mut catalog = StaticCatalog::default();
            for record in connections {
                catalog.add_connection(record);
            }
            catalog
        }
    };
    Ok(Engine::from_settings(settings, Arc::new(catalog))?)
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error encoding output: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_serve(
    engine: Engine,
    settings: &Settings,
    bind: Option<String>,
    port: Option<u16>,
) -> ExitCode {
    let addr = format!(
        "{}:{}",
        bind.as_deref().unwrap_or(&settings.server.bind),
        port.unwrap_or(settings.server.port)
    );
    match painel::web::serve(engine, &addr).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_render(
    engine: &Engine,
    instance: &str,
    filters: &[String],
    user: Option<&str>,
) -> ExitCode {
    let params = parse_filter_args(filters);
    match engine.render_dashboard(instance, user, &params).await {
        Ok(response) => print_json(&response),
        Err(e) => {
            eprintln!("Render error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_block(
    engine: &Engine,
    block: &str,
    instance: Option<&str>,
    user: Option<&str>,
) -> ExitCode {
    match engine.render_block(block, instance, user).await {
        Ok(payload) => print_json(&payload),
        Err(e) => {
            eprintln!("Block error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_compile(
    engine: &Engine,
    block: &str,
    instance: Option<&str>,
    dialect: Option<Dialect>,
) -> ExitCode {
    let compiled = match engine.compile_block(block, instance, dialect).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Compilation error ({}): {}", e.kind(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("{}", compiled.query.sql);
    if !compiled.query.params.is_empty() {
        println!();
        println!("-- Parameters:");
        for (i, param) in compiled.query.params.iter().enumerate() {
            println!("--   {}: {}", i + 1, serde_json::Value::from(param));
        }
    }
    ExitCode::SUCCESS
}

async fn cmd_inspect(engine: &Engine, dataset: &str, refresh: bool) -> ExitCode {
    let metadata = match engine.dataset_metadata(dataset, refresh).await {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Inspect error ({}): {}", e.kind(), e);
            return ExitCode::FAILURE;
        }
    };

    println!("Dataset: {}", dataset);
    println!();
    for column in metadata.sorted() {
        println!(
            "  {:<30} {:<12} {}",
            column.name,
            column.semantic_type.as_str(),
            column.database_type
        );
    }
    ExitCode::SUCCESS
}

async fn cmd_preview(
    engine: &Engine,
    dataset: &str,
    instance: Option<&str>,
    user: Option<&str>,
    limit: usize,
) -> ExitCode {
    match engine.preview_dataset(dataset, instance, user, limit).await {
        Ok(rows) => print_json(&rows),
        Err(e) => {
            eprintln!("Preview error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}
