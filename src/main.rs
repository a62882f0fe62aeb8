// ABOUTME: CLI entry point for mysql-sqlite-exporter
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Args, Parser, Subcommand};
use mysql_sqlite_exporter::commands::{self, ExportOptions};
use mysql_sqlite_exporter::config::SourceOverrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysql-sqlite-exporter")]
#[command(about = "Copy MySQL tables into a local SQLite database", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct SourceArgs {
    /// MySQL host
    #[arg(long, env = "MYSQL_HOST")]
    host: Option<String>,
    /// MySQL user
    #[arg(long, env = "MYSQL_USER")]
    user: Option<String>,
    /// MySQL password
    #[arg(long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// MySQL database (schema) to export from
    #[arg(long, env = "MYSQL_DATABASE")]
    database: Option<String>,
    /// MySQL port (default: 3306)
    #[arg(long, env = "MYSQL_PORT")]
    port: Option<u16>,
}

impl From<SourceArgs> for SourceOverrides {
    fn from(args: SourceArgs) -> Self {
        SourceOverrides {
            host: args.host,
            user: args.user,
            password: args.password,
            database: args.database,
            port: args.port,
        }
    }
}

#[derive(Args, Clone, Default)]
struct ConfigArgs {
    /// Path to the export config (TOML) listing tables, filters and defaults
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
    /// Path to a JSON column allow-list: {"table": ["column", ...]}
    #[arg(long = "fields")]
    fields_path: Option<PathBuf>,
    /// SQLite file to write (default: database/prod_database_local_copy.db next to the executable)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the configured tables from MySQL into the local SQLite file
    Export {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        config: ConfigArgs,
        /// Export only these tables, in this order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        /// Rows fetched and written per page (default: 1000)
        #[arg(long)]
        page_size: Option<usize>,
        /// Skip table selection and confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
        /// Disable interactive mode
        #[arg(long)]
        no_interactive: bool,
    },
    /// Show the export configuration and what the local copy already contains
    Status {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            source,
            config,
            tables,
            page_size,
            yes,
            no_interactive,
        } => {
            // --yes implies automation, so it disables interactive mode as well
            let options = ExportOptions {
                config_path: config.config_path,
                fields_path: config.fields_path,
                output: config.output,
                tables,
                page_size,
                source: source.into(),
                interactive: !no_interactive && !yes,
            };
            commands::export(options).await
        }
        Commands::Status { config } => commands::status(
            config.config_path.as_deref(),
            config.fields_path.as_deref(),
            config.output,
        ),
    }
}
