//! # askdb CLI
//!
//! Ask questions of an allow-listed database in plain language.
//!
//! ## Usage
//!
//! ```bash
//! # Index the knowledge base
//! askdb ingest
//!
//! # Generate SQL and run it
//! askdb ask "orders from last week" --execute
//! ```

use std::path::PathBuf;

use askdb::commands;
use askdb::config::Config;
use clap::{Parser, Subcommand};

/// Initialize logger based on verbose flag
fn init_logger(verbose: bool) {
    let mut log_builder = env_logger::Builder::from_default_env();
    if verbose {
        log_builder.filter_level(log::LevelFilter::Debug);
    } else {
        log_builder.filter_level(log::LevelFilter::Info);
    }
    log_builder.init();
}

/// Main CLI structure
#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask questions of an allow-listed database in plain language", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.config/askdb/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Build schema documents from the knowledge base and index them
    Ingest {
        /// Keep existing documents instead of rebuilding the index
        #[arg(long)]
        keep_existing: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Turn a question into validated SQL
    Ask {
        /// Natural language question
        #[arg(value_name = "QUESTION")]
        question: String,
        /// Run the SQL against the configured database
        #[arg(long, short = 'x')]
        execute: bool,
        /// Maximum rows to return
        #[arg(long, short = 'n', value_name = "N")]
        limit: Option<usize>,
        /// Number of tables to retrieve
        #[arg(long, value_name = "K")]
        top_k: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a SQL statement against the read-only policy
    Validate {
        #[arg(value_name = "SQL")]
        sql: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List allow-listed tables
    Tables {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the schema document for a table
    Schema {
        #[arg(value_name = "TABLE")]
        table: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify every allow-listed table has valid metadata
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive question loop
    Shell {
        /// Run every generated query
        #[arg(long, short = 'x')]
        execute: bool,
        /// Maximum rows to return per query
        #[arg(long, short = 'n', value_name = "N")]
        limit: Option<usize>,
    },
    /// Check knowledge base, index, models and database
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Show full secrets instead of masked values
        #[arg(long)]
        show_secrets: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a configuration file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    let exit_code = run_command(cli).await;
    std::process::exit(exit_code);
}

async fn run_command(cli: Cli) -> i32 {
    use askdb::exit_codes::*;

    // `config init` must work without a loadable config.
    if let Commands::Config {
        command: ConfigCommands::Init { force },
    } = cli.command
    {
        let args = commands::config::ConfigInitArgs {
            path: cli.config,
            force,
        };
        return match commands::config::execute_init(args) {
            Ok(exit_code) => exit_code,
            Err(e) => {
                eprintln!("Config error: {:#}", e);
                EXIT_CONFIG_ERROR
            }
        };
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            askdb::errors::display_config_error(&format!("{:#}", e));
            return EXIT_CONFIG_ERROR;
        }
    };
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::Ingest {
            keep_existing,
            json,
        } => {
            let args = commands::ingest::IngestArgs {
                keep_existing,
                json,
                verbose,
            };
            commands::ingest::execute(args, &config).await
        }
        Commands::Ask {
            question,
            execute,
            limit,
            top_k,
            json,
        } => {
            let args = commands::ask::AskArgs {
                question,
                execute,
                limit,
                top_k,
                json,
                verbose,
            };
            commands::ask::execute(args, &config).await
        }
        Commands::Validate { sql, json } => {
            commands::validate::execute(commands::validate::ValidateArgs { sql, json }, &config)
        }
        Commands::Tables { json } => {
            commands::tables::execute(commands::tables::TablesArgs { json }, &config)
        }
        Commands::Schema { table, json } => {
            commands::schema::execute(commands::schema::SchemaArgs { table, json }, &config)
        }
        Commands::Check { json } => {
            commands::check::execute(commands::check::CheckArgs { json }, &config)
        }
        Commands::Shell { execute, limit } => {
            let args = commands::shell::ShellArgs {
                execute,
                limit,
                verbose,
            };
            commands::shell::execute(args, &config).await
        }
        Commands::Status { json } => {
            commands::status::execute(commands::status::StatusArgs { json }, &config).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show { show_secrets, json } => commands::config::execute_show(
                commands::config::ConfigShowArgs { show_secrets, json },
                &config,
            ),
            ConfigCommands::Init { force } => {
                commands::config::execute_init(commands::config::ConfigInitArgs {
                    path: cli.config,
                    force,
                })
            }
        },
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}
