//! mosql: one-way MongoDB to SQL exports driven by editable schema mappings.

mod logging;
mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use mosql_export::ExportType;
use mosql_store::MappingStore;

const STORE_FILE: &str = "mosql.db";

#[derive(Parser, Debug)]
#[command(name = "mosql", version, about = "MongoDB to SQL database exports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle export related operations
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },
    /// Start admin console
    #[command(alias = "a")]
    Admin,
}

#[derive(Subcommand, Debug)]
enum ExportCommand {
    /// Initialize new export
    Init {
        /// Namespace value of the export
        #[arg(short = 'n', long)]
        namespace: String,
    },
    /// Generate default mappings for the export with given namespace.
    /// Default mappings convert Mongo collections and their keys to SQL
    /// tables and columns with default type conversions
    GenerateMappings {
        #[arg(short = 'n', long)]
        namespace: String,
        /// Dir path of all the mapping files
        #[arg(short = 'd', long = "dir-path")]
        dir_path: PathBuf,
    },
    /// Load customized or handwritten mappings for the export from the
    /// directory path
    LoadMappings {
        #[arg(short = 'n', long)]
        namespace: String,
        #[arg(short = 'd', long = "dir-path")]
        dir_path: PathBuf,
    },
    /// List all the saved exports
    List,
    /// Show the details of the saved export for a given namespace
    Show {
        #[arg(short = 'n', long)]
        namespace: String,
    },
    /// Delete the export for a given namespace
    Delete {
        #[arg(short = 'n', long)]
        namespace: String,
    },
    /// Start the export based on the type value of 'full' or 'change-stream'
    Start {
        #[arg(short = 'n', long)]
        namespace: String,
        /// Export type 'full' or 'change-stream'
        #[arg(short = 't', long = "type", default_value = "full")]
        export_type: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(None);

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            eprintln!("{}", usage_error(&e));
            return ExitCode::FAILURE;
        }
        Err(e) => {
            // --help / --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    if std::env::var("DATABASE_URL").is_err() {
        warn!("'DATABASE_URL' environment variable is not set; exports fall back to the stored source connection uri");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Admin => {
            println!("Admin console not ready yet");
            Ok(())
        }
        Command::Export { command } => {
            let store = MappingStore::open(STORE_FILE).context("opening mosql store")?;
            run_export(&store, command).await
        }
    }
}

async fn run_export(store: &MappingStore, command: ExportCommand) -> Result<()> {
    match command {
        ExportCommand::Init { namespace } => {
            let details = prompt::collect_init_data(&namespace)?;
            let export_id = mosql_export::initialize_export(store, &namespace, details)
                .context("failed to initialize export")?;

            println!(
                "\n{} Export created with namespace `{}`. Export ID `{}`\n",
                style("✅").green(),
                namespace,
                export_id
            );
            println!(
                "Now you can either generate a default schema mapping or run export with default mapping with following commands\n\
                 1) $ mosql export generate-mappings --namespace <namespace_value> --dir-path <dir_path_value>\n\
                 2) $ mosql export start --namespace <namespace_value> --type <type_value>"
            );
            Ok(())
        }

        ExportCommand::GenerateMappings {
            namespace,
            dir_path,
        } => {
            let generated =
                mosql_export::generate_mappings(store, &namespace, &dir_path).await?;
            println!(
                "Generated mappings for {} collection(s) into {}",
                generated.export.schemas.len(),
                dir_path.display()
            );
            Ok(())
        }

        ExportCommand::LoadMappings {
            namespace,
            dir_path,
        } => {
            let loaded = mosql_export::load_mappings(store, &namespace, &dir_path)?;
            if loaded.changeset.is_empty() {
                println!("Mappings loaded, nothing changed");
            } else {
                println!("Mappings loaded with changes:");
                for entry in &loaded.changeset.entries {
                    println!("  - {entry}");
                }
                for change in &loaded.changeset.schema_changes {
                    println!("  - {change}");
                }
            }
            Ok(())
        }

        ExportCommand::List => {
            let namespaces = mosql_export::list_exports(store)?;
            if namespaces.is_empty() {
                println!("No exports saved");
            } else {
                for namespace in namespaces {
                    println!("{namespace}");
                }
            }
            Ok(())
        }

        ExportCommand::Show { namespace } => {
            let export = mosql_export::show_export(store, &namespace)?;
            print_export(&export);
            Ok(())
        }

        ExportCommand::Delete { namespace } => {
            mosql_export::delete_export(store, &namespace)?;
            println!("Export `{namespace}` deleted");
            Ok(())
        }

        ExportCommand::Start {
            namespace,
            export_type,
        } => {
            let export_type: ExportType = export_type.parse()?;
            let shutdown = shutdown_token();
            let rows =
                mosql_export::start_export(store, &namespace, export_type, shutdown).await?;
            println!("Export `{namespace}` finished, {rows} row(s) written");
            Ok(())
        }
    }
}

fn print_export(export: &mosql_core::Export) {
    println!("Namespace:   {}", export.namespace);
    println!("Type:        {}", export.export_type);
    println!(
        "Source:      {} ({})",
        export.source_connection.name, export.source_connection.connection_uri
    );
    println!(
        "Destination: {} ({})",
        export.destination_connection.name, export.destination_connection.connection_uri
    );
    if !export.include_collections.is_empty() {
        println!("Include:     {}", export.include_collections);
    }
    if !export.exclude_collections.is_empty() {
        println!("Exclude:     {}", export.exclude_collections);
    }
    println!("Created:     {}", export.created_at.to_rfc3339());
    println!("Updated:     {}", export.updated_at.to_rfc3339());
    println!("Schemas:     {}", export.schemas.len());
    for schema in &export.schemas {
        println!(
            "  - {} -> {}.{} ({} field(s), pk {})",
            schema.collection,
            schema.namespace,
            schema.table,
            schema.mappings.len(),
            schema.primary_key.as_deref().unwrap_or("<none>")
        );
    }
}

/// ctrl-c flips a token every long-running command selects on.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            signal_token.cancel();
        }
    });
    token
}

/// Render a clap usage error in the house format.
fn usage_error(err: &clap::Error) -> String {
    let command = std::env::args()
        .skip_while(|a| a != "export")
        .nth(1)
        .filter(|a| !a.starts_with('-'))
        .unwrap_or_else(|| "help".to_string());

    let detail = err
        .to_string()
        .lines()
        .next()
        .unwrap_or("invalid usage")
        .trim_start_matches("error: ")
        .to_string();

    format!("error: {detail}, run 'mosql export {command} help' for usage")
}
