use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gts::GtsOps;

use crate::server::GtsHttpServer;

#[derive(Parser)]
#[command(name = "gts")]
#[command(about = "Global Type System helpers", long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to a GTS config JSON overriding the defaults
    #[arg(long)]
    pub config: Option<String>,

    /// Files or directories holding schemas and instances (repeatable)
    #[arg(long, action = clap::ArgAction::Append)]
    pub path: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a GTS ID format
    ValidateId {
        #[arg(long)]
        gts_id: String,
    },
    /// Parse a GTS ID into its components
    ParseId {
        #[arg(long)]
        gts_id: String,
    },
    /// Match a GTS ID against a wildcard pattern
    MatchIdPattern {
        #[arg(long)]
        pattern: String,
        #[arg(long)]
        candidate: String,
    },
    /// Derive the deterministic UUID of a GTS ID
    Uuid {
        #[arg(long)]
        gts_id: String,
    },
    /// Extract the GTS id from a JSON document
    ExtractId {
        /// Path to the document; reads stdin when omitted
        #[arg(long)]
        file: Option<String>,
    },
    /// Fetch a single entity by id
    GetEntity {
        #[arg(long)]
        gts_id: String,
    },
    /// Validate an instance against its schema
    ValidateInstance {
        #[arg(long)]
        gts_id: String,
    },
    /// Build the reference graph reachable from a schema
    ResolveRelationships {
        #[arg(long)]
        gts_id: String,
    },
    /// List the instances of a schema
    InstancesOf {
        #[arg(long)]
        schema_id: String,
    },
    /// Check minor-version compatibility between two schemas
    Compatibility {
        #[arg(long)]
        old_schema_id: String,
        #[arg(long)]
        new_schema_id: String,
    },
    /// Cast an instance to a compatible minor version
    Cast {
        #[arg(long)]
        from_id: String,
        #[arg(long)]
        to_schema_id: String,
    },
    /// Query entities using a pattern plus predicates
    Query {
        #[arg(long)]
        expr: String,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Resolve an attribute path against an entity
    Attr {
        #[arg(long)]
        gts_with_path: String,
    },
    /// List loaded entities
    List {
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Show load-time diagnostics (duplicates, skipped, broken references)
    Diagnostics,
    /// Start the GTS HTTP server
    Server {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value = "8000")]
        port: u16,
    },
    /// Write the OpenAPI specification of the HTTP surface
    OpenapiSpec {
        #[arg(long)]
        out: String,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value = "8000")]
        port: u16,
    },
}

/// Runs the CLI. Exit code 0 on success, 1 when the operation itself fails,
/// 2 (via the error return) on internal errors.
///
/// # Errors
/// Returns an error when command execution fails internally.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    run_with_cli(cli).await
}

/// Split from `run()` so tests can pass a parsed `Cli`.
///
/// # Errors
/// Returns an error when command execution fails internally.
pub async fn run_with_cli(cli: Cli) -> Result<ExitCode> {
    // WARN by default, INFO with -v, DEBUG with -vv
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .try_init();

    run_command(cli).await
}

async fn run_command(cli: Cli) -> Result<ExitCode> {
    let ops = GtsOps::new(&cli.path, cli.config.as_deref());

    let ok = match cli.command {
        Commands::Server { host, port } => {
            println!("starting the server @ http://{host}:{port}");
            if cli.verbose == 0 {
                println!("use --verbose to see server logs");
            }
            let server = GtsHttpServer::new(ops, host, port, cli.verbose);
            server.run().await?;
            true
        }
        Commands::OpenapiSpec { out, host, port } => {
            let server = GtsHttpServer::new(ops, host, port, cli.verbose);
            std::fs::write(&out, serde_json::to_string_pretty(&server.openapi_spec())?)?;
            print_result(&serde_json::json!({"ok": true, "out": out}))?;
            true
        }
        Commands::ValidateId { gts_id } => {
            let result = GtsOps::validate_id(&gts_id);
            print_result(&result)?;
            result.valid
        }
        Commands::ParseId { gts_id } => {
            let result = GtsOps::parse_id(&gts_id);
            print_result(&result)?;
            result.ok
        }
        Commands::MatchIdPattern { pattern, candidate } => {
            let result = GtsOps::match_id_pattern(&candidate, &pattern);
            print_result(&result)?;
            result.error.is_empty()
        }
        Commands::Uuid { gts_id } => {
            let result = ops.uuid(&gts_id);
            print_result(&result)?;
            result.ok
        }
        Commands::ExtractId { file } => match read_document(file.as_deref()) {
            Ok(document) => {
                let result = ops.extract_id(&document);
                print_result(&result)?;
                result.ok
            }
            Err(error) => {
                print_result(&serde_json::json!({"ok": false, "error": error}))?;
                false
            }
        },
        Commands::GetEntity { gts_id } => {
            let result = ops.get_entity(&gts_id);
            print_result(&result)?;
            result.ok
        }
        Commands::ValidateInstance { gts_id } => {
            let result = ops.validate_instance(&gts_id);
            print_result(&result)?;
            result.ok
        }
        Commands::ResolveRelationships { gts_id } => {
            let result = ops.schema_graph(&gts_id);
            print_result(&result)?;
            result.ok
        }
        Commands::InstancesOf { schema_id } => {
            let result = ops.instances_of(&schema_id);
            print_result(&result)?;
            result.error.is_empty()
        }
        Commands::Compatibility {
            old_schema_id,
            new_schema_id,
        } => {
            let result = ops.compatibility(&old_schema_id, &new_schema_id);
            print_result(&result)?;
            result.ok
        }
        Commands::Cast {
            from_id,
            to_schema_id,
        } => {
            let result = ops.cast(&from_id, &to_schema_id);
            print_result(&result)?;
            result.ok
        }
        Commands::Query { expr, limit } => {
            let result = ops.query(&expr, limit);
            print_result(&result)?;
            result.error.is_empty()
        }
        Commands::Attr { gts_with_path } => {
            let result = ops.attr(&gts_with_path);
            print_result(&result)?;
            result.resolved
        }
        Commands::List { limit } => {
            print_result(&ops.list_entities(limit))?;
            true
        }
        Commands::Diagnostics => {
            print_result(ops.diagnostics())?;
            true
        }
    };

    Ok(ExitCode::from(u8::from(!ok)))
}

/// Reads the JSON document for `extract-id` from a file or stdin. Unreadable
/// input is a user error, not an internal one.
fn read_document(file: Option<&str>) -> Result<serde_json::Value, String> {
    let raw = match file {
        Some(path) => {
            std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?
        }
        None => std::io::read_to_string(std::io::stdin())
            .map_err(|e| format!("cannot read stdin: {e}"))?,
    };
    serde_json::from_str(&raw).map_err(|e| format!("invalid JSON document: {e}"))
}

fn print_result<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}
