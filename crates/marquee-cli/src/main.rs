//! Marquee CLI: inspect and maintain the movie catalog against the configured
//! storage backend.
//!
//! Configuration comes from the environment (and `.env`); see `Config`.

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use marquee_catalog::{CatalogError, DeleteOutcome, DeleteRequest};
use marquee_cli::{build_service, guess_content_type, init_tracing};
use marquee_core::{Config, ErrorMetadata};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "marquee", about = "Movie catalog and storage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List raw storage keys under the root (or an owner folder)
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show the reconciled catalog for an owner (or the shared scope)
    View {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Reconcile and write the catalog back
    Refresh {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Delete a file by URL, path, key or bare name
    Delete {
        identifier: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Create an owner's folder
    Mkdir { owner: String },
    /// Upload a local file into the catalog layout
    Upload {
        /// Path to the file to upload
        file: std::path::PathBuf,
        #[arg(long)]
        owner: Option<String>,
        /// Stored name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Show the canonical key for an identifier
    Normalize {
        input: String,
        #[arg(long)]
        folder: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn report_error(error: CatalogError) -> anyhow::Result<()> {
    print_json(&serde_json::json!({
        "success": false,
        "status": error.http_status_code(),
        "code": error.error_code(),
        "message": error.client_message(),
    }))?;
    Err(error.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.log_json());

    let cli = Cli::parse();
    let (storage, service) = build_service(&config).await?;

    match cli.command {
        Commands::List { owner } => {
            let prefix = service.normalizer().folder_key(owner.as_deref());
            let keys = storage
                .list(&prefix)
                .await
                .with_context(|| format!("Failed to list {}", prefix))?;
            print_json(&keys)?;
        }
        Commands::View { owner } => {
            let view = service.catalog_view(owner.as_deref()).await;
            print_json(&view)?;
        }
        Commands::Refresh { owner } => match service.refresh(owner.as_deref()).await {
            Ok(view) => print_json(&view)?,
            Err(e) => report_error(e)?,
        },
        Commands::Delete { identifier, owner } => {
            let result = match DeleteRequest::new(identifier, owner) {
                Ok(request) => service.delete(&request).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(outcome) => {
                    let message = match &outcome {
                        DeleteOutcome::Deleted { key } => format!("Deleted {}", key),
                        DeleteOutcome::AlreadyAbsent => "File already absent".to_string(),
                    };
                    print_json(&serde_json::json!({
                        "success": true,
                        "message": message,
                        "result": outcome,
                    }))?;
                }
                Err(e) => report_error(e)?,
            }
        }
        Commands::Mkdir { owner } => {
            let created = service.ensure_owner_folder(&owner).await;
            print_json(&serde_json::json!({
                "success": created,
                "folder": service.normalizer().folder_key(Some(owner.as_str())),
            }))?;
        }
        Commands::Upload {
            file,
            owner,
            name,
            content_type,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("File path has no file name")?,
            };
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&name).to_string());

            match service
                .store_file(owner.as_deref(), &name, Bytes::from(data), &content_type)
                .await
            {
                Ok(stored) => print_json(&stored)?,
                Err(e) => report_error(e)?,
            }
        }
        Commands::Normalize { input, folder } => {
            let report = service.normalizer().normalize_report(&input, folder);
            print_json(&serde_json::json!({
                "key": report.key,
                "degradations": report
                    .degradations
                    .iter()
                    .map(|d| format!("{:?}", d))
                    .collect::<Vec<_>>(),
            }))?;
        }
    }

    Ok(())
}
