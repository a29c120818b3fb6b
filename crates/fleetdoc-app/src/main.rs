// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fleetdoc command-line tool.
//
// Entry point. Initialises logging, loads the configuration and runs one
// pipeline operation per invocation. Results are printed as JSON.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use fleetdoc_core::FleetdocConfig;
use fleetdoc_core::error::FleetdocError;
use fleetdoc_core::human_errors::humanize_error;
use fleetdoc_core::types::Protocol;
use fleetdoc_document::{DerivativeEngine, DerivativeLookup, ProtocolDocumentAssembler};
use fleetdoc_migration::{LegacyProtocolRecord, MigrationOptions, MigrationService};
use fleetdoc_security::{build_manifest, hash_bytes, verify_hash};
use fleetdoc_storage::LocalStore;
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "fleetdoc", version, about = "Rental protocol document pipeline")]
struct Cli {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the SHA-256 fingerprint of a file
    Hash {
        file: PathBuf,
    },
    /// Check a file against a recorded fingerprint
    Verify {
        file: PathBuf,
        /// Expected SHA-256, hex encoded
        digest: String,
    },
    /// Generate thumbnail, gallery and document copies of a photo
    Derive {
        image: PathBuf,
        /// Storage root the renditions are written under
        #[arg(long)]
        out: PathBuf,
        /// Protocol the photo belongs to
        #[arg(long, default_value = "unassigned")]
        protocol: String,
        /// Photo id; defaults to the file stem
        #[arg(long)]
        photo: Option<String>,
    },
    /// Render a protocol JSON file to an archival PDF
    Render {
        protocol: PathBuf,
        /// Storage root holding the photo document copies
        #[arg(long)]
        photos: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Migrate a JSON array of first-generation protocol records
    Migrate {
        records: PathBuf,
        /// Storage root holding legacy sources; results are written there too
        #[arg(long)]
        storage: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        skip_photos: bool,
        #[arg(long)]
        skip_documents: bool,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize result")?;
    println!("{out}");
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Attach the operator-facing explanation to pipeline errors.
fn explain(err: FleetdocError) -> anyhow::Error {
    let human = humanize_error(&err);
    tracing::error!(error = %err, severity = ?human.severity, "{}", human.message);
    anyhow::Error::new(err).context(format!("{} {}", human.message, human.suggestion))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => FleetdocConfig::load(path).map_err(explain)?,
        None => FleetdocConfig::default(),
    };

    match cli.command {
        Commands::Hash { file } => {
            let data = read(&file)?;
            println!("{}  {}", hash_bytes(&data), file.display());
        }
        Commands::Verify { file, digest } => {
            let data = read(&file)?;
            verify_hash(&data, &digest).map_err(explain)?;
            println!("{}: OK", file.display());
        }
        Commands::Derive {
            image,
            out,
            protocol,
            photo,
        } => {
            let photo = match photo {
                Some(photo) => photo,
                None => image
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .context("Photo id cannot be derived from the file name; pass --photo")?
                    .to_owned(),
            };
            let source = read(&image)?;
            let set = DerivativeEngine::new(config.derivatives.clone())
                .process(&source)
                .map_err(explain)?;
            let store = LocalStore::new(&out).map_err(explain)?;
            let keys = set.store(&store, &protocol, &photo).map_err(explain)?;
            let manifest = build_manifest(set.manifest_entries(&protocol, &photo)).map_err(explain)?;
            print_json(&json!({
                "originalHash": set.content_hash,
                "originalDimensions": set.original_dimensions,
                "sizes": set.sizes(),
                "keys": keys,
                "manifest": manifest,
            }))?;
        }
        Commands::Render {
            protocol,
            photos,
            out,
        } => {
            let raw = read(&protocol)?;
            let protocol: Protocol = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a protocol document", protocol.display()))?;
            let store = LocalStore::new(&photos).map_err(explain)?;
            let lookup =
                DerivativeLookup::load(&store, &protocol, config.derivatives.document.format);
            let rendered = ProtocolDocumentAssembler::new(config.document.clone(), config.fees.clone())
                .render(&protocol, &lookup)
                .map_err(explain)?;
            std::fs::write(&out, &rendered.bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_json(&json!({
                "file": out,
                "hash": rendered.hash,
                "byteSize": rendered.byte_size,
                "pageCount": rendered.page_count,
                "notices": rendered.notices,
            }))?;
        }
        Commands::Migrate {
            records,
            storage,
            dry_run,
            skip_photos,
            skip_documents,
        } => {
            let raw = read(&records)?;
            let records: Vec<LegacyProtocolRecord> = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a JSON array of records", records.display()))?;
            let store = LocalStore::new(&storage).map_err(explain)?;
            let mut service = MigrationService::new(store, &config);
            let options = MigrationOptions {
                dry_run,
                skip_photos,
                skip_documents,
            };
            let progress = service.migrate_batch(&records, &options);
            print_json(&json!({
                "progress": progress,
                "successRate": progress.success_rate(),
            }))?;
            if progress.failed > 0 {
                anyhow::bail!(
                    "{} of {} records failed to migrate",
                    progress.failed,
                    progress.total
                );
            }
        }
    }

    Ok(())
}
