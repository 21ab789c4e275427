/// # svgpng-batch CLI Interface (Module)
///
/// Command parsing and orchestration for the `svgpng-batch` binary. All
/// conversion logic (intake, engine, queue, session store, archive) lives in
/// the `svgpng-batch` core crate; this module only reads files from disk,
/// calls the core operations in order, and prints the resulting state.
///
/// For programmatic or integration use, call [`run`] with a constructed [`Cli`].
use crate::load_config::resolve_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use svgpng_batch::{
    build_archive, intake, save_output, Engine, IntakeError, IntakeOutcome, QueueRunner, RawFile,
    Rejection, SessionStore,
};

/// CLI for svgpng-batch: convert SVG files to PNG and PNG files to SVG.
#[derive(Parser)]
#[clap(
    name = "svgpng-batch",
    version,
    about = "Batch-convert SVG to PNG and PNG to SVG, individually or into one ZIP"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert every input to the opposite format
    Convert {
        /// Input files (.svg or .png)
        #[clap(required = true)]
        inputs: Vec<PathBuf>,
        /// Path to the YAML config file (falls back to $SVGPNG_BATCH_CONFIG)
        #[clap(long)]
        config: Option<PathBuf>,
        /// Directory for converted files or the archive
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Write one ZIP archive instead of individual files
        #[clap(long)]
        zip: bool,
    },
}

/// Media type declared for a file on disk, taken from its extension.
fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read every input from disk. Files that cannot be read become rejections
/// alongside the ones intake produces.
async fn read_inputs(inputs: &[PathBuf]) -> (Vec<RawFile>, Vec<Rejection>) {
    let mut files = Vec::with_capacity(inputs.len());
    let mut unreadable = Vec::new();
    for path in inputs {
        let name = display_name(path);
        match tokio::fs::read(path).await {
            Ok(bytes) => files.push(RawFile::new(name, media_type_for(path), bytes)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "[INTAKE] Failed to read input");
                unreadable.push(Rejection::new(name, IntakeError::Unreadable));
            }
        }
    }
    (files, unreadable)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Convert {
            inputs,
            config,
            output_dir,
            zip,
        } => {
            let config = resolve_config(config.as_deref())?;
            let output_dir = output_dir.unwrap_or_else(|| config.output.dir.clone());
            let archive = zip || config.output.archive;
            tracing::info!(
                command = "convert",
                inputs = inputs.len(),
                output_dir = %output_dir.display(),
                archive,
                "Starting conversion"
            );

            let (files, unreadable) = read_inputs(&inputs).await;
            let mut outcome: IntakeOutcome = intake(files, &config.intake).await;
            outcome.rejected.extend(unreadable);

            let store = SessionStore::new();
            store.ingest(outcome);
            for rejection in store.rejections() {
                eprintln!("rejected: {rejection}");
            }
            if store.is_empty() {
                anyhow::bail!("no files were accepted");
            }

            let runner = QueueRunner::new(Engine::new(&config.render));
            let report = runner.drive(&store).await;

            for item in store.snapshot() {
                match item.error_message() {
                    Some(message) => println!("{}\t{}\t{}", item.status().kind(), item.file_name(), message),
                    None => println!("{}\t{}", item.status().kind(), item.file_name()),
                }
            }
            let counts = store.counts();
            println!(
                "{} converted, {} failed, {} total",
                counts.converted, counts.failed, counts.total
            );

            std::fs::create_dir_all(&output_dir).with_context(|| {
                format!("failed to create output directory {}", output_dir.display())
            })?;

            if archive {
                let built = build_archive(&store.converted_snapshot())
                    .context("failed to build archive")?;
                match built {
                    Some(blob) => {
                        let path = blob.save_to(&output_dir).context("failed to save archive")?;
                        println!("archive: {}", path.display());
                    }
                    None => println!("nothing converted; no archive written"),
                }
            } else {
                for item in store.converted_snapshot() {
                    if let Some(path) = save_output(&item, &output_dir)
                        .with_context(|| format!("failed to save output for {}", item.file_name()))?
                    {
                        println!("saved: {}", path.display());
                    }
                }
            }

            tracing::info!(command = "convert", ?report, "Conversion complete");
            Ok(())
        }
    }
}
