//! # Strata CLI
//!
//! Command-line host for Strata canvases stored on disk.
//!
//! ## Usage
//!
//! ```bash
//! strata --data-dir ./canvas --key node-7 import photo.png --fit
//! strata --key node-7 replay drag.json
//! strata --key node-7 inspect --json
//! strata --key node-7 gc
//! ```
//!
//! Every command opens an [`FsStore`] under `--data-dir`, loads the
//! instance named by `--key`, does its work and flushes before exiting.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use strata_store::{EditorSession, FsStore, SessionConfig};

pub use commands::{InspectReport, LayerSummary, TraceRenderer};

/// Default directory for persisted canvases.
pub const DEFAULT_DATA_DIR: &str = ".strata";

/// Default instance key.
pub const DEFAULT_KEY: &str = "default";

/// Command-line arguments for `strata`.
#[derive(Debug, Clone, Parser)]
#[command(name = "strata")]
#[command(about = "Layered image canvas editor: import, replay, inspect and collect stored canvases")]
#[command(version)]
pub struct CliArgs {
    /// Directory holding persisted state and images
    #[arg(long, env = "STRATA_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Canvas instance to operate on
    #[arg(long, env = "STRATA_KEY", default_value = DEFAULT_KEY)]
    pub key: String,

    /// Grid pitch in world units used for snapping and wheel scaling
    #[arg(long, env = "STRATA_GRID_SIZE")]
    pub grid_size: Option<f64>,

    /// Undo depth
    #[arg(long, env = "STRATA_HISTORY_LIMIT")]
    pub history_limit: Option<usize>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Add image files to the canvas as new layers
    Import {
        /// Encoded image files (PNG, JPEG, ...)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Scale each image to fit inside the output area
        #[arg(long)]
        fit: bool,
        /// Layer name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Replay a JSON array of recorded input events
    ///
    /// Pointer events without `timestamp_ms` are untimed and never trigger the
    /// rapid re-click reset; give timestamps to reproduce a double click.
    Replay {
        /// Script file
        script: PathBuf,
        /// Apply the events without persisting the result
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the stored canvas
    Inspect {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete stored images nothing references any more
    Gc,
    /// Publish an output image (and optional mask) and report what was produced
    Output {
        /// Flattened canvas image
        image: Option<PathBuf>,
        /// Mask image
        #[arg(long)]
        mask: Option<PathBuf>,
    },
    /// Forget the persisted state for this instance
    Discard,
}

impl CliArgs {
    /// Session settings: environment first, then explicit flags on top.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::from_env();
        if let Some(grid_size) = self.grid_size.filter(|g| *g > 0.0) {
            config.editor.grid_size = grid_size;
        }
        if let Some(history_limit) = self.history_limit.filter(|l| *l > 0) {
            config.editor.history_limit = history_limit;
        }
        config
    }
}

/// Open the store and session described by `args`.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created.
pub async fn open_session(args: &CliArgs) -> anyhow::Result<EditorSession> {
    let store = FsStore::open(&args.data_dir)
        .await
        .with_context(|| format!("Failed to open data directory {}", args.data_dir.display()))?;
    Ok(EditorSession::new(
        args.key.clone(),
        Arc::new(store),
        args.session_config(),
    ))
}

/// Run one command and return what it prints.
///
/// # Errors
///
/// Returns an error if a file cannot be read, an image cannot be decoded or
/// the store fails.
pub async fn run(args: CliArgs) -> anyhow::Result<String> {
    let session = open_session(&args).await?;
    session
        .load()
        .await
        .with_context(|| format!("Failed to load instance '{}'", args.key))?;

    let output = match args.command {
        Command::Import { paths, fit, name } => {
            commands::import(&session, &paths, fit, name.as_deref()).await?
        }
        Command::Replay { script, dry_run } => commands::replay(&session, &script, dry_run).await?,
        Command::Inspect { json } => commands::inspect(&session, json).await?,
        Command::Gc => commands::gc(&session).await?,
        Command::Output { image, mask } => {
            commands::output(&session, image.as_deref(), mask.as_deref()).await?
        }
        Command::Discard => {
            session.discard().await.context("Failed to discard state")?;
            format!("Discarded instance '{}'", session.key())
        }
    };

    Ok(output)
}
