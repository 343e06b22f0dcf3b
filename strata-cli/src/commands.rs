//! Subcommand implementations. Each returns the text `strata` prints.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use strata_core::{AddLayer, BlendMode, Editor, ImageId, InputEvent, LayerId, RenderScene, Renderer};
use strata_store::EditorSession;

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Headless renderer that logs each paint and counts them.
#[derive(Debug, Clone, Default)]
pub struct TraceRenderer {
    paints: Arc<AtomicUsize>,
}

impl TraceRenderer {
    /// Paints so far, across every clone.
    #[must_use]
    pub fn paints(&self) -> usize {
        self.paints.load(Ordering::Relaxed)
    }
}

impl Renderer for TraceRenderer {
    fn render(&mut self, scene: &RenderScene<'_>) {
        let paint = self.paints.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            paint,
            layers = scene.canvas.layer_count(),
            selected = scene.selection.len(),
            resizing_canvas = scene.canvas_preview.is_some(),
            "Paint"
        );
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

pub(crate) async fn import(
    session: &EditorSession,
    paths: &[PathBuf],
    fit: bool,
    name: Option<&str>,
) -> anyhow::Result<String> {
    let mut out = String::new();
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let options = AddLayer {
            name: name
                .map(str::to_owned)
                .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned())),
            fit_to_canvas: fit,
        };
        let id = session
            .add_image(bytes, &options)
            .await
            .with_context(|| format!("Failed to import {}", path.display()))?;

        let line = session.editor().canvas().layer(id).map(|layer| {
            format!(
                "Added layer {id} '{}' {}x{} at ({}, {}) from {}",
                layer.name,
                layer.width,
                layer.height,
                layer.x,
                layer.y,
                path.display()
            )
        });
        if let Some(line) = line {
            out.push_str(&line);
            out.push('\n');
        }
    }

    let report = session.save_now().await.context("Failed to save")?;
    let _ = write!(
        out,
        "Saved {} layer(s), uploaded {} image(s)",
        report.layers, report.uploaded
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

pub(crate) async fn replay(
    session: &EditorSession,
    script: &Path,
    dry_run: bool,
) -> anyhow::Result<String> {
    let text = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let events: Vec<InputEvent> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of input events", script.display()))?;

    let renderer = TraceRenderer::default();
    session.with_editor(|editor| editor.set_renderer(Box::new(renderer.clone())));

    let mut commits = 0usize;
    for event in &events {
        let response = session.handle(event);
        if response.commit.is_some() {
            commits += 1;
        }
        session.with_editor(Editor::flush_render);
    }
    let mode = session.editor().mode().name();
    tracing::info!(events = events.len(), commits, mode, "Replay finished");

    let saved = if dry_run {
        session.cancel_autosave();
        "not saved (dry run)".to_owned()
    } else {
        match session.flush().await.context("Failed to save")? {
            Some(report) => format!("saved {} layer(s)", report.layers),
            None => "nothing to save".to_owned(),
        }
    };

    Ok(format!(
        "Replayed {} event(s): {commits} commit(s), {} paint(s), ending in mode '{mode}'; {saved}",
        events.len(),
        renderer.paints()
    ))
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

/// One row of `strata inspect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    /// Layer id.
    pub id: LayerId,
    /// Display name.
    pub name: String,
    /// Backing image.
    pub image_id: ImageId,
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Rotation in degrees.
    pub rotation: f64,
    /// Stacking order.
    pub z_index: i32,
    /// Opacity.
    pub opacity: f64,
    /// Compositing mode.
    pub blend_mode: BlendMode,
    /// Drawn at all.
    pub visible: bool,
}

/// What `strata inspect` reports about an instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectReport {
    /// Instance key.
    pub key: String,
    /// Output area width.
    pub width: f64,
    /// Output area height.
    pub height: f64,
    /// Viewport zoom.
    pub zoom: f64,
    /// Images held by the store.
    pub stored_images: usize,
    /// Layers, bottom to top.
    pub layers: Vec<LayerSummary>,
}

impl InspectReport {
    /// Summarize the session's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if stored images cannot be listed.
    pub async fn collect(session: &EditorSession) -> anyhow::Result<Self> {
        let stored_images = session
            .images()
            .all_image_ids()
            .await
            .context("Failed to list stored images")?
            .len();
        let editor = session.editor();
        let canvas = editor.canvas();
        Ok(Self {
            key: session.key().to_owned(),
            width: canvas.width,
            height: canvas.height,
            zoom: canvas.viewport.zoom,
            stored_images,
            layers: canvas
                .layers_by_z()
                .into_iter()
                .map(|layer| LayerSummary {
                    id: layer.id,
                    name: layer.name.clone(),
                    image_id: layer.image_id.clone(),
                    x: layer.x,
                    y: layer.y,
                    width: layer.width,
                    height: layer.height,
                    rotation: layer.rotation,
                    z_index: layer.z_index,
                    opacity: layer.opacity,
                    blend_mode: layer.blend_mode,
                    visible: layer.visible,
                })
                .collect(),
        })
    }

    fn to_table(&self) -> String {
        let mut out = format!(
            "Instance '{}': {}x{} canvas, zoom {:.2}, {} layer(s), {} stored image(s)",
            self.key,
            self.width,
            self.height,
            self.zoom,
            self.layers.len(),
            self.stored_images
        );
        for layer in &self.layers {
            let _ = write!(
                out,
                "\n  [{z:>3}] {name:<20} {w}x{h} at ({x}, {y}) rot {r} opacity {o:.2}{hidden}",
                z = layer.z_index,
                name = layer.name,
                w = layer.width,
                h = layer.height,
                x = layer.x,
                y = layer.y,
                r = layer.rotation,
                o = layer.opacity,
                hidden = if layer.visible { "" } else { " (hidden)" },
            );
        }
        out
    }
}

pub(crate) async fn inspect(session: &EditorSession, json: bool) -> anyhow::Result<String> {
    let report = InspectReport::collect(session).await?;
    if json {
        serde_json::to_string_pretty(&report).context("Failed to serialize report")
    } else {
        Ok(report.to_table())
    }
}

// ---------------------------------------------------------------------------
// Garbage collection
// ---------------------------------------------------------------------------

pub(crate) async fn gc(session: &EditorSession) -> anyhow::Result<String> {
    let report = session
        .collect_garbage()
        .await
        .context("Garbage collection failed")?;
    if report.skipped {
        return Ok("Garbage collection already running, skipped".to_owned());
    }
    let mut out = format!(
        "Scanned {} image(s), removed {}, failed {}",
        report.scanned,
        report.removed.len(),
        report.failed.len()
    );
    for id in &report.removed {
        let _ = write!(out, "\n  removed {id}");
    }
    for id in &report.failed {
        let _ = write!(out, "\n  failed {id}");
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

pub(crate) async fn output(
    session: &EditorSession,
    image: Option<&Path>,
    mask: Option<&Path>,
) -> anyhow::Result<String> {
    if let Some(image) = image {
        let image_bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("Failed to read {}", image.display()))?;
        let mask_bytes = match mask {
            Some(mask) => Some(
                tokio::fs::read(mask)
                    .await
                    .with_context(|| format!("Failed to read {}", mask.display()))?,
            ),
            None => None,
        };
        session.output().submit(image_bytes, mask_bytes);
    }

    let published = session
        .output()
        .process()
        .await
        .context("Failed to produce output")?;
    Ok(match published {
        Some(output) => format!(
            "Output {}: image {}x{}, mask {}x{}",
            output.execution_id,
            output.image.width,
            output.image.height,
            output.mask.width,
            output.mask.height
        ),
        None => "Output pass already running, nothing published".to_owned(),
    })
}
