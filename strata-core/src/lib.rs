//! # Strata Core
//!
//! Interactive layer-compositing editor logic: image layers on an infinite
//! canvas with a movable output area, snapping, undo/redo and image
//! reference tracking. Pure and synchronous; compiles to WASM.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   Editor                    │
//! ├─────────────────────────────────────────────┤
//! │  Interaction     │  History                 │
//! │  - Pointer/keys  │  - Snapshots             │
//! │  - Drag/resize   │  - Undo/redo             │
//! │  - Canvas moves  │  - Rebase on origin move │
//! ├─────────────────────────────────────────────┤
//! │  Canvas          │  ImageReferences         │
//! │  - Layers        │  - Live + history counts │
//! │  - Viewport      │  - GC grace period       │
//! ├─────────────────────────────────────────────┤
//! │  Geometry: snapping, resize, rotation       │
//! └─────────────────────────────────────────────┘
//!         │ Renderer / MaskTool (host traits)
//!         ▼
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod canvas;
pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod event;
pub mod geometry;
pub mod history;
pub mod host;
pub mod interaction;
pub mod layer;
pub mod references;
pub mod selection;
pub mod time;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use canvas::Canvas;
pub use config::EditorConfig;
pub use document::CanvasDocument;
pub use editor::{AddLayer, Editor};
pub use error::{EditorError, EditorResult};
pub use event::{InputEvent, Key, KeyEvent, KeyModifiers, PointerButton, PointerEvent, WheelEvent};
pub use geometry::{Frame, Point, Rect, ResizeHandle, SnapAdjustment, StepDirection, Viewport};
pub use history::{History, HistoryEntry};
pub use host::{MaskTool, NoMaskTool, NullRenderer, RenderScene, Renderer};
pub use interaction::{Commit, Interaction, InteractionMode, Response};
pub use layer::{BlendMode, ImageId, Layer, LayerHandle, LayerId};
pub use references::ImageReferences;
pub use selection::Selection;
pub use time::current_timestamp_ms;

/// Strata core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
