//! Editor tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geometry::DEFAULT_GRID_SIZE;
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::references::DEFAULT_GC_GRACE;

/// Default drag-snap threshold in world units.
pub const DEFAULT_SNAP_THRESHOLD: f64 = 10.0;

/// Interaction, history and collection settings for one editor.
///
/// Pixel-suffixed fields are screen pixels and are divided by the viewport
/// zoom before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Grid pitch for snapping, wheel scaling and canvas resize.
    pub grid_size: f64,
    /// Ctrl-drag snaps an edge when it is closer than this (world units).
    pub snap_threshold: f64,
    /// Ctrl-resize snaps the pointer when it is closer than this.
    pub resize_snap_threshold_px: f64,
    /// Pointer travel that turns a press on a layer into a drag.
    pub drag_threshold_px: f64,
    /// Two background clicks closer than this reset the editor.
    pub double_click_ms: u64,
    /// Hit radius of resize and rotation grips.
    pub handle_radius_px: f64,
    /// Distance of the rotation grip above the top edge.
    pub rotation_handle_offset_px: f64,
    /// Shift-rotate snap increment in degrees.
    pub rotate_snap_degrees: f64,
    /// Shift+wheel rotation step in degrees.
    pub wheel_rotate_degrees: f64,
    /// Ctrl+wheel size change in world units.
    pub fine_scale_step: f64,
    /// Viewport zoom multiplier per wheel notch.
    pub zoom_step: f64,
    /// Arrow-key nudge without / with Shift.
    pub nudge: (f64, f64),
    /// Bracket-key rotation without / with Shift.
    pub bracket_rotate: (f64, f64),
    /// Maximum undo depth.
    pub history_limit: usize,
    /// Seconds an image must stay unreferenced before deletion.
    pub gc_grace_secs: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
            resize_snap_threshold_px: 10.0,
            drag_threshold_px: 3.0,
            double_click_ms: 300,
            handle_radius_px: 8.0,
            rotation_handle_offset_px: 30.0,
            rotate_snap_degrees: 15.0,
            wheel_rotate_degrees: 5.0,
            fine_scale_step: 1.0,
            zoom_step: 1.1,
            nudge: (1.0, 10.0),
            bracket_rotate: (1.0, 10.0),
            history_limit: DEFAULT_HISTORY_LIMIT,
            gc_grace_secs: DEFAULT_GC_GRACE.as_secs(),
        }
    }
}

impl EditorConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `STRATA_GRID_SIZE`: Grid pitch (default: 64)
    /// - `STRATA_SNAP_THRESHOLD`: Drag snap threshold (default: 10)
    /// - `STRATA_HISTORY_LIMIT`: Undo depth (default: 100)
    /// - `STRATA_GC_GRACE_SECS`: Image collection grace period (default: 1800)
    ///
    /// Absent or unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            grid_size: env_or("STRATA_GRID_SIZE", defaults.grid_size),
            snap_threshold: env_or("STRATA_SNAP_THRESHOLD", defaults.snap_threshold),
            history_limit: env_or("STRATA_HISTORY_LIMIT", defaults.history_limit),
            gc_grace_secs: env_or("STRATA_GC_GRACE_SECS", defaults.gc_grace_secs),
            ..defaults
        }
    }

    /// Grace period as a [`Duration`].
    #[must_use]
    pub const fn gc_grace(&self) -> Duration {
        Duration::from_secs(self.gc_grace_secs)
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert!((config.grid_size - 64.0).abs() < f64::EPSILON);
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.gc_grace(), Duration::from_secs(1800));
        assert_eq!(config.double_click_ms, 300);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: EditorConfig =
            serde_json::from_str(r#"{"grid_size": 32.0, "history_limit": 5}"#).expect("parse");
        assert!((config.grid_size - 32.0).abs() < f64::EPSILON);
        assert_eq!(config.history_limit, 5);
        assert!((config.zoom_step - 1.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        assert_eq!(env_or("STRATA_TEST_UNSET_VARIABLE", 7_usize), 7);
    }
}
