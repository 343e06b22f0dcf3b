//! Layers - placed, transformable images on the canvas.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_128;

use crate::geometry::{self, Frame, Point, ResizeHandle, MIN_LAYER_SIZE};

/// Unique identifier for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Create a new unique layer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a layer ID from its string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key of a stored image.
///
/// Identical image bytes always map to the same key, so an image pasted twice
/// is stored once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    /// Wrap an existing key.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Content address for a blob of encoded image bytes.
    #[must_use]
    pub fn for_content(bytes: &[u8]) -> Self {
        Self(format!("img_{:032x}", xxh3_128(bytes)))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Compositing operator applied when a layer is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    /// Plain source-over.
    #[default]
    Normal,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
    /// Overlay.
    Overlay,
    /// Darken.
    Darken,
    /// Lighten.
    Lighten,
    /// Color dodge.
    ColorDodge,
    /// Color burn.
    ColorBurn,
    /// Hard light.
    HardLight,
    /// Soft light.
    SoftLight,
    /// Difference.
    Difference,
    /// Exclusion.
    Exclusion,
}

impl BlendMode {
    /// Name of the operator as understood by a 2D canvas context.
    #[must_use]
    pub const fn composite_operation(self) -> &'static str {
        match self {
            Self::Normal => "source-over",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::HardLight => "hard-light",
            Self::SoftLight => "soft-light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
        }
    }
}

/// A grip on a selected layer that starts a transform gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerHandle {
    /// One of the eight resize grips.
    Resize(ResizeHandle),
    /// The rotation grip above the top edge.
    Rotate,
}

const fn default_opacity() -> f64 {
    1.0
}

const fn default_visible() -> bool {
    true
}

/// One placed image.
///
/// Holds a reference to its pixels (`image_id`), never the pixels themselves,
/// so cloning a layer is cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique identifier.
    pub id: LayerId,
    /// Stored image this layer shows.
    pub image_id: ImageId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Left edge in world units.
    pub x: f64,
    /// Top edge in world units.
    pub y: f64,
    /// Width in world units, at least [`MIN_LAYER_SIZE`].
    pub width: f64,
    /// Height in world units, at least [`MIN_LAYER_SIZE`].
    pub height: f64,
    /// Rotation in degrees about the centre; unbounded.
    #[serde(default)]
    pub rotation: f64,
    /// Stacking order; higher draws on top.
    #[serde(default)]
    pub z_index: i32,
    /// Opacity in `[0, 1]`.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Compositing operator.
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// Hidden layers are neither drawn nor hit-tested.
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Optional per-layer alpha mask (a stored grayscale image).
    #[serde(default)]
    pub mask: Option<ImageId>,
    /// Pixel width of the source image.
    pub original_width: f64,
    /// Pixel height of the source image.
    pub original_height: f64,
}

impl Layer {
    /// Create a layer at the origin showing an image at its natural size.
    #[must_use]
    pub fn new(image_id: ImageId, width: f64, height: f64) -> Self {
        let width = width.max(1.0);
        let height = height.max(1.0);
        Self {
            id: LayerId::new(),
            image_id,
            name: String::new(),
            x: 0.0,
            y: 0.0,
            width: width.max(MIN_LAYER_SIZE),
            height: height.max(MIN_LAYER_SIZE),
            rotation: 0.0,
            z_index: 0,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            visible: true,
            mask: None,
            original_width: width,
            original_height: height,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the placement.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.set_frame(frame);
        self
    }

    /// Current placement.
    #[must_use]
    pub fn frame(&self) -> Frame {
        Frame::new(self.x, self.y, self.width, self.height, self.rotation)
    }

    /// Replace the placement, clamping the size to the floor.
    pub fn set_frame(&mut self, frame: Frame) {
        self.x = frame.x;
        self.y = frame.y;
        self.width = frame.width.max(MIN_LAYER_SIZE);
        self.height = frame.height.max(MIN_LAYER_SIZE);
        self.rotation = frame.rotation;
    }

    /// Move by a world-space delta.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Set opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = if opacity.is_nan() {
            1.0
        } else {
            opacity.clamp(0.0, 1.0)
        };
    }

    /// Centre in world space.
    #[must_use]
    pub fn center(&self) -> Point {
        self.frame().center()
    }

    /// Aspect ratio of the source image.
    #[must_use]
    pub fn original_aspect(&self) -> f64 {
        self.original_width / self.original_height
    }

    /// Whether a world point falls inside the rotated layer.
    #[must_use]
    pub fn contains_point(&self, world: Point) -> bool {
        let local = geometry::world_to_local(world, &self.frame());
        local.x.abs() <= self.width / 2.0 && local.y.abs() <= self.height / 2.0
    }

    /// World position of a resize grip.
    #[must_use]
    pub fn handle_position(&self, handle: ResizeHandle) -> Point {
        geometry::local_to_world(handle.local_position(self.width, self.height), &self.frame())
    }

    /// World position of the rotation grip, `offset` world units above the top edge.
    #[must_use]
    pub fn rotation_handle_position(&self, offset: f64) -> Point {
        geometry::local_to_world(
            Point::new(0.0, -self.height / 2.0 - offset),
            &self.frame(),
        )
    }

    /// Grip under a world point, if any.
    ///
    /// `radius` and `rotation_offset` are in world units; callers divide their
    /// screen-pixel sizes by the zoom.
    #[must_use]
    pub fn handle_at(&self, world: Point, radius: f64, rotation_offset: f64) -> Option<LayerHandle> {
        if self.rotation_handle_position(rotation_offset).distance(world) <= radius {
            return Some(LayerHandle::Rotate);
        }
        ResizeHandle::ALL
            .into_iter()
            .find(|&h| self.handle_position(h).distance(world) <= radius)
            .map(LayerHandle::Resize)
    }

    /// Copy with a fresh identity; image references are shared.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: LayerId::new(),
            ..self.clone()
        }
    }

    /// Every stored image this layer keeps alive.
    pub fn image_refs(&self) -> impl Iterator<Item = &ImageId> {
        std::iter::once(&self.image_id).chain(self.mask.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Layer {
        Layer::new(ImageId::from("img_a"), 200.0, 100.0)
            .with_frame(Frame::new(100.0, 100.0, 200.0, 100.0, 0.0))
    }

    #[test]
    fn test_image_id_is_content_addressed() {
        let a = ImageId::for_content(b"same bytes");
        let b = ImageId::for_content(b"same bytes");
        let c = ImageId::for_content(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("img_"));
        assert_eq!(a.as_str().len(), 4 + 32);
    }

    #[test]
    fn test_new_layer_respects_floor() {
        let l = Layer::new(ImageId::from("tiny"), 3.0, 4.0);
        assert!(l.width >= MIN_LAYER_SIZE);
        assert!(l.height >= MIN_LAYER_SIZE);
        assert!((l.original_width - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_frame_clamps() {
        let mut l = layer();
        l.set_frame(Frame::new(0.0, 0.0, 2.0, -5.0, 0.0));
        assert!((l.width - MIN_LAYER_SIZE).abs() < f64::EPSILON);
        assert!((l.height - MIN_LAYER_SIZE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_opacity_clamped() {
        let mut l = layer();
        l.set_opacity(1.7);
        assert!((l.opacity - 1.0).abs() < f64::EPSILON);
        l.set_opacity(-0.2);
        assert!(l.opacity.abs() < f64::EPSILON);
    }

    #[test]
    fn test_contains_point_rotated() {
        let mut l = layer();
        assert!(l.contains_point(Point::new(290.0, 110.0)));
        l.rotation = 90.0;
        // Centre (200, 150); rotated extent is 100 wide, 200 tall.
        assert!(!l.contains_point(Point::new(290.0, 150.0)));
        assert!(l.contains_point(Point::new(200.0, 240.0)));
    }

    #[test]
    fn test_handle_at_corners_and_rotation() {
        let l = layer();
        assert_eq!(
            l.handle_at(Point::new(301.0, 199.0), 8.0, 30.0),
            Some(LayerHandle::Resize(ResizeHandle::SE))
        );
        assert_eq!(
            l.handle_at(Point::new(200.0, 70.0), 8.0, 30.0),
            Some(LayerHandle::Rotate)
        );
        assert_eq!(
            l.handle_at(Point::new(200.0, 101.0), 8.0, 30.0),
            Some(LayerHandle::Resize(ResizeHandle::N))
        );
        assert_eq!(l.handle_at(Point::new(200.0, 150.0), 8.0, 30.0), None);
    }

    #[test]
    fn test_duplicate_shares_image() {
        let mut l = layer();
        l.mask = Some(ImageId::from("mask_a"));
        let d = l.duplicate();
        assert_ne!(d.id, l.id);
        assert_eq!(d.image_id, l.image_id);
        let refs: Vec<_> = d.image_refs().cloned().collect();
        assert_eq!(refs, vec![ImageId::from("img_a"), ImageId::from("mask_a")]);
    }

    #[test]
    fn test_layer_json_defaults() {
        let json = r#"{"id":"7a1c4f5e-3f5b-4c1a-9b1e-1d2c3b4a5f60","image_id":"img_x","x":1.0,"y":2.0,"width":30.0,"height":40.0,"original_width":30.0,"original_height":40.0}"#;
        let l: Layer = serde_json::from_str(json).expect("should parse");
        assert!((l.opacity - 1.0).abs() < f64::EPSILON);
        assert!(l.visible);
        assert_eq!(l.blend_mode, BlendMode::Normal);
        assert!(l.mask.is_none());
    }

    #[test]
    fn test_blend_mode_serde_kebab() {
        let json = serde_json::to_string(&BlendMode::ColorDodge).expect("serialize");
        assert_eq!(json, "\"color-dodge\"");
        assert_eq!(BlendMode::Normal.composite_operation(), "source-over");
    }
}
