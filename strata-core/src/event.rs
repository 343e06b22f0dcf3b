//! Toolkit-neutral input events.
//!
//! Hosts translate their native pointer, wheel and keyboard callbacks into
//! these structs and hand them to the [`Editor`](crate::Editor). Positions are
//! in screen pixels relative to the canvas element.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Keyboard modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct KeyModifiers {
    /// Shift key pressed.
    #[serde(default)]
    pub shift: bool,
    /// Control key pressed.
    #[serde(default)]
    pub ctrl: bool,
    /// Alt/Option key pressed.
    #[serde(default)]
    pub alt: bool,
    /// Meta/Command key pressed.
    #[serde(default)]
    pub meta: bool,
}

impl KeyModifiers {
    /// No modifiers.
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Only Shift.
    pub const SHIFT: Self = Self {
        shift: true,
        ..Self::NONE
    };

    /// Only Ctrl.
    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };

    /// Only Alt.
    pub const ALT: Self = Self {
        alt: true,
        ..Self::NONE
    };

    /// Ctrl or Meta, whichever the platform uses for shortcuts.
    #[must_use]
    pub const fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Mouse button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    /// Primary (usually left) button.
    #[default]
    Primary,
    /// Middle button / wheel press.
    Middle,
    /// Secondary (usually right) button.
    Secondary,
}

/// A pointer press, move or release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Position in screen pixels.
    pub position: Point,
    /// Button involved.
    #[serde(default)]
    pub button: PointerButton,
    /// Modifiers held at the time of the event.
    #[serde(default)]
    pub modifiers: KeyModifiers,
    /// Host timestamp in milliseconds. 0 means untimed; untimed presses
    /// never count as a rapid re-click.
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl PointerEvent {
    /// Primary-button event at a screen position with no modifiers.
    #[must_use]
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Point::new(x, y),
            button: PointerButton::Primary,
            modifiers: KeyModifiers::NONE,
            timestamp_ms: 0,
        }
    }

    /// Set the modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: KeyModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// A wheel or trackpad scroll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelEvent {
    /// Pointer position in screen pixels.
    pub position: Point,
    /// Vertical scroll; positive is "down".
    pub delta_y: f64,
    /// Modifiers held at the time of the event.
    #[serde(default)]
    pub modifiers: KeyModifiers,
}

impl WheelEvent {
    /// Wheel event at a screen position.
    #[must_use]
    pub fn at(x: f64, y: f64, delta_y: f64) -> Self {
        Self {
            position: Point::new(x, y),
            delta_y,
            modifiers: KeyModifiers::NONE,
        }
    }

    /// Set the modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: KeyModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Keys the editor reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Arrow up.
    ArrowUp,
    /// Arrow down.
    ArrowDown,
    /// Arrow left.
    ArrowLeft,
    /// Arrow right.
    ArrowRight,
    /// `[`
    BracketLeft,
    /// `]`
    BracketRight,
    /// Delete.
    Delete,
    /// Backspace.
    Backspace,
    /// Escape.
    Escape,
    /// Shift pressed or released on its own.
    Shift,
    /// Control pressed or released on its own.
    Control,
    /// Alt pressed or released on its own.
    Alt,
    /// Meta pressed or released on its own.
    Meta,
    /// Any printable character.
    Char(char),
    /// Anything else, by host name.
    Other(String),
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value.
    #[must_use]
    pub fn from_dom(key: &str) -> Self {
        match key {
            "ArrowUp" => Self::ArrowUp,
            "ArrowDown" => Self::ArrowDown,
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            "[" => Self::BracketLeft,
            "]" => Self::BracketRight,
            "Delete" => Self::Delete,
            "Backspace" => Self::Backspace,
            "Escape" => Self::Escape,
            "Shift" => Self::Shift,
            "Control" => Self::Control,
            "Alt" => Self::Alt,
            "Meta" => Self::Meta,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Char(c.to_ascii_lowercase()),
                    _ => Self::Other(other.to_string()),
                }
            }
        }
    }

    /// Whether this key nudges or rotates the selection.
    #[must_use]
    pub const fn is_movement(&self) -> bool {
        matches!(
            self,
            Self::ArrowUp
                | Self::ArrowDown
                | Self::ArrowLeft
                | Self::ArrowRight
                | Self::BracketLeft
                | Self::BracketRight
        )
    }
}

/// A key press or release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// The key.
    pub key: Key,
    /// Modifiers held, including the key itself if it is one.
    #[serde(default)]
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    /// Key event with the given modifiers.
    #[must_use]
    pub const fn new(key: Key, modifiers: KeyModifiers) -> Self {
        Self { key, modifiers }
    }
}

/// One recorded input, as replayed by scripts and the host bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Button pressed.
    PointerDown(PointerEvent),
    /// Pointer moved.
    PointerMove(PointerEvent),
    /// Button released.
    PointerUp(PointerEvent),
    /// Wheel scrolled.
    Wheel(WheelEvent),
    /// Key pressed.
    KeyDown(KeyEvent),
    /// Key released.
    KeyUp(KeyEvent),
}
