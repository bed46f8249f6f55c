//! Shared data model and message protocol between the main thread and the
//! background render context.
//!
//! Everything that crosses the thread boundary lives here: the per-card
//! `RenderState` snapshot, the transferable `Surface` and `ClipMask`
//! handles, and the two message enums (`RendererMsg`, `RendererEvent`).

mod surface;

use std::fmt;
use std::time::Instant;

use image::RgbaImage;
use smallvec::SmallVec;
use smol_str::SmolStr;

pub use surface::{ClipMask, PresentTarget, Surface};

/// Fixed precision used when fingerprinting pointer and hue values.
pub const STATE_KEY_PRECISION: f32 = 1000.0;

/// Largest backing-store edge the renderer will allocate, in device pixels.
pub const MAX_DRAW_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId(SmolStr);

impl CardId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for CardId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CardId {
    fn from(value: String) -> Self {
        Self(SmolStr::from(value))
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling class. Declaration order is visit order within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    High,
    Medium,
    Low,
}

impl Priority {
    pub const VISIT_ORDER: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    #[default]
    Dynamic,
    Static,
}

impl RenderMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            RenderMode::Dynamic => "dynamic",
            RenderMode::Static => "static",
        }
    }

    pub const fn is_static(self) -> bool {
        matches!(self, RenderMode::Static)
    }
}

/// Normalized interaction vector in `[-1, 1] x [-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pointer {
    pub x: f32,
    pub y: f32,
}

impl Pointer {
    pub const CENTER: Pointer = Pointer { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clamps both axes to `[-1, 1]`; non-finite components collapse to 0.
    pub fn clamped(self) -> Self {
        Self {
            x: clamp_unit(self.x),
            y: clamp_unit(self.y),
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Tiled watermark settings.
///
/// Only `mask_url` takes part in the state key. Changing `cell_size` or
/// `icon_size` alone publishes a new state but does not repaint the card
/// until something in its key changes too.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WatermarkConfig {
    pub mask_url: Option<SmolStr>,
    pub cell_size: Option<f32>,
    pub icon_size: Option<f32>,
}

/// Immutable per-frame snapshot of everything the painter needs for one card.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub card_id: CardId,
    pub priority: Priority,
    pub mode: RenderMode,
    pub width: u32,
    pub height: u32,
    pub dpr: f32,
    pub pointer: Pointer,
    pub active: bool,
    pub theme_hue: f32,
    pub enabled_pattern: bool,
    pub enabled_watermark: bool,
    pub watermark: WatermarkConfig,
}

impl RenderState {
    pub fn new(card_id: impl Into<CardId>, width: u32, height: u32) -> Self {
        Self {
            card_id: card_id.into(),
            priority: Priority::High,
            mode: RenderMode::Dynamic,
            width,
            height,
            dpr: 1.0,
            pointer: Pointer::CENTER,
            active: false,
            theme_hue: 0.0,
            enabled_pattern: true,
            enabled_watermark: false,
            watermark: WatermarkConfig::default(),
        }
    }

    /// Applies the invariants every published state must hold: positive
    /// size, finite positive dpr, pointer inside the unit square, and a
    /// centered idle pointer in static mode.
    pub fn normalized(mut self) -> Self {
        self.width = self.width.max(1);
        self.height = self.height.max(1);
        if !self.dpr.is_finite() || self.dpr <= 0.0 {
            self.dpr = 1.0;
        }
        if !self.theme_hue.is_finite() {
            self.theme_hue = 0.0;
        }
        self.pointer = self.pointer.clamped();
        if self.mode.is_static() {
            self.pointer = Pointer::CENTER;
            self.active = false;
        }
        self
    }

    pub fn with_dpr(&self, dpr: f32) -> Self {
        let mut state = self.clone();
        state.dpr = dpr;
        state
    }

    /// Backing-store size at this state's dpr, never smaller than 1x1.
    pub fn draw_size(&self) -> (u32, u32) {
        (scale_dimension(self.width, self.dpr), scale_dimension(self.height, self.dpr))
    }

    /// False when either draw edge is larger than `MAX_DRAW_DIMENSION`.
    pub fn draw_size_in_bounds(&self) -> bool {
        let (width, height) = self.draw_size();
        width <= MAX_DRAW_DIMENSION && height <= MAX_DRAW_DIMENSION
    }

    pub fn state_key(&self) -> StateKey {
        let (draw_width, draw_height) = self.draw_size();
        StateKey {
            draw_width,
            draw_height,
            mode: self.mode,
            pointer_x: quantize(self.pointer.x),
            pointer_y: quantize(self.pointer.y),
            active: self.active,
            theme_hue: quantize(self.theme_hue),
            enabled_pattern: self.enabled_pattern,
            enabled_watermark: self.enabled_watermark,
            watermark_mask_url: self.watermark.mask_url.clone(),
        }
    }
}

fn scale_dimension(logical: u32, dpr: f32) -> u32 {
    let scaled = (logical as f32 * dpr).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled as u32
    } else {
        1
    }
}

fn quantize(value: f32) -> i64 {
    (value * STATE_KEY_PRECISION).round() as i64
}

/// Fingerprint of everything that affects painted output. Two states with
/// equal keys paint identical pixels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub draw_width: u32,
    pub draw_height: u32,
    pub mode: RenderMode,
    pub pointer_x: i64,
    pub pointer_y: i64,
    pub active: bool,
    pub theme_hue: i64,
    pub enabled_pattern: bool,
    pub enabled_watermark: bool,
    pub watermark_mask_url: Option<SmolStr>,
}

pub type StateBatch = SmallVec<[RenderState; 4]>;

/// Main thread to background render context. A single FIFO channel carries
/// all of these, so per-card ordering follows send order.
#[derive(Debug)]
pub enum RendererMsg {
    /// One-time surface handoff. The surface never comes back.
    Register { card_id: CardId, surface: Surface },
    /// Drop render resources. Does not return the surface.
    Unregister { card_id: CardId },
    Update { states: StateBatch },
    SetClipMask { mask: ClipMask },
    /// Page visibility. While paused the renderer keeps pending work but
    /// produces no frames.
    SetPaused { paused: bool },
    LoadWatermark { key: SmolStr, url: SmolStr },
    /// Decoded watermark image, posted back by a loader thread.
    WatermarkLoaded {
        key: SmolStr,
        url: SmolStr,
        image: RgbaImage,
    },
    Shutdown,
}

/// Background render context to main thread.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    Ready,
    Rendered { card_id: CardId, timestamp: Instant },
}
