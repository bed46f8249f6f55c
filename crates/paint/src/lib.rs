//! Paint routine contract and the CPU hologram painter.
//!
//! The renderer treats painting as a pure function: it hands a target sized
//! to the effective resolution, the state, the card's previous caches and the
//! shared assets, and gets back caches for the next frame. Nothing here keeps
//! a reference to the target between calls.

mod clip_mask;
mod color;
mod hologram;

use image::RgbaImage;
use render_protocol::{ClipMask, RenderState};

pub use clip_mask::{ClipMaskSpec, synthesize_clip_mask};
pub use color::{GradientStops, hsl_to_rgb};
pub use hologram::{HologramCaches, HologramPainter};

#[derive(Debug, thiserror::Error)]
pub enum PaintError {
    #[error("paint target is {width}x{height}, expected {expected_width}x{expected_height}")]
    TargetSizeMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("painter failed: {0}")]
    Painter(String),
}

/// Everything a painter may read for one frame.
#[derive(Debug, Clone, Copy)]
pub struct PaintInput<'a> {
    /// State with `dpr` already replaced by the effective value.
    pub state: &'a RenderState,
    pub gradient: &'a GradientStops,
    pub clip_mask: Option<&'a ClipMask>,
    /// Watermark mask image for `state.watermark.mask_url`, if loaded.
    pub watermark: Option<&'a RgbaImage>,
}

pub trait Painter: Send + 'static {
    /// Per-card layers and masks, owned by the render context and opaque to
    /// everyone but the painter.
    type Caches: Default + Send + 'static;

    /// Draws one frame. Must be deterministic for identical inputs.
    fn paint(
        &self,
        target: &mut RgbaImage,
        input: &PaintInput<'_>,
        caches: Self::Caches,
    ) -> Result<Self::Caches, PaintError>;
}
