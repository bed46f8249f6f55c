use std::f32::consts::TAU;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use render_protocol::{ClipMask, Pointer, RenderState};

use crate::color::{GradientStops, hsl_to_rgb};
use crate::{PaintError, PaintInput, Painter};

const STRIPES_ACROSS: f32 = 12.0;
const MIN_STRIPE_PERIOD: f32 = 4.0;
const PATTERN_ALPHA_IDLE: f32 = 0.26;
const PATTERN_ALPHA_ACTIVE: f32 = 0.42;
const WATERMARK_ALPHA_IDLE: f32 = 0.14;
const WATERMARK_ALPHA_ACTIVE: f32 = 0.24;
const DEFAULT_WATERMARK_CELL: f32 = 48.0;
const DEFAULT_WATERMARK_ICON: f32 = 24.0;
const GLARE_RADIUS: f32 = 0.6;
const GLARE_ALPHA: f32 = 0.35;

/// Holographic card look: hue gradient, rainbow stripe refraction that
/// follows the pointer, a tiled watermark, and a glare spot while active.
#[derive(Debug, Clone, Copy, Default)]
pub struct HologramPainter;

/// Scratch layers and mask caches reused across frames of one card.
#[derive(Debug, Default)]
pub struct HologramCaches {
    pattern_layer: Option<RgbaImage>,
    watermark_layer: Option<RgbaImage>,
    pattern_mask: Option<GrayImage>,
    watermark_mask: Option<IconMask>,
}

#[derive(Debug)]
struct IconMask {
    source: String,
    size: u32,
    coverage: GrayImage,
}

impl Painter for HologramPainter {
    type Caches = HologramCaches;

    fn paint(
        &self,
        target: &mut RgbaImage,
        input: &PaintInput<'_>,
        mut caches: HologramCaches,
    ) -> Result<HologramCaches, PaintError> {
        let state = input.state;
        let (expected_width, expected_height) = state.draw_size();
        if target.dimensions() != (expected_width, expected_height) {
            return Err(PaintError::TargetSizeMismatch {
                width: target.width(),
                height: target.height(),
                expected_width,
                expected_height,
            });
        }

        fill_background(target, input.gradient);
        if state.enabled_pattern {
            paint_pattern(target, state, &mut caches.pattern_mask, &mut caches.pattern_layer);
        }
        if state.enabled_watermark {
            if let Some(image) = input.watermark {
                paint_watermark(
                    target,
                    state,
                    image,
                    &mut caches.watermark_mask,
                    &mut caches.watermark_layer,
                );
            }
        }
        if state.active {
            paint_glare(target, state.pointer);
        }
        if let Some(mask) = input.clip_mask {
            apply_clip(target, mask);
        }
        Ok(caches)
    }
}

fn fill_background(target: &mut RgbaImage, gradient: &GradientStops) {
    let height = target.height();
    let denominator = height.saturating_sub(1).max(1) as f32;
    for (y, row) in target.enumerate_rows_mut() {
        let [r, g, b] = gradient.sample(y as f32 / denominator);
        for (_, _, pixel) in row {
            *pixel = Rgba([r, g, b, 255]);
        }
    }
}

fn scratch_layer(slot: &mut Option<RgbaImage>, width: u32, height: u32) -> &mut RgbaImage {
    if slot
        .as_ref()
        .is_none_or(|layer| layer.dimensions() != (width, height))
    {
        *slot = Some(RgbaImage::new(width, height));
    }
    slot.get_or_insert_with(|| RgbaImage::new(width, height))
}

fn stripe_mask(slot: &mut Option<GrayImage>, width: u32, height: u32) -> &GrayImage {
    if slot
        .as_ref()
        .is_none_or(|mask| mask.dimensions() != (width, height))
    {
        *slot = Some(build_stripe_mask(width, height));
    }
    slot.get_or_insert_with(|| build_stripe_mask(width, height))
}

fn build_stripe_mask(width: u32, height: u32) -> GrayImage {
    let period = (width as f32 / STRIPES_ACROSS).max(MIN_STRIPE_PERIOD);
    GrayImage::from_fn(width, height, |x, y| {
        let phase = (x + y) as f32 / period * TAU;
        let band = (0.5 + 0.5 * phase.sin()).powi(2);
        Luma([(band * 255.0).round() as u8])
    })
}

fn paint_pattern(
    target: &mut RgbaImage,
    state: &RenderState,
    mask_slot: &mut Option<GrayImage>,
    layer_slot: &mut Option<RgbaImage>,
) {
    let (width, height) = target.dimensions();
    let mask = stripe_mask(mask_slot, width, height);
    let layer = scratch_layer(layer_slot, width, height);

    let hue_shift = state.pointer.x * 120.0 + state.pointer.y * 80.0;
    let intensity = if state.active {
        PATTERN_ALPHA_ACTIVE
    } else {
        PATTERN_ALPHA_IDLE
    };
    let diagonal = (width + height) as f32;

    for (x, y, pixel) in layer.enumerate_pixels_mut() {
        let band = mask.get_pixel(x, y).0[0] as f32 / 255.0;
        let hue = state.theme_hue + (x + y) as f32 / diagonal * 360.0 + hue_shift;
        let [r, g, b] = hsl_to_rgb(hue, 0.9, 0.62);
        *pixel = Rgba([r, g, b, (band * intensity * 255.0).round() as u8]);
    }
    blend_layer(target, layer);
}

fn icon_mask<'a>(
    slot: &'a mut Option<IconMask>,
    source: &str,
    image: &RgbaImage,
    size: u32,
) -> &'a GrayImage {
    let build = || IconMask {
        source: source.to_owned(),
        size,
        coverage: build_icon_mask(image, size),
    };
    if slot
        .as_ref()
        .is_none_or(|mask| mask.size != size || mask.source != source)
    {
        *slot = Some(build());
    }
    &slot.get_or_insert_with(build).coverage
}

fn build_icon_mask(image: &RgbaImage, size: u32) -> GrayImage {
    let resized = imageops::resize(image, size, size, FilterType::Triangle);
    GrayImage::from_fn(size, size, |x, y| {
        let [r, g, b, a] = resized.get_pixel(x, y).0;
        let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
        Luma([(a as u32 * luma / 255) as u8])
    })
}

fn paint_watermark(
    target: &mut RgbaImage,
    state: &RenderState,
    image: &RgbaImage,
    mask_slot: &mut Option<IconMask>,
    layer_slot: &mut Option<RgbaImage>,
) {
    let (width, height) = target.dimensions();
    let icon_size = state
        .watermark
        .icon_size
        .unwrap_or(DEFAULT_WATERMARK_ICON);
    let cell_size = state
        .watermark
        .cell_size
        .unwrap_or(DEFAULT_WATERMARK_CELL);
    let icon_px = scaled_px(icon_size, state.dpr);
    let cell_px = scaled_px(cell_size, state.dpr).max(icon_px);
    let source = state.watermark.mask_url.as_deref().unwrap_or_default();

    let icon = icon_mask(mask_slot, source, image, icon_px);
    let layer = scratch_layer(layer_slot, width, height);

    let offset_x = (state.pointer.x * cell_px as f32 * 0.25).round() as i64;
    let offset_y = (state.pointer.y * cell_px as f32 * 0.25).round() as i64;
    let padding = (cell_px - icon_px) / 2;
    let alpha_scale = if state.active {
        WATERMARK_ALPHA_ACTIVE
    } else {
        WATERMARK_ALPHA_IDLE
    };

    for (x, y, pixel) in layer.enumerate_pixels_mut() {
        let cell_x = (x as i64 + offset_x).rem_euclid(cell_px as i64) as u32;
        let cell_y = (y as i64 + offset_y).rem_euclid(cell_px as i64) as u32;
        let inside = cell_x >= padding
            && cell_x < padding + icon_px
            && cell_y >= padding
            && cell_y < padding + icon_px;
        let coverage = if inside {
            icon.get_pixel(cell_x - padding, cell_y - padding).0[0]
        } else {
            0
        };
        *pixel = Rgba([255, 255, 255, (coverage as f32 * alpha_scale).round() as u8]);
    }
    blend_layer(target, layer);
}

fn scaled_px(logical: f32, dpr: f32) -> u32 {
    let scaled = (logical * dpr).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled as u32
    } else {
        1
    }
}

fn paint_glare(target: &mut RgbaImage, pointer: Pointer) {
    let (width, height) = target.dimensions();
    let center_x = (pointer.x + 1.0) / 2.0 * width as f32;
    let center_y = (pointer.y + 1.0) / 2.0 * height as f32;
    let radius = GLARE_RADIUS * width.max(height) as f32;

    for (x, y, pixel) in target.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - center_x;
        let dy = y as f32 + 0.5 - center_y;
        let falloff = (1.0 - (dx * dx + dy * dy).sqrt() / radius).max(0.0);
        blend_pixel(pixel, [255, 255, 255], falloff * falloff * GLARE_ALPHA);
    }
}

fn blend_layer(target: &mut RgbaImage, layer: &RgbaImage) {
    for (destination, source) in target.pixels_mut().zip(layer.pixels()) {
        let [r, g, b, a] = source.0;
        if a == 0 {
            continue;
        }
        blend_pixel(destination, [r, g, b], a as f32 / 255.0);
    }
}

fn blend_pixel(destination: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for channel in 0..3 {
        let below = destination.0[channel] as f32;
        let above = color[channel] as f32;
        destination.0[channel] = (above * alpha + below * (1.0 - alpha)).round() as u8;
    }
}

fn apply_clip(target: &mut RgbaImage, mask: &ClipMask) {
    let (width, height) = target.dimensions();
    for (x, y, pixel) in target.enumerate_pixels_mut() {
        let coverage = mask.sample(x, y, width, height) as u16;
        pixel.0[3] = (pixel.0[3] as u16 * coverage / 255) as u8;
    }
}
