use image::{GrayImage, Luma};
use render_protocol::ClipMask;

/// Shape of the shared card clip mask, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipMaskSpec {
    pub base_width: u32,
    pub base_height: u32,
    pub corner_radius: f32,
    pub feather: f32,
}

impl Default for ClipMaskSpec {
    fn default() -> Self {
        Self {
            base_width: 340,
            base_height: 214,
            corner_radius: 18.0,
            feather: 1.0,
        }
    }
}

/// Rasterizes the rounded-rectangle coverage mask once, at device resolution
/// (never below 1x), so that every card can sample it at its own size.
pub fn synthesize_clip_mask(spec: ClipMaskSpec, device_pixel_ratio: f32) -> ClipMask {
    let scale = if device_pixel_ratio.is_finite() {
        device_pixel_ratio.max(1.0)
    } else {
        1.0
    };
    let width = ((spec.base_width.max(1) as f32) * scale).round().max(1.0) as u32;
    let height = ((spec.base_height.max(1) as f32) * scale).round().max(1.0) as u32;
    let half_width = width as f32 / 2.0;
    let half_height = height as f32 / 2.0;
    let radius = (spec.corner_radius * scale)
        .max(0.0)
        .min(half_width)
        .min(half_height);
    let feather = (spec.feather * scale).max(f32::EPSILON);

    let coverage = GrayImage::from_fn(width, height, |x, y| {
        let px = (x as f32 + 0.5 - half_width).abs() - (half_width - radius);
        let py = (y as f32 + 0.5 - half_height).abs() - (half_height - radius);
        let outside = (px.max(0.0).powi(2) + py.max(0.0).powi(2)).sqrt();
        let inside = px.max(py).min(0.0);
        let distance = outside + inside - radius;
        let alpha = (0.5 - distance / feather).clamp(0.0, 1.0);
        Luma([(alpha * 255.0).round() as u8])
    });

    tracing::debug!(width, height, "clip mask synthesized");
    ClipMask::new(coverage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_sized_from_device_pixel_ratio() {
        let spec = ClipMaskSpec::default();
        let mask = synthesize_clip_mask(spec, 2.0);
        assert_eq!((mask.width(), mask.height()), (680, 428));

        let low = synthesize_clip_mask(spec, 0.5);
        assert_eq!((low.width(), low.height()), (340, 214));
    }

    #[test]
    fn corners_are_transparent_and_center_is_opaque() {
        let mask = synthesize_clip_mask(ClipMaskSpec::default(), 1.0);
        let coverage = mask.coverage();

        assert_eq!(coverage.get_pixel(0, 0).0[0], 0);
        assert_eq!(coverage.get_pixel(mask.width() - 1, mask.height() - 1).0[0], 0);
        assert_eq!(coverage.get_pixel(mask.width() / 2, mask.height() / 2).0[0], 255);
        assert_eq!(coverage.get_pixel(mask.width() / 2, 0).0[0], 255);
    }
}
