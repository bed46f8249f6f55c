use std::fmt;
use std::sync::Arc;

use image::{GrayImage, RgbaImage};

use crate::CardId;

/// Where a surface's pixels become visible once a frame is finished.
pub trait PresentTarget: Send {
    fn present(&mut self, card_id: &CardId, pixels: &RgbaImage);
}

/// Drawable raster owned by exactly one context at a time.
///
/// `Surface` is deliberately not `Clone`: handing it to the renderer moves it,
/// and there is no message that moves it back.
pub struct Surface {
    pixels: RgbaImage,
    target: Option<Box<dyn PresentTarget>>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width.max(1), height.max(1)),
            target: None,
        }
    }

    pub fn with_target(width: u32, height: u32, target: impl PresentTarget + 'static) -> Self {
        Self {
            pixels: RgbaImage::new(width.max(1), height.max(1)),
            target: Some(Box::new(target)),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Resizes the backing store. Like a canvas, a size change discards the
    /// current contents; an unchanged size keeps them.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        let width = width.max(1);
        let height = height.max(1);
        if self.pixels.dimensions() == (width, height) {
            return false;
        }
        self.pixels = RgbaImage::new(width, height);
        true
    }

    /// Moves the current pixels out, leaving a cleared surface of the same
    /// size behind.
    pub fn take_pixels(&mut self) -> RgbaImage {
        let (width, height) = self.pixels.dimensions();
        std::mem::replace(&mut self.pixels, RgbaImage::new(width, height))
    }

    /// Copies `source` onto the surface. Mismatched sizes are composited at
    /// the origin and clipped.
    pub fn blit(&mut self, source: &RgbaImage) {
        if source.dimensions() == self.pixels.dimensions() {
            self.pixels.copy_from_slice(source.as_raw());
            return;
        }
        image::imageops::replace(&mut self.pixels, source, 0, 0);
    }

    pub fn present(&mut self, card_id: &CardId) {
        if let Some(target) = self.target.as_mut() {
            target.present(card_id, &self.pixels);
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

/// Shared, read-only coverage bitmap applied on top of every card.
#[derive(Clone)]
pub struct ClipMask {
    coverage: Arc<GrayImage>,
}

impl ClipMask {
    pub fn new(coverage: GrayImage) -> Self {
        Self {
            coverage: Arc::new(coverage),
        }
    }

    pub fn coverage(&self) -> &GrayImage {
        &self.coverage
    }

    pub fn width(&self) -> u32 {
        self.coverage.width()
    }

    pub fn height(&self) -> u32 {
        self.coverage.height()
    }

    /// Nearest-neighbour coverage lookup for a pixel of a `width x height`
    /// target, so one mask serves every card size.
    pub fn sample(&self, x: u32, y: u32, width: u32, height: u32) -> u8 {
        let mask_x = scale_coordinate(x, width, self.width());
        let mask_y = scale_coordinate(y, height, self.height());
        self.coverage.get_pixel(mask_x, mask_y).0[0]
    }
}

fn scale_coordinate(value: u32, from: u32, to: u32) -> u32 {
    if from == 0 || to == 0 {
        return 0;
    }
    let scaled = (u64::from(value) * u64::from(to) + u64::from(to) / 2) / u64::from(from);
    (scaled as u32).min(to - 1)
}

impl fmt::Debug for ClipMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipMask")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
