//! Per-card render resources. Only the render thread ever touches these.

use image::RgbaImage;
use paint::GradientStops;
use render_protocol::{StateKey, Surface};

struct StaticSnapshot {
    key: StateKey,
    pixels: RgbaImage,
}

pub(crate) struct RenderResources<C> {
    pub(crate) surface: Surface,
    pub(crate) caches: Option<C>,
    pub(crate) last_state_key: Option<StateKey>,
    pub(crate) registration_order: u64,
    last_theme_hue: Option<f32>,
    gradient: GradientStops,
    static_cache: Option<StaticSnapshot>,
}

impl<C> RenderResources<C> {
    pub(crate) fn new(surface: Surface, registration_order: u64) -> Self {
        Self {
            surface,
            caches: None,
            last_state_key: None,
            registration_order,
            last_theme_hue: None,
            gradient: GradientStops::for_hue(0.0),
            static_cache: None,
        }
    }

    /// Recomputes the background gradient only when the hue changed.
    pub(crate) fn refresh_gradient(&mut self, theme_hue: f32) -> bool {
        if self.last_theme_hue == Some(theme_hue) {
            return false;
        }
        self.gradient = GradientStops::for_hue(theme_hue);
        self.last_theme_hue = Some(theme_hue);
        true
    }

    pub(crate) fn gradient(&self) -> GradientStops {
        self.gradient
    }

    pub(crate) fn has_static_cache(&self) -> bool {
        self.static_cache.is_some()
    }

    /// Copies the snapshot for `key` onto the surface. `false` when there is
    /// no snapshot or it belongs to another key.
    pub(crate) fn blit_static_cache(&mut self, key: &StateKey) -> bool {
        let Some(snapshot) = self.static_cache.as_ref() else {
            return false;
        };
        if &snapshot.key != key {
            return false;
        }
        self.surface
            .resize(snapshot.pixels.width(), snapshot.pixels.height());
        self.surface.blit(&snapshot.pixels);
        true
    }

    /// Takes ownership of the freshly painted pixels as the new snapshot and
    /// puts them back on the surface, since taking them clears it.
    pub(crate) fn capture_static_cache(&mut self, key: StateKey) {
        let pixels = self.surface.take_pixels();
        self.release_static_cache();
        self.surface.blit(&pixels);
        self.static_cache = Some(StaticSnapshot { key, pixels });
    }

    pub(crate) fn release_static_cache(&mut self) -> bool {
        match self.static_cache.take() {
            Some(snapshot) => {
                drop(snapshot);
                true
            }
            None => false,
        }
    }

    /// Forgets everything derived from painted output so the next pass
    /// repaints from scratch.
    pub(crate) fn invalidate(&mut self) {
        self.last_state_key = None;
        self.release_static_cache();
    }
}
