/// HSL to 8-bit RGB. `hue` is in degrees and wraps; `saturation` and
/// `lightness` are clamped to `[0, 1]`.
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [u8; 3] {
    let hue = hue.rem_euclid(360.0) / 60.0;
    let saturation = saturation.clamp(0.0, 1.0);
    let lightness = lightness.clamp(0.0, 1.0);

    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let secondary = chroma * (1.0 - (hue % 2.0 - 1.0).abs());
    let (r, g, b) = match hue as u32 {
        0 => (chroma, secondary, 0.0),
        1 => (secondary, chroma, 0.0),
        2 => (0.0, chroma, secondary),
        3 => (0.0, secondary, chroma),
        4 => (secondary, 0.0, chroma),
        _ => (chroma, 0.0, secondary),
    };
    let offset = lightness - chroma / 2.0;
    [to_channel(r + offset), to_channel(g + offset), to_channel(b + offset)]
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: [u8; 3],
}

/// Top-to-bottom background gradient derived from the theme hue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStops {
    hue: f32,
    stops: [GradientStop; 3],
}

impl GradientStops {
    pub fn for_hue(hue: f32) -> Self {
        Self {
            hue,
            stops: [
                GradientStop {
                    offset: 0.0,
                    color: hsl_to_rgb(hue, 0.65, 0.42),
                },
                GradientStop {
                    offset: 0.55,
                    color: hsl_to_rgb(hue + 28.0, 0.7, 0.34),
                },
                GradientStop {
                    offset: 1.0,
                    color: hsl_to_rgb(hue + 56.0, 0.75, 0.24),
                },
            ],
        }
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }

    pub fn stops(&self) -> &[GradientStop; 3] {
        &self.stops
    }

    pub fn sample(&self, t: f32) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        let upper_index = self
            .stops
            .iter()
            .position(|stop| stop.offset >= t)
            .unwrap_or(self.stops.len() - 1)
            .max(1);
        let lower = self.stops[upper_index - 1];
        let upper = self.stops[upper_index];
        let span = upper.offset - lower.offset;
        let local = if span > 0.0 {
            (t - lower.offset) / span
        } else {
            0.0
        };
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * local).round() as u8;
        [
            mix(lower.color[0], upper.color[0]),
            mix(lower.color[1], upper.color[1]),
            mix(lower.color[2], upper.color[2]),
        ]
    }
}
