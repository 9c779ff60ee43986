//! Mapping between display pixels and octave-0 image coordinates.
//!
//! [`ViewportState`] is an immutable snapshot: every pan/zoom operation
//! returns a new state instead of mutating in place, so an in-flight
//! transform always sees one consistent view.

use serde::{Deserialize, Serialize};

/// Zoom, offset and octave of the strip window.
///
/// `image = offset + display / zoom` on each axis. `zoom_level` selects
/// the pyramid octave; negative levels magnify past octave 0 and sample
/// octave 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Display pixels per image pixel along azimuth. Always `> 0`.
    pub zoom_x: f64,
    /// Display pixels per image pixel along depth. Always `> 0`.
    pub zoom_y: f64,
    /// Image x of display column 0.
    pub offset_x: f64,
    /// Image y of display row 0.
    pub offset_y: f64,
    /// Requested octave; may be negative (magnification).
    pub zoom_level: i32,
}

impl ViewportState {
    /// Most magnified zoom level.
    pub const MIN_ZOOM_LEVEL: i32 = -6;

    /// Unit zoom at the image origin, octave 0.
    pub const IDENTITY: Self = Self {
        zoom_x: 1.0,
        zoom_y: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
        zoom_level: 0,
    };

    /// Unit zoom with the window's top edge at image row `depth`.
    #[must_use]
    pub const fn at_depth(depth: f64) -> Self {
        Self {
            offset_y: depth,
            ..Self::IDENTITY
        }
    }

    /// Pyramid octave to sample from.
    #[must_use]
    pub fn octave(self) -> u32 {
        u32::try_from(self.zoom_level).unwrap_or(0)
    }

    /// Display coordinates to image coordinates.
    #[must_use]
    pub fn to_image(self, dx: f64, dy: f64) -> (f64, f64) {
        (self.offset_x + dx / self.zoom_x, self.offset_y + dy / self.zoom_y)
    }

    /// Image coordinates to display coordinates; inverse of
    /// [`to_image`](Self::to_image).
    #[must_use]
    pub fn to_display(self, ix: f64, iy: f64) -> (f64, f64) {
        ((ix - self.offset_x) * self.zoom_x, (iy - self.offset_y) * self.zoom_y)
    }

    /// Move the view by a display-pixel drag of `(dx, dy)`.
    #[must_use]
    pub fn panned(self, dx: f64, dy: f64) -> Self {
        Self {
            offset_x: self.offset_x - dx / self.zoom_x,
            offset_y: self.offset_y - dy / self.zoom_y,
            ..self
        }
    }

    /// Set the zoom to `1 / factor` per axis, keeping the image point
    /// under display `(x, y)` fixed.
    ///
    /// A factor of `(1, 1)` also resets the zoom level to octave 0.
    /// Non-positive or non-finite factors leave the view unchanged.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn zoomed_to_factor(self, x: f64, y: f64, fx: f64, fy: f64) -> Self {
        let valid = |f: f64| f.is_finite() && f > 0.0;
        if !valid(fx) || !valid(fy) {
            return self;
        }
        let zoom_level = if fx == 1.0 && fy == 1.0 {
            0
        } else {
            self.zoom_level
        };
        let (cx, cy) = self.to_image(x, y);
        let (zoom_x, zoom_y) = (1.0 / fx, 1.0 / fy);
        Self {
            zoom_x,
            zoom_y,
            offset_x: cx - x / zoom_x,
            offset_y: cy - y / zoom_y,
            zoom_level,
        }
    }

    /// Step one octave coarser around display `(x, y)`, if the pyramid
    /// has one (`depth` octaves in total).
    ///
    /// Depth is compressed by `2^level`; the azimuth axis stays at unit
    /// zoom since the strip always spans the full circumference.
    #[must_use]
    pub fn octave_increased(self, x: f64, y: f64, depth: u32) -> Self {
        let top = i32::try_from(depth).unwrap_or(i32::MAX) - 1;
        if self.zoom_level >= top {
            return self;
        }
        Self {
            zoom_level: self.zoom_level + 1,
            ..self
        }
        .zoomed_to_level(x, y)
    }

    /// Step one octave finer around display `(x, y)`, down to
    /// [`MIN_ZOOM_LEVEL`](Self::MIN_ZOOM_LEVEL).
    #[must_use]
    pub fn octave_decreased(self, x: f64, y: f64) -> Self {
        Self {
            zoom_level: (self.zoom_level - 1).max(Self::MIN_ZOOM_LEVEL),
            ..self
        }
        .zoomed_to_level(x, y)
    }

    fn zoomed_to_level(self, x: f64, y: f64) -> Self {
        self.zoomed_to_factor(x, y, 1.0, 2.0_f64.powi(self.zoom_level))
    }

    /// Back to [`IDENTITY`](Self::IDENTITY).
    #[must_use]
    pub const fn reset() -> Self {
        Self::IDENTITY
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::IDENTITY
    }
}
