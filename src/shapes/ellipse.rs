use super::point::PointF32;
use image::{Rgba, RgbaImage};
use imageproc::drawing;

/// Axis aligned ellipse in normalized image coordinates.
///
/// `major_radius` spans the horizontal axis and `minor_radius` the vertical
/// one, regardless of which is larger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceEllipse {
    pub center: PointF32,
    pub major_radius: f32,
    pub minor_radius: f32,
}

const DEGENERATE_RADIUS: f32 = 1e-4;
const WHOLE_FRAME_RADIUS: f32 = 1.5;

impl FaceEllipse {
    /// Matches no point of the unit square: tiny and parked off frame.
    pub const NONE: FaceEllipse = FaceEllipse {
        center: PointF32::new(-1., -1.),
        major_radius: DEGENERATE_RADIUS,
        minor_radius: DEGENERATE_RADIUS,
    };

    /// Covers every point of the unit square.
    pub const WHOLE_FRAME: FaceEllipse = FaceEllipse {
        center: PointF32::new(0.5, 0.5),
        major_radius: WHOLE_FRAME_RADIUS,
        minor_radius: WHOLE_FRAME_RADIUS,
    };

    pub fn new(center: PointF32, major_radius: f32, minor_radius: f32) -> Self {
        Self {
            center,
            major_radius,
            minor_radius,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.major_radius > DEGENERATE_RADIUS && self.minor_radius > DEGENERATE_RADIUS)
    }

    pub fn contains(&self, p: PointF32) -> bool {
        // Also rejects NaN radii
        if !(self.major_radius > 0. && self.minor_radius > 0.) {
            return false;
        }

        let dx = (p.x - self.center.x) / self.major_radius;
        let dy = (p.y - self.center.y) / self.minor_radius;

        dx * dx + dy * dy < 1.
    }

    /// Debug overlay of the ellipse outline in pixel space.
    pub fn draw_outline(&self, img: &mut RgbaImage, color: Rgba<u8>) {
        if self.is_degenerate() || !self.center.is_finite() {
            return;
        }

        let (cx, cy) = self.center.to_pixels(img.width(), img.height());
        let rx = self.major_radius * img.width() as f32;
        let ry = self.minor_radius * img.height() as f32;

        drawing::draw_hollow_ellipse_mut(
            img,
            (cx.round() as i32, cy.round() as i32),
            rx.round().max(1.) as i32,
            ry.round().max(1.) as i32,
            color,
        );
    }
}

impl Default for FaceEllipse {
    fn default() -> Self {
        Self::NONE
    }
}
