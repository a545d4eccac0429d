/// Point in normalized image coordinates, (0, 0) top left and (1, 1) bottom right.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF32 {
    pub x: f32,
    pub y: f32,
}

impl PointF32 {
    pub const fn new(x: f32, y: f32) -> PointF32 {
        PointF32 { x, y }
    }

    pub fn offset(&self, dx: f32, dy: f32) -> PointF32 {
        PointF32 {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Project into pixel space for a frame of the given size
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}
