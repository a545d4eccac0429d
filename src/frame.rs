use crate::color::Rgb;
use crate::shapes::point::PointF32;
use image::{Rgba, RgbaImage};

/// Read-only view over a source frame with clamp-to-edge addressing.
pub struct Sampler<'a> {
    img: &'a RgbaImage,
    max_x: i64,
    max_y: i64,
}

impl<'a> Sampler<'a> {
    pub fn new(img: &'a RgbaImage) -> Self {
        Self {
            img,
            max_x: img.width() as i64 - 1,
            max_y: img.height() as i64 - 1,
        }
    }

    /// Colour at pixel (x, y); coordinates outside the frame are clamped.
    /// Callers must not sample an empty frame.
    pub fn fetch(&self, x: i64, y: i64) -> Rgb {
        let x = x.clamp(0, self.max_x) as u32;
        let y = y.clamp(0, self.max_y) as u32;
        to_rgb(self.img.get_pixel(x, y))
    }
}

/// Normalized coordinate of the center of pixel (x, y).
pub fn pixel_center(x: u32, y: u32, width: u32, height: u32) -> PointF32 {
    PointF32::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

pub fn to_rgb(p: &Rgba<u8>) -> Rgb {
    Rgb::new(
        p[0] as f32 / 255.,
        p[1] as f32 / 255.,
        p[2] as f32 / 255.,
    )
}

pub fn to_channel(v: f32) -> u8 {
    (v.clamp(0., 1.) * 255.).round() as u8
}

pub fn to_rgba(c: Rgb, alpha: u8) -> Rgba<u8> {
    Rgba([to_channel(c.r), to_channel(c.g), to_channel(c.b), alpha])
}

#[test]
fn test_fetch_clamps_to_edge() {
    let mut img = RgbaImage::new(3, 2);
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    img.put_pixel(2, 1, Rgba([0, 0, 255, 255]));
    let sampler = Sampler::new(&img);

    assert_eq!(sampler.fetch(-4, -1), Rgb::new(1., 0., 0.));
    assert_eq!(sampler.fetch(9, 7), Rgb::new(0., 0., 1.));
}

#[test]
fn test_channel_round_trip() {
    for v in 0..=255u8 {
        let p = Rgba([v, v, v, 17]);
        assert_eq!(to_rgba(to_rgb(&p), 17), p);
    }
}

#[test]
fn test_pixel_center() {
    let p = pixel_center(0, 3, 4, 4);
    assert_eq!(p, PointF32::new(0.125, 0.875));
}
