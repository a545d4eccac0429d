use crate::color::Rgb;
use crate::frame::Sampler;
use crate::params::DetailMode;

// Edge aware smoothing, distances in pixels
const SMOOTH_RADIUS: i64 = 2;
const SIGMA_SPATIAL: f32 = 4.0;
const SIGMA_LUMINANCE: f32 = 0.1;
const SIGMA_COLOR: f32 = 0.15;
const MIN_LUMINANCE: f32 = 1e-4;
const MIN_WEIGHT: f32 = 1e-6;

// Sharpen samples twice the base pixel spacing away
const SHARPEN_STEP: i64 = 2;
const BLUR_RADIUS: i64 = 2;
const BLUR_FALLOFF: f32 = 3.;

/// Detail filtered colour of pixel (x, y). Never touches the source.
pub fn apply(mode: DetailMode, src: &Sampler, x: u32, y: u32, strength: f32) -> Rgb {
    let (x, y) = (x as i64, y as i64);
    let center = src.fetch(x, y);

    match mode {
        DetailMode::Smooth => {
            if strength <= 0. {
                return center;
            }
            center.mix(smooth(src, x, y), strength)
        }
        DetailMode::SharpenBlur => sharpen_blur(src, x, y, strength),
    }
}

fn chromaticity(c: Rgb, luminance: f32) -> Rgb {
    c * (1. / luminance.max(MIN_LUMINANCE))
}

/// Bilateral style average over a 5x5 neighbourhood. Neighbours are weighted
/// down by spatial distance, luminance difference and by the difference of
/// their luminance normalized colours.
pub fn smooth(src: &Sampler, x: i64, y: i64) -> Rgb {
    let center = src.fetch(x, y);
    let center_lum = center.luminance();
    let center_chroma = chromaticity(center, center_lum);

    let mut sum = Rgb::default();
    let mut total_weight = 0.;

    for dy in -SMOOTH_RADIUS..=SMOOTH_RADIUS {
        for dx in -SMOOTH_RADIUS..=SMOOTH_RADIUS {
            let sample = src.fetch(x + dx, y + dy);
            let lum = sample.luminance();

            let spatial = ((dx * dx + dy * dy) as f32).sqrt() / SIGMA_SPATIAL;
            let lum_diff = (lum - center_lum) / SIGMA_LUMINANCE;
            let color_diff = (chromaticity(sample, lum) - center_chroma).length() / SIGMA_COLOR;

            let weight =
                (-(spatial * spatial + lum_diff * lum_diff + color_diff * color_diff)).exp();

            sum = sum + sample * weight;
            total_weight += weight;
        }
    }

    if total_weight < MIN_WEIGHT {
        return center;
    }

    sum * (1. / total_weight)
}

fn sharpen_blur(src: &Sampler, x: i64, y: i64, strength: f32) -> Rgb {
    let center = src.fetch(x, y);

    if strength > 0.5 {
        // Overshoot is left for the tone stage to clamp
        center.mix(sharpened(src, x, y), (strength - 0.5) * 2.)
    } else if strength < 0.5 {
        center.mix(blurred(src, x, y), 1. - strength * 2.)
    } else {
        center
    }
}

/// 3x3 kernel: 5 at the center, -1 on the orthogonal neighbours.
fn sharpened(src: &Sampler, x: i64, y: i64) -> Rgb {
    let s = SHARPEN_STEP;
    src.fetch(x, y) * 5.
        - src.fetch(x, y - s)
        - src.fetch(x, y + s)
        - src.fetch(x - s, y)
        - src.fetch(x + s, y)
}

/// 5x5 average with linear falloff max(0, 1 - d / 3).
fn blurred(src: &Sampler, x: i64, y: i64) -> Rgb {
    let mut sum = Rgb::default();
    let mut total_weight = 0.;

    for dy in -BLUR_RADIUS..=BLUR_RADIUS {
        for dx in -BLUR_RADIUS..=BLUR_RADIUS {
            let d = ((dx * dx + dy * dy) as f32).sqrt();
            let weight = (1. - d / BLUR_FALLOFF).max(0.);
            if weight == 0. {
                continue;
            }
            sum = sum + src.fetch(x + dx, y + dy) * weight;
            total_weight += weight;
        }
    }

    sum * (1. / total_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([200, 120, 90, 255])
            } else {
                Rgba([40, 60, 30, 255])
            }
        })
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8, 255])
        })
    }

    #[test]
    fn sharpen_blur_is_identity_at_half_strength() {
        let img = checker(7, 5);
        let src = Sampler::new(&img);
        for y in 0..5 {
            for x in 0..7 {
                let out = apply(DetailMode::SharpenBlur, &src, x, y, 0.5);
                assert_eq!(out, src.fetch(x as i64, y as i64));
            }
        }
    }

    #[test]
    fn smooth_is_identity_at_zero_strength() {
        let img = gradient(6, 6);
        let src = Sampler::new(&img);
        let out = apply(DetailMode::Smooth, &src, 3, 3, 0.);
        assert_eq!(out, src.fetch(3, 3));
    }

    #[test]
    fn flat_regions_are_unchanged() {
        let img = RgbaImage::from_pixel(6, 6, Rgba([128, 128, 128, 255]));
        let src = Sampler::new(&img);
        let gray = src.fetch(0, 0);
        for strength in [0., 0.2, 0.8, 1.] {
            for mode in [DetailMode::Smooth, DetailMode::SharpenBlur] {
                let out = apply(mode, &src, 2, 3, strength);
                assert!((out - gray).length() < 1e-5, "{mode:?} {strength}: {out:?}");
            }
        }
    }

    #[test]
    fn full_blur_pulls_towards_neighbours() {
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([0, 0, 0, 255]));
        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let src = Sampler::new(&img);

        let out = apply(DetailMode::SharpenBlur, &src, 4, 4, 0.);
        assert!(out.r < 1. && out.r > 0.);
        let neighbour = apply(DetailMode::SharpenBlur, &src, 5, 4, 0.);
        assert!(neighbour.r > 0.);
    }

    #[test]
    fn full_sharpen_boosts_contrast() {
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([100, 100, 100, 255]));
        img.put_pixel(4, 4, Rgba([150, 150, 150, 255]));
        let src = Sampler::new(&img);

        let out = apply(DetailMode::SharpenBlur, &src, 4, 4, 1.);
        assert!(out.r > src.fetch(4, 4).r);
    }

    #[test]
    fn full_sharpen_is_not_clamped() {
        let mut img = RgbaImage::from_pixel(9, 9, Rgba([200, 200, 200, 255]));
        img.put_pixel(4, 4, Rgba([100, 100, 100, 255]));
        let src = Sampler::new(&img);

        // 5 * 100 - 4 * 200
        let out = apply(DetailMode::SharpenBlur, &src, 4, 4, 1.);
        assert!((out.r - (-300. / 255.)).abs() < 1e-5);

        img.put_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let src = Sampler::new(&img);
        let out = apply(DetailMode::SharpenBlur, &src, 4, 4, 1.);
        assert!((out.r - 475. / 255.).abs() < 1e-5);
    }

    #[test]
    fn smoothing_keeps_strong_edges() {
        // Left half dark, right half bright
        let img = RgbaImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                Rgba([30, 30, 30, 255])
            } else {
                Rgba([220, 220, 220, 255])
            }
        });
        let src = Sampler::new(&img);

        let out = smooth(&src, 4, 5);
        assert!((out - src.fetch(4, 5)).length() < 1e-3);
    }

    #[test]
    fn smoothing_reduces_fine_noise() {
        // Small luminance jitter, similar hue
        let img = RgbaImage::from_fn(10, 10, |x, y| {
            let j = if (x + y) % 2 == 0 { 4 } else { 0 };
            Rgba([180 + j, 130 + j, 110 + j, 255])
        });
        let src = Sampler::new(&img);

        let center = src.fetch(5, 5);
        let out = smooth(&src, 5, 5);
        let mean = (src.fetch(5, 5) + src.fetch(4, 5)) * 0.5;
        assert!((out - mean).length() < (center - mean).length());
    }
}
