use crate::frame::{Sampler, pixel_center, to_rgba};
use crate::params::FilterParameters;
use crate::shapes::ellipse::FaceEllipse;
use image::RgbaImage;
use rayon::prelude::*;
use tone::Tone;
use tracing::{Level, span};

pub mod detail;
pub mod tone;

/// Runs detail + tone over every pixel of `src` inside `region` and returns
/// the new frame. Pixels outside the region, and the whole frame when the
/// effect is disabled, are copied through untouched. Alpha always passes
/// through.
///
/// Rows are processed in parallel; each output pixel depends only on its
/// neighbourhood in `src`.
pub fn apply(src: &RgbaImage, region: &FaceEllipse, params: &FilterParameters) -> RgbaImage {
    let span = span!(Level::DEBUG, "pixel_pass");
    let _guard = span.enter();

    let mut out = src.clone();
    let (width, height) = src.dimensions();
    if !params.effect_enabled || width == 0 || height == 0 || region.is_degenerate() {
        return out;
    }

    let params = params.clamped();
    let tone = Tone::from(&params);
    let sampler = Sampler::new(src);
    let stride = width as usize * 4;

    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for x in 0..width {
                if !region.contains(pixel_center(x, y, width, height)) {
                    continue;
                }

                let c = detail::apply(
                    params.detail_mode,
                    &sampler,
                    x,
                    y,
                    params.detail_strength,
                );
                let c = tone::apply(c, &tone);

                let i = x as usize * 4;
                let alpha = row[i + 3];
                row[i..i + 4].copy_from_slice(&to_rgba(c, alpha).0);
            }
        });

    out
}
