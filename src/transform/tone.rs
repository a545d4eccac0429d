use crate::color::{Hsv, Rgb, hsv_to_rgb, rgb_to_hsv};
use crate::params::FilterParameters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue: f32,
}

impl Tone {
    pub const NEUTRAL: Tone = Tone {
        brightness: 0.,
        contrast: 1.,
        saturation: 1.,
        hue: 0.,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl From<&FilterParameters> for Tone {
    fn from(p: &FilterParameters) -> Tone {
        Tone {
            brightness: p.brightness,
            contrast: p.contrast,
            saturation: p.saturation,
            hue: p.hue,
        }
    }
}

/// Brightness, then contrast (clamped), then saturation and hue in HSV.
/// Contrast must clamp before the HSV round trip so out of range channels
/// never reach the hue computation.
pub fn apply(c: Rgb, tone: &Tone) -> Rgb {
    let c = c.map(|v| v + tone.brightness);
    let c = c.map(|v| ((v - 0.5) * tone.contrast + 0.5).clamp(0., 1.));

    let hsv = rgb_to_hsv(c);
    hsv_to_rgb(Hsv {
        h: (hsv.h + tone.hue).rem_euclid(360.),
        s: (hsv.s * tone.saturation).clamp(0., 1.),
        v: hsv.v,
    })
}
