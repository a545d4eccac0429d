use std::ops::{Add, Mul, Sub};

/// Linear RGB triple, each channel nominally in 0. - 1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// Hue in degrees [0, 360), saturation and value in 0. - 1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(v: f32) -> Self {
        Self { r: v, g: v, b: v }
    }

    pub fn luminance(&self) -> f32 {
        0.299 * self.r + 0.587 * self.g + 0.114 * self.b
    }

    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            r: f(self.r),
            g: f(self.g),
            b: f(self.b),
        }
    }

    /// Linear interpolation towards `other`, t = 0. yields self.
    pub fn mix(self, other: Rgb, t: f32) -> Self {
        if t == 0. {
            return self;
        }
        self + (other - self) * t
    }

    pub fn length(&self) -> f32 {
        (self.r * self.r + self.g * self.g + self.b * self.b).sqrt()
    }

    pub fn max_channel(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn min_channel(&self) -> f32 {
        self.r.min(self.g).min(self.b)
    }
}

impl Add for Rgb {
    type Output = Rgb;

    fn add(self, o: Rgb) -> Rgb {
        Rgb::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl Sub for Rgb {
    type Output = Rgb;

    fn sub(self, o: Rgb) -> Rgb {
        Rgb::new(self.r - o.r, self.g - o.g, self.b - o.b)
    }
}

impl Mul<f32> for Rgb {
    type Output = Rgb;

    fn mul(self, f: f32) -> Rgb {
        Rgb::new(self.r * f, self.g * f, self.b * f)
    }
}

impl From<Rgb> for Hsv {
    fn from(c: Rgb) -> Hsv {
        rgb_to_hsv(c)
    }
}

impl From<Hsv> for Rgb {
    fn from(c: Hsv) -> Rgb {
        hsv_to_rgb(c)
    }
}

pub fn rgb_to_hsv(c: Rgb) -> Hsv {
    let max = c.max_channel();
    let min = c.min_channel();
    let chroma = max - min;

    let h = if chroma == 0. {
        0.
    } else if max == c.r {
        (60. * ((c.g - c.b) / chroma)).rem_euclid(360.)
    } else if max == c.g {
        (120. + 60. * ((c.b - c.r) / chroma)).rem_euclid(360.)
    } else {
        (240. + 60. * ((c.r - c.g) / chroma)).rem_euclid(360.)
    };

    // rem_euclid can round up to exactly 360 for tiny negative inputs
    let h = if h >= 360. { 0. } else { h };
    let s = if max == 0. { 0. } else { chroma / max };

    Hsv { h, s, v: max }
}

pub fn hsv_to_rgb(c: Hsv) -> Rgb {
    let h = c.h.rem_euclid(360.);
    let c1 = c.v * c.s;
    let x = c1 * (1. - ((h / 60.) % 2. - 1.).abs());
    let m = c.v - c1;

    let (r, g, b) = match h {
        h if h < 60. => (c1, x, 0.),
        h if h < 120. => (x, c1, 0.),
        h if h < 180. => (0., c1, x),
        h if h < 240. => (0., x, c1),
        h if h < 300. => (x, 0., c1),
        _ => (c1, 0., x),
    };

    Rgb::new(r + m, g + m, b + m)
}
