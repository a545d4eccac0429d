use std::sync::{Arc, RwLock};

/// Which detail filter runs inside the face region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailMode {
    /// Edge aware skin smoothing, blended with the source by strength.
    #[default]
    Smooth,
    /// Blur below 0.5 strength, sharpen above, identity at 0.5.
    SharpenBlur,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParameters {
    pub detail_mode: DetailMode,
    pub detail_strength: f32,
    pub brightness: f32,
    pub saturation: f32,
    pub contrast: f32,
    /// Degrees
    pub hue: f32,
    pub effect_enabled: bool,
    pub face_mask_enabled: bool,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            detail_mode: DetailMode::Smooth,
            detail_strength: 0.5,
            brightness: 0.,
            saturation: 1.,
            contrast: 1.,
            hue: 0.,
            effect_enabled: true,
            face_mask_enabled: true,
        }
    }
}

fn clamp_or(v: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if v.is_nan() { fallback } else { v.clamp(min, max) }
}

impl FilterParameters {
    /// Parameters pulled back into their supported ranges. NaN falls back
    /// to the neutral value.
    pub fn clamped(&self) -> Self {
        Self {
            detail_strength: clamp_or(self.detail_strength, 0., 1., 0.5),
            brightness: clamp_or(self.brightness, 0., 0.5, 0.),
            saturation: clamp_or(self.saturation, 0.5, 2., 1.),
            contrast: clamp_or(self.contrast, 0.5, 2., 1.),
            hue: clamp_or(self.hue, -90., 90., 0.),
            ..*self
        }
    }
}

/// Caller side handle for changing parameters between frames. Every frame
/// works on a copy taken once at its start.
#[derive(Debug, Clone, Default)]
pub struct Controls {
    inner: Arc<RwLock<FilterParameters>>,
}

impl Controls {
    pub fn new(params: FilterParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    pub fn snapshot(&self) -> FilterParameters {
        match self.inner.read() {
            Ok(p) => *p,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut FilterParameters)) {
        let mut guard = match self.inner.write() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard);
    }
}
