use crate::shapes::point::PointF32;
use anyhow::Result;
use image::RgbaImage;
use std::future::Future;

#[cfg(feature = "onnx")]
pub mod landmarks;
#[cfg(feature = "onnx")]
mod model;

// Face mesh topology (468 points)
pub const NOSE_TIP_IDX: usize = 1;
pub const FOREHEAD_IDX: usize = 10;
pub const CHIN_IDX: usize = 152;
pub const L_EYE_OUTER_IDX: usize = 33;
pub const R_EYE_OUTER_IDX: usize = 263;
pub const MESH_LEN: usize = 468;

/// Ordered landmark positions of one face in normalized frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    pub points: Vec<PointF32>,
}

/// The landmarks the face region is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchors {
    pub nose_tip: PointF32,
    pub forehead: PointF32,
    pub chin: PointF32,
    pub l_eye_outer: PointF32,
    pub r_eye_outer: PointF32,
}

/// `None` when the detector found no face.
pub type Detection = Option<Landmarks>;

impl Landmarks {
    pub fn new(points: Vec<PointF32>) -> Self {
        Self { points }
    }

    /// Builds a full length mesh with only the anchor positions filled in.
    pub fn from_anchors(a: &Anchors) -> Self {
        let mut points = vec![PointF32::default(); MESH_LEN];
        points[NOSE_TIP_IDX] = a.nose_tip;
        points[FOREHEAD_IDX] = a.forehead;
        points[CHIN_IDX] = a.chin;
        points[L_EYE_OUTER_IDX] = a.l_eye_outer;
        points[R_EYE_OUTER_IDX] = a.r_eye_outer;
        Self { points }
    }

    /// `None` if the mesh is too short or an anchor is not finite.
    pub fn anchors(&self) -> Option<Anchors> {
        let get = |idx: usize| self.points.get(idx).copied().filter(|p| p.is_finite());

        Some(Anchors {
            nose_tip: get(NOSE_TIP_IDX)?,
            forehead: get(FOREHEAD_IDX)?,
            chin: get(CHIN_IDX)?,
            l_eye_outer: get(L_EYE_OUTER_IDX)?,
            r_eye_outer: get(R_EYE_OUTER_IDX)?,
        })
    }
}

/// Produces landmarks for a frame. Runs on its own thread, at its own
/// cadence, decoupled from rendering.
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbaImage) -> impl Future<Output = Result<Detection>>;
}

/// Always reports the same detection. Useful for stills with known
/// landmarks and for exercising the scheduler.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    detection: Detection,
}

impl FixedDetector {
    pub fn new(detection: Detection) -> Self {
        Self { detection }
    }
}

impl Detector for FixedDetector {
    async fn detect(&mut self, _frame: &RgbaImage) -> Result<Detection> {
        Ok(self.detection.clone())
    }
}
