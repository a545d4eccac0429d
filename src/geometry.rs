use crate::pipeline::{Anchors, Detection};
use crate::shapes::ellipse::FaceEllipse;
use tracing::{trace, warn};

// Extra coverage beyond the forehead to chin span
const FACE_MARGIN: f32 = 1.2;
// Shifts the region up from the nose towards cheeks and forehead
const CENTER_Y_OFFSET: f32 = -0.05;
const MIN_FACE_HEIGHT: f32 = 1e-6;

/// Reduces one detection to the region the effect applies to. No face, a
/// malformed mesh or collapsed geometry all yield [`FaceEllipse::NONE`].
pub fn face_ellipse(detection: &Detection) -> FaceEllipse {
    let Some(landmarks) = detection else {
        trace!("No face detected");
        return FaceEllipse::NONE;
    };

    match landmarks.anchors() {
        Some(anchors) => from_anchors(&anchors),
        None => {
            warn!(
                "Malformed landmarks ({} points), ignoring face",
                landmarks.points.len()
            );
            FaceEllipse::NONE
        }
    }
}

/// Only the face's own proportions are used, never the frame aspect ratio.
pub fn from_anchors(a: &Anchors) -> FaceEllipse {
    let face_height = (a.forehead.y - a.chin.y).abs();
    let face_width = (a.r_eye_outer.x - a.l_eye_outer.x).abs();

    if !(face_height > MIN_FACE_HEIGHT) {
        warn!("Degenerate face height {face_height}, ignoring face");
        return FaceEllipse::NONE;
    }

    let face_ratio = face_width / face_height;
    let base_size = face_height * FACE_MARGIN;
    let major_axis = base_size * face_ratio;
    let minor_axis = base_size;

    let ellipse = FaceEllipse::new(
        a.nose_tip.offset(0., CENTER_Y_OFFSET),
        major_axis / 2.,
        minor_axis / 2.,
    );
    trace!("Face region: {ellipse:?}");

    ellipse
}
