use super::model::{Session, initialize_model};
use super::{Detection, Detector, Landmarks, MESH_LEN};
use crate::shapes::point::PointF32;
use anyhow::{Error, Result};
use image::imageops::{FilterType, resize};
use image::{GenericImageView, RgbaImage};
use ndarray::Array;
use ort::value::Tensor;
use std::path::Path;
use tracing::{Level, debug, span};

const HEIGHT: u32 = 192;
const WIDTH: u32 = 192;

/// Face mesh landmark model run on the centered square of the frame.
///
/// Model input: 1x192x192x3 f32 rgb in 0. - 1.
/// Model outputs:
/// - `conv2d_21`: 468 (x, y, z) points in input pixel units
/// - `conv2d_31`: face presence logit
pub struct MeshDetector {
    model: Session,
    threshold: f32,
}

/// Square region of the source frame fed to the model, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Crop {
    left: u32,
    top: u32,
    side: u32,
}

impl Crop {
    fn centered(width: u32, height: u32) -> Crop {
        let side = width.min(height);
        Crop {
            left: (width - side) / 2,
            top: (height - side) / 2,
            side,
        }
    }
}

fn sigmoid(v: f32) -> f32 {
    1. / (1. + (-v).exp())
}

impl MeshDetector {
    pub fn new(model_path: &Path, threads: usize, threshold: f32) -> Result<MeshDetector> {
        Ok(MeshDetector {
            model: initialize_model(model_path, threads)?,
            threshold,
        })
    }

    pub fn run(&mut self, img: &RgbaImage) -> Result<Detection> {
        let span = span!(Level::DEBUG, "face_landmarker");
        let _guard = span.enter();

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }

        let crop = Crop::centered(width, height);
        let face_img = img.view(crop.left, crop.top, crop.side, crop.side).to_image();
        let input_img = resize(&face_img, WIDTH, HEIGHT, FilterType::Triangle);

        let input_arr =
            Array::from_shape_fn((1, HEIGHT as usize, WIDTH as usize, 3), |(_, y, x, c)| {
                input_img.get_pixel(x as u32, y as u32)[c] as f32 / 255. // 0. - 1. range
            });
        let input = Tensor::from_array(input_arr)?;

        let outputs = self.model.run(ort::inputs!["input_1" => input]?)?;

        let presence = outputs["conv2d_31"]
            .try_extract_tensor::<f32>()?
            .iter()
            .next()
            .copied()
            .map(sigmoid)
            .unwrap_or(0.);
        debug!("Face presence {presence}");
        if presence < self.threshold {
            return Ok(None);
        }

        let mesh = outputs["conv2d_21"].try_extract_tensor::<f32>()?;
        let mesh = mesh.iter().copied().collect::<Vec<f32>>();
        if mesh.len() < MESH_LEN * 3 {
            return Err(Error::msg(format!(
                "Expected {} mesh values, model returned {}",
                MESH_LEN * 3,
                mesh.len()
            )));
        }

        Ok(Some(extract_landmarks(&mesh, crop, width, height)))
    }
}

impl Detector for MeshDetector {
    async fn detect(&mut self, frame: &RgbaImage) -> Result<Detection> {
        self.run(frame)
    }
}

/// Maps mesh points from model input space back to normalized frame space.
fn extract_landmarks(mesh: &[f32], crop: Crop, width: u32, height: u32) -> Landmarks {
    let scale = crop.side as f32 / WIDTH as f32;

    let points = mesh
        .chunks_exact(3)
        .take(MESH_LEN)
        .map(|p| {
            PointF32::new(
                (crop.left as f32 + p[0] * scale) / width as f32,
                (crop.top as f32 + p[1] * scale) / height as f32,
            )
        })
        .collect::<Vec<_>>();

    Landmarks::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_crop_on_wide_frame() {
        assert_eq!(
            Crop::centered(640, 480),
            Crop {
                left: 80,
                top: 0,
                side: 480
            }
        );
        assert_eq!(
            Crop::centered(300, 400),
            Crop {
                left: 0,
                top: 50,
                side: 300
            }
        );
    }

    #[test]
    fn mesh_maps_back_to_frame_space() {
        let mut mesh = vec![0.; MESH_LEN * 3];
        // model center -> frame center
        mesh[0] = 96.;
        mesh[1] = 96.;
        // model bottom right -> crop bottom right
        mesh[3] = 192.;
        mesh[4] = 192.;

        let crop = Crop::centered(640, 480);
        let landmarks = extract_landmarks(&mesh, crop, 640, 480);

        assert_eq!(landmarks.points.len(), MESH_LEN);
        assert_eq!(landmarks.points[0], PointF32::new(0.5, 0.5));
        assert_eq!(landmarks.points[1], PointF32::new(560. / 640., 1.));
        assert_eq!(landmarks.points[2], PointF32::new(80. / 640., 0.));
    }

    #[test]
    fn sigmoid_midpoint() {
        assert_eq!(sigmoid(0.), 0.5);
        assert!(sigmoid(10.) > 0.99);
    }
}
