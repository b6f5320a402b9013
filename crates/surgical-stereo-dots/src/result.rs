use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use surgical_stereo_core::Homography;

/// One identified dot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedDot {
    pub id: u32,
    /// Blob centre in the original (distorted) image.
    pub image: Point2<f64>,
    /// Blob centre after lens undistortion.
    pub undistorted: Point2<f64>,
    /// Physical position from the model.
    pub model: Point3<f64>,
}

/// Output of a dot detection run.
///
/// Dots are listed in raster order of their first pixel. An empty detection
/// means the target was not found.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DotDetection {
    pub dots: Vec<DetectedDot>,
    /// Layout to undistorted-image homography of the accepted fit.
    pub homography: Option<Homography>,
}

impl DotDetection {
    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.dots.iter().map(|d| d.id)
    }

    pub fn get(&self, id: u32) -> Option<&DetectedDot> {
        self.dots.iter().find(|d| d.id == id)
    }

    /// `[id, x, y]` rows in image pixels.
    pub fn to_rows(&self) -> Vec<[f64; 3]> {
        self.dots
            .iter()
            .map(|d| [d.id as f64, d.image.x, d.image.y])
            .collect()
    }

    /// `[id, x, y, X, Y, Z]` rows: image pixels followed by model coordinates.
    pub fn to_extended_rows(&self) -> Vec<[f64; 6]> {
        self.dots
            .iter()
            .map(|d| {
                [
                    d.id as f64,
                    d.image.x,
                    d.image.y,
                    d.model.x,
                    d.model.y,
                    d.model.z,
                ]
            })
            .collect()
    }
}
