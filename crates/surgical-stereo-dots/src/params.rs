use serde::{Deserialize, Serialize};
use surgical_stereo_core::UndistortConfig;

/// Whether dots are darker or brighter than the target background.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Dark,
    Bright,
}

/// How the image is binarised before blob extraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// One global Otsu threshold.
    Otsu,
    /// Compare each pixel with the mean of a `(2 radius + 1)^2` window,
    /// shifted by `offset` grey levels towards the background.
    Adaptive { radius: usize, offset: u8 },
}

impl Default for ThresholdMode {
    fn default() -> Self {
        Self::Adaptive {
            radius: 25,
            offset: 10,
        }
    }
}

/// Blob segmentation and shape filtering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    pub polarity: Polarity,
    pub threshold: ThresholdMode,
    /// Pixel area bounds for a dot.
    pub min_area: usize,
    pub max_area: usize,
    /// Major over minor axis of the second-moment ellipse.
    pub max_axis_ratio: f64,
    /// Area over bounding-box area. Discs give about 0.785.
    pub min_fill_ratio: f64,
    /// Blobs smaller than this fraction of the median dot area are dropped.
    pub min_relative_area: f64,
    /// A fiducial must be at least this many times the median dot area.
    pub fiducial_area_ratio: f64,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            polarity: Polarity::Dark,
            threshold: ThresholdMode::default(),
            min_area: 8,
            max_area: 20_000,
            max_axis_ratio: 3.0,
            min_fill_ratio: 0.5,
            min_relative_area: 0.25,
            fiducial_area_ratio: 2.0,
        }
    }
}

/// Grid fitting and id assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridFitParams {
    /// Association radius as a fraction of the locally projected dot pitch.
    pub match_radius: f64,
    /// Homography re-estimations from all associated dots.
    pub refine_iterations: usize,
    /// Minimum share of candidate blobs a hypothesis must explain.
    pub min_inlier_fraction: f64,
    pub undistort: UndistortConfig,
}

impl Default for GridFitParams {
    fn default() -> Self {
        Self {
            match_radius: 0.35,
            refine_iterations: 3,
            min_inlier_fraction: 0.2,
            undistort: UndistortConfig::default(),
        }
    }
}

/// Configuration for [`crate::DotDetector`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DotDetectorParams {
    pub blobs: BlobParams,
    pub grid: GridFitParams,
}
