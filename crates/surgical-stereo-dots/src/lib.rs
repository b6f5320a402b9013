//! Dot-grid target detection.
//!
//! Finds the dots of a known planar grid target in a grey image and
//! identifies each one with its model id. Four enlarged fiducial dots break
//! the grid symmetry.
//!
//! Pipeline:
//! 1. Binarise (adaptive mean or Otsu) and label 8-connected blobs.
//! 2. Keep compact, roughly elliptical blobs of plausible size.
//! 3. Take the four largest blobs as fiducials.
//! 4. Undistort all centres with the camera intrinsics and distortion.
//! 5. For each non-mirrored assignment of detected to model fiducials,
//!    fit a layout-to-image homography, associate every model dot with its
//!    nearest candidate and refine.
//! 6. Keep the hypothesis explaining the most dots. Equal counts go to the
//!    one keeping more fiducial blobs on fiducial model dots, then to the
//!    one whose fiducial quad is closest to upright.
//!
//! Not finding the target is a valid outcome and yields an empty
//! [`DotDetection`].
//!
//! ```no_run
//! use surgical_stereo_core::{CameraIntrinsics, Distortion, GrayImageView};
//! use surgical_stereo_dots::{DotDetector, DotDetectorParams, DotModel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rows: Vec<[f64; 6]> = Vec::new(); // [id, layout_x, layout_y, x, y, z]
//! let model = DotModel::from_rows(&rows)?;
//! let detector = DotDetector::new(model, &[133, 141, 308, 316], DotDetectorParams::default())?;
//!
//! let (w, h) = (1920, 1080);
//! let pixels = vec![255u8; w * h];
//! let image = GrayImageView::new(w, h, &pixels)?;
//! let k = CameraIntrinsics::from_params(2000.0, 2000.0, 960.0, 540.0)?;
//! let found = detector.detect(&image, &k, &Distortion::none())?;
//! for [id, x, y] in found.to_rows() {
//!     println!("{id} {x:.2} {y:.2}");
//! }
//! # Ok(())
//! # }
//! ```

mod blobs;
mod detector;
mod error;
mod grid;
mod model;
mod params;
mod result;

pub use blobs::Blob;
pub use detector::{detect_dots, DotDetector};
pub use error::{DotDetectError, ModelError};
pub use model::{DotModel, FiducialSet, ModelPoint};
pub use params::{BlobParams, DotDetectorParams, GridFitParams, Polarity, ThresholdMode};
pub use result::{DetectedDot, DotDetection};

/// Candidate blobs after shape filtering, in raster order.
///
/// Exposed for diagnostics and threshold tuning.
pub fn dot_candidates(
    image: &surgical_stereo_core::GrayImageView<'_>,
    params: &BlobParams,
) -> Result<Vec<Blob>, surgical_stereo_core::ImageError> {
    image.validate()?;
    let mask = blobs::binarize(image, params);
    let found = blobs::label_components(&mask, image.width, image.height);
    Ok(blobs::filter_blobs(found, image.width, image.height, params))
}
