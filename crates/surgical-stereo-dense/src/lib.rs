//! Quasi-dense stereo surface reconstruction.
//!
//! Follows the seeded region-growing scheme of Stoyanov et al. (MICCAI
//! 2010), which in turn builds on Lhuillier & Quan's quasi-dense matching:
//! 1. Shi–Tomasi corners in the left image become seeds.
//! 2. Each seed is matched along its epipolar line by ZNCC and confirmed by
//!    matching back from the right image.
//! 3. Matches grow in waves, best-first within each wave, into
//!    neighbouring pixels whose offset stays within a small disparity
//!    gradient, so growth halts at depth and texture discontinuities.
//! 4. Matches failing a left-right consistency check are dropped; the
//!    survivors are refined to sub-pixel accuracy.
//! 5. Every correspondence is triangulated in the left camera frame.
//!
//! Output is ordered by left pixel (row-major) and is identical for
//! repeated calls on the same input, with or without the `rayon` feature.
//! An image pair without usable seeds reconstructs to an empty cloud.
//!
//! ```no_run
//! use nalgebra::{Matrix3, Vector3};
//! use surgical_stereo_core::{ImageView, StereoRig};
//! use surgical_stereo_dense::{reconstruct, ReconstructionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (w, h) = (640, 480);
//! let (left_px, right_px) = (vec![0u8; w * h * 3], vec![0u8; w * h * 3]);
//! let left = ImageView::new(w, h, 3, &left_px)?;
//! let right = ImageView::new(w, h, 3, &right_px)?;
//! let k = Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0);
//! let rig = StereoRig::from_matrices(k, k, Matrix3::identity(), Vector3::new(-5.0, 0.0, 0.0))?;
//!
//! let cloud = reconstruct(&left, &right, &rig, &ReconstructionConfig::with_flags(false, true))?;
//! assert_eq!(cloud.columns(), 7);
//! # Ok(())
//! # }
//! ```

mod error;
mod matcher;
mod params;
mod pipeline;
mod propagate;
mod result;
mod seeds;
mod texture;

pub use error::ReconstructError;
pub use params::{QuasiDenseParams, ReconstructionConfig};
pub use result::{DisparityMap, PointCloud, StereoMatch, SurfacePoint, SurfaceReconstruction};

use log::debug;
use nalgebra::{Matrix3, Vector3};
use surgical_stereo_core::{ImageView, StereoRig};
use surgical_stereo_triangulate::{Correspondence, Triangulator};

/// Baselines shorter than this are rejected before matching.
pub const MIN_BASELINE: f64 = 1e-9;

/// Reconstruct the surface seen by a calibrated stereo pair.
///
/// The table has 3 or 7 columns depending on
/// [`ReconstructionConfig::emit_color_and_quality`].
pub fn reconstruct(
    left: &ImageView<'_>,
    right: &ImageView<'_>,
    rig: &StereoRig,
    config: &ReconstructionConfig,
) -> Result<PointCloud, ReconstructError> {
    Ok(reconstruct_surface(left, right, rig, config)?.to_point_cloud(config.emit_color_and_quality))
}

/// Like [`reconstruct`], building the rig from raw calibration matrices.
///
/// `rotation` and `translation` map left camera coordinates to right
/// camera coordinates.
#[allow(clippy::too_many_arguments)]
pub fn reconstruct_calibrated(
    left: &ImageView<'_>,
    left_intrinsics: Matrix3<f64>,
    right: &ImageView<'_>,
    right_intrinsics: Matrix3<f64>,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
    use_hartley: bool,
    emit_color_and_quality: bool,
) -> Result<PointCloud, ReconstructError> {
    let rig = StereoRig::from_matrices(left_intrinsics, right_intrinsics, rotation, translation)?;
    let config = ReconstructionConfig::with_flags(use_hartley, emit_color_and_quality);
    reconstruct(left, right, &rig, &config)
}

/// Reconstruction with per-point provenance.
pub fn reconstruct_surface(
    left: &ImageView<'_>,
    right: &ImageView<'_>,
    rig: &StereoRig,
    config: &ReconstructionConfig,
) -> Result<SurfaceReconstruction, ReconstructError> {
    let method = config.triangulation_method;
    let matches = pipeline::dense_matches(left, right, rig, &config.matching)?;
    if matches.is_empty() {
        return Ok(SurfaceReconstruction {
            points: Vec::new(),
            method,
        });
    }

    let pairs: Vec<Correspondence> = matches
        .iter()
        .map(|m| Correspondence::new(m.left, m.right))
        .collect();
    let positions = Triangulator::new(*rig, method).triangulate(&pairs)?;
    debug!(
        "{} of {} correspondences triangulated",
        positions.valid_count(),
        positions.len()
    );

    let points = matches
        .into_iter()
        .zip(positions.into_inner())
        .map(|(m, position)| SurfacePoint {
            color: left.rgb(m.left.x as usize, m.left.y as usize),
            correspondence: m,
            position,
        })
        .collect();
    Ok(SurfaceReconstruction { points, method })
}

/// Dense correspondences without triangulation.
pub fn match_points(
    left: &ImageView<'_>,
    right: &ImageView<'_>,
    rig: &StereoRig,
    params: &QuasiDenseParams,
) -> Result<Vec<StereoMatch>, ReconstructError> {
    pipeline::dense_matches(left, right, rig, params)
}

/// Disparity over the left image grid.
pub fn compute_disparity(
    left: &ImageView<'_>,
    right: &ImageView<'_>,
    rig: &StereoRig,
    params: &QuasiDenseParams,
) -> Result<DisparityMap, ReconstructError> {
    let matches = pipeline::dense_matches(left, right, rig, params)?;
    Ok(DisparityMap::from_matches(left.width, left.height, &matches))
}
