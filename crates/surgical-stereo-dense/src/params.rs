use serde::{Deserialize, Serialize};
use surgical_stereo_triangulate::TriangulationMethod;

/// Matching and propagation parameters.
///
/// Disparity is `x_left - x_right` in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuasiDenseParams {
    /// Pixels this close to the image edge are never matched.
    pub border: usize,
    /// Half size of the ZNCC window.
    pub window_radius: usize,
    /// Minimum ZNCC for a propagated match.
    pub correlation_threshold: f32,
    /// Minimum window standard deviation, in grey levels, on both sides.
    pub texture_threshold: f32,
    /// Neighbourhood visited around each accepted match.
    pub neighborhood_radius: usize,
    /// Maximum change of the match offset between neighbouring pixels.
    pub disparity_gradient: usize,
    pub max_seeds: usize,
    /// Seed responses below `seed_quality * max_response` are ignored.
    pub seed_quality: f64,
    pub seed_min_distance: f64,
    /// Minimum ZNCC for a seed match.
    pub seed_correlation_threshold: f32,
    /// Inclusive `[min, max]` disparity.
    pub disparity_range: [i32; 2],
    /// Maximum distance of a right pixel from the epipolar line.
    pub epipolar_tolerance: f64,
    pub lr_check: bool,
    /// Half size of the left window searched by the consistency check.
    pub lr_search_radius: usize,
    /// The back-match must land this close to the original left pixel.
    pub lr_tolerance: usize,
    /// Parabolic sub-pixel refinement of the right point.
    pub subpixel: bool,
}

impl Default for QuasiDenseParams {
    fn default() -> Self {
        Self {
            border: 10,
            window_radius: 2,
            correlation_threshold: 0.5,
            texture_threshold: 2.0,
            neighborhood_radius: 1,
            disparity_gradient: 1,
            max_seeds: 500,
            seed_quality: 0.01,
            seed_min_distance: 10.0,
            seed_correlation_threshold: 0.8,
            disparity_range: [-32, 256],
            epipolar_tolerance: 1.5,
            lr_check: true,
            lr_search_radius: 2,
            lr_tolerance: 1,
            subpixel: true,
        }
    }
}

/// Configuration for [`crate::reconstruct`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub triangulation_method: TriangulationMethod,
    /// Emit `[x, y, z, r, g, b, quality]` rows instead of `[x, y, z]`.
    pub emit_color_and_quality: bool,
    pub matching: QuasiDenseParams,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            triangulation_method: TriangulationMethod::Midpoint,
            emit_color_and_quality: true,
            matching: QuasiDenseParams::default(),
        }
    }
}

impl ReconstructionConfig {
    /// Default matching with the two output switches set explicitly.
    pub fn with_flags(use_hartley: bool, emit_color_and_quality: bool) -> Self {
        Self {
            triangulation_method: TriangulationMethod::from_use_hartley(use_hartley),
            emit_color_and_quality,
            ..Self::default()
        }
    }
}
