//! Triangulation of matched stereo points.
//!
//! Two interchangeable methods share one entry point:
//! - [`TriangulationMethod::Midpoint`]: midpoint of the shortest segment
//!   between the two back-projected rays. Cheap and closed form.
//! - [`TriangulationMethod::Hartley`]: Hartley–Sturm optimal correction onto
//!   the epipolar constraint followed by iterative linear triangulation.
//!
//! Points are returned in the left camera frame, one per input
//! correspondence and in input order. A correspondence that cannot be
//! triangulated (parallel rays, zero baseline, non-finite input) yields a
//! per-point [`Degeneracy`] instead of failing the batch.
//!
//! ```
//! use nalgebra::{Matrix3, Point2, Vector3};
//! use surgical_stereo_core::StereoRig;
//! use surgical_stereo_triangulate::{triangulate, Correspondence, TriangulationMethod};
//!
//! let k = Matrix3::new(1000.0, 0.0, 640.0, 0.0, 1000.0, 360.0, 0.0, 0.0, 1.0);
//! let rig = StereoRig::from_matrices(k, k, Matrix3::identity(), Vector3::new(-5.0, 0.0, 0.0))?;
//! let pairs = [Correspondence::new(Point2::new(700.0, 400.0), Point2::new(650.0, 400.0))];
//! let points = triangulate(&pairs, &rig, TriangulationMethod::Hartley)?;
//! assert_eq!(points.len(), 1);
//! # Ok::<(), surgical_stereo_core::GeometryError>(())
//! ```

mod hartley;
mod midpoint;
mod polynomial;

use log::debug;
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};
use surgical_stereo_core::{Degeneracy, GeometryError, StereoRig};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

pub use surgical_stereo_core::maths::rms_between_corresponding_points;

/// Baselines shorter than this are treated as zero.
pub const MIN_BASELINE: f64 = 1e-12;

/// Which triangulation algorithm to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriangulationMethod {
    #[default]
    Midpoint,
    Hartley,
}

impl TriangulationMethod {
    /// Map the boolean switch used by older call sites.
    pub fn from_use_hartley(use_hartley: bool) -> Self {
        if use_hartley {
            Self::Hartley
        } else {
            Self::Midpoint
        }
    }
}

/// A left image point and the right image point of the same scene point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub left: Point2<f64>,
    pub right: Point2<f64>,
}

impl Correspondence {
    pub fn new(left: Point2<f64>, right: Point2<f64>) -> Self {
        Self { left, right }
    }

    /// From a `[x_left, y_left, x_right, y_right]` row.
    pub fn from_row(row: [f64; 4]) -> Self {
        Self::new(Point2::new(row[0], row[1]), Point2::new(row[2], row[3]))
    }

    pub fn to_row(&self) -> [f64; 4] {
        [self.left.x, self.left.y, self.right.x, self.right.y]
    }

    fn is_finite(&self) -> bool {
        self.to_row().iter().all(|v| v.is_finite())
    }
}

/// One result per input correspondence, in input order.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangulatedPoints {
    points: Vec<Result<Point3<f64>, Degeneracy>>,
}

impl TriangulatedPoints {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_slice(&self) -> &[Result<Point3<f64>, Degeneracy>] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Result<Point3<f64>, Degeneracy>> {
        self.points.get(index).copied()
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_ok()).count()
    }

    /// `(index, point)` for every successfully triangulated correspondence.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, Point3<f64>)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.ok().map(|p| (i, p)))
    }

    /// `[x, y, z]` rows; degenerate points become `[NaN, NaN, NaN]`.
    pub fn to_rows(&self) -> Vec<[f64; 3]> {
        self.points
            .iter()
            .map(|p| match p {
                Ok(p) => [p.x, p.y, p.z],
                Err(_) => [f64::NAN; 3],
            })
            .collect()
    }

    pub fn into_inner(self) -> Vec<Result<Point3<f64>, Degeneracy>> {
        self.points
    }
}

/// A stereo rig bound to a triangulation method.
#[derive(Clone, Debug)]
pub struct Triangulator {
    rig: StereoRig,
    method: TriangulationMethod,
    essential: Matrix3<f64>,
}

impl Triangulator {
    pub fn new(rig: StereoRig, method: TriangulationMethod) -> Self {
        let essential = rig.extrinsics.essential();
        Self {
            rig,
            method,
            essential,
        }
    }

    pub fn rig(&self) -> &StereoRig {
        &self.rig
    }

    pub fn method(&self) -> TriangulationMethod {
        self.method
    }

    /// Triangulate one correspondence.
    pub fn point(&self, c: &Correspondence) -> Result<Point3<f64>, Degeneracy> {
        if !c.is_finite() {
            return Err(Degeneracy::NonFiniteInput);
        }
        if self.rig.extrinsics.baseline() < MIN_BASELINE {
            return Err(Degeneracy::ZeroBaseline);
        }
        if !self.has_parallax(c) {
            return Err(Degeneracy::ParallelRays);
        }
        match self.method {
            TriangulationMethod::Midpoint => midpoint::triangulate_midpoint(&self.rig, c.left, c.right),
            TriangulationMethod::Hartley => {
                let x1 = self.rig.left.normalize(c.left);
                let x2 = self.rig.right.normalize(c.right);
                let (x1, x2) = hartley::correct_to_epipolar(&self.essential, x1, x2);
                hartley::iterative_linear(&self.rig.extrinsics, x1, x2)
            }
        }
    }

    // Both methods reject the same correspondences so point validity does
    // not depend on the method.
    fn has_parallax(&self, c: &Correspondence) -> bool {
        let u = self.rig.left.ray(c.left).normalize();
        let v = self.rig.extrinsics.rotation().transpose() * self.rig.right.ray(c.right).normalize();
        u.cross(&v).norm() > 1e-9
    }

    /// Triangulate every correspondence, preserving order.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, pairs), fields(count = pairs.len(), method = ?self.method))
    )]
    pub fn triangulate(&self, pairs: &[Correspondence]) -> Result<TriangulatedPoints, GeometryError> {
        if pairs.is_empty() {
            return Err(GeometryError::NoCorrespondences);
        }

        #[cfg(feature = "rayon")]
        let points: Vec<_> = pairs.par_iter().map(|c| self.point(c)).collect();
        #[cfg(not(feature = "rayon"))]
        let points: Vec<_> = pairs.iter().map(|c| self.point(c)).collect();

        let out = TriangulatedPoints { points };
        let degenerate = out.len() - out.valid_count();
        if degenerate > 0 {
            debug!(
                "{:?}: {} of {} correspondences degenerate",
                self.method,
                degenerate,
                out.len()
            );
        }
        Ok(out)
    }
}

/// Triangulate `pairs` with `method`.
///
/// Fails only for structural problems (no correspondences); numerical
/// problems are reported per point.
pub fn triangulate(
    pairs: &[Correspondence],
    rig: &StereoRig,
    method: TriangulationMethod,
) -> Result<TriangulatedPoints, GeometryError> {
    Triangulator::new(*rig, method).triangulate(pairs)
}

/// Triangulate parallel slices of left and right points.
pub fn triangulate_slices(
    left: &[Point2<f64>],
    right: &[Point2<f64>],
    rig: &StereoRig,
    method: TriangulationMethod,
) -> Result<TriangulatedPoints, GeometryError> {
    if left.len() != right.len() {
        return Err(GeometryError::CountMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    let pairs: Vec<Correspondence> = left
        .iter()
        .zip(right)
        .map(|(&l, &r)| Correspondence::new(l, r))
        .collect();
    triangulate(&pairs, rig, method)
}
