//! Midpoint of the common perpendicular between the two viewing rays.

use nalgebra::{Point2, Point3};
use surgical_stereo_core::maths::closest_points_between_lines;
use surgical_stereo_core::{Degeneracy, StereoRig};

/// Triangulate in the left camera frame.
///
/// The left ray starts at the origin; the right ray starts at the right
/// camera centre `-R^T t` with direction `R^T K_r^-1 p_r`.
pub(crate) fn triangulate_midpoint(
    rig: &StereoRig,
    left: Point2<f64>,
    right: Point2<f64>,
) -> Result<Point3<f64>, Degeneracy> {
    let e = &rig.extrinsics;
    let u = rig.left.ray(left).normalize();
    let v = e.rotation().transpose() * rig.right.ray(right).normalize();
    let right_center = Point3::from(e.right_center_in_left());

    let (p, q) = closest_points_between_lines(&Point3::origin(), &u, &right_center, &v)
        .ok_or(Degeneracy::ParallelRays)?;
    Ok(nalgebra::center(&p, &q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};

    fn rig() -> StereoRig {
        StereoRig::from_matrices(
            Matrix3::new(1000.0, 0.0, 640.0, 0.0, 1000.0, 360.0, 0.0, 0.0, 1.0),
            Matrix3::new(1000.0, 0.0, 640.0, 0.0, 1000.0, 360.0, 0.0, 0.0, 1.0),
            Matrix3::identity(),
            Vector3::new(-5.0, 0.0, 0.0),
        )
        .unwrap()
    }

    #[test]
    fn rectified_pair_gives_depth_from_disparity() {
        // disparity 50 px, f 1000, baseline 5 -> depth 100
        let p = triangulate_midpoint(&rig(), Point2::new(700.0, 400.0), Point2::new(650.0, 400.0))
            .unwrap();
        assert!((p.z - 100.0).abs() < 1e-9);
        assert!((p.x - 6.0).abs() < 1e-9);
        assert!((p.y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn zero_disparity_is_parallel() {
        let res = triangulate_midpoint(&rig(), Point2::new(700.0, 400.0), Point2::new(700.0, 400.0));
        assert_eq!(res, Err(Degeneracy::ParallelRays));
    }
}
