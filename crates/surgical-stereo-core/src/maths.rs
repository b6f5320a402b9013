//! Small 3D helpers shared by triangulation and evaluation code.

use crate::GeometryError;
use nalgebra::{Matrix3, Point3, Vector3};

/// Cross-product matrix: `skew(a) * b == a.cross(&b)`.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Closest points on two lines `p0 + s*u` and `q0 + t*v`.
///
/// Returns `None` when the lines are parallel, or the directions are zero.
pub fn closest_points_between_lines(
    p0: &Point3<f64>,
    u: &Vector3<f64>,
    q0: &Point3<f64>,
    v: &Vector3<f64>,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let w0 = p0 - q0;
    let a = u.dot(u);
    let b = u.dot(v);
    let c = v.dot(v);
    let d = u.dot(&w0);
    let e = v.dot(&w0);
    let denom = a * c - b * b;
    // relative test so scaled direction vectors behave the same
    if denom.is_nan() || denom <= 1e-12 * a * c {
        return None;
    }
    let sc = (b * e - c * d) / denom;
    let tc = (a * e - b * d) / denom;
    Some((p0 + u * sc, q0 + v * tc))
}

/// Perpendicular distance from `x` to the line through `a` and `b`.
pub fn distance_to_line(x: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let dir = b - a;
    let len = dir.norm();
    if len == 0.0 {
        return (x - a).norm();
    }
    (x - a).cross(&dir).norm() / len
}

/// Root-mean-square Euclidean distance between paired points.
pub fn rms_between_corresponding_points(
    a: &[Point3<f64>],
    b: &[Point3<f64>],
) -> Result<f64, GeometryError> {
    if a.len() != b.len() {
        return Err(GeometryError::CountMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(GeometryError::NoCorrespondences);
    }
    let sum: f64 = a.iter().zip(b).map(|(p, q)| (p - q).norm_squared()).sum();
    Ok((sum / a.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skew_matches_cross() {
        let a = Vector3::new(1.0, -2.0, 0.5);
        let b = Vector3::new(0.3, 4.0, -1.0);
        assert!((skew(&a) * b - a.cross(&b)).norm() < 1e-12);
    }

    #[test]
    fn closest_points_of_skew_lines() {
        let (p, q) = closest_points_between_lines(
            &Point3::origin(),
            &Vector3::x(),
            &Point3::new(0.0, 0.0, 2.0),
            &Vector3::y(),
        )
        .unwrap();
        assert!((p - Point3::origin()).norm() < 1e-12);
        assert!((q - Point3::new(0.0, 0.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn parallel_lines_have_no_closest_pair() {
        let res = closest_points_between_lines(
            &Point3::origin(),
            &Vector3::z(),
            &Point3::new(1.0, 0.0, 0.0),
            &(Vector3::z() * 3.0),
        );
        assert!(res.is_none());
        let d = distance_to_line(
            &Point3::new(1.0, 0.0, 5.0),
            &Point3::origin(),
            &Point3::new(0.0, 0.0, 1.0),
        );
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rms_of_known_offsets() {
        let a = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)];
        let b = [Point3::new(3.0, 0.0, 4.0), Point3::new(1.0, 1.0, 1.0)];
        let rms = rms_between_corresponding_points(&a, &b).unwrap();
        assert!((rms - (25.0_f64 / 2.0).sqrt()).abs() < 1e-12);
        assert!(rms_between_corresponding_points(&a, &b[..1]).is_err());
        assert!(rms_between_corresponding_points(&[], &[]).is_err());
    }
}
