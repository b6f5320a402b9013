//! Optimal triangulation (Hartley & Sturm, 1997).
//!
//! The observed pair is first moved the minimum distance needed to satisfy
//! the epipolar constraint exactly, then triangulated with the iterative
//! weighted linear method. Everything runs in normalized camera
//! coordinates, where the essential matrix plays the role of `F`.

use crate::polynomial;
use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, SMatrix, SVector, Vector3};
use surgical_stereo_core::{Degeneracy, StereoExtrinsics};

const MAX_ITERATIONS: usize = 10;
const WEIGHT_EPS: f64 = 1e-11;

/// Closest pair `(x1', x2')` to `(x1, x2)` with `x2'^T E x1' = 0`.
///
/// Returns the input unchanged when a point sits on its epipole, where the
/// correction is undefined.
pub(crate) fn correct_to_epipolar(
    essential: &Matrix3<f64>,
    x1: Point2<f64>,
    x2: Point2<f64>,
) -> (Point2<f64>, Point2<f64>) {
    // move both observations to the origin
    let t1_inv = Matrix3::new(1.0, 0.0, x1.x, 0.0, 1.0, x1.y, 0.0, 0.0, 1.0);
    let t2_inv = Matrix3::new(1.0, 0.0, x2.x, 0.0, 1.0, x2.y, 0.0, 0.0, 1.0);
    let f = t2_inv.transpose() * essential * t1_inv;

    let (Some(e1), Some(e2)) = (null_vector(&f), null_vector(&f.transpose())) else {
        return (x1, x2);
    };
    let (Some(e1), Some(e2)) = (unit_xy(e1), unit_xy(e2)) else {
        return (x1, x2);
    };

    // rotate the epipoles onto the x axis: e = (1, 0, f)
    let r1 = Matrix3::new(e1.x, e1.y, 0.0, -e1.y, e1.x, 0.0, 0.0, 0.0, 1.0);
    let r2 = Matrix3::new(e2.x, e2.y, 0.0, -e2.y, e2.x, 0.0, 0.0, 0.0, 1.0);
    let f = r2 * f * r1.transpose();

    let (f1, f2) = (e1.z, e2.z);
    let (a, b, c, d) = (f[(1, 1)], f[(1, 2)], f[(2, 1)], f[(2, 2)]);

    let cost = |t: f64| {
        let l = a * t + b;
        let r = c * t + d;
        t * t / (1.0 + f1 * f1 * t * t) + r * r / (l * l + f2 * f2 * r * r)
    };

    // g(t) = t((at+b)^2 + f2^2(ct+d)^2)^2 - (ad-bc)(1+f1^2 t^2)^2 (at+b)(ct+d)
    let p_ab = [b, a];
    let p_cd = [d, c];
    let denom = polynomial::add(
        &polynomial::mul(&p_ab, &p_ab),
        &polynomial::scale(&polynomial::mul(&p_cd, &p_cd), f2 * f2),
    );
    let lhs = polynomial::mul(&[0.0, 1.0], &polynomial::mul(&denom, &denom));
    let sq = [1.0, 0.0, f1 * f1];
    let rhs = polynomial::scale(
        &polynomial::mul(&polynomial::mul(&sq, &sq), &polynomial::mul(&p_ab, &p_cd)),
        a * d - b * c,
    );
    let g = polynomial::add(&lhs, &polynomial::scale(&rhs, -1.0));

    let mut best: Option<(f64, f64)> = None;
    for t in polynomial::real_parts_of_roots(&g) {
        let s = cost(t);
        if s.is_finite() && best.is_none_or(|(bs, _)| s < bs) {
            best = Some((s, t));
        }
    }

    // asymptotic value for t -> infinity
    let s_inf = 1.0 / (f1 * f1) + c * c / (a * a + f2 * f2 * c * c);
    let (l1, l2) = match best {
        Some((s, t)) if !(s_inf.is_finite() && s_inf < s) => (
            Vector3::new(t * f1, 1.0, -t),
            Vector3::new(-f2 * (c * t + d), a * t + b, c * t + d),
        ),
        _ if s_inf.is_finite() => (Vector3::new(f1, 0.0, -1.0), Vector3::new(-f2 * c, a, c)),
        _ => return (x1, x2),
    };

    let h1 = t1_inv * r1.transpose() * closest_to_origin(&l1);
    let h2 = t2_inv * r2.transpose() * closest_to_origin(&l2);
    if h1.z.abs() < f64::EPSILON || h2.z.abs() < f64::EPSILON {
        return (x1, x2);
    }
    (
        Point2::new(h1.x / h1.z, h1.y / h1.z),
        Point2::new(h2.x / h2.z, h2.y / h2.z),
    )
}

/// Point on the line `(l, m, n)` nearest the origin.
fn closest_to_origin(l: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-l.x * l.z, -l.y * l.z, l.x * l.x + l.y * l.y)
}

fn unit_xy(e: Vector3<f64>) -> Option<Vector3<f64>> {
    let s = e.x.hypot(e.y);
    (s > 1e-15).then(|| e / s)
}

fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let svd = m.svd(false, true);
    let vt = svd.v_t?;
    let i = svd.singular_values.imin();
    Some(vt.row(i).transpose())
}

/// Iterative weighted linear triangulation with `P_l = [I|0]`, `P_r = [R|t]`.
///
/// Each equation is divided by the current depth estimate in its camera, so
/// the algebraic residual converges to the reprojection error.
pub(crate) fn iterative_linear(
    extrinsics: &StereoExtrinsics,
    x1: Point2<f64>,
    x2: Point2<f64>,
) -> Result<Point3<f64>, Degeneracy> {
    let p1 = Matrix3x4::<f64>::identity();
    let mut p2 = Matrix3x4::<f64>::zeros();
    p2.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(extrinsics.rotation());
    p2.set_column(3, extrinsics.translation());

    let observations = [(x1.x, 0, 0), (x1.y, 1, 0), (x2.x, 0, 1), (x2.y, 1, 1)];
    let cameras = [&p1, &p2];

    let mut weights = [1.0_f64, 1.0];
    let mut x = Vector3::zeros();
    for _ in 0..MAX_ITERATIONS {
        let mut a = SMatrix::<f64, 4, 3>::zeros();
        let mut b = SVector::<f64, 4>::zeros();
        for (row, &(u, r, cam)) in observations.iter().enumerate() {
            let p = cameras[cam];
            let w = weights[cam];
            for c in 0..3 {
                a[(row, c)] = (u * p[(2, c)] - p[(r, c)]) / w;
            }
            b[row] = -(u * p[(2, 3)] - p[(r, 3)]) / w;
        }

        let svd = a.svd(true, true);
        let s_max = svd.singular_values.max();
        let s_min = svd.singular_values.min();
        if !(s_max.is_finite() && s_min > 1e-12 * s_max) {
            return Err(Degeneracy::SingularSystem);
        }
        x = svd
            .solve(&b, 0.0)
            .map_err(|_| Degeneracy::SingularSystem)?;

        let h = x.push(1.0);
        let depth1 = (p1 * h).z;
        let depth2 = (p2 * h).z;
        let converged =
            (weights[0] - depth1).abs() <= WEIGHT_EPS && (weights[1] - depth2).abs() <= WEIGHT_EPS;
        if converged {
            break;
        }
        if depth1.abs() < f64::EPSILON || depth2.abs() < f64::EPSILON {
            return Err(Degeneracy::SingularSystem);
        }
        weights = [depth1, depth2];
    }

    if x.iter().all(|v| v.is_finite()) {
        Ok(Point3::from(x))
    } else {
        Err(Degeneracy::SingularSystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    fn extrinsics() -> StereoExtrinsics {
        let r = Rotation3::from_euler_angles(0.02, -0.05, 0.01).into_inner();
        StereoExtrinsics::new(r, Vector3::new(-5.0, 0.2, 0.4)).unwrap()
    }

    fn project(e: &StereoExtrinsics, x: &Vector3<f64>) -> (Point2<f64>, Point2<f64>) {
        let xr = e.rotation() * x + e.translation();
        (
            Point2::new(x.x / x.z, x.y / x.z),
            Point2::new(xr.x / xr.z, xr.y / xr.z),
        )
    }

    #[test]
    fn exact_pair_is_left_unchanged() {
        let e = extrinsics();
        let (p1, p2) = project(&e, &Vector3::new(3.0, -2.0, 90.0));
        let (c1, c2) = correct_to_epipolar(&e.essential(), p1, p2);
        assert!((c1 - p1).norm() < 1e-9);
        assert!((c2 - p2).norm() < 1e-9);
    }

    #[test]
    fn correction_satisfies_epipolar_constraint() {
        let e = extrinsics();
        let ess = e.essential();
        let (p1, p2) = project(&e, &Vector3::new(-8.0, 4.0, 120.0));
        let noisy1 = Point2::new(p1.x + 2e-4, p1.y - 1e-4);
        let noisy2 = Point2::new(p2.x - 1e-4, p2.y + 3e-4);
        let (c1, c2) = correct_to_epipolar(&ess, noisy1, noisy2);
        let residual = c2.to_homogeneous().dot(&(ess * c1.to_homogeneous()));
        assert!(residual.abs() < 1e-12, "residual {residual}");
        // the correction never moves points further than the raw residual allows
        let moved = (c1 - noisy1).norm_squared() + (c2 - noisy2).norm_squared();
        assert!(moved < 2e-7, "moved {moved}");
    }

    #[test]
    fn iterative_linear_recovers_point() {
        let e = extrinsics();
        let x = Vector3::new(12.0, -6.0, 150.0);
        let (p1, p2) = project(&e, &x);
        let got = iterative_linear(&e, p1, p2).unwrap();
        assert!((got.coords - x).norm() < 1e-6);
    }
}
