use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Planar projective map `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Sign of the Jacobian at `p`: negative when the map mirrors locally.
    pub fn orientation_at(&self, p: Point2<f64>) -> f64 {
        let w = (self.h * Vector3::new(p.x, p.y, 1.0))[2];
        self.h.determinant() * w.signum()
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

// translate to centroid, scale so mean distance = sqrt(2)
fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let (cx, cy) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (cx / n, cy / n);
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn denormalize(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Least-squares `dst ~ H * src` from four or more correspondences
/// (normalized DLT).
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f64>; 4] = src.try_into().ok()?;
        let d: &[Point2<f64>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (r, tr) = normalize_points(src);
    let (i, ti) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let (x, y) = (r[k].x, r[k].y);
        let (u, v) = (i[k].x, i[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // null vector of A^T A is the homography; the 9x9 normal matrix keeps
    // the SVD small for large point sets
    let ata = a.transpose() * &a;
    let svd = ata.svd(false, true);
    let vt = svd.v_t?;
    let h = vt.row(vt.nrows().checked_sub(1)?);
    let hn = Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    denormalize(hn, tr, ti)
}

/// Exact `dst ~ H * src` through four correspondences in consistent order.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    // h33 = 1; per point:
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );
    denormalize(hn, t_src, t_dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ))
    }

    #[test]
    fn four_points_recover_h() {
        let gt = ground_truth();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(180.0, 0.0),
            Point2::new(180.0, 130.0),
            Point2::new(0.0, 130.0),
        ];
        let dst = src.map(|p| gt.apply(p));
        let h = homography_from_4pt(&src, &dst).expect("recoverable");
        for p in [Point2::new(60.0, 40.0), Point2::new(150.0, 120.0)] {
            assert_close(h.apply(p), gt.apply(p), 1e-6);
        }
        assert!(h.orientation_at(Point2::new(90.0, 65.0)) > 0.0);
    }

    #[test]
    fn overdetermined_dlt_and_inverse() {
        let gt = ground_truth();
        let src: Vec<Point2<f64>> = (0..4)
            .flat_map(|y| (0..5).map(move |x| Point2::new(x as f64 * 40.0, y as f64 * 50.0)))
            .collect();
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| gt.apply(p)).collect();
        let h = estimate_homography(&src, &dst).expect("estimate");
        let inv = h.inverse().expect("invertible");
        for p in [Point2::new(10.0, 10.0), Point2::new(95.0, 120.0)] {
            assert_close(h.apply(p), gt.apply(p), 1e-6);
            assert_close(inv.apply(h.apply(p)), p, 1e-6);
        }
    }

    #[test]
    fn mirrored_map_has_negative_orientation() {
        let flip = Homography::new(Matrix3::new(-1.0, 0.0, 100.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0));
        assert!(flip.orientation_at(Point2::new(3.0, 4.0)) < 0.0);
    }

    #[test]
    fn mismatched_input_lengths_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
    }
}
