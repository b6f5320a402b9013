//! Pinhole camera model: intrinsic matrix plus OpenCV-ordered lens distortion.

use crate::{GeometryError, GeometryOperand};
use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Validated 3x3 intrinsic matrix with its cached inverse.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct CameraIntrinsics {
    k: Matrix3<f64>,
    k_inv: Matrix3<f64>,
}

impl CameraIntrinsics {
    pub fn new(k: Matrix3<f64>) -> Result<Self, GeometryError> {
        if k.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite(GeometryOperand::Intrinsics));
        }
        if k.determinant().abs() <= 1e-12 {
            return Err(GeometryError::Singular(GeometryOperand::Intrinsics));
        }
        let k_inv = k
            .try_inverse()
            .ok_or(GeometryError::Singular(GeometryOperand::Intrinsics))?;
        Ok(Self { k, k_inv })
    }

    /// Build `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub fn from_params(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, GeometryError> {
        Self::new(Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0))
    }

    /// Build from nine row-major values.
    pub fn from_row_slice(values: &[f64]) -> Result<Self, GeometryError> {
        if values.len() != 9 {
            return Err(GeometryError::Shape {
                operand: GeometryOperand::Intrinsics,
                expected: "3x3",
                got: format!("{} values", values.len()),
            });
        }
        Self::new(Matrix3::from_row_slice(values))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.k
    }

    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.k_inv
    }

    pub fn fx(&self) -> f64 {
        self.k[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.k[(1, 1)]
    }

    /// Back-projected ray `K^-1 [u v 1]^T` (not unit length).
    #[inline]
    pub fn ray(&self, pixel: Point2<f64>) -> Vector3<f64> {
        self.k_inv * Vector3::new(pixel.x, pixel.y, 1.0)
    }

    /// Pixel to normalized image coordinates.
    #[inline]
    pub fn normalize(&self, pixel: Point2<f64>) -> Point2<f64> {
        let r = self.ray(pixel);
        Point2::new(r.x / r.z, r.y / r.z)
    }

    /// Normalized image coordinates to pixel.
    #[inline]
    pub fn project(&self, normalized: Point2<f64>) -> Point2<f64> {
        let v = self.k * Vector3::new(normalized.x, normalized.y, 1.0);
        Point2::new(v.x / v.z, v.y / v.z)
    }
}

impl TryFrom<[[f64; 3]; 3]> for CameraIntrinsics {
    type Error = GeometryError;

    fn try_from(rows: [[f64; 3]; 3]) -> Result<Self, Self::Error> {
        Self::from_row_slice(&rows.concat())
    }
}

impl From<CameraIntrinsics> for [[f64; 3]; 3] {
    fn from(k: CameraIntrinsics) -> Self {
        let m = k.k;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

/// Fixed-point settings for inverting the distortion model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    pub max_iters: usize,
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

/// Lens distortion in OpenCV order `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
///
/// Zero coefficients mean an ideal pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Distortion {
    coeffs: [f64; 8],
    len: usize,
}

impl Default for Distortion {
    fn default() -> Self {
        Self::none()
    }
}

impl Distortion {
    pub fn none() -> Self {
        Self {
            coeffs: [0.0; 8],
            len: 0,
        }
    }

    /// Accepts 0, 4, 5 or 8 coefficients.
    pub fn new(coeffs: &[f64]) -> Result<Self, GeometryError> {
        if !matches!(coeffs.len(), 0 | 4 | 5 | 8) {
            return Err(GeometryError::Shape {
                operand: GeometryOperand::Distortion,
                expected: "0, 4, 5 or 8 coefficients",
                got: format!("{} coefficients", coeffs.len()),
            });
        }
        if coeffs.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite(GeometryOperand::Distortion));
        }
        let mut out = Self::none();
        out.coeffs[..coeffs.len()].copy_from_slice(coeffs);
        out.len = coeffs.len();
        Ok(out)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs[..self.len]
    }

    pub fn is_identity(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0.0)
    }

    /// Radial numerator/denominator and tangential offset at `(x, y)`.
    #[inline]
    fn terms(&self, x: f64, y: f64) -> (f64, f64, f64, f64) {
        let [k1, k2, p1, p2, k3, k4, k5, k6] = self.coeffs;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
        let den = 1.0 + k4 * r2 + k5 * r4 + k6 * r6;
        let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (num, den, dx, dy)
    }

    /// Ideal normalized point to distorted normalized point.
    pub fn distort_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        if self.is_identity() {
            return p;
        }
        let (num, den, dx, dy) = self.terms(p.x, p.y);
        let radial = num / den;
        Point2::new(p.x * radial + dx, p.y * radial + dy)
    }

    /// Distorted normalized point to ideal normalized point.
    ///
    /// Returns `None` when the iteration diverges.
    pub fn undistort_normalized(&self, p: Point2<f64>, cfg: UndistortConfig) -> Option<Point2<f64>> {
        if self.is_identity() {
            return Some(p);
        }
        let (mut x, mut y) = (p.x, p.y);
        for _ in 0..cfg.max_iters {
            let (num, den, dx, dy) = self.terms(x, y);
            let inv = den / num;
            let nx = (p.x - dx) * inv;
            let ny = (p.y - dy) * inv;
            if !nx.is_finite() || !ny.is_finite() {
                return None;
            }
            let step = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
            x = nx;
            y = ny;
            if step < cfg.eps {
                break;
            }
        }
        Some(Point2::new(x, y))
    }

    /// Distorted pixel to the pixel an ideal pinhole camera would observe.
    pub fn undistort_pixel(&self, k: &CameraIntrinsics, pixel: Point2<f64>) -> Option<Point2<f64>> {
        self.undistort_pixel_with(k, pixel, UndistortConfig::default())
    }

    pub fn undistort_pixel_with(
        &self,
        k: &CameraIntrinsics,
        pixel: Point2<f64>,
        cfg: UndistortConfig,
    ) -> Option<Point2<f64>> {
        let n = self.undistort_normalized(k.normalize(pixel), cfg)?;
        Some(k.project(n))
    }

    /// Ideal pixel to distorted pixel.
    pub fn distort_pixel(&self, k: &CameraIntrinsics, pixel: Point2<f64>) -> Point2<f64> {
        k.project(self.distort_normalized(k.normalize(pixel)))
    }
}

impl TryFrom<Vec<f64>> for Distortion {
    type Error = GeometryError;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(&v)
    }
}

impl From<Distortion> for Vec<f64> {
    fn from(d: Distortion) -> Self {
        d.coefficients().to_vec()
    }
}
