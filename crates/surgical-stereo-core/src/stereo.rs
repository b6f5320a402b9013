//! Calibrated stereo geometry.

use crate::maths::skew;
use crate::{CameraIntrinsics, GeometryError, GeometryOperand};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Maximum deviation of `R^T R` from identity accepted as orthonormal.
///
/// Calibration files are usually written with six decimals, so a tight
/// tolerance would reject real rigs.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Rigid transform from the left camera frame to the right one:
/// `X_right = R * X_left + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExtrinsics", into = "RawExtrinsics")]
pub struct StereoExtrinsics {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RawExtrinsics {
    rotation: [[f64; 3]; 3],
    translation: [f64; 3],
}

impl StereoExtrinsics {
    /// Validate and build. A zero translation is accepted here; stages that
    /// need a baseline check it themselves.
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Result<Self, GeometryError> {
        if rotation.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite(GeometryOperand::Rotation));
        }
        if translation.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite(GeometryOperand::Translation));
        }
        let error = (rotation.transpose() * rotation - Matrix3::identity()).abs().max();
        let det = rotation.determinant();
        if error > ORTHONORMAL_TOLERANCE || det <= 0.0 {
            return Err(GeometryError::NotOrthonormal { det, error });
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    /// Split a 4x4 homogeneous left-to-right transform.
    pub fn from_homogeneous(m: &Matrix4<f64>) -> Result<Self, GeometryError> {
        let bottom = [m[(3, 0)], m[(3, 1)], m[(3, 2)], m[(3, 3)]];
        if bottom != [0.0, 0.0, 0.0, 1.0] {
            return Err(GeometryError::Shape {
                operand: GeometryOperand::Extrinsics,
                expected: "homogeneous 4x4 with last row [0 0 0 1]",
                got: format!("last row {bottom:?}"),
            });
        }
        let rotation = m.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self::new(rotation, translation)
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    /// Right camera centre expressed in the left frame, `-R^T t`.
    pub fn right_center_in_left(&self) -> Vector3<f64> {
        -(self.rotation.transpose() * self.translation)
    }

    /// Essential matrix `[t]x R`, so that `x_r^T E x_l = 0` for normalized points.
    pub fn essential(&self) -> Matrix3<f64> {
        skew(&self.translation) * self.rotation
    }

    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

impl TryFrom<RawExtrinsics> for StereoExtrinsics {
    type Error = GeometryError;

    fn try_from(raw: RawExtrinsics) -> Result<Self, Self::Error> {
        let rotation = Matrix3::from_row_slice(&raw.rotation.concat());
        Self::new(rotation, Vector3::from(raw.translation))
    }
}

impl From<StereoExtrinsics> for RawExtrinsics {
    fn from(e: StereoExtrinsics) -> Self {
        let r = e.rotation;
        Self {
            rotation: [
                [r[(0, 0)], r[(0, 1)], r[(0, 2)]],
                [r[(1, 0)], r[(1, 1)], r[(1, 2)]],
                [r[(2, 0)], r[(2, 1)], r[(2, 2)]],
            ],
            translation: [e.translation.x, e.translation.y, e.translation.z],
        }
    }
}

/// Both cameras plus the transform between them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoRig {
    pub left: CameraIntrinsics,
    pub right: CameraIntrinsics,
    pub extrinsics: StereoExtrinsics,
}

impl StereoRig {
    pub fn new(
        left: CameraIntrinsics,
        right: CameraIntrinsics,
        extrinsics: StereoExtrinsics,
    ) -> Self {
        Self {
            left,
            right,
            extrinsics,
        }
    }

    /// Build from raw matrices, tagging intrinsics errors with their side.
    pub fn from_matrices(
        left_k: Matrix3<f64>,
        right_k: Matrix3<f64>,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
    ) -> Result<Self, GeometryError> {
        let left = CameraIntrinsics::new(left_k)
            .map_err(|e| e.for_operand(GeometryOperand::LeftIntrinsics))?;
        let right = CameraIntrinsics::new(right_k)
            .map_err(|e| e.for_operand(GeometryOperand::RightIntrinsics))?;
        let extrinsics = StereoExtrinsics::new(rotation, translation)?;
        Ok(Self::new(left, right, extrinsics))
    }

    /// Fundamental matrix: `p_r^T F p_l = 0` in pixels.
    pub fn fundamental(&self) -> Matrix3<f64> {
        self.right.inverse().transpose() * self.extrinsics.essential() * self.left.inverse()
    }

    /// Fail with [`GeometryError::ZeroBaseline`] when the cameras coincide.
    pub fn require_baseline(&self, min_norm: f64) -> Result<(), GeometryError> {
        let norm = self.extrinsics.baseline();
        if norm < min_norm {
            return Err(GeometryError::ZeroBaseline { norm });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Rotation3};

    fn rig() -> StereoRig {
        let r = Rotation3::from_euler_angles(0.01, -0.03, 0.002).into_inner();
        StereoRig::from_matrices(
            Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0),
            Matrix3::new(820.0, 0.0, 330.0, 0.0, 815.0, 235.0, 0.0, 0.0, 1.0),
            r,
            Vector3::new(-5.0, 0.1, 0.3),
        )
        .unwrap()
    }

    #[test]
    fn rejects_reflection_and_scaling() {
        let mut r = Matrix3::identity();
        r[(2, 2)] = -1.0;
        assert!(matches!(
            StereoExtrinsics::new(r, Vector3::x()),
            Err(GeometryError::NotOrthonormal { .. })
        ));
        assert!(StereoExtrinsics::new(Matrix3::identity() * 1.01, Vector3::x()).is_err());
        assert!(StereoExtrinsics::new(Matrix3::identity(), Vector3::zeros()).is_ok());
    }

    #[test]
    fn singular_right_intrinsics_are_named() {
        let err = StereoRig::from_matrices(
            Matrix3::identity(),
            Matrix3::zeros(),
            Matrix3::identity(),
            Vector3::x(),
        )
        .unwrap_err();
        assert_eq!(err.operand(), Some(GeometryOperand::RightIntrinsics));
    }

    #[test]
    fn fundamental_satisfies_epipolar_constraint() {
        let rig = rig();
        let e = &rig.extrinsics;
        let x_left = Vector3::new(12.0, -8.0, 140.0);
        let x_right = e.rotation() * x_left + e.translation();
        let pl = rig.left.project(Point2::new(x_left.x / x_left.z, x_left.y / x_left.z));
        let pr = rig
            .right
            .project(Point2::new(x_right.x / x_right.z, x_right.y / x_right.z));
        let residual = Vector3::new(pr.x, pr.y, 1.0).dot(&(rig.fundamental() * Vector3::new(pl.x, pl.y, 1.0)));
        assert!(residual.abs() < 1e-9, "residual {residual}");
    }

    #[test]
    fn homogeneous_round_trip_and_centre() {
        let e = rig().extrinsics;
        let back = StereoExtrinsics::from_homogeneous(&e.to_homogeneous()).unwrap();
        assert_eq!(back, e);
        let c = e.right_center_in_left();
        let in_right = e.rotation() * c + e.translation();
        assert!(in_right.norm() < 1e-12);
    }
}
