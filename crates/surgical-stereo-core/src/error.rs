//! Error taxonomy shared by every stage.
//!
//! Structural problems with the inputs ([`ImageError`], [`GeometryError`])
//! fail a whole call. Numerical trouble with a single correspondence is a
//! [`Degeneracy`] and is reported per point.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Invalid image input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is empty (width={width}, height={height})")]
    Empty { width: usize, height: usize },
    #[error("unsupported channel count (expected {expected}, got {got})")]
    Channels { expected: &'static str, got: usize },
    #[error("invalid image buffer length (expected {expected} bytes, got {got})")]
    BufferLength { expected: usize, got: usize },
    #[error("left/right image sizes differ ({}x{} vs {}x{})", left.0, left.1, right.0, right.1)]
    SizeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
}

/// The operand a [`GeometryError`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryOperand {
    LeftIntrinsics,
    RightIntrinsics,
    Intrinsics,
    Distortion,
    Rotation,
    Translation,
    Extrinsics,
    Correspondences,
}

impl fmt::Display for GeometryOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LeftIntrinsics => "left intrinsics",
            Self::RightIntrinsics => "right intrinsics",
            Self::Intrinsics => "intrinsics",
            Self::Distortion => "distortion coefficients",
            Self::Rotation => "rotation",
            Self::Translation => "translation",
            Self::Extrinsics => "extrinsics",
            Self::Correspondences => "correspondences",
        };
        f.write_str(name)
    }
}

/// Invalid camera or stereo geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("{0} matrix is singular")]
    Singular(GeometryOperand),
    #[error("{0} contains non-finite values")]
    NonFinite(GeometryOperand),
    #[error("{operand} has shape {got}, expected {expected}")]
    Shape {
        operand: GeometryOperand,
        expected: &'static str,
        got: String,
    },
    #[error("rotation is not orthonormal (det={det:.6}, max |R^T R - I|={error:.3e})")]
    NotOrthonormal { det: f64, error: f64 },
    #[error("correspondence counts differ (left={left}, right={right})")]
    CountMismatch { left: usize, right: usize },
    #[error("no correspondences supplied")]
    NoCorrespondences,
    #[error("stereo baseline is degenerate (|t|={norm:.3e})")]
    ZeroBaseline { norm: f64 },
}

impl GeometryError {
    /// Operand blamed by this error, when there is a single one.
    pub fn operand(&self) -> Option<GeometryOperand> {
        match self {
            Self::Singular(op) | Self::NonFinite(op) => Some(*op),
            Self::Shape { operand, .. } => Some(*operand),
            Self::NotOrthonormal { .. } => Some(GeometryOperand::Rotation),
            Self::CountMismatch { .. } | Self::NoCorrespondences => {
                Some(GeometryOperand::Correspondences)
            }
            Self::ZeroBaseline { .. } => Some(GeometryOperand::Translation),
        }
    }

    /// Relabel errors raised against a generic intrinsics operand.
    pub fn for_operand(self, operand: GeometryOperand) -> Self {
        match self {
            Self::Singular(GeometryOperand::Intrinsics) => Self::Singular(operand),
            Self::NonFinite(GeometryOperand::Intrinsics) => Self::NonFinite(operand),
            Self::Shape {
                operand: GeometryOperand::Intrinsics,
                expected,
                got,
            } => Self::Shape {
                operand,
                expected,
                got,
            },
            other => other,
        }
    }
}

/// Why a single correspondence could not be triangulated.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degeneracy {
    #[error("rays are parallel")]
    ParallelRays,
    #[error("stereo baseline is zero")]
    ZeroBaseline,
    #[error("linear system is rank deficient")]
    SingularSystem,
    #[error("input point is not finite")]
    NonFiniteInput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_is_reported() {
        let err = GeometryError::Singular(GeometryOperand::Intrinsics)
            .for_operand(GeometryOperand::RightIntrinsics);
        assert_eq!(err.operand(), Some(GeometryOperand::RightIntrinsics));
        assert_eq!(err.to_string(), "right intrinsics matrix is singular");

        let err = GeometryError::NotOrthonormal {
            det: -1.0,
            error: 0.0,
        };
        assert_eq!(err.operand(), Some(GeometryOperand::Rotation));
    }
}
