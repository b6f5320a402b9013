//! JSON configuration and plain-text matrix files.
//!
//! Matrix files are whitespace separated, one row per line, with `#`
//! starting a comment (the layout `numpy.savetxt` writes). Calibration uses
//! three of them: a 3x3 intrinsic matrix per camera, an optional distortion
//! vector, and a 4x4 homogeneous left-to-right transform.

use crate::Error;
use nalgebra::{DMatrix, Matrix3, Matrix4};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::{fs, path::Path};
use surgical_stereo_core::{
    CameraIntrinsics, Distortion, GeometryError, GeometryOperand, StereoExtrinsics, StereoRig,
};
use surgical_stereo_dense::{PointCloud, ReconstructionConfig};
use surgical_stereo_dots::{DotDetection, DotDetectorParams, DotModel};
use surgical_stereo_triangulate::{Correspondence, TriangulatedPoints, TriangulationMethod};

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Malformed matrix text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("line {line}: cannot parse {token:?} as a number")]
    Parse { line: usize, token: String },
    #[error("line {line}: expected {expected} columns, got {got}")]
    Ragged {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("no numeric rows")]
    Empty,
}

/// Settings for every stage, loadable from one JSON file.
///
/// Missing fields take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dots: DotDetectorParams,
    /// Fiducial ids in top-left, top-right, bottom-left, bottom-right order.
    pub fiducial_ids: Vec<u32>,
    /// Method for sparse (point list) triangulation.
    pub triangulation_method: TriangulationMethod,
    pub reconstruction: ReconstructionConfig,
}

impl PipelineConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Parse matrix text. A single line yields a one-row matrix.
pub fn parse_matrix_txt(text: &str) -> Result<DMatrix<f64>, MatrixError> {
    let mut values = Vec::new();
    let mut cols = None;
    let mut rows = 0;
    for (i, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("");
        let start = values.len();
        for token in content.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let v = token.parse::<f64>().map_err(|_| MatrixError::Parse {
                line: i + 1,
                token: token.to_string(),
            })?;
            values.push(v);
        }
        let got = values.len() - start;
        if got == 0 {
            continue;
        }
        match cols {
            None => cols = Some(got),
            Some(expected) if expected != got => {
                return Err(MatrixError::Ragged {
                    line: i + 1,
                    expected,
                    got,
                })
            }
            Some(_) => {}
        }
        rows += 1;
    }
    let cols = cols.ok_or(MatrixError::Empty)?;
    Ok(DMatrix::from_row_slice(rows, cols, &values))
}

/// Read a matrix text file.
pub fn load_matrix_txt(path: impl AsRef<Path>) -> Result<DMatrix<f64>, IoError> {
    let raw = fs::read_to_string(path)?;
    Ok(parse_matrix_txt(&raw)?)
}

/// Write rows of `columns` values, row-major in `values`.
pub fn write_table_txt(path: impl AsRef<Path>, columns: usize, values: &[f64]) -> Result<(), IoError> {
    let mut out = String::new();
    for row in values.chunks(columns.max(1)) {
        let mut first = true;
        for v in row {
            if !first {
                out.push(' ');
            }
            first = false;
            let _ = write!(out, "{v:.18e}");
        }
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

pub fn write_matrix_txt(path: impl AsRef<Path>, m: &DMatrix<f64>) -> Result<(), IoError> {
    let values: Vec<f64> = m.transpose().iter().copied().collect();
    write_table_txt(path, m.ncols(), &values)
}

/// `[x, y, z]` or `[x, y, z, r, g, b, quality]` per line.
pub fn write_point_cloud_txt(path: impl AsRef<Path>, cloud: &PointCloud) -> Result<(), IoError> {
    write_table_txt(path, cloud.columns(), &cloud.to_flat())
}

/// `[x, y, z]` per line, NaN for degenerate points.
pub fn write_points_txt(path: impl AsRef<Path>, points: &TriangulatedPoints) -> Result<(), IoError> {
    let values: Vec<f64> = points.to_rows().into_iter().flatten().collect();
    write_table_txt(path, 3, &values)
}

/// `[id, x, y]` per line.
pub fn write_detection_txt(path: impl AsRef<Path>, detection: &DotDetection) -> Result<(), IoError> {
    let values: Vec<f64> = detection.to_rows().into_iter().flatten().collect();
    write_table_txt(path, 3, &values)
}

fn shape_error(operand: GeometryOperand, expected: &'static str, m: &DMatrix<f64>) -> GeometryError {
    GeometryError::Shape {
        operand,
        expected,
        got: format!("{}x{}", m.nrows(), m.ncols()),
    }
}

pub fn intrinsics_from_matrix(m: &DMatrix<f64>) -> Result<CameraIntrinsics, GeometryError> {
    if m.shape() != (3, 3) {
        return Err(shape_error(GeometryOperand::Intrinsics, "3x3", m));
    }
    CameraIntrinsics::new(Matrix3::from_iterator(m.iter().copied()))
}

/// Coefficients from a row or column vector; an empty file is not allowed,
/// use [`Distortion::none`] instead.
pub fn distortion_from_matrix(m: &DMatrix<f64>) -> Result<Distortion, GeometryError> {
    if m.nrows() != 1 && m.ncols() != 1 {
        return Err(shape_error(GeometryOperand::Distortion, "row or column vector", m));
    }
    Distortion::new(m.as_slice())
}

/// Left-to-right transform from a 4x4 homogeneous matrix.
pub fn extrinsics_from_matrix(m: &DMatrix<f64>) -> Result<StereoExtrinsics, GeometryError> {
    if m.shape() != (4, 4) {
        return Err(shape_error(GeometryOperand::Extrinsics, "4x4", m));
    }
    StereoExtrinsics::from_homogeneous(&Matrix4::from_iterator(m.iter().copied()))
}

/// Rows `[x_l, y_l, x_r, y_r]`.
pub fn correspondences_from_matrix(m: &DMatrix<f64>) -> Result<Vec<Correspondence>, GeometryError> {
    if m.ncols() != 4 {
        return Err(shape_error(GeometryOperand::Correspondences, "Nx4", m));
    }
    Ok(m.row_iter()
        .map(|r| Correspondence::from_row([r[0], r[1], r[2], r[3]]))
        .collect())
}

/// Rows `[id, layout_x, layout_y, x, y, z]`.
pub fn dot_model_from_matrix(m: &DMatrix<f64>) -> Result<DotModel, Error> {
    if m.ncols() != 6 {
        return Err(Error::ModelColumns { got: m.ncols() });
    }
    let rows: Vec<[f64; 6]> = m
        .row_iter()
        .map(|r| [r[0], r[1], r[2], r[3], r[4], r[5]])
        .collect();
    Ok(DotModel::from_rows(&rows)?)
}

/// Rig from the three calibration files.
pub fn load_stereo_rig(
    left_intrinsics: impl AsRef<Path>,
    right_intrinsics: impl AsRef<Path>,
    left_to_right: impl AsRef<Path>,
) -> Result<StereoRig, Error> {
    let left = intrinsics_from_matrix(&load_matrix_txt(left_intrinsics)?)
        .map_err(|e| e.for_operand(GeometryOperand::LeftIntrinsics))?;
    let right = intrinsics_from_matrix(&load_matrix_txt(right_intrinsics)?)
        .map_err(|e| e.for_operand(GeometryOperand::RightIntrinsics))?;
    let extrinsics = extrinsics_from_matrix(&load_matrix_txt(left_to_right)?)?;
    Ok(StereoRig::new(left, right, extrinsics))
}

pub fn load_correspondences(path: impl AsRef<Path>) -> Result<Vec<Correspondence>, Error> {
    Ok(correspondences_from_matrix(&load_matrix_txt(path)?)?)
}

pub fn load_dot_model(path: impl AsRef<Path>) -> Result<DotModel, Error> {
    dot_model_from_matrix(&load_matrix_txt(path)?)
}

pub fn load_distortion(path: impl AsRef<Path>) -> Result<Distortion, Error> {
    Ok(distortion_from_matrix(&load_matrix_txt(path)?)?)
}
