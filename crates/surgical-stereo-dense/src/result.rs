use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use surgical_stereo_core::{Degeneracy, GrayImage};
use surgical_stereo_triangulate::TriangulationMethod;

/// One accepted correspondence, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StereoMatch {
    /// Integer left pixel.
    pub left: Point2<f64>,
    /// Right point, sub-pixel when refinement is enabled.
    pub right: Point2<f64>,
    /// ZNCC of the integer match.
    pub score: f32,
}

impl StereoMatch {
    /// `[x_l, y_l, x_r, y_r]`.
    pub fn to_row(&self) -> [f64; 4] {
        [self.left.x, self.left.y, self.right.x, self.right.y]
    }

    pub fn disparity(&self) -> f64 {
        self.left.x - self.right.x
    }
}

/// A reconstructed surface point with its provenance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint {
    #[serde(flatten)]
    pub correspondence: StereoMatch,
    /// Left camera frame, or why the point could not be triangulated.
    pub position: Result<Point3<f64>, Degeneracy>,
    /// Colour at the left pixel.
    pub color: [u8; 3],
}

impl SurfacePoint {
    pub fn quality(&self) -> f64 {
        self.correspondence.score as f64
    }

    fn xyz(&self) -> [f64; 3] {
        match &self.position {
            Ok(p) => [p.x, p.y, p.z],
            Err(_) => [f64::NAN; 3],
        }
    }
}

/// Surface points sorted by left pixel index (row-major).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceReconstruction {
    pub points: Vec<SurfacePoint>,
    pub method: TriangulationMethod,
}

impl SurfaceReconstruction {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| p.position.is_ok()).count()
    }

    /// Output table; degenerate points keep their row with NaN coordinates.
    pub fn to_point_cloud(&self, emit_color_and_quality: bool) -> PointCloud {
        if emit_color_and_quality {
            PointCloud::XyzRgbq(
                self.points
                    .iter()
                    .map(|p| {
                        let [x, y, z] = p.xyz();
                        let [r, g, b] = p.color.map(f64::from);
                        [x, y, z, r, g, b, p.quality()]
                    })
                    .collect(),
            )
        } else {
            PointCloud::Xyz(self.points.iter().map(SurfacePoint::xyz).collect())
        }
    }
}

/// Reconstruction table with either 3 or 7 columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointCloud {
    /// `[x, y, z]`
    Xyz(Vec<[f64; 3]>),
    /// `[x, y, z, r, g, b, quality]`
    XyzRgbq(Vec<[f64; 7]>),
}

impl PointCloud {
    pub fn columns(&self) -> usize {
        match self {
            Self::Xyz(_) => 3,
            Self::XyzRgbq(_) => 7,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Xyz(rows) => rows.len(),
            Self::XyzRgbq(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> Option<&[f64]> {
        match self {
            Self::Xyz(rows) => rows.get(i).map(|r| r.as_slice()),
            Self::XyzRgbq(rows) => rows.get(i).map(|r| r.as_slice()),
        }
    }

    pub fn position(&self, i: usize) -> Option<Point3<f64>> {
        self.row(i).map(|r| Point3::new(r[0], r[1], r[2]))
    }

    /// Row-major values, `len() * columns()` long.
    pub fn to_flat(&self) -> Vec<f64> {
        match self {
            Self::Xyz(rows) => rows.iter().flatten().copied().collect(),
            Self::XyzRgbq(rows) => rows.iter().flatten().copied().collect(),
        }
    }
}

/// Per-pixel disparity `x_l - x_r` in left image coordinates; NaN where no
/// match was accepted.
#[derive(Clone, Debug, PartialEq)]
pub struct DisparityMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DisparityMap {
    pub(crate) fn from_matches(width: usize, height: usize, matches: &[StereoMatch]) -> Self {
        let mut data = vec![f32::NAN; width * height];
        for m in matches {
            let (x, y) = (m.left.x as usize, m.left.y as usize);
            data[y * width + x] = m.disparity() as f32;
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let d = self.data[y * self.width + x];
        (!d.is_nan()).then_some(d)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| !d.is_nan()).count()
    }

    /// Finite range of the map, if any pixel was matched.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .filter(|d| d.is_finite())
            .fold(None, |acc, &d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }

    /// 8-bit rendering: unmatched pixels are 0, matched ones span 1..=255.
    pub fn to_gray(&self) -> GrayImage {
        let mut out = GrayImage::new(self.width, self.height);
        let Some((lo, hi)) = self.range() else {
            return out;
        };
        let span = (hi - lo).max(f32::EPSILON);
        for (o, &d) in out.data.iter_mut().zip(&self.data) {
            if d.is_finite() {
                *o = (1.0 + 254.0 * (d - lo) / span).round() as u8;
            }
        }
        out
    }
}
