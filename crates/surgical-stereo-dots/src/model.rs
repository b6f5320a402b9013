//! Known dot-grid target definition.

use crate::error::ModelError;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One dot of the physical target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    pub id: u32,
    /// Nominal 2D position used to lay out the grid during fitting.
    pub layout: Point2<f64>,
    /// Physical position on the target, typically millimetres with `z = 0`.
    pub position: Point3<f64>,
}

/// Validated set of model points with unique ids.
#[derive(Clone, Debug)]
pub struct DotModel {
    points: Vec<ModelPoint>,
    by_id: HashMap<u32, usize>,
    layout_spacing: f64,
}

impl DotModel {
    pub fn new(points: Vec<ModelPoint>) -> Result<Self, ModelError> {
        if points.is_empty() {
            return Err(ModelError::Empty);
        }
        let mut by_id = HashMap::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            let finite = p.layout.iter().chain(p.position.iter()).all(|v| v.is_finite());
            if !finite {
                return Err(ModelError::NonFinite { id: p.id });
            }
            if by_id.insert(p.id, i).is_some() {
                return Err(ModelError::DuplicateId(p.id));
            }
        }
        let layout_spacing = median_neighbour_distance(&points);
        Ok(Self {
            points,
            by_id,
            layout_spacing,
        })
    }

    /// Build from `[id, layout_x, layout_y, x, y, z]` rows.
    pub fn from_rows(rows: &[[f64; 6]]) -> Result<Self, ModelError> {
        let points = rows
            .iter()
            .enumerate()
            .map(|(row, r)| {
                let id = r[0];
                if !(id.is_finite() && id >= 0.0 && id.fract() == 0.0 && id <= u32::MAX as f64) {
                    return Err(ModelError::InvalidId { row, value: id });
                }
                Ok(ModelPoint {
                    id: id as u32,
                    layout: Point2::new(r[1], r[2]),
                    position: Point3::new(r[3], r[4], r[5]),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(points)
    }

    pub fn points(&self) -> &[ModelPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ModelPoint> {
        self.index_of(id).map(|i| &self.points[i])
    }

    pub fn index_of(&self, id: u32) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Median nearest-neighbour distance between layout positions.
    pub fn layout_spacing(&self) -> f64 {
        self.layout_spacing
    }
}

fn median_neighbour_distance(points: &[ModelPoint]) -> f64 {
    if points.len() < 2 {
        return 1.0;
    }
    let coords: Vec<[f64; 2]> = points.iter().map(|p| [p.layout.x, p.layout.y]).collect();
    let tree: KdTree<f64, 2> = (&coords).into();
    let mut d: Vec<f64> = coords
        .iter()
        .enumerate()
        .filter_map(|(i, q)| {
            tree.nearest_n::<SquaredEuclidean>(q, 2)
                .into_iter()
                .find(|nn| nn.item as usize != i)
                .map(|nn| nn.distance.sqrt())
        })
        .filter(|d| *d > 0.0)
        .collect();
    if d.is_empty() {
        return 1.0;
    }
    d.sort_by(f64::total_cmp);
    d[d.len() / 2]
}

/// The four orientation-breaking dots, ordered top-left, top-right,
/// bottom-left, bottom-right in layout coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiducialSet {
    ids: [u32; 4],
}

impl FiducialSet {
    pub const COUNT: usize = 4;

    /// Validate `ids` against `model`.
    pub fn new(model: &DotModel, ids: &[u32]) -> Result<Self, ModelError> {
        let ids: [u32; 4] = ids.try_into().map_err(|_| ModelError::FiducialCount {
            expected: Self::COUNT,
            got: ids.len(),
        })?;
        for (i, id) in ids.iter().enumerate() {
            if model.index_of(*id).is_none() {
                return Err(ModelError::FiducialOutOfRange(*id));
            }
            if ids[..i].contains(id) {
                return Err(ModelError::DuplicateFiducial(*id));
            }
        }
        Ok(Self { ids })
    }

    pub fn ids(&self) -> [u32; 4] {
        self.ids
    }

    /// Model indices in top-left, top-right, bottom-right, bottom-left order.
    pub(crate) fn cyclic_indices(&self, model: &DotModel) -> Option<[usize; 4]> {
        let [tl, tr, bl, br] = self.ids;
        Some([
            model.index_of(tl)?,
            model.index_of(tr)?,
            model.index_of(br)?,
            model.index_of(bl)?,
        ])
    }
}
