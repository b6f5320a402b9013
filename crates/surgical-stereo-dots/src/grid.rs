//! Fitting the model layout onto detected dot centres.
//!
//! The four fiducials fix a homography from layout to (undistorted) image
//! coordinates for each of their dihedral assignments. Every hypothesis is
//! grown by associating all projected model dots with their nearest
//! candidate and re-estimating the homography from the associations.
//!
//! Hypotheses are ranked by the number of dots they explain, then by how
//! many fiducial blobs stay associated with fiducial model dots. Only a
//! layout that is symmetric about its fiducial quad leaves an exact tie,
//! which the upright prior resolves.

use crate::model::{DotModel, FiducialSet, ModelPoint};
use crate::params::GridFitParams;
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Point2, Vector2};
use surgical_stereo_core::{estimate_homography, homography_from_4pt, Homography};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Model index paired with candidate index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Association {
    pub model: usize,
    pub candidate: usize,
    dist2: f64,
}

/// A fitted assignment of model dots to candidates.
#[derive(Clone, Debug)]
pub(crate) struct GridFit {
    pub homography: Homography,
    /// Sorted by candidate index.
    pub associations: Vec<Association>,
    /// Fiducial blobs associated with one of the fiducial model dots.
    fiducial_hits: usize,
    /// Absolute angle of the top edge of the fiducial quad in the image.
    tilt: f64,
    hypothesis: usize,
}

/// The dihedral assignments of the detected fiducials to the model
/// fiducials, skipping mirrored ones.
///
/// `detected` are the undistorted fiducial centres in any order.
pub(crate) fn fiducial_hypotheses(
    model: &DotModel,
    fiducials: &FiducialSet,
    detected: [Point2<f64>; 4],
) -> Vec<(Homography, f64)> {
    let Some(cyclic) = fiducials.cyclic_indices(model) else {
        return Vec::new();
    };
    let layout: [Point2<f64>; 4] = cyclic.map(|i| model.points()[i].layout);
    let layout_centre = Point2::from(layout.iter().map(|p| p.coords).sum::<Vector2<f64>>() / 4.0);

    // order the detections around their centroid in the same angular sense
    // as the cyclic model order
    let centre = detected.iter().map(|p| p.coords).sum::<Vector2<f64>>() / 4.0;
    let mut ring = detected;
    ring.sort_by(|a, b| {
        let ta = (a.y - centre.y).atan2(a.x - centre.x);
        let tb = (b.y - centre.y).atan2(b.x - centre.x);
        ta.total_cmp(&tb)
    });

    let mut out = Vec::with_capacity(8);
    for mirrored in [false, true] {
        for r in 0..4 {
            let image: [Point2<f64>; 4] = std::array::from_fn(|i| {
                let k = if mirrored { r + 4 - i } else { r + i };
                ring[k % 4]
            });
            let Some(h) = homography_from_4pt(&layout, &image) else {
                continue;
            };
            if h.orientation_at(layout_centre) <= 0.0 {
                continue;
            }
            let top = image[1] - image[0];
            out.push((h, top.y.atan2(top.x).abs()));
        }
    }
    out
}

/// Associate every projected model dot with its nearest candidate.
///
/// Each candidate is used at most once; the closest model dot keeps it.
fn associate(
    model: &DotModel,
    tree: &KdTree<f64, 2>,
    candidate_count: usize,
    homography: &Homography,
    match_radius: f64,
) -> Vec<Association> {
    let pitch = model.layout_spacing();
    let step_x = Vector2::new(pitch, 0.0);
    let step_y = Vector2::new(0.0, pitch);

    let nearest = |(mi, p): (usize, &ModelPoint)| {
        if homography.orientation_at(p.layout) <= 0.0 {
            return None;
        }
        let q = homography.apply(p.layout);
        let local_pitch = (homography.apply(p.layout + step_x) - q)
            .norm()
            .min((homography.apply(p.layout + step_y) - q).norm());
        if !(q.x.is_finite() && q.y.is_finite() && local_pitch.is_finite()) {
            return None;
        }
        let radius = match_radius * local_pitch;
        let nn = tree.nearest_one::<SquaredEuclidean>(&[q.x, q.y]);
        (nn.distance <= radius * radius).then_some(Association {
            model: mi,
            candidate: nn.item as usize,
            dist2: nn.distance,
        })
    };

    #[cfg(feature = "rayon")]
    let mut found: Vec<Association> = model
        .points()
        .par_iter()
        .enumerate()
        .filter_map(nearest)
        .collect();
    #[cfg(not(feature = "rayon"))]
    let mut found: Vec<Association> = model
        .points()
        .iter()
        .enumerate()
        .filter_map(nearest)
        .collect();

    found.sort_by(|a, b| {
        a.dist2
            .total_cmp(&b.dist2)
            .then(a.model.cmp(&b.model))
    });
    let mut taken = vec![false; candidate_count];
    let mut out: Vec<Association> = found
        .into_iter()
        .filter(|a| !std::mem::replace(&mut taken[a.candidate], true))
        .collect();
    out.sort_by_key(|a| a.candidate);
    out
}

fn refine(
    model: &DotModel,
    candidates: &[Point2<f64>],
    tree: &KdTree<f64, 2>,
    seed: Homography,
    params: &GridFitParams,
) -> (Homography, Vec<Association>) {
    let mut h = seed;
    let mut assoc = associate(model, tree, candidates.len(), &h, params.match_radius);
    for _ in 0..params.refine_iterations {
        if assoc.len() < 4 {
            break;
        }
        let src: Vec<Point2<f64>> = assoc.iter().map(|a| model.points()[a.model].layout).collect();
        let dst: Vec<Point2<f64>> = assoc.iter().map(|a| candidates[a.candidate]).collect();
        let Some(next) = estimate_homography(&src, &dst) else {
            break;
        };
        let next_assoc = associate(model, tree, candidates.len(), &next, params.match_radius);
        if next_assoc.len() < assoc.len() {
            break;
        }
        let converged = next_assoc.len() == assoc.len();
        h = next;
        assoc = next_assoc;
        if converged {
            break;
        }
    }
    (h, assoc)
}

/// Best grid fit over all fiducial hypotheses, if any explains enough of
/// the candidates.
pub(crate) fn fit_grid(
    model: &DotModel,
    fiducials: &FiducialSet,
    candidates: &[Point2<f64>],
    fiducial_candidates: [usize; 4],
    params: &GridFitParams,
) -> Option<GridFit> {
    if fiducial_candidates.iter().any(|&i| i >= candidates.len()) {
        return None;
    }
    let fiducial_models = fiducials.cyclic_indices(model)?;
    let fiducial_points = fiducial_candidates.map(|i| candidates[i]);
    let hypotheses = fiducial_hypotheses(model, fiducials, fiducial_points);
    if hypotheses.is_empty() {
        return None;
    }
    let coords: Vec<[f64; 2]> = candidates.iter().map(|p| [p.x, p.y]).collect();
    let tree: KdTree<f64, 2> = (&coords).into();

    let fit = |(hypothesis, (seed, tilt)): (usize, &(Homography, f64))| {
        let (homography, associations) = refine(model, candidates, &tree, *seed, params);
        let fiducial_hits = associations
            .iter()
            .filter(|a| {
                fiducial_candidates.contains(&a.candidate) && fiducial_models.contains(&a.model)
            })
            .count();
        GridFit {
            homography,
            associations,
            fiducial_hits,
            tilt: *tilt,
            hypothesis,
        }
    };
    #[cfg(feature = "rayon")]
    let fits: Vec<GridFit> = hypotheses.par_iter().enumerate().map(fit).collect();
    #[cfg(not(feature = "rayon"))]
    let fits: Vec<GridFit> = hypotheses.iter().enumerate().map(fit).collect();

    for f in &fits {
        debug!(
            "hypothesis {}: {} dots, {} fiducials, tilt {:.1} deg",
            f.hypothesis,
            f.associations.len(),
            f.fiducial_hits,
            f.tilt.to_degrees()
        );
    }

    let best = fits.iter().map(|f| f.associations.len()).max()?;
    let required = ((params.min_inlier_fraction * candidates.len() as f64).ceil() as usize).max(4);
    if best < required {
        debug!("best hypothesis explains {best} dots, {required} required");
        return None;
    }
    fits.into_iter().min_by(|a, b| {
        b.associations
            .len()
            .cmp(&a.associations.len())
            .then(b.fiducial_hits.cmp(&a.fiducial_hits))
            .then(a.tilt.total_cmp(&b.tilt))
            .then(a.hypothesis.cmp(&b.hypothesis))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::grid_model;

    fn similarity(scale: f64, angle: f64, t: Vector2<f64>) -> Homography {
        let (s, c) = angle.sin_cos();
        Homography::new(nalgebra::Matrix3::new(
            scale * c,
            -scale * s,
            t.x,
            scale * s,
            scale * c,
            t.y,
            0.0,
            0.0,
            1.0,
        ))
    }

    fn fiducial_points(model: &DotModel, h: &Homography, ids: [u32; 4]) -> [Point2<f64>; 4] {
        ids.map(|id| h.apply(model.get(id).unwrap().layout))
    }

    /// Candidates projected from every model dot, so candidate index equals
    /// model index.
    fn projected(model: &DotModel, h: &Homography) -> Vec<Point2<f64>> {
        model.points().iter().map(|p| h.apply(p.layout)).collect()
    }

    fn model_indices(model: &DotModel, fid: &FiducialSet) -> [usize; 4] {
        fid.ids().map(|id| model.index_of(id).unwrap())
    }

    #[test]
    fn mirrored_assignments_are_skipped() {
        let model = grid_model();
        let fid = FiducialSet::new(&model, &[133, 141, 308, 316]).unwrap();
        let h = similarity(0.5, 0.2, Vector2::new(30.0, 10.0));
        let hyps = fiducial_hypotheses(&model, &fid, fiducial_points(&model, &h, fid.ids()));
        assert_eq!(hyps.len(), 4);
        let upright = hyps
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert!((upright.1 - 0.2).abs() < 1e-9);
    }

    #[test]
    fn full_grid_is_recovered_with_upright_prior() {
        let model = grid_model();
        let fid = FiducialSet::new(&model, &[133, 141, 308, 316]).unwrap();
        let h = similarity(0.6, -0.1, Vector2::new(40.0, 25.0));
        let candidates = projected(&model, &h);
        let fit = fit_grid(
            &model,
            &fid,
            &candidates,
            model_indices(&model, &fid),
            &GridFitParams::default(),
        )
        .unwrap();
        assert_eq!(fit.associations.len(), model.len());
        // the 180 degree hypothesis scores the same; the prior picks upright
        assert!(fit.associations.iter().all(|a| a.model == a.candidate));
    }

    #[test]
    fn off_centre_fiducials_fix_an_upside_down_target() {
        let model = grid_model();
        // rows 5 and 11 of 0..18: the quad is one row off the grid centre
        let fid = FiducialSet::new(&model, &[133, 141, 283, 291]).unwrap();
        for angle in [0.0, std::f64::consts::PI, std::f64::consts::PI - 0.3] {
            let h = similarity(0.6, angle, Vector2::new(450.0, 350.0));
            let candidates = projected(&model, &h);
            let fit = fit_grid(
                &model,
                &fid,
                &candidates,
                model_indices(&model, &fid),
                &GridFitParams::default(),
            )
            .unwrap();
            assert_eq!(fit.associations.len(), model.len(), "angle {angle}");
            assert_eq!(fit.fiducial_hits, 4);
            assert!(
                fit.associations.iter().all(|a| a.model == a.candidate),
                "angle {angle}"
            );
        }
    }

    #[test]
    fn sparse_candidates_are_rejected() {
        let model = grid_model();
        let fid = FiducialSet::new(&model, &[133, 141, 308, 316]).unwrap();
        let h = similarity(0.6, 0.0, Vector2::new(40.0, 25.0));
        let mut candidates: Vec<Point2<f64>> = (0..200)
            .map(|i| Point2::new(3.1 * i as f64, 700.0 + (i % 7) as f64 * 13.0))
            .collect();
        candidates.extend(fiducial_points(&model, &h, fid.ids()));
        let fids = [200, 201, 202, 203];
        assert!(fit_grid(&model, &fid, &candidates, fids, &GridFitParams::default()).is_none());
    }
}
