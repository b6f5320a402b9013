//! Pipelines built with `--no-default-features`, where every crate runs its
//! sequential code paths.
#![cfg(not(feature = "rayon"))]

use nalgebra::{Matrix3, Point2, Vector3};
use surgical_stereo::dense::reconstruct;
use surgical_stereo::triangulate::triangulate;
use surgical_stereo::{
    Correspondence, ImageView, ReconstructionConfig, StereoRig, TriangulationMethod,
};

const W: usize = 160;
const H: usize = 120;
const DISPARITY: usize = 8;
const F: f64 = 400.0;
const BASELINE: f64 = 2.0;
const DEPTH: f64 = F * BASELINE / DISPARITY as f64;

fn rig() -> StereoRig {
    let k = Matrix3::new(F, 0.0, 80.0, 0.0, F, 60.0, 0.0, 0.0, 1.0);
    StereoRig::from_matrices(k, k, Matrix3::identity(), Vector3::new(-BASELINE, 0.0, 0.0)).unwrap()
}

/// `(left, right)` with `right(x, y) = left(x + DISPARITY, y)`.
fn pair() -> (Vec<u8>, Vec<u8>) {
    let bw = W + DISPARITY;
    let mut s = 2024u32;
    let base: Vec<u8> = (0..bw * H)
        .map(|_| {
            s = s.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (s >> 24) as u8
        })
        .collect();
    let crop = |offset: usize| -> Vec<u8> {
        (0..H)
            .flat_map(|y| base[y * bw + offset..y * bw + offset + W].iter().copied())
            .collect()
    };
    (crop(0), crop(DISPARITY))
}

#[test]
fn dense_reconstruction_runs_without_rayon() {
    let (l, r) = pair();
    let left = ImageView::new(W, H, 1, &l).unwrap();
    let right = ImageView::new(W, H, 1, &r).unwrap();
    let config = ReconstructionConfig::default();

    let cloud = reconstruct(&left, &right, &rig(), &config).unwrap();
    assert!(cloud.len() > W * H / 2, "{} points", cloud.len());
    let mut z: Vec<f64> = (0..cloud.len())
        .filter_map(|i| cloud.position(i))
        .map(|p| p.z)
        .collect();
    z.sort_by(f64::total_cmp);
    let median = z[z.len() / 2];
    assert!((median - DEPTH).abs() < 1.5, "median depth {median}");

    let again = reconstruct(&left, &right, &rig(), &config).unwrap();
    // degenerate rows are NaN, so compare bit patterns
    let bits = |c: &surgical_stereo::PointCloud| -> Vec<u64> {
        c.to_flat().iter().map(|v| v.to_bits()).collect()
    };
    assert_eq!(bits(&cloud), bits(&again));
}

#[test]
fn triangulation_runs_without_rayon() {
    let pairs = vec![
        Correspondence::new(Point2::new(90.0, 70.0), Point2::new(82.0, 70.0)),
        Correspondence::new(Point2::new(80.0, 60.0), Point2::new(80.0, 60.0)),
    ];
    for method in [TriangulationMethod::Midpoint, TriangulationMethod::Hartley] {
        let points = triangulate(&pairs, &rig(), method).unwrap();
        assert_eq!(points.len(), 2);
        let p = points.get(0).unwrap().unwrap();
        assert!((p.z - DEPTH).abs() < 1e-6, "{method:?}: {p}");
        assert!(points.get(1).unwrap().is_err());
    }
}
