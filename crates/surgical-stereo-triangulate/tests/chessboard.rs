//! Triangulation of chessboard corners seen by a calibrated stereo laparoscope.
//!
//! The board pose in the left camera frame is known from calibration, so the
//! ground-truth corner positions are `R_board * M + t_board`.

use approx::assert_abs_diff_eq;
use nalgebra::{Matrix3, Point3, Vector3};
use surgical_stereo_core::{Degeneracy, StereoRig};
use surgical_stereo_triangulate::{
    rms_between_corresponding_points, triangulate, triangulate_slices, Correspondence,
    TriangulatedPoints, TriangulationMethod,
};

fn rig() -> StereoRig {
    let left_k = Matrix3::new(
        2012.186314, 0.0, 944.7173708, 0.0, 2017.966019, 617.1093984, 0.0, 0.0, 1.0,
    );
    let right_k = Matrix3::new(
        2037.233928, 0.0, 1051.112809, 0.0, 2052.018948, 548.0675962, 0.0, 0.0, 1.0,
    );
    let rotation = Matrix3::new(
        0.999678, 0.000151, 0.025398, -0.000720, 0.999749, 0.022394, -0.025388, -0.022405,
        0.999426,
    );
    let translation = Vector3::new(-4.631472, 0.268695, 1.300256);
    StereoRig::from_matrices(left_k, right_k, rotation, translation).unwrap()
}

fn corners() -> Vec<Correspondence> {
    [
        [1100.16, 262.974, 1184.84, 241.915],
        [1757.74, 228.971, 1843.52, 204.083],
        [1065.44, 651.593, 1142.75, 632.817],
        [1788.22, 650.41, 1867.78, 632.59],
    ]
    .into_iter()
    .map(Correspondence::from_row)
    .collect()
}

fn ground_truth() -> Vec<Point3<f64>> {
    let board_r = Matrix3::new(
        0.966285949,
        -0.1053020017,
        0.2349530874,
        -0.005105986897,
        0.9045241988,
        0.4263917244,
        -0.2574206552,
        -0.4132159994,
        0.8734913532,
    );
    let board_t = Vector3::new(9.847672184, -22.45992103, 127.7836183);
    [[0.0, 0.0], [39.0, 0.0], [0.0, 27.0], [39.0, 27.0]]
        .into_iter()
        .map(|[x, y]| Point3::from(board_r * Vector3::new(x, y, 0.0) + board_t))
        .collect()
}

fn valid_points(out: &TriangulatedPoints) -> Vec<Point3<f64>> {
    assert_eq!(out.valid_count(), out.len());
    out.iter_valid().map(|(_, p)| p).collect()
}

#[test]
fn midpoint_matches_calibrated_board() {
    let out = triangulate(&corners(), &rig(), TriangulationMethod::Midpoint).unwrap();
    let points = valid_points(&out);
    let rms = rms_between_corresponding_points(&points, &ground_truth()).unwrap();
    assert!(rms < 1.5, "midpoint rms {rms}");

    // first corner sits close to the board origin
    assert_abs_diff_eq!(points[0].x, 9.883, epsilon = 0.05);
    assert_abs_diff_eq!(points[0].y, -22.444, epsilon = 0.05);
    assert_abs_diff_eq!(points[0].z, 127.927, epsilon = 0.05);
}

#[test]
fn hartley_matches_calibrated_board() {
    let out = triangulate(&corners(), &rig(), TriangulationMethod::Hartley).unwrap();
    let rms = rms_between_corresponding_points(&valid_points(&out), &ground_truth()).unwrap();
    assert!(rms < 1.5, "hartley rms {rms}");
}

#[test]
fn methods_agree_on_well_conditioned_points() {
    let pairs = corners();
    let mid = triangulate(&pairs, &rig(), TriangulationMethod::Midpoint).unwrap();
    let opt = triangulate(&pairs, &rig(), TriangulationMethod::Hartley).unwrap();
    assert_eq!(mid.len(), opt.len());
    for (a, b) in mid.to_rows().iter().zip(opt.to_rows()) {
        for k in 0..3 {
            let tol = 0.25 + 0.05 * a[k].abs();
            assert!((a[k] - b[k]).abs() < tol, "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn slices_and_rows_agree() {
    let pairs = corners();
    let left: Vec<_> = pairs.iter().map(|c| c.left).collect();
    let right: Vec<_> = pairs.iter().map(|c| c.right).collect();
    let a = triangulate_slices(&left, &right, &rig(), TriangulationMethod::Hartley).unwrap();
    let b = triangulate(&pairs, &rig(), TriangulationMethod::Hartley).unwrap();
    assert_eq!(a, b);
}

#[test]
fn output_order_and_length_follow_input() {
    let mut pairs = corners();
    pairs.reverse();
    pairs.push(Correspondence::from_row([f64::INFINITY, 0.0, 0.0, 0.0]));
    let out = triangulate(&pairs, &rig(), TriangulationMethod::Midpoint).unwrap();
    assert_eq!(out.len(), 5);
    assert_eq!(out.get(4), Some(Err(Degeneracy::NonFiniteInput)));

    let truth = ground_truth();
    let last = out.get(0).unwrap().unwrap();
    assert!((last - truth[3]).norm() < 1.5);
}
