//! Detection on rendered dot-grid targets.

use approx::assert_abs_diff_eq;
use nalgebra::Point2;
use std::f64::consts::PI;
use surgical_stereo_core::{CameraIntrinsics, Distortion, GrayImageView, ImageError, ImageView};
use surgical_stereo_dots::{
    detect_dots, DotDetectError, DotDetection, DotDetector, DotDetectorParams, DotModel,
    ModelError,
};

const FIDUCIALS: [u32; 4] = [133, 141, 308, 316];
/// Rows 5 and 11 of 18: the fiducial quad sits one row above the grid centre.
const OFF_CENTRE_FIDUCIALS: [u32; 4] = [133, 141, 283, 291];
const WIDTH: usize = 900;
const HEIGHT: usize = 700;

fn model() -> DotModel {
    let mut rows = Vec::new();
    let mut id = 0.0;
    for y in 0..18 {
        for x in 0..25 {
            let (x, y) = (x as f64, y as f64);
            rows.push([id, (x + 1.0) * 50.0, (y + 1.0) * 50.0, x * 5.0, y * 5.0, 0.0]);
            id += 1.0;
        }
    }
    DotModel::from_rows(&rows).unwrap()
}

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::from_params(800.0, 800.0, 450.0, 350.0).unwrap()
}

/// Layout to ideal image: rotate by `angle` about the layout centre, scale,
/// and centre in the image.
fn pose(angle: f64, scale: f64) -> impl Fn(Point2<f64>) -> Point2<f64> {
    let (s, c) = angle.sin_cos();
    move |p: Point2<f64>| {
        let (x, y) = (p.x - 650.0, p.y - 475.0);
        Point2::new(
            WIDTH as f64 / 2.0 + scale * (c * x - s * y),
            HEIGHT as f64 / 2.0 + scale * (s * x + c * y),
        )
    }
}

struct Scene {
    pixels: Vec<u8>,
    /// Ideal (undistorted) centre per model index.
    truth: Vec<Point2<f64>>,
}

fn render(
    model: &DotModel,
    fiducials: &[u32; 4],
    to_image: impl Fn(Point2<f64>) -> Point2<f64>,
    distortion: &Distortion,
    fiducial_radius: f64,
    hidden: impl Fn(Point2<f64>) -> bool,
) -> Scene {
    let k = intrinsics();
    let mut coverage = vec![0.0f64; WIDTH * HEIGHT];
    let mut truth = Vec::new();
    for p in model.points() {
        let ideal = to_image(p.layout);
        truth.push(ideal);
        if hidden(ideal) {
            continue;
        }
        let centre = distortion.distort_pixel(&k, ideal);
        let r = if fiducials.contains(&p.id) {
            fiducial_radius
        } else {
            6.0
        };
        let x0 = (centre.x - r - 1.0).floor().max(0.0) as usize;
        let y0 = (centre.y - r - 1.0).floor().max(0.0) as usize;
        let x1 = ((centre.x + r + 2.0).ceil() as usize).min(WIDTH);
        let y1 = ((centre.y + r + 2.0).ceil() as usize).min(HEIGHT);
        for y in y0..y1 {
            for x in x0..x1 {
                let mut hits = 0;
                for sy in 0..4 {
                    for sx in 0..4 {
                        let px = x as f64 + (sx as f64 + 0.5) / 4.0 - 0.5 - centre.x;
                        let py = y as f64 + (sy as f64 + 0.5) / 4.0 - 0.5 - centre.y;
                        if px * px + py * py <= r * r {
                            hits += 1;
                        }
                    }
                }
                coverage[y * WIDTH + x] += hits as f64 / 16.0;
            }
        }
    }
    let pixels = coverage
        .iter()
        .map(|c| (220.0 - 180.0 * c.min(1.0)).round() as u8)
        .collect();
    Scene { pixels, truth }
}

fn detector_with(fiducials: &[u32; 4]) -> DotDetector {
    DotDetector::new(model(), fiducials, DotDetectorParams::default()).unwrap()
}

fn detector() -> DotDetector {
    detector_with(&FIDUCIALS)
}

fn detect_with(scene: &Scene, distortion: &Distortion, fiducials: &[u32; 4]) -> DotDetection {
    let image = GrayImageView::new(WIDTH, HEIGHT, &scene.pixels).unwrap();
    detector_with(fiducials)
        .detect(&image, &intrinsics(), distortion)
        .unwrap()
}

fn detect(scene: &Scene, distortion: &Distortion) -> DotDetection {
    detect_with(scene, distortion, &FIDUCIALS)
}

fn assert_ids_match_truth(found: &DotDetection, truth: &[Point2<f64>], tol: f64) {
    for dot in &found.dots {
        let want = truth[dot.id as usize];
        assert_abs_diff_eq!(dot.undistorted.x, want.x, epsilon = tol);
        assert_abs_diff_eq!(dot.undistorted.y, want.y, epsilon = tol);
    }
}

#[test]
fn full_target_is_identified() {
    let model = model();
    let scene = render(&model, &FIDUCIALS, pose(0.05, 0.6), &Distortion::none(), 10.0, |_| false);
    let found = detect(&scene, &Distortion::none());

    assert_eq!(found.len(), model.len());
    assert_ids_match_truth(&found, &scene.truth, 0.3);
    for id in FIDUCIALS {
        assert!(found.get(id).is_some());
    }
    let rows = found.to_extended_rows();
    let row = rows.iter().find(|r| r[0] == 141.0).unwrap();
    assert_eq!(&row[3..], &[80.0, 25.0, 0.0]);
}

#[test]
fn output_is_in_raster_order() {
    let model = model();
    let scene = render(&model, &FIDUCIALS, pose(0.0, 0.6), &Distortion::none(), 10.0, |_| false);
    let found = detect(&scene, &Distortion::none());
    assert_eq!(found.len(), model.len());
    // fiducials are taller than their row neighbours and so start earlier
    let ids: Vec<u32> = found.ids().filter(|id| !FIDUCIALS.contains(id)).collect();
    let expected: Vec<u32> = (0..model.len() as u32)
        .filter(|id| !FIDUCIALS.contains(id))
        .collect();
    assert_eq!(ids, expected);
}

#[test]
fn rotated_target_keeps_its_ids() {
    let model = model();
    let scene = render(&model, &FIDUCIALS, pose(0.5, 0.45), &Distortion::none(), 10.0, |_| false);
    let found = detect(&scene, &Distortion::none());
    assert_eq!(found.len(), model.len());
    assert_ids_match_truth(&found, &scene.truth, 0.3);
}

#[test]
fn upside_down_target_with_off_centre_fiducials_keeps_its_ids() {
    let model = model();
    for angle in [0.0, PI] {
        let scene = render(
            &model,
            &OFF_CENTRE_FIDUCIALS,
            pose(angle, 0.6),
            &Distortion::none(),
            10.0,
            |_| false,
        );
        let found = detect_with(&scene, &Distortion::none(), &OFF_CENTRE_FIDUCIALS);
        assert_eq!(found.len(), model.len(), "angle {angle}");
        assert_ids_match_truth(&found, &scene.truth, 0.3);
        let fiducial = found.get(133).unwrap();
        assert_abs_diff_eq!(fiducial.undistorted.x, scene.truth[133].x, epsilon = 0.3);
        assert_abs_diff_eq!(fiducial.undistorted.y, scene.truth[133].y, epsilon = 0.3);
    }
}

#[test]
fn partial_occlusion_yields_a_subset() {
    let model = model();
    let scene = render(&model, &FIDUCIALS, pose(0.0, 0.6), &Distortion::none(), 10.0, |p| p.x < 250.0);
    let found = detect(&scene, &Distortion::none());
    assert!(found.len() < model.len());
    assert!(found.len() > 300, "{} dots", found.len());
    assert!(found.dots.iter().all(|d| d.image.x >= 250.0));
    assert_ids_match_truth(&found, &scene.truth, 0.3);
}

#[test]
fn lens_distortion_is_removed_before_fitting() {
    let model = model();
    let distortion = Distortion::new(&[-0.12, 0.02, 0.0005, -0.0003, 0.0]).unwrap();
    let scene = render(&model, &FIDUCIALS, pose(0.02, 0.6), &distortion, 10.0, |_| false);
    let found = detect(&scene, &distortion);
    assert_eq!(found.len(), model.len());
    assert_ids_match_truth(&found, &scene.truth, 0.35);

    // reported image positions stay in the distorted frame
    let k = intrinsics();
    let dot = found.get(0).unwrap();
    let distorted = distortion.distort_pixel(&k, scene.truth[0]);
    assert!((dot.image - distorted).norm() < 0.35);
}

#[test]
fn detection_is_deterministic() {
    let model = model();
    let scene = render(&model, &FIDUCIALS, pose(-0.3, 0.5), &Distortion::none(), 10.0, |p| p.y > 550.0);
    let a = detect(&scene, &Distortion::none());
    let b = detect(&scene, &Distortion::none());
    assert_eq!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn missing_fiducials_give_an_empty_detection() {
    let model = model();
    let scene = render(&model, &FIDUCIALS, pose(0.0, 0.6), &Distortion::none(), 6.0, |_| false);
    let found = detect(&scene, &Distortion::none());
    assert!(found.is_empty());
    assert!(found.homography.is_none());
}

#[test]
fn invalid_inputs_fail() {
    let model = model();
    let k = intrinsics();
    let params = DotDetectorParams::default();
    let pixels = vec![200u8; 16];
    let image = GrayImageView::new(4, 4, &pixels).unwrap();

    let err = detect_dots(&image, &k, &Distortion::none(), &model, &[1, 2, 3, 999], &params)
        .unwrap_err();
    assert_eq!(err, DotDetectError::Model(ModelError::FiducialOutOfRange(999)));

    let empty = GrayImageView {
        width: 0,
        height: 0,
        data: &[],
    };
    let err = detect_dots(&empty, &k, &Distortion::none(), &model, &FIDUCIALS, &params)
        .unwrap_err();
    assert!(matches!(err, DotDetectError::Image(ImageError::Empty { .. })));

    let rgb = vec![0u8; 4 * 4 * 3];
    let view = ImageView::new(4, 4, 3, &rgb).unwrap();
    let err = detector()
        .detect_image(&view, &k, &Distortion::none())
        .unwrap_err();
    assert!(matches!(
        err,
        DotDetectError::Image(ImageError::Channels { got: 3, .. })
    ));

    // nothing to find is not an error
    let blank = detector()
        .detect(&image, &k, &Distortion::none())
        .unwrap();
    assert!(blank.is_empty());
}
