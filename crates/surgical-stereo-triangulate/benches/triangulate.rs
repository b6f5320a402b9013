use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{Matrix3, Point2, Rotation3, Vector2, Vector3};
use surgical_stereo_core::StereoRig;
use surgical_stereo_triangulate::{Correspondence, TriangulationMethod, Triangulator};

fn synthetic_pairs(rig: &StereoRig, n: usize) -> Vec<Correspondence> {
    let e = &rig.extrinsics;
    (0..n)
        .map(|i| {
            let a = i as f64 * 0.37;
            let x = Vector3::new(
                20.0 * a.sin(),
                15.0 * (1.3 * a).cos(),
                90.0 + 30.0 * (0.7 * a).sin(),
            );
            let xr = e.rotation() * x + e.translation();
            // quarter-pixel jitter so the optimal correction has work to do
            let jitter = 0.25 * (2.1 * a).sin();
            Correspondence::new(
                rig.left.project(Point2::new(x.x / x.z, x.y / x.z)),
                rig.right.project(Point2::new(xr.x / xr.z, xr.y / xr.z))
                    + Vector2::new(jitter, -jitter),
            )
        })
        .collect()
}

fn bench_triangulate(c: &mut Criterion) {
    let k = Matrix3::new(2000.0, 0.0, 960.0, 0.0, 2000.0, 540.0, 0.0, 0.0, 1.0);
    let r = Rotation3::from_euler_angles(0.01, 0.025, -0.003).into_inner();
    let rig = StereoRig::from_matrices(k, k, r, Vector3::new(-4.6, 0.27, 1.3)).unwrap();
    let pairs = synthetic_pairs(&rig, 10_000);

    let mut group = c.benchmark_group("triangulate_10k");
    for method in [TriangulationMethod::Midpoint, TriangulationMethod::Hartley] {
        let t = Triangulator::new(rig, method);
        group.bench_function(format!("{method:?}"), |b| {
            b.iter(|| t.triangulate(black_box(&pairs)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_triangulate);
criterion_main!(benches);
