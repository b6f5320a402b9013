//! Shi–Tomasi corners used as propagation seeds.

use crate::texture::Textured;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Minimum eigenvalue of the 3x3-summed gradient structure tensor.
fn min_eigen_response(img: &Textured) -> Vec<f32> {
    let (w, h) = (img.width, img.height);
    let mut gx = vec![0f32; w * h];
    let mut gy = vec![0f32; w * h];
    let gradients = |(y, (gx_row, gy_row)): (usize, (&mut [f32], &mut [f32]))| {
        if y == 0 || y + 1 >= h {
            return;
        }
        for x in 1..w.saturating_sub(1) {
            gx_row[x] = 0.5 * (img.gray(x + 1, y) as f32 - img.gray(x - 1, y) as f32);
            gy_row[x] = 0.5 * (img.gray(x, y + 1) as f32 - img.gray(x, y - 1) as f32);
        }
    };
    #[cfg(feature = "rayon")]
    gx.par_chunks_mut(w)
        .zip(gy.par_chunks_mut(w))
        .enumerate()
        .for_each(gradients);
    #[cfg(not(feature = "rayon"))]
    gx.chunks_mut(w)
        .zip(gy.chunks_mut(w))
        .enumerate()
        .for_each(gradients);

    let mut response = vec![0f32; w * h];
    let tensor = |(y, row): (usize, &mut [f32])| {
        if y < 2 || y + 2 >= h {
            return;
        }
        for x in 2..w.saturating_sub(2) {
            let (mut a, mut b, mut c) = (0f32, 0f32, 0f32);
            for yy in y - 1..=y + 1 {
                for xx in x - 1..=x + 1 {
                    let (dx, dy) = (gx[yy * w + xx], gy[yy * w + xx]);
                    a += dx * dx;
                    b += dx * dy;
                    c += dy * dy;
                }
            }
            let half_trace = 0.5 * (a + c);
            let disc = (0.25 * (a - c) * (a - c) + b * b).sqrt();
            row[x] = half_trace - disc;
        }
    };
    #[cfg(feature = "rayon")]
    response.par_chunks_mut(w).enumerate().for_each(tensor);
    #[cfg(not(feature = "rayon"))]
    response.chunks_mut(w).enumerate().for_each(tensor);
    response
}

/// Strongest corners in the matchable area, at least `min_distance` apart,
/// strongest first.
pub(crate) fn detect_seeds(
    img: &Textured,
    max_seeds: usize,
    quality: f64,
    min_distance: f64,
) -> Vec<(usize, usize)> {
    let (w, h) = (img.width, img.height);
    if w < 5 || h < 5 || max_seeds == 0 {
        return Vec::new();
    }
    let response = min_eigen_response(img);
    let max = response.iter().copied().fold(0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let floor = (quality * max as f64) as f32;

    let mut candidates: Vec<(f32, usize)> = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let v = response[y * w + x];
            if v <= 0.0 || v < floor || !img.usable(x as i64, y as i64) {
                continue;
            }
            // 3x3 non-maximum suppression; ties keep the first in raster order
            let is_max = (y - 1..=y + 1).all(|yy| {
                (x - 1..=x + 1).all(|xx| {
                    let u = response[yy * w + xx];
                    let earlier = (yy, xx) < (y, x);
                    u < v || (u == v && !earlier)
                })
            });
            if is_max {
                candidates.push((v, y * w + x));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    // greedy minimum-distance selection on a coarse occupancy grid
    let cell = min_distance.max(1.0);
    let gw = (w as f64 / cell).ceil() as usize + 1;
    let gh = (h as f64 / cell).ceil() as usize + 1;
    let mut grid: Vec<Vec<(usize, usize)>> = vec![Vec::new(); gw * gh];
    let min_d2 = min_distance * min_distance;
    let mut seeds = Vec::new();
    for (_, idx) in candidates {
        let (x, y) = (idx % w, idx / w);
        let (cx, cy) = ((x as f64 / cell) as usize, (y as f64 / cell) as usize);
        let crowded = (cy.saturating_sub(1)..=(cy + 1).min(gh - 1)).any(|gy| {
            (cx.saturating_sub(1)..=(cx + 1).min(gw - 1)).any(|gx| {
                grid[gy * gw + gx].iter().any(|&(sx, sy)| {
                    let dx = sx as f64 - x as f64;
                    let dy = sy as f64 - y as f64;
                    dx * dx + dy * dy < min_d2
                })
            })
        });
        if crowded {
            continue;
        }
        grid[cy * gw + cx].push((x, y));
        seeds.push((x, y));
        if seeds.len() >= max_seeds {
            break;
        }
    }
    seeds
}
