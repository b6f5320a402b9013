//! Correlation search along epipolar lines.

use crate::params::QuasiDenseParams;
use crate::texture::{zncc, Textured};
use nalgebra::{Matrix3, Point2, Vector2, Vector3};
use std::sync::atomic::{AtomicBool, Ordering};

/// Integer match between a left and a right pixel, as flat indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PixelMatch {
    pub left: usize,
    pub right: usize,
    pub score: f32,
}

/// Claimed-pixel masks for both images.
pub(crate) struct Claims {
    left: Vec<AtomicBool>,
    right: Vec<AtomicBool>,
}

impl Claims {
    pub fn new(left_len: usize, right_len: usize) -> Self {
        let mask = |n: usize| (0..n).map(|_| AtomicBool::new(false)).collect();
        Self {
            left: mask(left_len),
            right: mask(right_len),
        }
    }

    #[inline]
    fn left_taken(&self, i: usize) -> bool {
        self.left[i].load(Ordering::Acquire)
    }

    #[inline]
    fn right_taken(&self, i: usize) -> bool {
        self.right[i].load(Ordering::Acquire)
    }

    /// Claim both pixels of `m`, or neither.
    pub fn claim(&self, m: &PixelMatch) -> bool {
        let free = |flag: &AtomicBool| {
            flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        };
        if !free(&self.left[m.left]) {
            return false;
        }
        if !free(&self.right[m.right]) {
            self.left[m.left].store(false, Ordering::Release);
            return false;
        }
        true
    }
}

/// Epipolar line `(a, b, c)` scaled so that `a^2 + b^2 = 1`.
fn unit_line(l: Vector3<f64>) -> Option<Vector3<f64>> {
    let n = l.x.hypot(l.y);
    (n > 1e-12 && l.iter().all(|v| v.is_finite())).then(|| l / n)
}

#[inline]
fn line_distance(line: &Vector3<f64>, x: i64, y: i64) -> f64 {
    (line.x * x as f64 + line.y * y as f64 + line.z).abs()
}

#[inline]
fn chebyshev(a: (usize, usize), b: (usize, usize)) -> usize {
    a.0.abs_diff(b.0).max(a.1.abs_diff(b.1))
}

/// Usable pixels of `img` on `line` with `x_lo <= x <= x_hi`, one per step
/// along the line's dominant axis.
fn line_samples(line: &Vector3<f64>, img: &Textured, x_lo: i64, x_hi: i64) -> Vec<(usize, usize)> {
    let (a, b, c) = (line.x, line.y, line.z);
    let mut out = Vec::new();
    if b.abs() >= a.abs() {
        for x in x_lo.max(0)..=x_hi.min(img.width as i64 - 1) {
            let y = (-(a * x as f64 + c) / b).round() as i64;
            if img.usable(x, y) {
                out.push((x as usize, y as usize));
            }
        }
    } else {
        for y in 0..img.height as i64 {
            let x = (-(b * y as f64 + c) / a).round() as i64;
            if (x_lo..=x_hi).contains(&x) && img.usable(x, y) {
                out.push((x as usize, y as usize));
            }
        }
    }
    out
}

/// Highest score; the first candidate wins ties.
fn best_of(
    candidates: impl IntoIterator<Item = (usize, usize)>,
    score: impl Fn((usize, usize)) -> f32,
) -> Option<((usize, usize), f32)> {
    let mut best: Option<((usize, usize), f32)> = None;
    for c in candidates {
        let s = score(c);
        if best.is_none_or(|(_, b)| s > b) {
            best = Some((c, s));
        }
    }
    best
}

pub(crate) struct Matcher<'a> {
    left: &'a Textured,
    right: &'a Textured,
    fundamental: Matrix3<f64>,
    params: &'a QuasiDenseParams,
}

impl<'a> Matcher<'a> {
    pub fn new(
        left: &'a Textured,
        right: &'a Textured,
        fundamental: Matrix3<f64>,
        params: &'a QuasiDenseParams,
    ) -> Self {
        Self {
            left,
            right,
            fundamental,
            params,
        }
    }

    /// Epipolar line in the right image of a left pixel.
    fn right_line(&self, x: usize, y: usize) -> Option<Vector3<f64>> {
        unit_line(self.fundamental * Vector3::new(x as f64, y as f64, 1.0))
    }

    /// Epipolar line in the left image of a right pixel.
    fn left_line(&self, x: usize, y: usize) -> Option<Vector3<f64>> {
        unit_line(self.fundamental.transpose() * Vector3::new(x as f64, y as f64, 1.0))
    }

    fn score(&self, l: (usize, usize), r: (usize, usize)) -> f32 {
        zncc(self.left, l, self.right, r)
    }

    /// Exhaustive search along the epipolar line, confirmed by searching
    /// back from the best right pixel.
    pub fn match_seed(&self, (x, y): (usize, usize)) -> Option<PixelMatch> {
        if !self.left.usable(x as i64, y as i64) {
            return None;
        }
        let [d_min, d_max] = self.params.disparity_range.map(i64::from);
        let line = self.right_line(x, y)?;
        let samples = line_samples(&line, self.right, x as i64 - d_max, x as i64 - d_min);
        let (r, score) = best_of(samples, |r| self.score((x, y), r))?;
        if score < self.params.seed_correlation_threshold {
            return None;
        }

        let back = self.left_line(r.0, r.1)?;
        let samples = line_samples(&back, self.left, r.0 as i64 + d_min, r.0 as i64 + d_max);
        let (l, _) = best_of(samples, |l| self.score(l, r))?;
        (chebyshev(l, (x, y)) <= self.params.lr_tolerance).then(|| PixelMatch {
            left: self.left.index(x, y),
            right: self.right.index(r.0, r.1),
            score,
        })
    }

    /// Best unclaimed match for every unclaimed neighbour of `m`, searched
    /// within the disparity gradient of `m`'s offset.
    pub fn propose(&self, m: &PixelMatch, claims: &Claims) -> Vec<PixelMatch> {
        let (xl, yl) = self.left.coords(m.left);
        let (xr, yr) = self.right.coords(m.right);
        let n = self.params.neighborhood_radius as i64;
        let g = self.params.disparity_gradient as i64;
        let [d_min, d_max] = self.params.disparity_range.map(i64::from);
        let tol = self.params.epipolar_tolerance;

        let mut out = Vec::new();
        for dy in -n..=n {
            for dx in -n..=n {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (lx, ly) = (xl as i64 + dx, yl as i64 + dy);
                if !self.left.usable(lx, ly) {
                    continue;
                }
                let l = (lx as usize, ly as usize);
                if claims.left_taken(self.left.index(l.0, l.1)) {
                    continue;
                }
                let Some(line) = self.right_line(l.0, l.1) else {
                    continue;
                };

                let mut candidates = Vec::with_capacity(((2 * g + 1) * (2 * g + 1)) as usize);
                for ey in -g..=g {
                    for ex in -g..=g {
                        let (rx, ry) = (xr as i64 + dx + ex, yr as i64 + dy + ey);
                        let disparity = lx - rx;
                        if disparity < d_min
                            || disparity > d_max
                            || !self.right.usable(rx, ry)
                            || line_distance(&line, rx, ry) > tol
                            || claims.right_taken(self.right.index(rx as usize, ry as usize))
                        {
                            continue;
                        }
                        candidates.push((rx as usize, ry as usize));
                    }
                }
                if let Some((r, score)) = best_of(candidates, |r| self.score(l, r)) {
                    if score >= self.params.correlation_threshold {
                        out.push(PixelMatch {
                            left: self.left.index(l.0, l.1),
                            right: self.right.index(r.0, r.1),
                            score,
                        });
                    }
                }
            }
        }
        out
    }

    /// The best left pixel for `m.right` near `m.left` must be `m.left`
    /// itself, within tolerance.
    pub fn is_consistent(&self, m: &PixelMatch) -> bool {
        let (xl, yl) = self.left.coords(m.left);
        let r = self.right.coords(m.right);
        let Some(line) = self.left_line(r.0, r.1) else {
            return false;
        };
        let radius = self.params.lr_search_radius as i64;
        let tol = self.params.epipolar_tolerance;
        let mut candidates = Vec::new();
        for y in yl as i64 - radius..=yl as i64 + radius {
            for x in xl as i64 - radius..=xl as i64 + radius {
                if self.left.usable(x, y) && line_distance(&line, x, y) <= tol {
                    candidates.push((x as usize, y as usize));
                }
            }
        }
        best_of(candidates, |l| self.score(l, r))
            .is_some_and(|(l, _)| chebyshev(l, (xl, yl)) <= self.params.lr_tolerance)
    }

    /// Sub-pixel left and right points of `m`.
    ///
    /// The right point is refined by a parabola through the horizontal
    /// correlation profile, then moved onto the epipolar line of the left
    /// pixel.
    pub fn refine(&self, m: &PixelMatch) -> (Point2<f64>, Point2<f64>) {
        let (xl, yl) = self.left.coords(m.left);
        let (xr, yr) = self.right.coords(m.right);
        let left = Point2::new(xl as f64, yl as f64);
        let mut right = Point2::new(xr as f64, yr as f64);
        if !self.params.subpixel {
            return (left, right);
        }

        let (xi, yi) = (xr as i64, yr as i64);
        if self.right.usable(xi - 1, yi) && self.right.usable(xi + 1, yi) {
            let before = self.score((xl, yl), (xr - 1, yr));
            let after = self.score((xl, yl), (xr + 1, yr));
            let curvature = before - 2.0 * m.score + after;
            if curvature < 0.0 {
                let offset = (0.5 * (before - after) / curvature).clamp(-0.5, 0.5);
                right.x += offset as f64;
            }
        }
        if let Some(line) = self.right_line(xl, yl) {
            let d = line.x * right.x + line.y * right.y + line.z;
            right -= d * Vector2::new(line.x, line.y);
        }
        (left, right)
    }
}
