//! Segmentation of dot candidates: binarisation, 8-connected labelling and
//! shape moments.

use crate::params::{BlobParams, Polarity, ThresholdMode};
use nalgebra::Point2;
use surgical_stereo_core::{histogram, otsu_threshold, GrayImageView, IntegralImage};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A connected foreground region with its shape statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    /// Mean pixel position, pixel centres at integer coordinates.
    pub centroid: Point2<f64>,
    pub area: usize,
    /// Major over minor axis of the second-moment ellipse.
    pub axis_ratio: f64,
    /// Area over bounding-box area.
    pub fill_ratio: f64,
    /// `[x_min, y_min, x_max, y_max]`, inclusive.
    pub bbox: [usize; 4],
}

/// Foreground mask, one byte per pixel (`1` = dot).
pub(crate) fn binarize(img: &GrayImageView<'_>, params: &BlobParams) -> Vec<u8> {
    let dark = params.polarity == Polarity::Dark;
    let mut mask = vec![0u8; img.width * img.height];
    if mask.is_empty() {
        return mask;
    }

    match params.threshold {
        ThresholdMode::Otsu => {
            let t = otsu_threshold(&histogram(img));
            let classify = |(y, row): (usize, &mut [u8])| {
                for (x, m) in row.iter_mut().enumerate() {
                    let v = img.get(x, y);
                    *m = u8::from(if dark { v <= t } else { v > t });
                }
            };
            #[cfg(feature = "rayon")]
            mask.par_chunks_mut(img.width).enumerate().for_each(classify);
            #[cfg(not(feature = "rayon"))]
            mask.chunks_mut(img.width).enumerate().for_each(classify);
        }
        ThresholdMode::Adaptive { radius, offset } => {
            let integral = IntegralImage::new(img);
            let offset = offset as f64;
            let classify = |(y, row): (usize, &mut [u8])| {
                for (x, m) in row.iter_mut().enumerate() {
                    let (mean, _) = integral.window_stats(x, y, radius);
                    let v = img.get(x, y) as f64;
                    *m = u8::from(if dark {
                        v < mean - offset
                    } else {
                        v > mean + offset
                    });
                }
            };
            #[cfg(feature = "rayon")]
            mask.par_chunks_mut(img.width).enumerate().for_each(classify);
            #[cfg(not(feature = "rayon"))]
            mask.chunks_mut(img.width).enumerate().for_each(classify);
        }
    }
    mask
}

struct DisjointSet {
    parent: Vec<u32>,
}

impl DisjointSet {
    fn new() -> Self {
        // label 0 is background
        Self { parent: vec![0] }
    }

    fn make(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        label
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    // smaller root wins so labels stay in raster order
    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi as usize] = lo;
        }
    }
}

#[derive(Clone, Copy)]
struct Moments {
    n: usize,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
    bbox: [usize; 4],
}

impl Moments {
    fn new(x: usize, y: usize) -> Self {
        Self {
            n: 0,
            sx: 0.0,
            sy: 0.0,
            sxx: 0.0,
            syy: 0.0,
            sxy: 0.0,
            bbox: [x, y, x, y],
        }
    }

    fn add(&mut self, x: usize, y: usize) {
        let (fx, fy) = (x as f64, y as f64);
        self.n += 1;
        self.sx += fx;
        self.sy += fy;
        self.sxx += fx * fx;
        self.syy += fy * fy;
        self.sxy += fx * fy;
        self.bbox[0] = self.bbox[0].min(x);
        self.bbox[1] = self.bbox[1].min(y);
        self.bbox[2] = self.bbox[2].max(x);
        self.bbox[3] = self.bbox[3].max(y);
    }

    fn blob(&self) -> Blob {
        let n = self.n as f64;
        let (mx, my) = (self.sx / n, self.sy / n);
        // each pixel is a unit square, which adds 1/12 to both variances
        let cxx = self.sxx / n - mx * mx + 1.0 / 12.0;
        let cyy = self.syy / n - my * my + 1.0 / 12.0;
        let cxy = self.sxy / n - mx * my;
        let half_trace = 0.5 * (cxx + cyy);
        let disc = (0.25 * (cxx - cyy).powi(2) + cxy * cxy).sqrt();
        let major = half_trace + disc;
        let minor = (half_trace - disc).max(f64::MIN_POSITIVE);
        let [x0, y0, x1, y1] = self.bbox;
        let box_area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
        Blob {
            centroid: Point2::new(mx, my),
            area: self.n,
            axis_ratio: (major / minor).sqrt(),
            fill_ratio: n / box_area,
            bbox: self.bbox,
        }
    }
}

/// 8-connected components of `mask`, ordered by their first pixel in raster
/// order.
pub(crate) fn label_components(mask: &[u8], width: usize, height: usize) -> Vec<Blob> {
    let mut labels = vec![0u32; mask.len()];
    let mut sets = DisjointSet::new();

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if mask[i] == 0 {
                continue;
            }
            let mut current = 0u32;
            let mut visit = |label: u32, sets: &mut DisjointSet| {
                if label == 0 {
                    return;
                }
                if current == 0 {
                    current = label;
                } else {
                    sets.union(current, label);
                    current = current.min(label);
                }
            };
            if x > 0 {
                visit(labels[i - 1], &mut sets);
            }
            if y > 0 {
                let up = i - width;
                if x > 0 {
                    visit(labels[up - 1], &mut sets);
                }
                visit(labels[up], &mut sets);
                if x + 1 < width {
                    visit(labels[up + 1], &mut sets);
                }
            }
            labels[i] = if current == 0 { sets.make() } else { current };
        }
    }

    let mut slot = vec![usize::MAX; sets.parent.len()];
    let mut moments: Vec<Moments> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let label = labels[y * width + x];
            if label == 0 {
                continue;
            }
            let root = sets.find(label) as usize;
            if slot[root] == usize::MAX {
                slot[root] = moments.len();
                moments.push(Moments::new(x, y));
            }
            moments[slot[root]].add(x, y);
        }
    }
    moments.iter().map(Moments::blob).collect()
}

/// Blobs that look like dots.
///
/// Absolute shape limits come first, then blobs much smaller than the
/// median survivor are dropped. Blobs touching the image border are
/// discarded because their centroids are biased.
pub(crate) fn filter_blobs(
    blobs: Vec<Blob>,
    width: usize,
    height: usize,
    params: &BlobParams,
) -> Vec<Blob> {
    let shaped: Vec<Blob> = blobs
        .into_iter()
        .filter(|b| {
            let [x0, y0, x1, y1] = b.bbox;
            let interior = x0 > 0 && y0 > 0 && x1 + 1 < width && y1 + 1 < height;
            interior
                && b.area >= params.min_area
                && b.area <= params.max_area
                && b.axis_ratio <= params.max_axis_ratio
                && b.fill_ratio >= params.min_fill_ratio
        })
        .collect();

    let Some(median) = median_area(&shaped) else {
        return shaped;
    };
    let min_area = params.min_relative_area * median;
    shaped
        .into_iter()
        .filter(|b| b.area as f64 >= min_area)
        .collect()
}

pub(crate) fn median_area(blobs: &[Blob]) -> Option<f64> {
    if blobs.is_empty() {
        return None;
    }
    let mut areas: Vec<usize> = blobs.iter().map(|b| b.area).collect();
    areas.sort_unstable();
    Some(areas[areas.len() / 2] as f64)
}

/// Indices of the four largest blobs, if all four are clearly larger than a
/// typical dot.
pub(crate) fn pick_fiducials(blobs: &[Blob], params: &BlobParams) -> Option<[usize; 4]> {
    let median = median_area(blobs)?;
    let mut order: Vec<usize> = (0..blobs.len()).collect();
    // stable: equal areas keep raster order
    order.sort_by(|&a, &b| blobs[b].area.cmp(&blobs[a].area));
    let top: [usize; 4] = order.get(..4)?.try_into().ok()?;
    let threshold = params.fiducial_area_ratio * median;
    top.iter()
        .all(|&i| blobs[i].area as f64 >= threshold)
        .then_some(top)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc_mask(width: usize, height: usize, discs: &[(f64, f64, f64)]) -> Vec<u8> {
        let mut mask = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let inside = discs.iter().any(|&(cx, cy, r)| {
                    let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                    dx * dx + dy * dy <= r * r
                });
                mask[y * width + x] = u8::from(inside);
            }
        }
        mask
    }

    #[test]
    fn components_are_found_in_raster_order() {
        let mask = disc_mask(60, 40, &[(40.0, 10.0, 4.0), (10.0, 25.0, 5.0)]);
        let blobs = label_components(&mask, 60, 40);
        assert_eq!(blobs.len(), 2);
        assert!((blobs[0].centroid - Point2::new(40.0, 10.0)).norm() < 1e-9);
        assert!((blobs[1].centroid - Point2::new(10.0, 25.0)).norm() < 1e-9);
        assert!(blobs[1].area > blobs[0].area);
        assert!(blobs[0].axis_ratio < 1.1);
    }

    #[test]
    fn u_shape_merges_into_one_component() {
        // two vertical strokes joined only at the bottom
        let (w, h) = (10, 8);
        let mut mask = vec![0u8; w * h];
        for y in 1..7 {
            mask[y * w + 2] = 1;
            mask[y * w + 7] = 1;
        }
        for x in 2..8 {
            mask[6 * w + x] = 1;
        }
        let blobs = label_components(&mask, w, h);
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 16);
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mask = vec![1, 0, 0, 0, 1, 0, 0, 0, 1];
        assert_eq!(label_components(&mask, 3, 3).len(), 1);
    }

    #[test]
    fn filters_drop_lines_and_specks() {
        let (w, h) = (80, 40);
        let mut mask = disc_mask(w, h, &[(15.0, 15.0, 5.0), (35.0, 15.0, 5.0), (55.0, 15.0, 5.0)]);
        // a thin bar and a speck
        for x in 10..70 {
            mask[32 * w + x] = 1;
        }
        mask[5 * w + 70] = 1;
        let blobs = label_components(&mask, w, h);
        assert_eq!(blobs.len(), 5);
        let dots = filter_blobs(blobs, w, h, &BlobParams::default());
        assert_eq!(dots.len(), 3);
    }

    #[test]
    fn fiducials_need_four_large_blobs() {
        let small = Blob {
            centroid: Point2::origin(),
            area: 50,
            axis_ratio: 1.0,
            fill_ratio: 0.78,
            bbox: [0, 0, 7, 7],
        };
        let big = Blob { area: 200, ..small };
        let mut blobs = vec![small; 10];
        blobs[2] = big;
        blobs[5] = big;
        blobs[7] = big;
        let params = BlobParams::default();
        assert_eq!(pick_fiducials(&blobs, &params), None);
        blobs[9] = big;
        assert_eq!(pick_fiducials(&blobs, &params), Some([2, 5, 7, 9]));
    }

    #[test]
    fn adaptive_threshold_finds_dark_dots() {
        let (w, h) = (40, 30);
        let discs = disc_mask(w, h, &[(20.0, 15.0, 4.0)]);
        let data: Vec<u8> = discs.iter().map(|&m| if m == 1 { 30 } else { 200 }).collect();
        let img = GrayImageView::new(w, h, &data).unwrap();
        let mask = binarize(&img, &BlobParams::default());
        assert_eq!(mask, discs);

        let otsu = BlobParams {
            threshold: ThresholdMode::Otsu,
            ..BlobParams::default()
        };
        assert_eq!(binarize(&img, &otsu), discs);
    }
}
