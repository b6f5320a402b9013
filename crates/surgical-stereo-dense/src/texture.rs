//! Per-pixel window statistics and zero-mean normalised cross-correlation.

use surgical_stereo_core::{GrayImage, IntegralImage};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A grey image with the mean and standard deviation of the matching
/// window around every pixel.
pub(crate) struct Textured {
    pub width: usize,
    pub height: usize,
    gray: Vec<u8>,
    mean: Vec<f32>,
    std: Vec<f32>,
    radius: usize,
    /// Pixels closer than this to the edge are never matched.
    margin: usize,
    min_std: f32,
}

impl Textured {
    pub fn new(image: GrayImage, radius: usize, border: usize, min_std: f32) -> Self {
        let view = image.view();
        let integral = IntegralImage::new(&view);
        let (width, height) = (image.width, image.height);
        let mut mean = vec![0f32; width * height];
        let mut std = vec![0f32; width * height];

        let fill = |(y, (m_row, s_row)): (usize, (&mut [f32], &mut [f32]))| {
            for x in 0..width {
                let (m, v) = integral.window_stats(x, y, radius);
                m_row[x] = m as f32;
                s_row[x] = v.sqrt() as f32;
            }
        };
        #[cfg(feature = "rayon")]
        mean.par_chunks_mut(width)
            .zip(std.par_chunks_mut(width))
            .enumerate()
            .for_each(fill);
        #[cfg(not(feature = "rayon"))]
        mean.chunks_mut(width)
            .zip(std.chunks_mut(width))
            .enumerate()
            .for_each(fill);

        Self {
            width,
            height,
            gray: image.data,
            mean,
            std,
            radius,
            margin: border.max(radius),
            min_std,
        }
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    #[inline]
    pub fn inside(&self, x: i64, y: i64) -> bool {
        let m = self.margin as i64;
        x >= m && y >= m && x + m < self.width as i64 && y + m < self.height as i64
    }

    /// Inside the matching area and textured enough to correlate.
    #[inline]
    pub fn usable(&self, x: i64, y: i64) -> bool {
        self.inside(x, y) && self.std[self.index(x as usize, y as usize)] >= self.min_std
    }

    #[inline]
    pub fn gray(&self, x: usize, y: usize) -> u8 {
        self.gray[self.index(x, y)]
    }
}

/// ZNCC between the window at `a` in `left` and at `b` in `right`.
///
/// Both windows must be [`Textured::usable`]; the result lies in `[-1, 1]`.
pub(crate) fn zncc(left: &Textured, a: (usize, usize), right: &Textured, b: (usize, usize)) -> f32 {
    let r = left.radius;
    let n = ((2 * r + 1) * (2 * r + 1)) as f64;
    let mut cross = 0u64;
    for dy in 0..=2 * r {
        let la = left.index(a.0 - r, a.1 + dy - r);
        let rb = right.index(b.0 - r, b.1 + dy - r);
        let lrow = &left.gray[la..la + 2 * r + 1];
        let rrow = &right.gray[rb..rb + 2 * r + 1];
        cross += lrow
            .iter()
            .zip(rrow)
            .map(|(&p, &q)| p as u64 * q as u64)
            .sum::<u64>();
    }
    let ia = left.index(a.0, a.1);
    let ib = right.index(b.0, b.1);
    let (ma, sa) = (left.mean[ia] as f64, left.std[ia] as f64);
    let (mb, sb) = (right.mean[ib] as f64, right.std[ib] as f64);
    let denom = sa * sb;
    if denom <= 0.0 {
        return 0.0;
    }
    let cov = cross as f64 / n - ma * mb;
    (cov / denom).clamp(-1.0, 1.0) as f32
}
