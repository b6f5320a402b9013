//! Summed-area tables for constant-time window statistics.

use crate::GrayImageView;

/// Integral images of intensity and squared intensity.
///
/// Tables are `(width + 1) x (height + 1)` with a zero first row/column.
#[derive(Clone, Debug)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImageView<'_>) -> Self {
        let stride = img.width + 1;
        let mut sum = vec![0u64; stride * (img.height + 1)];
        let mut sum_sq = vec![0u64; stride * (img.height + 1)];
        for y in 0..img.height {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..img.width {
                let v = img.get(x, y) as u64;
                row += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sum_sq[i] = sum_sq[i - stride] + row_sq;
            }
        }
        Self {
            width: img.width,
            height: img.height,
            sum,
            sum_sq,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn rect(table: &[u64], stride: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    /// Sum and squared sum over `[x0, x1) x [y0, y1)`, clamped to the image.
    #[inline]
    pub fn rect_sums(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> (u64, u64, usize) {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return (0, 0, 0);
        }
        let stride = self.width + 1;
        (
            Self::rect(&self.sum, stride, x0, y0, x1, y1),
            Self::rect(&self.sum_sq, stride, x0, y0, x1, y1),
            (x1 - x0) * (y1 - y0),
        )
    }

    /// Mean and variance of the `(2r+1)^2` window centred on `(cx, cy)`,
    /// truncated at the borders.
    #[inline]
    pub fn window_stats(&self, cx: usize, cy: usize, r: usize) -> (f64, f64) {
        let (s, s2, n) = self.rect_sums(
            cx.saturating_sub(r),
            cy.saturating_sub(r),
            cx + r + 1,
            cy + r + 1,
        );
        if n == 0 {
            return (0.0, 0.0);
        }
        let n = n as f64;
        let mean = s as f64 / n;
        let var = (s2 as f64 / n - mean * mean).max(0.0);
        (mean, var)
    }
}
