//! Filtering point lists by binary masks.

use crate::GrayImageView;
use nalgebra::Point2;

#[inline]
fn inside_mask(mask: &GrayImageView<'_>, p: &Point2<f64>) -> bool {
    if p.x.is_nan() || p.y.is_nan() || p.x < 0.0 || p.y < 0.0 {
        return false;
    }
    let (x, y) = (p.x as usize, p.y as usize);
    x < mask.width && y < mask.height && mask.get(x, y) != 0
}

/// Keep the points that land on non-zero mask pixels, preserving order.
pub fn mask_points(points: &[Point2<f64>], mask: &GrayImageView<'_>) -> Vec<Point2<f64>> {
    points
        .iter()
        .copied()
        .filter(|p| inside_mask(mask, p))
        .collect()
}

/// Keep left/right pairs whose left point lies on the left mask and right
/// point on the right mask.
pub fn mask_stereo_points(
    pairs: &[(Point2<f64>, Point2<f64>)],
    left_mask: &GrayImageView<'_>,
    right_mask: &GrayImageView<'_>,
) -> Vec<(Point2<f64>, Point2<f64>)> {
    pairs
        .iter()
        .copied()
        .filter(|(l, r)| inside_mask(left_mask, l) && inside_mask(right_mask, r))
        .collect()
}
