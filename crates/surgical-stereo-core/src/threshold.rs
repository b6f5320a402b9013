//! Global and local binarisation thresholds.

use crate::GrayImageView;

/// 256-bin intensity histogram.
pub fn histogram(img: &GrayImageView<'_>) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &v in img.data {
        hist[v as usize] += 1;
    }
    hist
}

/// Otsu threshold: pixels `<= t` form the lower class.
pub fn otsu_threshold(hist: &[u32; 256]) -> u8 {
    let total: f64 = hist.iter().map(|&h| h as f64).sum();
    if total < 1.0 {
        return 127;
    }

    let min_v = hist.iter().position(|&h| h > 0).unwrap_or(0);
    let max_v = hist.iter().rposition(|&h| h > 0).unwrap_or(255);
    if min_v == max_v {
        return min_v as u8;
    }
    let occupied = hist.iter().filter(|&&h| h > 0).count();
    if occupied <= 2 {
        return ((min_v + max_v) / 2) as u8;
    }

    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}
