use crate::matcher::{Claims, Matcher, PixelMatch};
use crate::propagate::propagate;
use crate::seeds::detect_seeds;
use crate::texture::Textured;
use crate::{QuasiDenseParams, ReconstructError, StereoMatch, MIN_BASELINE};
use log::{debug, info};
use surgical_stereo_core::{ImageError, ImageView, StereoRig};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Structural checks shared by every entry point.
pub(crate) fn check_inputs(
    left: &ImageView<'_>,
    right: &ImageView<'_>,
    rig: &StereoRig,
) -> Result<(), ReconstructError> {
    left.validate()?;
    right.validate()?;
    if left.size() != right.size() {
        return Err(ImageError::SizeMismatch {
            left: left.size(),
            right: right.size(),
        }
        .into());
    }
    rig.require_baseline(MIN_BASELINE)?;
    Ok(())
}

/// Accepted correspondences sorted by left pixel index.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(left, right, rig, params),
        fields(width = left.width, height = left.height)
    )
)]
pub(crate) fn dense_matches(
    left: &ImageView<'_>,
    right: &ImageView<'_>,
    rig: &StereoRig,
    params: &QuasiDenseParams,
) -> Result<Vec<StereoMatch>, ReconstructError> {
    check_inputs(left, right, rig)?;

    let textured = |img: &ImageView<'_>| {
        Textured::new(
            img.to_gray(),
            params.window_radius,
            params.border,
            params.texture_threshold,
        )
    };
    let left_tex = textured(left);
    let right_tex = textured(right);

    let seeds = detect_seeds(
        &left_tex,
        params.max_seeds,
        params.seed_quality,
        params.seed_min_distance,
    );
    if seeds.is_empty() {
        info!("no seed corners in the left image");
        return Ok(Vec::new());
    }

    let matcher = Matcher::new(&left_tex, &right_tex, rig.fundamental(), params);

    #[cfg(feature = "rayon")]
    let seed_matches: Vec<PixelMatch> = seeds.par_iter().filter_map(|&s| matcher.match_seed(s)).collect();
    #[cfg(not(feature = "rayon"))]
    let seed_matches: Vec<PixelMatch> = seeds.iter().filter_map(|&s| matcher.match_seed(s)).collect();
    debug!("{} of {} seeds matched", seed_matches.len(), seeds.len());

    let claims = Claims::new(left_tex.width * left_tex.height, right_tex.width * right_tex.height);
    let mut grown = propagate(&matcher, &claims, seed_matches);

    if params.lr_check {
        let before = grown.len();
        #[cfg(feature = "rayon")]
        {
            grown = grown.into_par_iter().filter(|m| matcher.is_consistent(m)).collect();
        }
        #[cfg(not(feature = "rayon"))]
        grown.retain(|m| matcher.is_consistent(m));
        debug!("left-right check kept {} of {}", grown.len(), before);
    }

    grown.sort_by_key(|m| m.left);

    let refine = |m: &PixelMatch| {
        let (left, right) = matcher.refine(m);
        StereoMatch {
            left,
            right,
            score: m.score,
        }
    };
    #[cfg(feature = "rayon")]
    let matches: Vec<StereoMatch> = grown.par_iter().map(refine).collect();
    #[cfg(not(feature = "rayon"))]
    let matches: Vec<StereoMatch> = grown.iter().map(refine).collect();

    info!("{} dense correspondences", matches.len());
    Ok(matches)
}
