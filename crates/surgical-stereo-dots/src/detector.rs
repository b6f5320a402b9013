use crate::blobs::{binarize, filter_blobs, label_components, pick_fiducials, Blob};
use crate::grid::fit_grid;
use crate::model::{DotModel, FiducialSet};
use crate::{DetectedDot, DotDetectError, DotDetection, DotDetectorParams, ModelError};
use log::{debug, warn};
use nalgebra::Point2;
use surgical_stereo_core::{CameraIntrinsics, Distortion, GrayImageView, ImageError, ImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Dot-grid detector for one target model.
#[derive(Clone, Debug)]
pub struct DotDetector {
    model: DotModel,
    fiducials: FiducialSet,
    params: DotDetectorParams,
}

impl DotDetector {
    /// Create a detector, validating the fiducial ids against the model.
    pub fn new(
        model: DotModel,
        fiducial_ids: &[u32],
        params: DotDetectorParams,
    ) -> Result<Self, ModelError> {
        let fiducials = FiducialSet::new(&model, fiducial_ids)?;
        Ok(Self {
            model,
            fiducials,
            params,
        })
    }

    #[inline]
    pub fn model(&self) -> &DotModel {
        &self.model
    }

    #[inline]
    pub fn fiducials(&self) -> &FiducialSet {
        &self.fiducials
    }

    #[inline]
    pub fn params(&self) -> &DotDetectorParams {
        &self.params
    }

    /// Detect and identify the target in a grey image.
    pub fn detect(
        &self,
        image: &GrayImageView<'_>,
        intrinsics: &CameraIntrinsics,
        distortion: &Distortion,
    ) -> Result<DotDetection, DotDetectError> {
        run(
            image,
            intrinsics,
            distortion,
            &self.model,
            &self.fiducials,
            &self.params,
        )
    }

    /// Like [`DotDetector::detect`] for a generic view, which must have a
    /// single channel.
    pub fn detect_image(
        &self,
        image: &ImageView<'_>,
        intrinsics: &CameraIntrinsics,
        distortion: &Distortion,
    ) -> Result<DotDetection, DotDetectError> {
        image.validate()?;
        let gray = image.as_gray().ok_or(ImageError::Channels {
            expected: "1",
            got: image.channels,
        })?;
        self.detect(&gray, intrinsics, distortion)
    }
}

/// One-shot detection without building a [`DotDetector`].
pub fn detect_dots(
    image: &GrayImageView<'_>,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    model: &DotModel,
    fiducial_ids: &[u32],
    params: &DotDetectorParams,
) -> Result<DotDetection, DotDetectError> {
    let fiducials = FiducialSet::new(model, fiducial_ids)?;
    run(image, intrinsics, distortion, model, &fiducials, params)
}

#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(image, intrinsics, distortion, model, fiducials, params),
        fields(width = image.width, height = image.height, model_len = model.len())
    )
)]
fn run(
    image: &GrayImageView<'_>,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    model: &DotModel,
    fiducials: &FiducialSet,
    params: &DotDetectorParams,
) -> Result<DotDetection, DotDetectError> {
    image.validate()?;

    let mask = binarize(image, &params.blobs);
    let blobs = label_components(&mask, image.width, image.height);
    let raw_count = blobs.len();
    let blobs = filter_blobs(blobs, image.width, image.height, &params.blobs);
    debug!("{} components, {} dot candidates", raw_count, blobs.len());

    // undistortion can fail far outside the calibrated field of view
    let candidates: Vec<(Blob, Point2<f64>)> = blobs
        .into_iter()
        .filter_map(|b| {
            distortion
                .undistort_pixel_with(intrinsics, b.centroid, params.grid.undistort)
                .map(|u| (b, u))
        })
        .collect();

    let shapes: Vec<Blob> = candidates.iter().map(|(b, _)| *b).collect();
    let Some(fid) = pick_fiducials(&shapes, &params.blobs) else {
        warn!(
            "fewer than {} fiducial dots among {} candidates",
            FiducialSet::COUNT,
            candidates.len()
        );
        return Ok(DotDetection::default());
    };

    let points: Vec<Point2<f64>> = candidates.iter().map(|(_, u)| *u).collect();
    let Some(fit) = fit_grid(model, fiducials, &points, fid, &params.grid) else {
        warn!("no fiducial assignment explains the dot candidates");
        return Ok(DotDetection::default());
    };

    let dots: Vec<DetectedDot> = fit
        .associations
        .iter()
        .map(|a| {
            let m = &model.points()[a.model];
            let (blob, undistorted) = &candidates[a.candidate];
            DetectedDot {
                id: m.id,
                image: blob.centroid,
                undistorted: *undistorted,
                model: m.position,
            }
        })
        .collect();
    debug!("identified {} of {} model dots", dots.len(), model.len());

    Ok(DotDetection {
        dots,
        homography: Some(fit.homography),
    })
}
