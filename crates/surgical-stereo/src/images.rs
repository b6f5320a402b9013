//! Adapters from the `image` crate and end-to-end helpers.

use crate::Error;
use ::image::{DynamicImage, GrayImage, RgbImage};
use log::debug;
use std::path::Path;
use surgical_stereo_core::{CameraIntrinsics, Distortion, GrayImageView, ImageError, ImageView, StereoRig};
use surgical_stereo_dense::{PointCloud, ReconstructionConfig};
use surgical_stereo_dots::{DotDetection, DotDetector};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Borrow an `image::GrayImage` as a core view.
pub fn gray_view(img: &GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Borrow an `image::RgbImage` as a three-channel view.
pub fn rgb_view(img: &RgbImage) -> ImageView<'_> {
    ImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        channels: 3,
        data: img.as_raw(),
    }
}

/// Borrow 8-bit grey or RGB images; other pixel types need
/// [`to_supported`] first.
pub fn image_view(img: &DynamicImage) -> Result<ImageView<'_>, ImageError> {
    match img {
        DynamicImage::ImageLuma8(g) => Ok(gray_view(g).as_image()),
        DynamicImage::ImageRgb8(c) => Ok(rgb_view(c)),
        other => Err(ImageError::Channels {
            expected: "8-bit luma or rgb",
            got: other.color().channel_count() as usize,
        }),
    }
}

/// Convert to 8-bit grey when the source has one colour channel, else to
/// 8-bit RGB. Alpha is dropped.
pub fn to_supported(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        other if other.color().has_color() => DynamicImage::ImageRgb8(other.to_rgb8()),
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}

/// Decode an image file into a supported pixel layout.
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, Error> {
    let img = ::image::open(path)?;
    Ok(to_supported(img))
}

/// Run `detector` on an `image::GrayImage`.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(img, intrinsics, distortion, detector),
        fields(width = img.width(), height = img.height())
    )
)]
pub fn detect_dots_in_image(
    img: &GrayImage,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
    detector: &DotDetector,
) -> Result<DotDetection, Error> {
    Ok(detector.detect(&gray_view(img), intrinsics, distortion)?)
}

/// Reconstruct from two decoded images of any supported layout.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(left, right, rig, config),
        fields(width = left.width(), height = left.height())
    )
)]
pub fn reconstruct_images(
    left: &DynamicImage,
    right: &DynamicImage,
    rig: &StereoRig,
    config: &ReconstructionConfig,
) -> Result<PointCloud, Error> {
    let cloud = surgical_stereo_dense::reconstruct(&image_view(left)?, &image_view(right)?, rig, config)?;
    debug!("{} points, {} columns", cloud.len(), cloud.columns());
    Ok(cloud)
}
