//! Core types for stereo surgical navigation.
//!
//! Everything here is plain data plus small geometric helpers: image views,
//! the pinhole camera model with lens distortion, calibrated stereo rigs, and
//! the error taxonomy shared by the detection, triangulation and
//! reconstruction crates. No concrete image decoder is involved.

mod camera;
mod error;
mod homography;
mod image;
mod integral;
mod logger;
pub mod maths;
mod masking;
mod stereo;
mod threshold;

pub use camera::{CameraIntrinsics, Distortion, UndistortConfig};
pub use error::{Degeneracy, GeometryError, GeometryOperand, ImageError};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView, ImageView};
pub use integral::IntegralImage;
pub use masking::{mask_points, mask_stereo_points};
pub use stereo::{StereoExtrinsics, StereoRig, ORTHONORMAL_TOLERANCE};
pub use threshold::{histogram, otsu_threshold};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV};
