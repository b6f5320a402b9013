//! High-level facade for the `surgical-stereo-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core types and the three algorithm crates
//! - a single [`Error`] type covering every stage
//! - [`io`]: JSON configuration and the plain-text matrix files used for
//!   calibrations, point lists and target models
//! - (feature `image`) adapters from the `image` crate and end-to-end
//!   helpers
//!
//! ## Quickstart
//!
//! ```no_run
//! use surgical_stereo::{io, triangulate, TriangulationMethod};
//!
//! # fn main() -> Result<(), surgical_stereo::Error> {
//! let rig = io::load_stereo_rig("left_intrinsic.txt", "right_intrinsic.txt", "l2r.txt")?;
//! let pairs = io::load_correspondences("image_points.txt")?;
//! let points = triangulate::triangulate(&pairs, &rig, TriangulationMethod::Hartley)?;
//! io::write_points_txt("points.txt", &points)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `surgical_stereo::core`: images, cameras, stereo rigs, errors.
//! - `surgical_stereo::triangulate`: midpoint and Hartley–Sturm triangulation.
//! - `surgical_stereo::dots`: dot-grid target detection.
//! - `surgical_stereo::dense`: quasi-dense surface reconstruction.
//! - `surgical_stereo::images` (feature `image`): `image` crate helpers.

pub use surgical_stereo_core as core;
pub use surgical_stereo_dense as dense;
pub use surgical_stereo_dots as dots;
pub use surgical_stereo_triangulate as triangulate;

pub use surgical_stereo_core::{
    CameraIntrinsics, Degeneracy, Distortion, GeometryError, GrayImageView, ImageError, ImageView,
    StereoExtrinsics, StereoRig,
};
pub use surgical_stereo_dense::{PointCloud, ReconstructError, ReconstructionConfig};
pub use surgical_stereo_dots::{DotDetectError, DotDetection, DotDetector, DotModel, ModelError};
pub use surgical_stereo_triangulate::{Correspondence, TriangulatedPoints, TriangulationMethod};

pub mod io;

#[cfg(feature = "image")]
pub mod images;

/// Any failure of the facade helpers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    DotDetect(#[from] DotDetectError),
    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
    #[error(transparent)]
    Io(#[from] io::IoError),
    #[error(transparent)]
    Matrix(#[from] io::MatrixError),
    #[error("dot model rows need 6 columns, got {got}")]
    ModelColumns { got: usize },
    #[cfg(feature = "image")]
    #[error(transparent)]
    Decode(#[from] ::image::ImageError),
}
