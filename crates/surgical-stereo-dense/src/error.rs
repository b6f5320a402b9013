use surgical_stereo_core::{GeometryError, ImageError};

/// Errors returned by the dense reconstructor.
///
/// Finding no surface is not an error; it yields an empty result.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReconstructError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
