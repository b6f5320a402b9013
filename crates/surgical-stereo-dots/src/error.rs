use surgical_stereo_core::ImageError;

/// Invalid dot model or fiducial set.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("dot model is empty")]
    Empty,
    #[error("dot model id {0} appears more than once")]
    DuplicateId(u32),
    #[error("dot model point {id} has non-finite coordinates")]
    NonFinite { id: u32 },
    #[error("dot model row {row} has invalid id {value}")]
    InvalidId { row: usize, value: f64 },
    #[error("expected {expected} fiducial ids, got {got}")]
    FiducialCount { expected: usize, got: usize },
    #[error("fiducial id {0} is not part of the model")]
    FiducialOutOfRange(u32),
    #[error("fiducial id {0} is listed twice")]
    DuplicateFiducial(u32),
}

/// Errors returned by the dot detector.
///
/// Failing to find the target is not an error; it yields an empty detection.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DotDetectError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Model(#[from] ModelError),
}
