use thiserror::Error;

/// Minimum marker intersection below which an inference call is refused.
pub const MIN_OVERLAP: usize = 100;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Insufficient overlapping markers: found {found}, need at least {required}")]
    InsufficientMarkers { found: usize, required: usize },

    #[error("Reference data unavailable: {0}")]
    ReferenceUnavailable(String),

    #[error("EM solver hit the iteration cap with the estimate still moving (last delta: {delta:.2e})")]
    NumericalInstability { delta: f64 },

    #[error("Inference was cancelled")]
    Cancelled,
}
