use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuperpopError {
    #[error("'{0}' is not a continental superpopulation code (expected EUR, AFR, EAS, SAS or AMR)")]
    ParseSuperpop(String),

    #[error("Superpopulation index {0} is out of range (expected 0..5)")]
    InvalidIndex(usize),

    #[error("Proportion component lies outside the [0, 1] range")]
    ComponentOutOfRange,

    #[error("Proportions sum to {0}, expected 1.0 within tolerance")]
    DoesNotSumToOne(f64),

    #[error("Cannot normalise a vector with total mass {0}")]
    Unnormalisable(f64),
}
