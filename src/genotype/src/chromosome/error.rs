use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChromosomeError {
    #[error("'{0}' is not a valid autosome name (expected 1..=22)")]
    InvalidAutosome(u8),

    #[error("Failed to parse '{0}' as a chromosome (expected 1..=22, X, Y or MT)")]
    ParseChromosome(String),
}
