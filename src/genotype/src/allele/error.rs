use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleError {
    #[error("'{0}' is not a valid nucleotide (expected one of A, C, G, T)")]
    InvalidBase(char),
}
