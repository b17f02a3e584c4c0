use thiserror::Error;

/// Minimum number of successfully parsed rows below which a genotype file
/// is rejected outright.
pub const MIN_SNP_COUNT: usize = 1_000;

#[derive(Error, Debug)]
pub enum GenofileError {
    #[error("Unrecognised genotype file format: {0}")]
    UnrecognisedFormat(&'static str),

    #[error("Insufficient markers: only {found} valid SNPs were parsed (minimum: {MIN_SNP_COUNT})")]
    InsufficientSnps { found: usize },

    #[error("Failed to read input file")]
    Io(#[from] std::io::Error),
}
