use thiserror::Error;

#[derive(Error, Debug)]
pub enum AimBuildError {
    #[error("Variant service responded with HTTP {status}")]
    ExternalService { status: u16 },

    #[error("Variant service kept throttling after {0} retries")]
    Throttled(u32),

    #[error("Failed to reach the variant service")]
    Transport(#[from] reqwest::Error),

    #[error("Seed list {0} holds no usable rsids")]
    EmptySeedList(String),
}
