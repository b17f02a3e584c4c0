use thiserror::Error;

#[derive(Error, Debug)]
pub enum AimError {
    #[error("Marker {0} carries an allele frequency outside the [0, 1] range")]
    FrequencyOutOfRange(String),
}
