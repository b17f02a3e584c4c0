use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Marker {0} is listed in the panel metadata but carries no genotype string")]
    MissingGenotypes(String),

    #[error("Genotype string for {rsid} holds {found} calls, expected {expected} (one per sample)")]
    LengthMismatch { rsid: String, expected: usize, found: usize },

    #[error("Genotype string for {rsid} holds invalid byte {byte:#04x} (expected '0', '1', '2' or '9')")]
    InvalidDosage { rsid: String, byte: u8 },

    #[error("Sample {id} addresses column {index}, but the panel only holds {samples} samples")]
    InvalidSampleIndex { id: String, index: usize, samples: usize },
}
