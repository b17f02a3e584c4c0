pub mod read;
pub mod write;

pub use read::aim::{AimDatabase, AimMarker, AimMetadata};
pub use read::panel::{PopulationInfo, ReferencePanel, SampleInfo};
