mod allele;
pub use allele::Allele;

mod call;
pub use call::GenotypeCall;

mod chromosome;
pub use chromosome::Chromosome;

mod confidence;
pub use confidence::Confidence;

pub mod dosage;

mod snp;
pub use snp::SnpRecord;

mod superpop;
pub use superpop::{Superpop, SuperpopMap, Proportions, PROPORTION_TOLERANCE};
