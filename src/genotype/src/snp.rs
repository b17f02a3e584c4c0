use crate::{Chromosome, GenotypeCall};

/// A single normalised genotype row out of a consumer SNP file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnpRecord {
    pub rsid      : String,
    pub chromosome: Chromosome,
    pub position  : u64,
    pub call      : GenotypeCall,
}

impl SnpRecord {
    #[must_use]
    pub fn new(rsid: String, chromosome: Chromosome, position: u64, call: GenotypeCall) -> Self {
        Self { rsid, chromosome, position, call }
    }
}
