use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Allele;

/// A diploid genotype call: the two observed alleles at one site.
/// Homozygous calls carry the same base twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenotypeCall {
    pub allele1: Allele,
    pub allele2: Allele,
}

impl GenotypeCall {
    #[must_use]
    pub fn new(allele1: Allele, allele2: Allele) -> Self {
        Self { allele1, allele2 }
    }

    #[must_use]
    pub fn is_homozygous(self) -> bool {
        self.allele1 == self.allele2
    }

    /// Number of alleles within this call equal to `target` (0, 1 or 2).
    #[must_use]
    pub fn count_of(self, target: Allele) -> u8 {
        u8::from(self.allele1 == target) + u8::from(self.allele2 == target)
    }

    /// `true` if both alleles belong to the `{reference, alternate}` base set.
    #[must_use]
    pub fn matches(self, reference: Allele, alternate: Allele) -> bool {
        let in_set = |allele| allele == reference || allele == alternate;
        in_set(self.allele1) && in_set(self.allele2)
    }

    /// The same call, typed on the opposite strand.
    #[must_use]
    pub fn complement(self) -> Self {
        Self::new(self.allele1.complement(), self.allele2.complement())
    }
}

impl Display for GenotypeCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.allele1, self.allele2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_of_matches_zygosity() {
        let het = GenotypeCall::new(Allele::A, Allele::G);
        assert_eq!(het.count_of(Allele::G), 1);
        assert_eq!(het.count_of(Allele::A), 1);
        assert_eq!(het.count_of(Allele::C), 0);

        let hom = GenotypeCall::new(Allele::G, Allele::G);
        assert_eq!(hom.count_of(Allele::G), 2);
        assert!(hom.is_homozygous());
    }

    #[test]
    fn matches_requires_both_alleles_in_set() {
        let call = GenotypeCall::new(Allele::A, Allele::G);
        assert!(call.matches(Allele::A, Allele::G));
        assert!(call.matches(Allele::G, Allele::A));
        assert!(!call.matches(Allele::A, Allele::C));
    }

    #[test]
    fn complement_round_trips() {
        let call = GenotypeCall::new(Allele::A, Allele::C);
        assert_eq!(call.complement(), GenotypeCall::new(Allele::T, Allele::G));
        assert_eq!(call.complement().complement(), call);
    }
}
