use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

mod error;
pub use error::AlleleError;

/// A single observed nucleotide. Missing and indel calls never make it
/// past the file parser, hence no `N`/`-` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Allele {
    A,
    C,
    G,
    T,
}

impl Allele {
    /// Return the complementary base (A<->T, C<->G), i.e. the base found
    /// on the opposite strand. Used when reconciling vendor files typed on
    /// the reverse strand with a (ref, alt) marker definition.
    #[must_use]
    pub fn complement(self) -> Self {
        match self {
            Self::A => Self::T,
            Self::T => Self::A,
            Self::C => Self::G,
            Self::G => Self::C,
        }
    }

    /// `true` if `self` and `other` form a strand-ambiguous (palindromic) pair.
    #[must_use]
    pub fn is_palindromic_with(self, other: Self) -> bool {
        self.complement() == other
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::C => 'C',
            Self::G => 'G',
            Self::T => 'T',
        }
    }
}

impl TryFrom<char> for Allele {
    type Error = AlleleError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase() {
            'A' => Ok(Self::A),
            'C' => Ok(Self::C),
            'G' => Ok(Self::G),
            'T' => Ok(Self::T),
            other => Err(AlleleError::InvalidBase(other)),
        }
    }
}

impl TryFrom<u8> for Allele {
    type Error = AlleleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(char::from(value))
    }
}

impl Display for Allele {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
