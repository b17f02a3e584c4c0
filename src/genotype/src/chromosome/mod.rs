use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

mod error;
pub use error::ChromosomeError;

/// GRCh37 sequence lengths, indexed by autosome name - 1. Used to close
/// the terminal ancestry segment of each chromosome.
const GRCH37_AUTOSOME_LENGTHS: [u64; 22] = [
    249_250_621, 243_199_373, 198_022_430, 191_154_276, 180_915_260,
    171_115_067, 159_138_663, 146_364_022, 141_213_431, 135_534_747,
    135_006_516, 133_851_895, 115_169_878, 107_349_540, 102_531_392,
     90_354_753,  81_195_210,  78_077_248,  59_128_983,  63_025_520,
     48_129_895,  51_304_566,
];

const GRCH37_X_LENGTH : u64 = 155_270_560;
const GRCH37_Y_LENGTH : u64 =  59_373_566;
const GRCH37_MT_LENGTH: u64 =      16_569;

/// A chromosome label as found in consumer genotype files: the 22
/// autosomes, the sex chromosomes and the mitochondrial genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Chromosome {
    Autosome(u8),
    X,
    Y,
    Mt,
}

impl Chromosome {
    /// Instantiate an autosome from its 1-based name.
    ///
    /// # Errors
    /// if `name` does not lie within the 1..=22 range.
    pub fn autosome(name: u8) -> Result<Self, ChromosomeError> {
        match name {
            1..=22 => Ok(Self::Autosome(name)),
            _      => Err(ChromosomeError::InvalidAutosome(name)),
        }
    }

    #[must_use]
    pub fn is_autosome(self) -> bool {
        matches!(self, Self::Autosome(_))
    }

    /// GRCh37 sequence length of this chromosome, in base pairs.
    #[must_use]
    pub fn length(self) -> u64 {
        match self {
            Self::Autosome(name) => GRCH37_AUTOSOME_LENGTHS[usize::from(name) - 1],
            Self::X              => GRCH37_X_LENGTH,
            Self::Y              => GRCH37_Y_LENGTH,
            Self::Mt             => GRCH37_MT_LENGTH,
        }
    }

    /// Sort key: autosomes in numeric order, then X, Y, MT.
    fn rank(self) -> u8 {
        match self {
            Self::Autosome(name) => name,
            Self::X              => 23,
            Self::Y              => 24,
            Self::Mt             => 25,
        }
    }
}

impl Ord for Chromosome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Chromosome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Chromosome {
    type Err = ChromosomeError;

    /// Parse a chromosome token, stripping any leading `chr` prefix
    /// (case-insensitive), e.g. "chr12" -> Autosome(12), "chrM" -> Mt.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let token = ["chr", "CHR", "Chr"]
            .iter()
            .find_map(|prefix| token.strip_prefix(prefix))
            .unwrap_or(token);

        match token {
            "X" | "x"                       => Ok(Self::X),
            "Y" | "y"                       => Ok(Self::Y),
            "MT" | "Mt" | "mt" | "M" | "m"  => Ok(Self::Mt),
            _ => {
                let name = token
                    .parse::<u8>()
                    .map_err(|_| ChromosomeError::ParseChromosome(s.to_string()))?;
                Self::autosome(name).map_err(|_| ChromosomeError::ParseChromosome(s.to_string()))
            }
        }
    }
}

impl Display for Chromosome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Autosome(name) => write!(f, "{name}"),
            Self::X              => write!(f, "X"),
            Self::Y              => write!(f, "Y"),
            Self::Mt             => write!(f, "MT"),
        }
    }
}

impl From<Chromosome> for String {
    fn from(chromosome: Chromosome) -> Self {
        chromosome.to_string()
    }
}

impl TryFrom<String> for Chromosome {
    type Error = ChromosomeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}
