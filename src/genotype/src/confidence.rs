use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Qualitative confidence attached to inference outputs. Ordered so that
/// `min()` over a run of markers yields the weakest label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Moderate,
    High,
}

impl Display for Confidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::High     => write!(f, "high"),
            Self::Moderate => write!(f, "moderate"),
            Self::Low      => write!(f, "low"),
        }
    }
}
