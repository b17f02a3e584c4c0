use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use genotype::{Confidence, Proportions, Superpop};

use crate::admixture::AdmixtureEstimate;

/// Which estimator produced the reported continental proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Knn,
    Likelihood,
    Combined,
    Em,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Knn        => write!(f, "knn"),
            Self::Likelihood => write!(f, "likelihood"),
            Self::Combined   => write!(f, "combined"),
            Self::Em         => write!(f, "em"),
        }
    }
}

/// One reference individual out of the k-NN neighbour list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub id: String,
    pub population: String,
    pub super_population: Superpop,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubpopProportion {
    pub code: String,
    pub proportion: f64,
}

/// Sub-continental refinement within the arg-max continent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubpopComposition {
    pub continent: Superpop,
    pub proportions: Vec<SubpopProportion>,
    pub markers_used: usize,
}

/// The global ancestry composition handed to the UI (and to the HMM as
/// its initial distribution).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionResult {
    pub proportions: Proportions,
    pub method: Method,
    pub markers_used: usize,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpopulations: Option<SubpopComposition>,
    pub nearest: Vec<Neighbor>,
    /// EM diagnostics; also the fallback estimate when no panel is loaded.
    pub em: AdmixtureEstimate,
}

impl CompositionResult {
    /// Wrap a bare EM estimate, when the panel is unavailable or the
    /// panel overlap is too thin.
    #[must_use]
    pub fn from_em(em: AdmixtureEstimate) -> Self {
        Self {
            proportions: em.proportions,
            method: Method::Em,
            markers_used: em.markers_used,
            confidence: em.confidence,
            subpopulations: None,
            nearest: Vec::new(),
            em,
        }
    }
}
