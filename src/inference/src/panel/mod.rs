use anyhow::Result;
use log::debug;
use rayon::prelude::*;

use cairn_io::ReferencePanel;
use genotype::{dosage, Proportions, Superpop, SuperpopMap};

use crate::{
    admixture::{confidence_from_markers, AdmixtureEstimate},
    cancel::CancelToken,
    composition::{CompositionResult, Method, Neighbor},
    error::InferenceError,
    hwe,
    overlap::PanelAlignment,
};

mod refine;
pub(crate) use refine::{refine_subpopulations, refine_within};

/// Neighbour count of the basic k-NN composition.
pub const KNN_K: usize = 20;
/// Neighbour count of the weighted k-NN used for refinement.
pub const REFINE_K: usize = 50;
/// Exponential weight scale: w = exp(WEIGHT_SCALE * (s - s_min)).
pub const WEIGHT_SCALE: f64 = 100.0;

/// Floor applied to posterior components before a geometric mean, so a
/// single zero vote cannot annihilate a population.
const GEOMEAN_FLOOR: f64 = 1e-4;

/// Identity-by-state similarity of one reference sample against the
/// aligned user dosages, over their shared non-missing markers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scored {
    /// Index into `panel.samples()`.
    pub sample: usize,
    pub similarity: f64,
}

/// Scan every labelled panel sample (optionally excluding one column for
/// leave-one-out evaluation) and score its IBS similarity:
/// sum(2 - |d_user - d_ref|) / (2 * shared markers).
/// Samples sharing no observed marker are dropped from the ranking.
pub(crate) fn scan_similarities(
    alignment: &PanelAlignment,
    panel: &ReferencePanel,
    exclude_column: Option<usize>,
) -> Vec<Scored> {
    let dosages = alignment.aligned.dosages();
    let rows = &alignment.rows;

    let mut scored: Vec<Scored> = panel
        .samples()
        .par_iter()
        .enumerate()
        .filter(|(_, sample)| Some(sample.index) != exclude_column)
        .filter_map(|(sample_index, sample)| {
            let mut identity = 0.0f64;
            let mut shared = 0usize;
            for (&row, &user_dosage) in rows.iter().zip(dosages) {
                let ref_dosage = panel.dosage(row, sample.index);
                if !dosage::is_observed(ref_dosage) {
                    continue;
                }
                identity += 2.0 - f64::from(user_dosage.abs_diff(ref_dosage));
                shared += 1;
            }
            (shared > 0).then(|| Scored {
                sample: sample_index,
                similarity: identity / (2.0 * shared as f64),
            })
        })
        .collect();

    // Descending similarity; a tie at the cut is resolved in favour of
    // the larger original sample index.
    scored.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| panel.samples()[b.sample].index.cmp(&panel.samples()[a.sample].index))
    });
    scored
}

/// Basic k-NN composition: the fraction of each superpopulation among
/// the k most similar reference samples.
pub(crate) fn knn_fraction(ranked: &[Scored], panel: &ReferencePanel, k: usize) -> SuperpopMap<f64> {
    let top = &ranked[..k.min(ranked.len())];
    let mut counts = SuperpopMap::splat(0.0);
    for scored in top {
        counts[panel.samples()[scored.sample].super_population] += 1.0;
    }
    counts.map(|_, &count| count / top.len().max(1) as f64)
}

/// Weighted k-NN posterior: neighbours vote with weight
/// exp(WEIGHT_SCALE * (s - s_min)), normalised per superpopulation.
pub(crate) fn weighted_knn_posterior(
    ranked: &[Scored],
    panel: &ReferencePanel,
    k: usize,
) -> SuperpopMap<f64> {
    let top = &ranked[..k.min(ranked.len())];
    let s_min = top.iter().map(|s| s.similarity).fold(f64::INFINITY, f64::min);

    let mut weights = SuperpopMap::splat(0.0);
    let mut total = 0.0;
    for scored in top {
        let weight = (WEIGHT_SCALE * (scored.similarity - s_min)).exp();
        weights[panel.samples()[scored.sample].super_population] += weight;
        total += weight;
    }
    if total <= 0.0 {
        return SuperpopMap::splat(1.0 / Superpop::COUNT as f64);
    }
    weights.map(|_, &weight| weight / total)
}

/// Per-marker alternate-allele frequency of each superpopulation,
/// estimated from the panel columns (missing calls and the excluded
/// column left out). Groups without a single observed call fall back to
/// an uninformative 0.5.
pub(crate) fn superpop_frequencies(
    alignment: &PanelAlignment,
    panel: &ReferencePanel,
    exclude_column: Option<usize>,
) -> Vec<SuperpopMap<f64>> {
    alignment
        .rows
        .iter()
        .map(|&row| {
            let mut sums = SuperpopMap::splat(0.0f64);
            let mut counts = SuperpopMap::splat(0usize);
            for sample in panel.samples() {
                if Some(sample.index) == exclude_column {
                    continue;
                }
                let ref_dosage = panel.dosage(row, sample.index);
                if !dosage::is_observed(ref_dosage) {
                    continue;
                }
                sums[sample.super_population] += f64::from(ref_dosage);
                counts[sample.super_population] += 1;
            }
            SuperpopMap::from_fn(|pop| match counts[pop] {
                0 => 0.5,
                n => sums[pop] / (2.0 * n as f64),
            })
        })
        .collect()
}

/// Per-superpopulation HWE log-likelihood of the user's aligned dosages,
/// turned into a posterior by a max-subtracted softmax.
pub(crate) fn likelihood_posterior(
    dosages: &[u8],
    frequencies: &[SuperpopMap<f64>],
) -> SuperpopMap<f64> {
    let mut log_scores = SuperpopMap::splat(0.0f64);
    for (&user_dosage, freqs) in dosages.iter().zip(frequencies) {
        for pop in Superpop::ALL {
            log_scores[pop] += hwe::log_genotype_prob(user_dosage, freqs[pop]);
        }
    }
    let posterior = hwe::softmax(log_scores.as_array());
    SuperpopMap::from_fn(|pop| posterior[pop.index()])
}

/// Combine two posteriors by their renormalised geometric mean.
pub(crate) fn geometric_combine(a: &SuperpopMap<f64>, b: &SuperpopMap<f64>) -> SuperpopMap<f64> {
    let mut combined =
        SuperpopMap::from_fn(|pop| (a[pop].max(GEOMEAN_FLOOR) * b[pop].max(GEOMEAN_FLOOR)).sqrt());
    let total = combined.sum();
    for pop in Superpop::ALL {
        combined[pop] /= total;
    }
    combined
}

/// Full panel inference (C6): IBS scan, weighted k-NN and likelihood
/// posteriors combined by geometric mean, the nearest-neighbour list,
/// and sub-population refinement within the arg-max continent.
///
/// # Errors
/// - [`InferenceError::Cancelled`] between stages.
pub fn panel_composition(
    alignment: &PanelAlignment,
    panel: &ReferencePanel,
    em: &AdmixtureEstimate,
    cancel: &CancelToken,
) -> Result<CompositionResult, InferenceError> {
    cancel.ensure_active()?;
    let ranked = scan_similarities(alignment, panel, None);

    cancel.ensure_active()?;
    let frequencies = superpop_frequencies(alignment, panel, None);
    let likelihood = likelihood_posterior(alignment.aligned.dosages(), &frequencies);
    let weighted = weighted_knn_posterior(&ranked, panel, REFINE_K);
    let combined = geometric_combine(&weighted, &likelihood);

    let proportions =
        Proportions::normalised(combined).unwrap_or_else(|_| Proportions::uniform());
    debug!("Panel composition: {proportions} over {} markers", alignment.len());

    cancel.ensure_active()?;
    let subpopulations = refine_subpopulations(alignment, panel, proportions.argmax(), None);

    let nearest = ranked
        .iter()
        .take(KNN_K)
        .map(|scored| {
            let sample = &panel.samples()[scored.sample];
            Neighbor {
                id: sample.id.clone(),
                population: sample.population.clone(),
                super_population: sample.super_population,
                similarity: scored.similarity,
            }
        })
        .collect();

    Ok(CompositionResult {
        proportions,
        method: Method::Combined,
        markers_used: alignment.len(),
        confidence: confidence_from_markers(alignment.len()),
        subpopulations,
        nearest,
        em: em.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::AlignedDosages;
    use cairn_io::AimMarker;
    use float_cmp::assert_approx_eq;
    use genotype::{Allele, Chromosome};
    use serde_json::json;

    /// Four samples: two EUR (columns 0, 1), one AFR, one EAS. Columns 0
    /// and 1 carry identical genotypes, so their similarities tie.
    fn tiny_panel() -> ReferencePanel {
        let document = serde_json::from_value(json!({
            "metadata": {
                "rsids": ["rs1", "rs2", "rs3", "rs4"],
                "sampleIds": ["EUR_A", "EUR_B", "AFR_A", "EAS_A"],
            },
            "genotypes": {
                "rs1": "2200",
                "rs2": "2210",
                "rs3": "2202",
                "rs4": "2292",
            },
        }))
        .expect("panel fixture");
        let metadata = serde_json::from_value(json!({
            "populations": {
                "CEU": {"code": "CEU", "superPop": "EUR", "count": 2, "description": "t"},
                "YRI": {"code": "YRI", "superPop": "AFR", "count": 1, "description": "t"},
                "CHB": {"code": "CHB", "superPop": "EAS", "count": 1, "description": "t"},
            },
            "sampleInfo": [
                {"id": "EUR_A", "population": "CEU", "superPopulation": "EUR", "index": 0},
                {"id": "EUR_B", "population": "CEU", "superPopulation": "EUR", "index": 1},
                {"id": "AFR_A", "population": "YRI", "superPopulation": "AFR", "index": 2},
                {"id": "EAS_A", "population": "CHB", "superPopulation": "EAS", "index": 3},
            ],
        }))
        .expect("metadata fixture");
        ReferencePanel::from_documents(document, metadata).expect("panel fixture")
    }

    /// A user homozygous-alt at every marker: identical to both EUR columns.
    fn alt_heavy_alignment(panel: &ReferencePanel) -> PanelAlignment {
        let mut aligned = AlignedDosages::default();
        let mut rows = Vec::new();
        for (index, rsid) in ["rs1", "rs2", "rs3", "rs4"].iter().enumerate() {
            aligned.push(
                &AimMarker {
                    rsid: (*rsid).to_string(),
                    chromosome: Chromosome::Autosome(1),
                    position: 1_000 + index as u64 * 1_000,
                    reference: Allele::A,
                    alternate: Allele::G,
                    frequencies: SuperpopMap::new([0.9, 0.1, 0.1, 0.1, 0.1]),
                },
                2,
            );
            rows.push(panel.row_index(rsid).expect("fixture rsid"));
        }
        PanelAlignment { aligned, rows }
    }

    #[test]
    fn similarity_ties_resolve_to_the_larger_sample_index() {
        let panel = tiny_panel();
        let ranked = scan_similarities(&alt_heavy_alignment(&panel), &panel, None);

        // Columns 0 and 1 both match the user perfectly; the tie goes to
        // column 1.
        assert_approx_eq!(f64, ranked[0].similarity, 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, ranked[1].similarity, 1.0, epsilon = 1e-12);
        assert_eq!(panel.samples()[ranked[0].sample].index, 1);
        assert_eq!(panel.samples()[ranked[1].sample].index, 0);
    }

    #[test]
    fn missing_reference_calls_shrink_the_shared_set() {
        let panel = tiny_panel();
        let ranked = scan_similarities(&alt_heavy_alignment(&panel), &panel, None);

        // AFR_A carries a missing call at rs4; its similarity is computed
        // over the three observed markers only: (0 + 1 + 0) / (2 * 3).
        let afr = ranked
            .iter()
            .find(|scored| panel.samples()[scored.sample].id == "AFR_A")
            .expect("AFR_A missing from the ranking");
        assert_approx_eq!(f64, afr.similarity, 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn leave_one_out_excludes_the_requested_column() {
        let panel = tiny_panel();
        let ranked = scan_similarities(&alt_heavy_alignment(&panel), &panel, Some(1));
        assert!(ranked.iter().all(|scored| panel.samples()[scored.sample].index != 1));
    }

    #[test]
    fn knn_fraction_counts_the_top_k() {
        let panel = tiny_panel();
        let ranked = scan_similarities(&alt_heavy_alignment(&panel), &panel, None);

        let fraction = knn_fraction(&ranked, &panel, 2);
        assert_approx_eq!(f64, fraction[Superpop::Eur], 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, fraction[Superpop::Afr], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn weighted_knn_concentrates_on_the_closest_samples() {
        let panel = tiny_panel();
        let ranked = scan_similarities(&alt_heavy_alignment(&panel), &panel, None);

        let posterior = weighted_knn_posterior(&ranked, &panel, 4);
        assert!(posterior[Superpop::Eur] > 0.95, "EUR = {}", posterior[Superpop::Eur]);
        assert_approx_eq!(f64, posterior.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn likelihood_posterior_prefers_the_matching_profile() {
        let frequencies = vec![SuperpopMap::new([0.9, 0.1, 0.1, 0.1, 0.1]); 60];
        let dosages = vec![2u8; 60];

        let posterior = likelihood_posterior(&dosages, &frequencies);
        assert_eq!(posterior.argmax(), Superpop::Eur);
        assert_approx_eq!(f64, posterior.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn geometric_combine_renormalises() {
        let knn = SuperpopMap::new([0.8, 0.2, 0.0, 0.0, 0.0]);
        let likelihood = SuperpopMap::new([0.6, 0.4, 0.0, 0.0, 0.0]);

        let combined = geometric_combine(&knn, &likelihood);
        assert_approx_eq!(f64, combined.sum(), 1.0, epsilon = 1e-12);
        assert!(combined[Superpop::Eur] > combined[Superpop::Afr]);
        // The floor keeps zero components alive but tiny.
        assert!(combined[Superpop::Eas] > 0.0);
        assert!(combined[Superpop::Eas] < 0.01);
    }
}
