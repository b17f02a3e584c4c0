//! Sub-population refinement: within one continental group, re-estimate
//! allele frequencies per subpopulation, rank markers by pairwise FST,
//! and score the user against the most differentiating subset.

use itertools::Itertools;
use log::debug;

use cairn_io::ReferencePanel;
use genotype::{dosage, Superpop};

use crate::{
    composition::{SubpopComposition, SubpopProportion},
    hwe,
    overlap::PanelAlignment,
    panel::{GEOMEAN_FLOOR, REFINE_K, WEIGHT_SCALE},
};

/// Number of top-FST markers retained for the refinement scoring.
pub const TOP_FST_MARKERS: usize = 500;

/// One subpopulation of the refined continent: its code and the matrix
/// columns of its samples (minus any excluded column).
struct SubpopGroup {
    code: String,
    columns: Vec<usize>,
}

/// Sample-size-weighted pairwise FST at one marker:
/// FST = (H_T - H_S) / H_T over the two groups' expected heterozygosities.
#[must_use]
pub(crate) fn pairwise_fst(p1: f64, n1: usize, p2: f64, n2: usize) -> f64 {
    let (w1, w2) = (n1 as f64, n2 as f64);
    let total = w1 + w2;
    if total <= 0.0 {
        return 0.0;
    }
    let p_bar = (w1 * p1 + w2 * p2) / total;
    let h_t = 2.0 * p_bar * (1.0 - p_bar);
    if h_t <= f64::EPSILON {
        return 0.0;
    }
    let h_s = (w1 * 2.0 * p1 * (1.0 - p1) + w2 * 2.0 * p2 * (1.0 - p2)) / total;
    ((h_t - h_s) / h_t).clamp(0.0, 1.0)
}

fn subpop_groups(
    panel: &ReferencePanel,
    continent: Superpop,
    exclude_column: Option<usize>,
) -> Vec<SubpopGroup> {
    panel
        .subpopulations_of(continent)
        .into_iter()
        .filter_map(|population| {
            let columns: Vec<usize> = panel
                .samples_in_population(&population.code)
                .map(|sample| sample.index)
                .filter(|&column| Some(column) != exclude_column)
                .collect();
            (!columns.is_empty()).then(|| SubpopGroup { code: population.code.clone(), columns })
        })
        .collect()
}

/// Alternate-allele frequency and observed sample count of one group at
/// one matrix row.
fn group_frequency(panel: &ReferencePanel, row: usize, columns: &[usize]) -> (f64, usize) {
    let mut sum = 0.0;
    let mut observed = 0usize;
    for &column in columns {
        let ref_dosage = panel.dosage(row, column);
        if dosage::is_observed(ref_dosage) {
            sum += f64::from(ref_dosage);
            observed += 1;
        }
    }
    match observed {
        0 => (0.5, 0),
        n => (sum / (2.0 * n as f64), n),
    }
}

/// Refine the user's composition within `continent`: returns the subpop
/// codes, the combined posterior over them (weighted k-NN x likelihood,
/// geometric mean), and the number of markers scored. `None` when the
/// panel does not carry at least two populated subpopulations.
pub(crate) fn refine_within(
    alignment: &PanelAlignment,
    panel: &ReferencePanel,
    continent: Superpop,
    exclude_column: Option<usize>,
) -> Option<(Vec<String>, Vec<f64>, usize)> {
    let groups = subpop_groups(panel, continent, exclude_column);
    if groups.len() < 2 {
        return None;
    }

    // ---- Subpopulation allele frequencies at every aligned marker.
    let frequencies: Vec<Vec<(f64, usize)>> = alignment
        .rows
        .iter()
        .map(|&row| groups.iter().map(|group| group_frequency(panel, row, &group.columns)).collect())
        .collect();

    // ---- Rank markers by mean pairwise FST between the subpopulations,
    //      and keep the most differentiating subset.
    let mut ranked_markers: Vec<(usize, f64)> = frequencies
        .iter()
        .enumerate()
        .map(|(marker, freqs)| {
            let mut fst_sum = 0.0;
            let mut pairs = 0usize;
            for ((p1, n1), (p2, n2)) in freqs.iter().copied().tuple_combinations() {
                if n1 == 0 || n2 == 0 {
                    continue;
                }
                fst_sum += pairwise_fst(p1, n1, p2, n2);
                pairs += 1;
            }
            (marker, if pairs == 0 { 0.0 } else { fst_sum / pairs as f64 })
        })
        .collect();
    ranked_markers.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let subset: Vec<usize> = ranked_markers
        .iter()
        .take(TOP_FST_MARKERS)
        .map(|&(marker, _)| marker)
        .collect();

    let user = alignment.aligned.dosages();

    // ---- Weighted k-NN over the continent's samples, on the subset.
    let mut scored: Vec<(usize, usize, f64)> = Vec::new(); // (group, column, similarity)
    for (group_index, group) in groups.iter().enumerate() {
        for &column in &group.columns {
            let mut identity = 0.0;
            let mut shared = 0usize;
            for &marker in &subset {
                let ref_dosage = panel.dosage(alignment.rows[marker], column);
                if !dosage::is_observed(ref_dosage) {
                    continue;
                }
                identity += 2.0 - f64::from(user[marker].abs_diff(ref_dosage));
                shared += 1;
            }
            if shared > 0 {
                scored.push((group_index, column, identity / (2.0 * shared as f64)));
            }
        }
    }
    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| b.1.cmp(&a.1)));

    let top = &scored[..REFINE_K.min(scored.len())];
    let s_min = top.iter().map(|&(_, _, s)| s).fold(f64::INFINITY, f64::min);
    let mut knn_posterior = vec![0.0; groups.len()];
    let mut weight_total = 0.0;
    for &(group_index, _, similarity) in top {
        let weight = (WEIGHT_SCALE * (similarity - s_min)).exp();
        knn_posterior[group_index] += weight;
        weight_total += weight;
    }
    for weight in &mut knn_posterior {
        *weight /= weight_total;
    }

    // ---- Per-subpopulation HWE likelihood over the subset.
    let log_scores: Vec<f64> = (0..groups.len())
        .map(|group_index| {
            subset
                .iter()
                .map(|&marker| {
                    let (p, _) = frequencies[marker][group_index];
                    hwe::log_genotype_prob(user[marker], p)
                })
                .sum()
        })
        .collect();
    let likelihood_posterior = hwe::softmax(&log_scores);

    // ---- Combined: renormalised geometric mean of the two posteriors.
    let mut combined: Vec<f64> = knn_posterior
        .iter()
        .zip(&likelihood_posterior)
        .map(|(&knn, &like)| (knn.max(GEOMEAN_FLOOR) * like.max(GEOMEAN_FLOOR)).sqrt())
        .collect();
    let total: f64 = combined.iter().sum();
    for value in &mut combined {
        *value /= total;
    }

    let codes = groups.into_iter().map(|group| group.code).collect();
    Some((codes, combined, subset.len()))
}

/// Assemble [`refine_within`]'s posterior into the reported composition,
/// sorted by decreasing proportion.
pub(crate) fn refine_subpopulations(
    alignment: &PanelAlignment,
    panel: &ReferencePanel,
    continent: Superpop,
    exclude_column: Option<usize>,
) -> Option<SubpopComposition> {
    let (codes, combined, markers_used) =
        refine_within(alignment, panel, continent, exclude_column)?;

    let mut proportions: Vec<SubpopProportion> = codes
        .into_iter()
        .zip(combined)
        .map(|(code, proportion)| SubpopProportion { code, proportion })
        .collect();
    proportions.sort_by(|a, b| b.proportion.total_cmp(&a.proportion));

    debug!(
        "Subpopulation refinement within {continent}: best = {} ({markers_used} markers)",
        proportions.first().map_or("-", |p| p.code.as_str())
    );
    Some(SubpopComposition { continent, proportions, markers_used })
}
