use anyhow::Result;
use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use genotype::{Chromosome, Confidence, Proportions, Superpop, SuperpopMap};

use crate::{
    cancel::CancelToken,
    error::InferenceError,
    hwe,
    overlap::AlignedDosages,
};

/// Expected ancestry-segment length, in base pairs, encoded by the
/// switch rate: rho = mean inter-marker spacing / this scale.
pub const SWITCH_LENGTH_BP: f64 = 20_000_000.0;

/// Bounds keeping the per-chromosome switch rate a usable probability.
const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 0.5;

/// Posterior-probability cuts for the per-marker confidence label.
const HIGH_POSTERIOR_CUT    : f64 = 0.8;
const MODERATE_POSTERIOR_CUT: f64 = 0.6;

/// Smoothed ancestry state of a single marker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPosterior {
    pub chromosome: Chromosome,
    pub position: u64,
    pub label: Superpop,
    pub confidence: Confidence,
    /// max_k gamma_k: posterior mass of the winning ancestry.
    pub posterior: f64,
}

/// Per-chromosome switch rate derived from the mean inter-marker spacing,
/// optionally overridden by the `--switch-scale` knob.
fn switch_rate(positions: &[u64], override_rho: Option<f64>) -> f64 {
    if let Some(rho) = override_rho {
        return rho.clamp(RHO_MIN, RHO_MAX);
    }
    if positions.len() < 2 {
        return RHO_MIN;
    }
    let span = (positions[positions.len() - 1] - positions[0]) as f64;
    let mean_spacing = span / (positions.len() - 1) as f64;
    (mean_spacing / SWITCH_LENGTH_BP).clamp(RHO_MIN, RHO_MAX)
}

/// Forward-backward smoothing of one chromosome, in log space.
///
/// Transition kernel: a(i -> j) = (1 - rho) * delta_ij + rho * theta_j,
/// i.e. self-persistent with switches drawn from the global prior.
fn smooth_chromosome(
    chromosome: Chromosome,
    dosages: &[u8],
    frequencies: &[SuperpopMap<f64>],
    positions: &[u64],
    prior: &Proportions,
    override_rho: Option<f64>,
) -> Vec<MarkerPosterior> {
    const K: usize = Superpop::COUNT;
    let m = dosages.len();
    let rho = switch_rate(positions, override_rho);

    // ---- Emission table: ln P(g_i | state = k).
    let emissions: Vec<[f64; K]> = dosages
        .iter()
        .zip(frequencies)
        .map(|(&dosage, freqs)| {
            std::array::from_fn(|k| {
                hwe::log_genotype_prob(dosage, freqs[Superpop::ALL[k]])
            })
        })
        .collect();

    // ---- Log transition matrix.
    let mut log_trans = [[0.0f64; K]; K];
    for (i, row) in log_trans.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let stay = if i == j { 1.0 - rho } else { 0.0 };
            *cell = (stay + rho * prior[Superpop::ALL[j]]).ln();
        }
    }
    let log_prior: [f64; K] = std::array::from_fn(|k| prior[Superpop::ALL[k]].max(f64::MIN_POSITIVE).ln());

    // ---- Forward pass.
    let mut alpha = vec![[0.0f64; K]; m];
    for k in 0..K {
        alpha[0][k] = log_prior[k] + emissions[0][k];
    }
    for t in 1..m {
        for j in 0..K {
            let terms: [f64; K] = std::array::from_fn(|i| alpha[t - 1][i] + log_trans[i][j]);
            alpha[t][j] = hwe::log_sum_exp(&terms) + emissions[t][j];
        }
    }

    // ---- Backward pass.
    let mut beta = vec![[0.0f64; K]; m];
    for t in (0..m.saturating_sub(1)).rev() {
        for i in 0..K {
            let terms: [f64; K] =
                std::array::from_fn(|j| log_trans[i][j] + emissions[t + 1][j] + beta[t + 1][j]);
            beta[t][i] = hwe::log_sum_exp(&terms);
        }
    }

    // ---- Posterior gamma, label and confidence per marker.
    (0..m)
        .map(|t| {
            let joint: [f64; K] = std::array::from_fn(|k| alpha[t][k] + beta[t][k]);
            let norm = hwe::log_sum_exp(&joint);
            let (mut best, mut best_gamma) = (0, f64::NEG_INFINITY);
            for (k, &value) in joint.iter().enumerate() {
                let gamma = (value - norm).exp();
                if gamma > best_gamma {
                    best = k;
                    best_gamma = gamma;
                }
            }
            let confidence = if best_gamma >= HIGH_POSTERIOR_CUT {
                Confidence::High
            } else if best_gamma >= MODERATE_POSTERIOR_CUT {
                Confidence::Moderate
            } else {
                Confidence::Low
            };
            MarkerPosterior {
                chromosome,
                position: positions[t],
                label: Superpop::ALL[best],
                confidence,
                posterior: best_gamma,
            }
        })
        .collect()
}

/// Smooth the aligned markers into per-marker ancestry posteriors (C7).
/// Chromosomes are independent and processed in parallel; the token is
/// honoured at chromosome granularity.
///
/// # Errors
/// - [`InferenceError::Cancelled`] when the token fires.
pub fn smooth(
    aligned: &AlignedDosages,
    prior: &Proportions,
    override_rho: Option<f64>,
    cancel: &CancelToken,
) -> Result<Vec<MarkerPosterior>, InferenceError> {
    let ranges = aligned.chromosome_ranges();
    debug!("HMM smoothing over {} chromosomes ({} markers)", ranges.len(), aligned.len());

    let per_chromosome: Vec<Vec<MarkerPosterior>> = ranges
        .into_par_iter()
        .map(|(chromosome, range)| {
            cancel.ensure_active()?;
            let positions: Vec<u64> =
                aligned.loci()[range.clone()].iter().map(|&(_, position)| position).collect();
            Ok(smooth_chromosome(
                chromosome,
                &aligned.dosages()[range.clone()],
                &aligned.frequencies()[range.clone()],
                &positions,
                prior,
                override_rho,
            ))
        })
        .collect::<Result<_, InferenceError>>()?;

    Ok(per_chromosome.into_iter().flatten().collect())
}
