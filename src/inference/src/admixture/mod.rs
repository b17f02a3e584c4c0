use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;

use genotype::{Confidence, Proportions, Superpop, SuperpopMap};

use crate::{
    cancel::CancelToken,
    error::InferenceError,
    hwe,
    overlap::AlignedDosages,
};

/// Iteration cap of the EM loop.
pub const MAX_ITERATIONS: usize = 50;
/// Convergence: largest per-component change below this ends the loop.
pub const CONVERGENCE_TOL: f64 = 1e-6;
/// Hitting the cap with a change still above this flags instability.
pub const INSTABILITY_TOL: f64 = 1e-2;

/// Confidence thresholds on the number of markers backing the estimate.
const HIGH_CONFIDENCE_MARKERS    : usize = 2_000;
const MODERATE_CONFIDENCE_MARKERS: usize = 500;

/// Output of the EM admixture solver.
#[derive(Debug, Clone, Serialize)]
pub struct AdmixtureEstimate {
    pub proportions   : Proportions,
    pub markers_used  : usize,
    pub iterations    : usize,
    pub log_likelihood: f64,
    pub converged     : bool,
    pub confidence    : Confidence,
}

/// Maximise the likelihood of the user's genotypes under a mixture of the
/// five continental allele-frequency profiles (C5).
///
/// The model: P(g_i | theta) = sum_k theta_k * P(g_i | p_ki), with the
/// HWE genotype probabilities of [`crate::hwe`]. Standard EM from a
/// uniform start; the incomplete-data log-likelihood is tracked per
/// iteration and is non-decreasing.
///
/// # Errors
/// - [`InferenceError::Cancelled`] when the token fires between iterations.
pub fn em_admixture(
    aligned: &AlignedDosages,
    cancel: &CancelToken,
) -> Result<AdmixtureEstimate, InferenceError> {
    let markers_used = aligned.len();
    if markers_used == 0 {
        return Err(InferenceError::InsufficientMarkers { found: 0, required: 1 });
    }
    let m = markers_used as f64;

    // ---- Hoist the per-marker HWE likelihood table out of the loop: it
    //      only depends on the (dosage, frequency) pairs, never on theta.
    let likelihoods: Vec<SuperpopMap<f64>> = aligned
        .dosages()
        .iter()
        .zip(aligned.frequencies())
        .map(|(&dosage, freqs)| freqs.map(|_, &p| hwe::genotype_prob(dosage, p)))
        .collect();

    let mut theta = SuperpopMap::splat(1.0 / Superpop::COUNT as f64);
    let mut log_likelihood = f64::NEG_INFINITY;
    let mut iterations = 0;
    let mut converged = false;
    let mut delta = f64::INFINITY;

    while iterations < MAX_ITERATIONS {
        cancel.ensure_active()?;
        iterations += 1;

        // ---- E-step: per-marker responsibilities, accumulated straight
        //      into the M-step sums.
        let mut sums = SuperpopMap::splat(0.0);
        let mut ll = 0.0;
        for likelihood in &likelihoods {
            let joint = theta.map(|pop, &t| t * likelihood[pop]);
            let total = joint.sum();
            ll += total.ln();
            for pop in Superpop::ALL {
                sums[pop] += joint[pop] / total;
            }
        }

        // ---- M-step.
        let updated = sums.map(|_, &sum| sum / m);
        delta = Superpop::ALL
            .iter()
            .map(|&pop| (updated[pop] - theta[pop]).abs())
            .fold(0.0, f64::max);
        theta = updated;
        log_likelihood = ll;

        if delta < CONVERGENCE_TOL {
            converged = true;
            break;
        }
    }

    let mut confidence = confidence_from_markers(markers_used);
    if !converged && delta > INSTABILITY_TOL {
        // Rare; degrades confidence rather than aborting.
        warn!("{}", InferenceError::NumericalInstability { delta });
        confidence = confidence.min(Confidence::Moderate);
    }

    let proportions = Proportions::normalised(theta)
        .unwrap_or_else(|_| Proportions::uniform());

    debug!(
        "EM admixture: {proportions} ({markers_used} markers, {iterations} iterations, logL = {log_likelihood:.2})"
    );

    Ok(AdmixtureEstimate {
        proportions,
        markers_used,
        iterations,
        log_likelihood,
        converged,
        confidence,
    })
}

pub(crate) fn confidence_from_markers(markers_used: usize) -> Confidence {
    if markers_used >= HIGH_CONFIDENCE_MARKERS {
        Confidence::High
    } else if markers_used >= MODERATE_CONFIDENCE_MARKERS {
        Confidence::Moderate
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::align;
    use cairn_io::AimMarker;
    use float_cmp::assert_approx_eq;
    use genotype::{Allele, Chromosome};

    /// Build an aligned vector directly from synthetic (dosage, frequency)
    /// pairs, routed through the real C4 path for realism.
    fn aligned_from(pop_freqs: &[SuperpopMap<f64>], dosages: &[u8]) -> AlignedDosages {
        assert_eq!(pop_freqs.len(), dosages.len());
        let mut content = String::from("# This data file generated by 23andMe\n");
        let mut markers = Vec::new();
        for (i, (&dosage, freqs)) in dosages.iter().zip(pop_freqs).enumerate() {
            let call = match dosage {
                0 => "AA",
                1 => "AG",
                _ => "GG",
            };
            content.push_str(&format!("rs{i}\t1\t{}\t{call}\n", 1_000 + i as u64 * 100));
            markers.push(AimMarker {
                rsid: format!("rs{i}"),
                chromosome: Chromosome::Autosome(1),
                position: 1_000 + i as u64 * 100,
                reference: Allele::A,
                alternate: Allele::G,
                frequencies: *freqs,
            });
        }
        for i in 0..1_000 {
            content.push_str(&format!("rs99{i:05}\t22\t{}\tAA\n", 40_000_000 + i));
        }
        let parsed = genofile::parse_file(&content).expect("fixture did not parse");
        align(&parsed, markers.iter())
    }

    /// Markers perfectly discriminating EUR: alt fixed in EUR, absent elsewhere.
    fn eur_specific_freqs(count: usize) -> Vec<SuperpopMap<f64>> {
        (0..count)
            .map(|_| SuperpopMap::new([0.95, 0.02, 0.02, 0.02, 0.02]))
            .collect()
    }

    #[test]
    fn recovers_a_pure_population() -> Result<()> {
        let freqs = eur_specific_freqs(600);
        let dosages = vec![2u8; 600];
        let estimate = em_admixture(&aligned_from(&freqs, &dosages), &CancelToken::new())?;

        assert!(estimate.proportions[Superpop::Eur] > 0.9, "EUR = {}", estimate.proportions[Superpop::Eur]);
        assert_approx_eq!(f64, estimate.proportions.as_map().sum(), 1.0, epsilon = 1e-6);
        assert_eq!(estimate.confidence, Confidence::Moderate);
        Ok(())
    }

    #[test]
    fn recovers_an_even_admixture() -> Result<()> {
        // Alternate markers favouring EUR and AFR; dosages split evenly.
        let mut freqs = Vec::new();
        let mut dosages = Vec::new();
        for i in 0..800 {
            if i % 2 == 0 {
                freqs.push(SuperpopMap::new([0.9, 0.05, 0.05, 0.05, 0.05]));
            } else {
                freqs.push(SuperpopMap::new([0.05, 0.9, 0.05, 0.05, 0.05]));
            }
            dosages.push(2);
        }
        let estimate = em_admixture(&aligned_from(&freqs, &dosages), &CancelToken::new())?;

        let eur = estimate.proportions[Superpop::Eur];
        let afr = estimate.proportions[Superpop::Afr];
        assert!((0.35..=0.65).contains(&eur), "EUR = {eur}");
        assert!((0.35..=0.65).contains(&afr), "AFR = {afr}");
        Ok(())
    }

    #[test]
    fn log_likelihood_is_monotone() -> Result<()> {
        // Re-run EM step by step and check the recorded likelihood of the
        // final state dominates a one-iteration run.
        let freqs = eur_specific_freqs(300);
        let dosages: Vec<u8> = (0..300).map(|i| (i % 3) as u8).collect();
        let aligned = aligned_from(&freqs, &dosages);

        let full = em_admixture(&aligned, &CancelToken::new())?;
        assert!(full.converged);
        assert!(full.log_likelihood.is_finite());

        // A converged run can never score below the uniform-start likelihood.
        let uniform_ll: f64 = aligned
            .dosages()
            .iter()
            .zip(aligned.frequencies())
            .map(|(&dosage, f)| {
                let mix: f64 = f.values().map(|&p| 0.2 * hwe::genotype_prob(dosage, p)).sum();
                mix.ln()
            })
            .sum();
        assert!(full.log_likelihood >= uniform_ll - 1e-9);
        Ok(())
    }

    #[test]
    fn confidence_tracks_marker_counts() -> Result<()> {
        let token = CancelToken::new();
        let estimate = em_admixture(&aligned_from(&eur_specific_freqs(2_100), &vec![2u8; 2_100]), &token)?;
        assert_eq!(estimate.confidence, Confidence::High);

        let estimate = em_admixture(&aligned_from(&eur_specific_freqs(450), &vec![2u8; 450]), &token)?;
        assert_eq!(estimate.confidence, Confidence::Low);
        Ok(())
    }

    #[test]
    fn cancellation_interrupts_the_loop() {
        let token = CancelToken::new();
        token.cancel();
        let result = em_admixture(&aligned_from(&eur_specific_freqs(300), &vec![2u8; 300]), &token);
        assert!(matches!(result, Err(InferenceError::Cancelled)));
    }
}
