//! Hardy-Weinberg genotype likelihoods, shared by the EM solver, the
//! panel likelihood scorer and the local-ancestry HMM emissions.

/// Allele frequencies are clamped into this closed range before any HWE
/// formula, so no genotype ever receives a zero probability.
pub const FREQ_FLOOR: f64 = 0.001;
pub const FREQ_CEIL : f64 = 0.999;

#[must_use]
pub fn clamp_frequency(p: f64) -> f64 {
    p.clamp(FREQ_FLOOR, FREQ_CEIL)
}

/// P(dosage | p) under Hardy-Weinberg equilibrium:
/// P(0) = (1-p)^2, P(1) = 2p(1-p), P(2) = p^2.
#[must_use]
pub fn genotype_prob(dosage: u8, p: f64) -> f64 {
    let p = clamp_frequency(p);
    let q = 1.0 - p;
    match dosage {
        0 => q * q,
        1 => 2.0 * p * q,
        _ => p * p,
    }
}

#[must_use]
pub fn log_genotype_prob(dosage: u8, p: f64) -> f64 {
    genotype_prob(dosage, p).ln()
}

/// Numerically stable `ln(sum(exp(values)))`.
#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|value| (value - max).exp()).sum();
    max + sum.ln()
}

/// Stable softmax over a log-score slice.
#[must_use]
pub fn softmax(log_scores: &[f64]) -> Vec<f64> {
    let norm = log_sum_exp(log_scores);
    log_scores.iter().map(|score| (score - norm).exp()).collect()
}
