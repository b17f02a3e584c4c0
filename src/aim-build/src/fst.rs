use genotype::{Superpop, SuperpopMap};

/// Weir-Cockerham-style fixation index across the five continents:
/// FST = var(p) / (p_bar * (1 - p_bar)), clamped to [0, 1]. Monomorphic
/// markers score zero.
#[must_use]
pub fn continental_fst(frequencies: &SuperpopMap<f64>) -> f64 {
    let k = Superpop::COUNT as f64;
    let mean = frequencies.sum() / k;
    if mean <= 0.0 || mean >= 1.0 {
        return 0.0;
    }
    let variance = frequencies
        .values()
        .map(|&p| (p - mean) * (p - mean))
        .sum::<f64>()
        / k;
    (variance / (mean * (1.0 - mean))).clamp(0.0, 1.0)
}
