//! Population-tag mapping and per-continent allele-frequency extraction
//! from variant documents.

use genotype::{Allele, Superpop, SuperpopMap};

use crate::client::VariantDocument;

/// Authoritative mapping from population tags onto continental
/// superpopulations: 1000-Genomes subpopulation codes and gnomAD cohort
/// tags. Service tags are namespaced (e.g. "1000GENOMES:phase_3:CEU",
/// "gnomADe:nfe"); matching happens on the final component.
const POP_TAG_MAP: &[(&str, Superpop)] = &[
    // ---- 1000 Genomes subpopulation codes.
    ("CEU", Superpop::Eur), ("TSI", Superpop::Eur), ("GBR", Superpop::Eur),
    ("FIN", Superpop::Eur), ("IBS", Superpop::Eur),
    ("YRI", Superpop::Afr), ("LWK", Superpop::Afr), ("GWD", Superpop::Afr),
    ("MSL", Superpop::Afr), ("ESN", Superpop::Afr), ("ASW", Superpop::Afr),
    ("ACB", Superpop::Afr),
    ("CHB", Superpop::Eas), ("JPT", Superpop::Eas), ("CHS", Superpop::Eas),
    ("CDX", Superpop::Eas), ("KHV", Superpop::Eas),
    ("GIH", Superpop::Sas), ("PJL", Superpop::Sas), ("BEB", Superpop::Sas),
    ("STU", Superpop::Sas), ("ITU", Superpop::Sas),
    ("MXL", Superpop::Amr), ("PUR", Superpop::Amr), ("CLM", Superpop::Amr),
    ("PEL", Superpop::Amr),
    // ---- 1000 Genomes superpopulation codes.
    ("EUR", Superpop::Eur), ("AFR", Superpop::Afr), ("EAS", Superpop::Eas),
    ("SAS", Superpop::Sas), ("AMR", Superpop::Amr),
    // ---- gnomAD cohort tags.
    ("nfe", Superpop::Eur), ("fin", Superpop::Eur),
    ("afr", Superpop::Afr),
    ("eas", Superpop::Eas),
    ("sas", Superpop::Sas),
    ("amr", Superpop::Amr),
];

/// Continents required before a marker is accepted; the remaining one is
/// imputed as the mean of the present four.
const MIN_CONTINENT_COVERAGE: usize = 4;

/// Map a namespaced population tag onto its continent, when recognised.
#[must_use]
pub fn map_population_tag(tag: &str) -> Option<Superpop> {
    let code = tag.rsplit(':').next().unwrap_or(tag);
    POP_TAG_MAP
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|&(_, pop)| pop)
}

/// Average the document's alternate-allele frequency records into one
/// value per continent, requiring [`MIN_CONTINENT_COVERAGE`] continents
/// and imputing a single missing one as the mean of the others.
#[must_use]
pub fn extract_frequencies(document: &VariantDocument, alternate: Allele) -> Option<SuperpopMap<f64>> {
    let alt_code = alternate.as_char().to_string();

    let mut sums = SuperpopMap::splat(0.0f64);
    let mut counts = SuperpopMap::splat(0usize);
    for record in &document.populations {
        if record.allele != alt_code || !(0.0..=1.0).contains(&record.frequency) {
            continue;
        }
        let Some(pop) = map_population_tag(&record.population) else {
            continue;
        };
        sums[pop] += record.frequency;
        counts[pop] += 1;
    }

    let covered: Vec<Superpop> = Superpop::ALL
        .into_iter()
        .filter(|&pop| counts[pop] > 0)
        .collect();
    if covered.len() < MIN_CONTINENT_COVERAGE {
        return None;
    }

    let mean_of_present: f64 = covered
        .iter()
        .map(|&pop| sums[pop] / counts[pop] as f64)
        .sum::<f64>()
        / covered.len() as f64;

    Some(SuperpopMap::from_fn(|pop| match counts[pop] {
        0 => mean_of_present,
        n => sums[pop] / n as f64,
    }))
}
