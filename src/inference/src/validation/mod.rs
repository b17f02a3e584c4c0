//! Leave-one-out panel evaluation (C10): how often does each inference
//! method recover the known population of a reference individual when
//! that individual is hidden from the reference?

use std::fmt::{self, Display, Formatter};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;

use cairn_io::{AimDatabase, ReferencePanel};
use genotype::{dosage, Superpop};

use crate::{
    cancel::CancelToken,
    overlap::{AlignedDosages, PanelAlignment},
    panel::{
        geometric_combine, knn_fraction, likelihood_posterior, refine_within, scan_similarities,
        superpop_frequencies, weighted_knn_posterior, KNN_K, REFINE_K,
    },
};

/// Test-set ceiling per continental population.
pub const MAX_TEST_SAMPLES_PER_POP: usize = 10;

/// The four evaluated continental classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EvalMethod {
    BasicKnn,
    Likelihood,
    WeightedKnn,
    Combined,
}

impl EvalMethod {
    pub const ALL: [Self; 4] = [Self::BasicKnn, Self::Likelihood, Self::WeightedKnn, Self::Combined];
}

impl Display for EvalMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BasicKnn    => write!(f, "basic k-NN"),
            Self::Likelihood  => write!(f, "likelihood"),
            Self::WeightedKnn => write!(f, "weighted k-NN"),
            Self::Combined    => write!(f, "combined"),
        }
    }
}

/// Accuracy and 5x5 continental confusion of one method. Rows index the
/// true superpopulation, columns the prediction, in [`Superpop::ALL`]
/// order.
#[derive(Debug, Clone, Serialize)]
pub struct MethodOutcome {
    pub method: EvalMethod,
    pub accuracy: f64,
    pub confusion: Vec<Vec<u32>>,
}

/// Subpopulation confusion within one continent, under the combined
/// refinement method.
#[derive(Debug, Clone, Serialize)]
pub struct SubpopOutcome {
    pub continent: Superpop,
    pub codes: Vec<String>,
    pub accuracy: f64,
    pub confusion: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub samples_evaluated: usize,
    pub methods: Vec<MethodOutcome>,
    pub subpopulations: Vec<SubpopOutcome>,
}

/// Build the test-side alignment of one panel column: its observed
/// dosages over the AIM markers the panel carries.
fn sample_alignment(aim: &AimDatabase, panel: &ReferencePanel, column: usize) -> PanelAlignment {
    let mut aligned = AlignedDosages::default();
    let mut rows = Vec::new();
    for marker in aim.iter() {
        let Some(row) = panel.row_index(&marker.rsid) else {
            continue;
        };
        let sample_dosage = panel.dosage(row, column);
        if !dosage::is_observed(sample_dosage) {
            continue;
        }
        aligned.push(marker, sample_dosage);
        rows.push(row);
    }
    PanelAlignment { aligned, rows }
}

/// The four continental predictions for one held-out sample.
fn continental_predictions(
    alignment: &PanelAlignment,
    panel: &ReferencePanel,
    column: usize,
) -> [Superpop; 4] {
    let ranked = scan_similarities(alignment, panel, Some(column));
    let basic = knn_fraction(&ranked, panel, KNN_K);
    let weighted = weighted_knn_posterior(&ranked, panel, REFINE_K);
    let frequencies = superpop_frequencies(alignment, panel, Some(column));
    let likelihood = likelihood_posterior(alignment.aligned.dosages(), &frequencies);
    let combined = geometric_combine(&weighted, &likelihood);

    [basic.argmax(), likelihood.argmax(), weighted.argmax(), combined.argmax()]
}

/// Run the leave-one-out evaluation. Up to `max_per_pop` test samples per
/// continent are drawn with the seeded generator, so a report is
/// reproducible from its seed.
///
/// # Errors
/// - [`InferenceError::Cancelled`] between test samples.
pub fn run_validation(
    aim: &AimDatabase,
    panel: &ReferencePanel,
    max_per_pop: usize,
    seed: u64,
    cancel: &CancelToken,
) -> Result<ValidationReport> {
    let mut rng = fastrand::Rng::with_seed(seed);

    // ---- Draw the test set: up to `max_per_pop` labelled samples per continent.
    let mut test_set: Vec<usize> = Vec::new(); // indices into panel.samples()
    for pop in Superpop::ALL {
        let mut candidates: Vec<usize> = panel
            .samples()
            .iter()
            .enumerate()
            .filter(|(_, sample)| sample.super_population == pop)
            .map(|(index, _)| index)
            .collect();
        rng.shuffle(&mut candidates);
        candidates.truncate(max_per_pop);
        if candidates.is_empty() {
            warn!("Reference panel carries no {pop} samples; continent left out of validation");
        }
        test_set.extend(candidates);
    }
    info!("Validating {} held-out samples against the panel", test_set.len());

    let progress = ProgressBar::new(test_set.len() as u64).with_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message("leave-one-out");

    // ---- Evaluate.
    let mut confusion = [[[0u32; Superpop::COUNT]; Superpop::COUNT]; 4];
    let mut subpop_results: Vec<(Superpop, String, String)> = Vec::new(); // (continent, truth, prediction)

    for &sample_index in &test_set {
        cancel.ensure_active()?;
        let sample = &panel.samples()[sample_index];
        let truth = sample.super_population;
        let column = sample.index;

        let alignment = sample_alignment(aim, panel, column);
        if alignment.is_empty() {
            warn!("Sample {} shares no markers with the AIM database; skipped", sample.id);
            progress.inc(1);
            continue;
        }

        let predictions = continental_predictions(&alignment, panel, column);
        for (method_index, prediction) in predictions.into_iter().enumerate() {
            confusion[method_index][truth.index()][prediction.index()] += 1;
        }

        // ---- Subpopulation refinement within the sample's own continent.
        if let Some((codes, posterior, _)) = refine_within(&alignment, panel, truth, Some(column)) {
            let best = posterior
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(index, _)| codes[index].clone())
                .unwrap_or_default();
            subpop_results.push((truth, sample.population.clone(), best));
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    // ---- Assemble per-method outcomes.
    let methods = EvalMethod::ALL
        .iter()
        .enumerate()
        .map(|(method_index, &method)| {
            let matrix = confusion[method_index];
            let correct: u32 = (0..Superpop::COUNT).map(|i| matrix[i][i]).sum();
            let total: u32 = matrix.iter().flatten().sum();
            MethodOutcome {
                method,
                accuracy: if total == 0 { 0.0 } else { f64::from(correct) / f64::from(total) },
                confusion: matrix.iter().map(|row| row.to_vec()).collect(),
            }
        })
        .collect();

    // ---- Assemble per-continent subpopulation confusions.
    let mut subpopulations = Vec::new();
    for continent in Superpop::ALL {
        let codes: Vec<String> = panel
            .subpopulations_of(continent)
            .iter()
            .map(|population| population.code.clone())
            .collect();
        if codes.len() < 2 {
            continue;
        }
        let mut matrix = vec![vec![0u32; codes.len()]; codes.len()];
        let mut correct = 0u32;
        let mut total = 0u32;
        for (_, truth, prediction) in subpop_results.iter().filter(|(pop, _, _)| *pop == continent) {
            let (Some(truth_index), Some(pred_index)) = (
                codes.iter().position(|code| code == truth),
                codes.iter().position(|code| code == prediction),
            ) else {
                continue;
            };
            matrix[truth_index][pred_index] += 1;
            total += 1;
            if truth_index == pred_index {
                correct += 1;
            }
        }
        if total == 0 {
            continue;
        }
        subpopulations.push(SubpopOutcome {
            continent,
            codes,
            accuracy: f64::from(correct) / f64::from(total),
            confusion: matrix,
        });
    }

    Ok(ValidationReport { samples_evaluated: test_set.len(), methods, subpopulations })
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Leave-one-out evaluation over {} samples", self.samples_evaluated)?;
        for outcome in &self.methods {
            writeln!(f, "\n{} - accuracy {:.1}%", outcome.method, outcome.accuracy * 100.0)?;
            write!(f, "{: >12}", "truth\\pred")?;
            for pop in Superpop::ALL {
                write!(f, "{pop: >6}")?;
            }
            writeln!(f)?;
            for (row_index, row) in outcome.confusion.iter().enumerate() {
                write!(f, "{: >12}", Superpop::ALL[row_index].code())?;
                for count in row {
                    write!(f, "{count: >6}")?;
                }
                writeln!(f)?;
            }
        }
        for outcome in &self.subpopulations {
            writeln!(
                f,
                "\n{} subpopulations - accuracy {:.1}%",
                outcome.continent,
                outcome.accuracy * 100.0
            )?;
            write!(f, "{: >12}", "truth\\pred")?;
            for code in &outcome.codes {
                write!(f, "{code: >6}")?;
            }
            writeln!(f)?;
            for (row_index, row) in outcome.confusion.iter().enumerate() {
                write!(f, "{: >12}", outcome.codes[row_index])?;
                for count in row {
                    write!(f, "{count: >6}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
