//! The ancestry-inference engine: marker-overlap indexing, EM admixture,
//! panel k-NN/likelihood scoring, local-ancestry HMM smoothing and
//! segmentation, plus the leave-one-out validation harness.
//!
//! Everything here is a pure function of explicitly-passed references:
//! the AIM database and the reference panel are loaded once by the
//! caller and shared read-only across inference calls.

pub mod admixture;
pub mod cancel;
pub mod composition;
pub mod error;
pub mod hmm;
pub mod hwe;
pub mod overlap;
pub mod panel;
pub mod segment;
pub mod validation;

mod runner;
pub use runner::{run, validate};

pub use cancel::CancelToken;
pub use composition::{CompositionResult, Method, Neighbor, SubpopComposition};
pub use error::{InferenceError, MIN_OVERLAP};
pub use segment::{LocalAncestry, Parent, Segment};

use anyhow::Result;
use log::{info, warn};

use cairn_io::{AimDatabase, ReferencePanel};
use genofile::ParsedFile;

/// Estimate the global ancestry composition of a parsed file (C4-C6).
///
/// The EM estimate over the AIM database always runs and provides the
/// fallback; when a panel is supplied and shares enough markers with the
/// file, the panel's combined k-NN/likelihood estimate supersedes it.
///
/// # Errors
/// - [`InferenceError::InsufficientMarkers`] when fewer than
///   [`MIN_OVERLAP`] AIM markers intersect the file;
/// - [`InferenceError::Cancelled`] when the token fires.
pub fn infer_admixture(
    parsed: &ParsedFile,
    aim: &AimDatabase,
    panel: Option<&ReferencePanel>,
    cancel: &CancelToken,
) -> Result<CompositionResult, InferenceError> {
    let aligned = overlap::align(parsed, aim.iter());
    if aligned.len() < MIN_OVERLAP {
        return Err(InferenceError::InsufficientMarkers {
            found: aligned.len(),
            required: MIN_OVERLAP,
        });
    }

    let em = admixture::em_admixture(&aligned, cancel)?;

    let Some(panel) = panel else {
        return Ok(CompositionResult::from_em(em));
    };

    let alignment = overlap::align_to_panel(parsed, aim, panel);
    if alignment.len() < MIN_OVERLAP {
        // Thin panel overlap degrades the method rather than failing.
        warn!(
            "Only {} markers shared with the reference panel; falling back to the EM estimate",
            alignment.len()
        );
        return Ok(CompositionResult::from_em(em));
    }

    panel::panel_composition(&alignment, panel, &em, cancel)
}

/// Partition the genome into contiguous ancestry segments (C7-C8),
/// seeding the HMM with the global composition.
///
/// # Errors
/// - [`InferenceError::InsufficientMarkers`] when fewer than
///   [`MIN_OVERLAP`] AIM markers intersect the file;
/// - [`InferenceError::Cancelled`] when the token fires.
pub fn infer_local_ancestry(
    parsed: &ParsedFile,
    composition: &CompositionResult,
    aim: &AimDatabase,
    switch_scale: Option<f64>,
    cancel: &CancelToken,
) -> Result<LocalAncestry, InferenceError> {
    let aligned = overlap::align(parsed, aim.iter());
    if aligned.len() < MIN_OVERLAP {
        return Err(InferenceError::InsufficientMarkers {
            found: aligned.len(),
            required: MIN_OVERLAP,
        });
    }

    let posteriors = hmm::smooth(&aligned, &composition.proportions, switch_scale, cancel)?;
    let ancestry = segment::segment_markers(&posteriors, Parent::Unphased);
    info!(
        "Local ancestry: {} segments across {} chromosomes",
        ancestry.segments.len(),
        ancestry.by_chromosome.len()
    );
    Ok(ancestry)
}
