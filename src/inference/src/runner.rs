//! Command-line entry points: wire the reference files, the input file
//! and the inference pipeline together, and write the result documents.

use std::{fmt::Write as _, path::Path};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use cairn_io::{AimDatabase, ReferencePanel};

use crate::{
    cancel::CancelToken,
    composition::CompositionResult,
    error::InferenceError,
    infer_admixture, infer_local_ancestry,
    segment::LocalAncestry,
    validation,
};

/// Load the optional reference panel; a broken panel degrades the run to
/// AIM-only EM instead of aborting it.
fn load_panel(common: &parser::Common) -> Option<ReferencePanel> {
    match (&common.panel, &common.panel_meta) {
        (Some(panel_path), Some(meta_path)) => {
            match ReferencePanel::from_paths(panel_path, meta_path) {
                Ok(panel) => Some(panel),
                Err(source) => {
                    warn!("{}", InferenceError::ReferenceUnavailable(format!("{source:#}")));
                    None
                }
            }
        }
        (None, None) => None,
        _ => {
            warn!("--panel and --panel-meta must be provided together; continuing without a panel");
            None
        }
    }
}

fn write_segments_tsv(path: &Path, ancestry: &LocalAncestry) -> Result<()> {
    let mut content = String::from("chromosome\tstart\tend\tcategory\tconfidence\tparent\n");
    for segment in &ancestry.segments {
        writeln!(
            content,
            "{}\t{}\t{}\t{}\t{}\t{}",
            segment.chromosome,
            segment.start,
            segment.end,
            segment.category,
            segment.confidence,
            segment.parent,
        )?;
    }
    cairn_io::write::atomic_write_text(path, &content)
}

/// Run the full inference pipeline for the `infer` subcommand:
/// parse -> intersect -> global inference -> per-chromosome HMM -> segments.
pub fn run(common: &parser::Common, args: &parser::Infer) -> Result<()> {
    let aim = AimDatabase::from_path(&common.aim_db)?;
    let panel = load_panel(common);
    let parsed = genofile::parse_path(&args.input)?;
    let cancel = CancelToken::new();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .context("While building the inference worker pool")?;

    let outcome: Result<(CompositionResult, LocalAncestry)> = pool.install(|| {
        let composition = infer_admixture(&parsed, &aim, panel.as_ref(), &cancel)?;
        info!(
            "Global composition [{}]: {} (confidence: {})",
            composition.method, composition.proportions, composition.confidence
        );
        let ancestry =
            infer_local_ancestry(&parsed, &composition, &aim, args.switch_scale, &cancel)?;
        Ok((composition, ancestry))
    });
    let (composition, ancestry) = outcome?;

    // ---- Write result documents next to each other in the output dir.
    let stem = args
        .input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("cairn");
    let composition_path = common.output_dir.join(format!("{stem}.composition.json"));
    let segments_path = common.output_dir.join(format!("{stem}.segments.tsv"));
    common.can_write_file(&composition_path)?;
    common.can_write_file(&segments_path)?;

    cairn_io::write::atomic_write_json(&composition_path, &composition)?;
    write_segments_tsv(&segments_path, &ancestry)?;
    info!("Results written to {}", common.output_dir.display());
    Ok(())
}

/// Run the leave-one-out panel evaluation for the `validate` subcommand.
pub fn validate(common: &parser::Common, args: &parser::Validate) -> Result<()> {
    let aim = AimDatabase::from_path(&common.aim_db)?;
    let (panel_path, meta_path) = common
        .panel
        .as_ref()
        .zip(common.panel_meta.as_ref())
        .ok_or_else(|| anyhow!("validation requires both --panel and --panel-meta"))?;
    let panel = ReferencePanel::from_paths(panel_path, meta_path)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .context("While building the validation worker pool")?;

    info!("Seed: {}", args.seed);
    let report = pool.install(|| {
        validation::run_validation(&aim, &panel, args.max_per_pop, args.seed, &CancelToken::new())
    })?;
    info!("\n{report}");

    let report_path = common.output_dir.join("validation-report.json");
    common.can_write_file(&report_path)?;
    cairn_io::write::atomic_write_json(&report_path, &report)?;
    info!("Report written to {}", report_path.display());
    Ok(())
}
