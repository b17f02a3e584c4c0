use std::{fs, str::FromStr};

use ahash::AHashSet;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use cairn_io::{
    read::aim::{AimDocument, AimMetadata},
    AimDatabase, AimMarker,
};
use genotype::{Allele, Chromosome};

use crate::{
    client::{VariantClient, VariantDocument, MAX_BATCH_SIZE},
    error::AimBuildError,
    frequencies::extract_frequencies,
    fst::continental_fst,
};

/// A variant accepted as a biallelic SNP candidate: its locus and
/// (ref, alt) pair, extracted from the document's first mapping.
fn candidate_site(document: &VariantDocument) -> Option<(Chromosome, u64, Allele, Allele)> {
    // Indels and structural classes are rejected up front.
    let class = document.var_class.as_deref()?;
    if !class.eq_ignore_ascii_case("snp") {
        return None;
    }

    let mapping = document.mappings.first()?;
    let mut alleles = mapping.allele_string.split('/');
    let (reference, alternate) = (alleles.next()?, alleles.next()?);
    if alleles.next().is_some() {
        // Multi-allelic.
        return None;
    }
    if reference.len() != 1 || alternate.len() != 1 {
        // Indel spelled as an allele string.
        return None;
    }

    let chromosome = Chromosome::from_str(&mapping.seq_region_name).ok()?;
    let reference = Allele::try_from(reference.chars().next()?).ok()?;
    let alternate = Allele::try_from(alternate.chars().next()?).ok()?;
    Some((chromosome, mapping.start, reference, alternate))
}

fn read_seed_rsids(build: &parser::AimBuild) -> Result<Vec<String>> {
    let content = fs::read_to_string(&build.seed_rsids)
        .with_context(|| format!("While reading seed list {}", build.seed_rsids.display()))?;

    let mut seen = AHashSet::new();
    let seeds: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("rs"))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect();

    if seeds.is_empty() {
        return Err(AimBuildError::EmptySeedList(build.seed_rsids.display().to_string()).into());
    }
    Ok(seeds)
}

/// Offline AIM database construction (C9): query the variant service in
/// batches, keep biallelic SNPs with sufficient continental coverage and
/// FST, and atomically emit the expanded database.
pub fn run(common: &parser::Common, build: &parser::AimBuild) -> Result<()> {
    let seeds = read_seed_rsids(build)?;
    info!("Loaded {} candidate rsids from {}", seeds.len(), build.seed_rsids.display());

    let existing = match &build.existing {
        Some(path) => Some(AimDatabase::from_path(path)?),
        None => None,
    };
    let known: AHashSet<&str> = existing
        .iter()
        .flat_map(|database| database.rsids())
        .collect();

    let output_path = common.output_dir.join(&build.output_file);
    common.can_write_file(&output_path)?;

    let client = VariantClient::new(&build.url)?;
    let batch_size = build.batch_size.clamp(1, MAX_BATCH_SIZE);

    let progress = logger::Logger::multi().add(
        ProgressBar::new(((seeds.len() + batch_size - 1) / batch_size) as u64).with_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} batches")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        ),
    );
    progress.set_message("querying variant service");

    // ---- Batch loop. Dropped batches are counted, never fatal.
    let mut new_markers: Vec<AimMarker> = Vec::new();
    let mut rejected = 0usize;
    let mut dropped_batches = 0usize;
    'batches: for chunk in seeds.chunks(batch_size) {
        if new_markers.len() >= build.max_new_markers {
            info!("Early stop: {} new markers collected", new_markers.len());
            break 'batches;
        }

        let documents = match client.fetch_batch(chunk) {
            Ok(documents) => documents,
            Err(AimBuildError::ExternalService { status }) => {
                warn!("Dropping batch of {} rsids: HTTP {status}", chunk.len());
                dropped_batches += 1;
                progress.inc(1);
                continue 'batches;
            }
            Err(AimBuildError::Throttled(retries)) => {
                warn!("Dropping batch of {} rsids: still throttled after {retries} retries", chunk.len());
                dropped_batches += 1;
                progress.inc(1);
                continue 'batches;
            }
            Err(error) => return Err(error.into()),
        };

        for (rsid, document) in documents {
            if known.contains(rsid.as_str()) || new_markers.iter().any(|marker| marker.rsid == rsid) {
                continue;
            }
            let Some((chromosome, position, reference, alternate)) = candidate_site(&document) else {
                rejected += 1;
                continue;
            };
            let Some(frequencies) = extract_frequencies(&document, alternate) else {
                rejected += 1;
                continue;
            };
            let fst = continental_fst(&frequencies);
            if fst < build.fst_threshold {
                debug!("{rsid}: FST {fst:.3} below threshold {}", build.fst_threshold);
                continue;
            }
            new_markers.push(AimMarker { rsid, chromosome, position, reference, alternate, frequencies });
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    info!(
        "Collected {} new markers ({rejected} candidates rejected, {dropped_batches} batches dropped)",
        new_markers.len()
    );

    // ---- Merge with the existing catalogue and emit, sorted by locus.
    let mut markers: Vec<AimMarker> = existing
        .iter()
        .flat_map(|database| database.iter().cloned())
        .collect();
    markers.extend(new_markers);

    let metadata = AimMetadata {
        version: existing
            .as_ref()
            .map_or_else(|| String::from("1.0.0"), |database| database.metadata.version.clone()),
        total_markers: markers.len(),
        last_updated: chrono::offset::Local::now().format("%Y-%m-%d").to_string(),
        description: String::from("Ancestry-informative markers with continental alternate-allele frequencies"),
    };
    // Round-trip through the database type to enforce ordering and the
    // frequency invariants before anything lands on disk.
    let database = AimDatabase::from_document(AimDocument { metadata, markers })?;
    let document = AimDocument {
        metadata: database.metadata.clone(),
        markers: database.iter().cloned().collect(),
    };

    cairn_io::write::atomic_write_json(&output_path, &document)?;
    info!("AIM database written to {} ({} markers)", output_path.display(), document.markers.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Mapping;

    fn snp_document(allele_string: &str) -> VariantDocument {
        VariantDocument {
            var_class: Some("SNP".to_string()),
            mappings: vec![Mapping {
                seq_region_name: "7".to_string(),
                start: 50_443_603,
                allele_string: allele_string.to_string(),
            }],
            populations: Vec::new(),
        }
    }

    #[test]
    fn accepts_biallelic_snps() {
        let (chromosome, position, reference, alternate) =
            candidate_site(&snp_document("A/G")).expect("biallelic SNP was rejected");
        assert_eq!(chromosome, Chromosome::Autosome(7));
        assert_eq!(position, 50_443_603);
        assert_eq!(reference, Allele::A);
        assert_eq!(alternate, Allele::G);
    }

    #[test]
    fn rejects_multiallelic_and_indels() {
        assert!(candidate_site(&snp_document("A/G/T")).is_none());
        assert!(candidate_site(&snp_document("TA/T")).is_none());
        assert!(candidate_site(&snp_document("A/-")).is_none());

        let mut indel = snp_document("A/G");
        indel.var_class = Some("indel".to_string());
        assert!(candidate_site(&indel).is_none());
    }

    #[test]
    fn rejects_unplaced_contigs() {
        let mut document = snp_document("A/G");
        document.mappings[0].seq_region_name = "GL000219.1".to_string();
        assert!(candidate_site(&document).is_none());
    }
}
