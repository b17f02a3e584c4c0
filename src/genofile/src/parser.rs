use ahash::AHashMap;
use log::{debug, warn};

use genotype::{Allele, Chromosome, GenotypeCall, SnpRecord};

use crate::{
    error::{GenofileError, MIN_SNP_COUNT},
    source::{detect_build, detect_source, GenomeBuild, Source},
};

/// Column layout of the data rows, probed from the first data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLayout {
    /// `(rsid, chromosome, position, genotype)` with a two-character call.
    FourColumn,
    /// `(rsid, chromosome, position, allele1, allele2)`.
    FiveColumn,
}

/// A consumer genotype file, normalised into canonical SNP records.
///
/// Rows are kept in file order; `by_rsid` maps each rsid onto its index
/// within `snps`, with duplicate rsids resolving to the first occurrence.
#[derive(Debug)]
pub struct ParsedFile {
    pub source : Source,
    pub build  : GenomeBuild,
    snps       : Vec<SnpRecord>,
    by_rsid    : AHashMap<String, usize>,
}

impl ParsedFile {
    #[must_use]
    pub fn snp_count(&self) -> usize {
        self.snps.len()
    }

    #[must_use]
    pub fn snps(&self) -> &[SnpRecord] {
        &self.snps
    }

    #[must_use]
    pub fn get(&self, rsid: &str) -> Option<&SnpRecord> {
        self.by_rsid.get(rsid).map(|&index| &self.snps[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnpRecord> {
        self.snps.iter()
    }
}

/// Parse the text content of a consumer genotype file.
///
/// # Errors
/// - [`GenofileError::UnrecognisedFormat`] on empty input, an
///   undetectable delimiter, or a column layout that is neither the
///   four- nor the five-field convention;
/// - [`GenofileError::InsufficientSnps`] when a recognised layout yields
///   fewer than 1,000 valid rows.
pub fn parse_file(text: &str) -> Result<ParsedFile, GenofileError> {
    use GenofileError::UnrecognisedFormat;

    if text.trim().is_empty() {
        return Err(UnrecognisedFormat("empty input"));
    }

    // ---- Scan the header block for vendor and build mentions. The scan
    //      stops at the first non-comment line.
    let mut source = Source::Unknown;
    let mut build  = GenomeBuild::Unknown;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            break;
        }
        if source == Source::Unknown {
            if let Some(detected) = detect_source(trimmed) {
                source = detected;
            }
        }
        if build == GenomeBuild::Unknown {
            if let Some(detected) = detect_build(trimmed) {
                build = detected;
            }
        }
    }

    // ---- Probe the column layout from the first data line.
    let first_data_line = text
        .lines()
        .map(str::trim_start)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .ok_or(UnrecognisedFormat("no data rows found"))?;

    if !first_data_line.contains('\t') {
        return Err(UnrecognisedFormat("no field delimiter detected"));
    }
    let layout = match first_data_line.split('\t').count() {
        4 => RowLayout::FourColumn,
        5 => RowLayout::FiveColumn,
        _ => return Err(UnrecognisedFormat("expected 4 or 5 tab-separated fields per row")),
    };

    // ---- Parse data rows. Invalid and missing rows are dropped, not fatal.
    let mut snps: Vec<SnpRecord> = Vec::new();
    let mut by_rsid: AHashMap<String, usize> = AHashMap::new();
    let mut skipped = 0usize;
    let mut duplicates = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(record) = parse_row(line, layout) else {
            skipped += 1;
            continue;
        };
        if by_rsid.contains_key(&record.rsid) {
            duplicates += 1;
            continue;
        }
        by_rsid.insert(record.rsid.clone(), snps.len());
        snps.push(record);
    }

    debug!("Parsed {} SNPs ({skipped} rows skipped, {duplicates} duplicate rsids)", snps.len());
    if snps.len() < MIN_SNP_COUNT {
        return Err(GenofileError::InsufficientSnps { found: snps.len() });
    }
    if source == Source::Unknown {
        warn!("Could not identify the vendor of the input file from its headers");
    }

    Ok(ParsedFile { source, build, snps, by_rsid })
}

/// Parse a single data row into a [`SnpRecord`], or `None` when the row
/// is malformed or carries a missing/indel call.
fn parse_row(line: &str, layout: RowLayout) -> Option<SnpRecord> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();

    let expected = match layout {
        RowLayout::FourColumn => 4,
        RowLayout::FiveColumn => 5,
    };
    if fields.len() != expected {
        return None;
    }

    let rsid = fields[0];
    if !rsid.starts_with("rs") || rsid.len() <= 2 {
        return None;
    }

    let chromosome: Chromosome = fields[1].parse().ok()?;
    let position: u64 = fields[2].parse().ok()?;

    let (raw1, raw2) = match layout {
        RowLayout::FourColumn => {
            let mut chars = fields[3].chars();
            let (a, b) = (chars.next()?, chars.next()?);
            if chars.next().is_some() {
                return None;
            }
            (a, b)
        }
        RowLayout::FiveColumn => {
            let single = |field: &str| {
                let mut chars = field.chars();
                let c = chars.next()?;
                chars.next().is_none().then_some(c)
            };
            (single(fields[3])?, single(fields[4])?)
        }
    };

    // Missing ('-', '0', 'N') and indel ('I', 'D') calls drop the row.
    let allele1 = Allele::try_from(raw1).ok()?;
    let allele2 = Allele::try_from(raw2).ok()?;

    Some(SnpRecord::new(
        rsid.to_string(),
        chromosome,
        position,
        GenotypeCall::new(allele1, allele2),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Emit `count` synthetic 23andMe-style rows cycling over chromosomes 1-22.
    fn synthetic_rows(count: usize) -> String {
        let calls = ["AA", "AG", "GG", "CT", "CC", "TT"];
        (0..count)
            .map(|i| {
                format!(
                    "rs{}\t{}\t{}\t{}",
                    1000 + i,
                    (i % 22) + 1,
                    10_000 + i * 37,
                    calls[i % calls.len()]
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn twentythreeandme_file(rows: usize) -> String {
        format!(
            "# This data file generated by 23andMe at: Sat Jul 05 2025\n\
             # More information on reference human assembly build 37 (GRCh37)\n\
             # rsid\tchromosome\tposition\tgenotype\n{}\n",
            synthetic_rows(rows)
        )
    }

    #[test]
    fn parses_a_twentythreeandme_file() -> anyhow::Result<()> {
        let parsed = parse_file(&twentythreeandme_file(1_200))?;
        assert_eq!(parsed.source, Source::TwentyThreeAndMe);
        assert_eq!(parsed.build, GenomeBuild::Grch37);
        assert_eq!(parsed.snp_count(), 1_200);

        let record = parsed.get("rs1000").expect("rs1000 missing");
        assert_eq!(record.chromosome, Chromosome::Autosome(1));
        assert_eq!(record.position, 10_000);
        Ok(())
    }

    #[test]
    fn parses_a_five_column_ancestry_file() -> anyhow::Result<()> {
        let rows: String = (0..1_100)
            .map(|i| format!("rs{}\t{}\t{}\tA\tG", i, (i % 22) + 1, 5_000 + i))
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!("#AncestryDNA raw data download\n#build 37\n{rows}\n");

        let parsed = parse_file(&content)?;
        assert_eq!(parsed.source, Source::AncestryDna);
        assert_eq!(parsed.snp_count(), 1_100);
        assert_eq!(parsed.get("rs0").expect("rs0 missing").call.to_string(), "AG");
        Ok(())
    }

    #[test]
    fn missing_and_indel_calls_are_dropped() -> anyhow::Result<()> {
        let mut content = twentythreeandme_file(1_050);
        content.push_str("rs999001\t1\t500\t--\n");
        content.push_str("rs999002\t1\t501\tDD\n");
        content.push_str("rs999003\t1\t502\tII\n");
        content.push_str("rs999004\t1\t503\tA0\n");

        let parsed = parse_file(&content)?;
        assert_eq!(parsed.snp_count(), 1_050);
        assert!(parsed.get("rs999001").is_none());
        Ok(())
    }

    #[test]
    fn duplicate_rsids_keep_the_first_occurrence() -> anyhow::Result<()> {
        let mut content = twentythreeandme_file(1_050);
        content.push_str("rs1000\t9\t999999\tTT\n");

        let parsed = parse_file(&content)?;
        let record = parsed.get("rs1000").expect("rs1000 missing");
        assert_eq!(record.chromosome, Chromosome::Autosome(1));
        assert_eq!(record.position, 10_000);
        Ok(())
    }

    #[test]
    fn chr_prefixes_are_stripped() -> anyhow::Result<()> {
        let mut rows = synthetic_rows(1_040);
        rows.push_str("\nrs999100\tchrX\t1234\tAA\nrs999101\tchrMT\t42\tCC\n");
        let parsed = parse_file(&rows)?;
        assert_eq!(parsed.get("rs999100").expect("missing").chromosome, Chromosome::X);
        assert_eq!(parsed.get("rs999101").expect("missing").chromosome, Chromosome::Mt);
        Ok(())
    }

    #[test]
    fn invalid_rsids_and_chromosomes_are_skipped() -> anyhow::Result<()> {
        let mut content = twentythreeandme_file(1_020);
        content.push_str("i705234\t1\t100\tAA\n");     // internal vendor id
        content.push_str("rs55\t99\t100\tAA\n");       // chromosome out of range
        content.push_str("rs56\t1\t-20\tAA\n");        // negative position

        let parsed = parse_file(&content)?;
        assert_eq!(parsed.snp_count(), 1_020);
        Ok(())
    }

    #[test]
    fn empty_input_is_unrecognised() {
        assert!(matches!(parse_file(""), Err(GenofileError::UnrecognisedFormat(_))));
        assert!(matches!(parse_file("\n  \n"), Err(GenofileError::UnrecognisedFormat(_))));
    }

    #[test]
    fn three_column_layout_is_unrecognised() {
        let content = (0..1_200)
            .map(|i| format!("rs{i}\t1\t{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(parse_file(&content), Err(GenofileError::UnrecognisedFormat(_))));
    }

    #[test]
    fn space_separated_rows_are_unrecognised() {
        let content = "rs1 1 100 AA\nrs2 1 200 AG\n";
        assert!(matches!(parse_file(content), Err(GenofileError::UnrecognisedFormat(_))));
    }

    #[test]
    fn undersized_files_are_insufficient() {
        let content = twentythreeandme_file(900);
        assert!(matches!(
            parse_file(&content),
            Err(GenofileError::InsufficientSnps { found: 900 })
        ));
    }
}
