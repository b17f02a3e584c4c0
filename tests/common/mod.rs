//! Shared synthetic world for the end-to-end suites: a deterministic AIM
//! database, a packed reference panel drawn from it, and vendor-style
//! genotype files re-emitted from panel columns.
#![allow(dead_code)]

use anyhow::Result;
use serde_json::json;

use cairn_io::{
    read::aim::{AimDocument, AimMetadata},
    read::panel::{PanelDocument, PanelMetaDocument},
    AimDatabase, AimMarker, ReferencePanel,
};
use genotype::{Allele, Chromosome, Superpop};

/// Synthetic catalogue size. Non-palindromic markers stay above the
/// high-confidence threshold even after palindromic drops.
pub const MARKERS: usize = 2_500;
pub const SAMPLES_PER_SUBPOP: usize = 6;

pub const SUBPOPS: [(&str, Superpop); 10] = [
    ("CEU", Superpop::Eur), ("GBR", Superpop::Eur),
    ("YRI", Superpop::Afr), ("LWK", Superpop::Afr),
    ("CHB", Superpop::Eas), ("JPT", Superpop::Eas),
    ("GIH", Superpop::Sas), ("PJL", Superpop::Sas),
    ("MXL", Superpop::Amr), ("PUR", Superpop::Amr),
];

pub struct Fixture {
    pub aim: AimDatabase,
    pub panel: ReferencePanel,
    /// Dosages by [marker][sample], 9 = missing. Marker order matches
    /// `markers`, not the database's locus order.
    pub matrix: Vec<Vec<u8>>,
    pub markers: Vec<AimMarker>,
    /// (id, subpopulation, superpopulation) per column.
    pub samples: Vec<(String, String, Superpop)>,
}

pub fn rsid(marker: usize) -> String {
    format!("rs{}", 10_000 + marker)
}

pub fn locus(marker: usize) -> (u8, u64) {
    let chromosome = (marker % 22) as u8 + 1;
    let position = 1_000_000 + (marker / 22) as u64 * 1_000_000;
    (chromosome, position)
}

/// Every 10th marker is an A/T palindrome; the rest are A/G.
pub fn is_palindromic(marker: usize) -> bool {
    marker % 10 == 0
}

/// Continental alternate-allele frequency: each marker is informative
/// for one cycling superpopulation.
pub fn continental_freq(marker: usize, pop: Superpop) -> f64 {
    if marker % 5 == pop.index() {
        0.8
    } else {
        0.1
    }
}

/// Subpopulation frequency: every 7th marker separates the two subpops
/// of a continent by +/- 0.15 around the continental value.
pub fn subpop_freq(marker: usize, pop: Superpop, subpop_slot: usize) -> f64 {
    let base = continental_freq(marker, pop);
    if marker % 7 == 0 {
        let shift = if subpop_slot == 0 { 0.15 } else { -0.15 };
        (base + shift).clamp(0.02, 0.98)
    } else {
        base
    }
}

fn aim_markers() -> Vec<AimMarker> {
    (0..MARKERS)
        .map(|marker| {
            let (chromosome, position) = locus(marker);
            AimMarker {
                rsid: rsid(marker),
                chromosome: Chromosome::Autosome(chromosome),
                position,
                reference: Allele::A,
                alternate: if is_palindromic(marker) { Allele::T } else { Allele::G },
                frequencies: genotype::SuperpopMap::from_fn(|pop| continental_freq(marker, pop)),
            }
        })
        .collect()
}

pub fn aim_document() -> AimDocument {
    AimDocument {
        metadata: AimMetadata {
            version: "1.0.0".to_string(),
            total_markers: MARKERS,
            last_updated: "2025-06-01".to_string(),
            description: "synthetic test catalogue".to_string(),
        },
        markers: aim_markers(),
    }
}

/// Draw one dosage from a binomial(2, freq) with the shared generator.
fn draw_dosage(rng: &mut fastrand::Rng, freq: f64) -> u8 {
    u8::from(rng.f64() < freq) + u8::from(rng.f64() < freq)
}

pub fn fixture() -> Result<Fixture> {
    let markers = aim_markers();

    // ---- Sample roster: 6 individuals per subpopulation, columns in
    //      roster order.
    let mut samples = Vec::new();
    for (code, pop) in SUBPOPS {
        for index in 0..SAMPLES_PER_SUBPOP {
            samples.push((format!("{code}{index:03}"), code.to_string(), pop));
        }
    }

    // ---- Deterministic dosage matrix, with a sprinkle of missing calls.
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let mut matrix = vec![vec![0u8; samples.len()]; MARKERS];
    for (marker, row) in matrix.iter_mut().enumerate() {
        for (column, cell) in row.iter_mut().enumerate() {
            if (marker + column) % 97 == 0 {
                *cell = 9;
                continue;
            }
            let subpop_slot = (column / SAMPLES_PER_SUBPOP) % 2;
            let pop = samples[column].2;
            *cell = draw_dosage(&mut rng, subpop_freq(marker, pop, subpop_slot));
        }
    }

    // ---- Assemble the two panel documents through their JSON shape.
    let rsids: Vec<String> = (0..MARKERS).map(rsid).collect();
    let sample_ids: Vec<&str> = samples.iter().map(|(id, _, _)| id.as_str()).collect();
    let genotypes: serde_json::Map<String, serde_json::Value> = (0..MARKERS)
        .map(|marker| {
            let packed: String = matrix[marker]
                .iter()
                .map(|&dosage| char::from(b'0' + dosage))
                .collect();
            (rsid(marker), json!(packed))
        })
        .collect();

    let panel_document: PanelDocument = serde_json::from_value(json!({
        "metadata": { "rsids": rsids, "sampleIds": sample_ids },
        "genotypes": genotypes,
    }))?;

    let populations: serde_json::Map<String, serde_json::Value> = SUBPOPS
        .iter()
        .map(|(code, pop)| {
            (
                (*code).to_string(),
                json!({
                    "code": code,
                    "superPop": pop.code(),
                    "count": SAMPLES_PER_SUBPOP,
                    "description": format!("synthetic {code} cohort"),
                }),
            )
        })
        .collect();
    let sample_info: Vec<serde_json::Value> = samples
        .iter()
        .enumerate()
        .map(|(index, (id, code, pop))| {
            json!({
                "id": id,
                "population": code,
                "superPopulation": pop.code(),
                "index": index,
            })
        })
        .collect();
    let meta_document: PanelMetaDocument = serde_json::from_value(json!({
        "populations": populations,
        "sampleInfo": sample_info,
    }))?;

    Ok(Fixture {
        aim: AimDatabase::from_document(aim_document())?,
        panel: ReferencePanel::from_documents(panel_document, meta_document)?,
        matrix,
        markers,
        samples,
    })
}

/// Column index of the first sample of a subpopulation.
pub fn first_column_of(code: &str) -> usize {
    SUBPOPS
        .iter()
        .position(|(candidate, _)| *candidate == code)
        .expect("unknown subpopulation")
        * SAMPLES_PER_SUBPOP
}

fn call_for(marker: &AimMarker, dosage: u8) -> String {
    let (reference, alternate) = (marker.reference.as_char(), marker.alternate.as_char());
    match dosage {
        0 => format!("{reference}{reference}"),
        1 => format!("{reference}{alternate}"),
        2 => format!("{alternate}{alternate}"),
        _ => "--".to_string(),
    }
}

/// Re-emit one panel column as a 23andMe-style file.
pub fn genotype_text(fixture: &Fixture, column: usize) -> String {
    let mut content = String::from(
        "# This data file generated by 23andMe.\n# reference human assembly build 37\n",
    );
    for (index, marker) in fixture.markers.iter().enumerate() {
        let (chromosome, position) = locus(index);
        content.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            marker.rsid,
            chromosome,
            position,
            call_for(marker, fixture.matrix[index][column]),
        ));
    }
    content
}

/// A synthetic even admixture: dosage =
/// round((EUR_freq + AFR_freq) / 2 * 2) at every marker.
pub fn averaged_admixture_text(fixture: &Fixture) -> String {
    let mut content = String::from("# This data file generated by 23andMe.\n");
    for (index, marker) in fixture.markers.iter().enumerate() {
        let (chromosome, position) = locus(index);
        let mean = (continental_freq(index, Superpop::Eur) + continental_freq(index, Superpop::Afr)) / 2.0;
        let dosage = (mean * 2.0).round() as u8;
        content.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            marker.rsid,
            chromosome,
            position,
            call_for(marker, dosage),
        ));
    }
    content
}

/// A block-admixed genome: chromosomes 1-11 drawn from EUR frequencies,
/// 12-22 from AFR.
pub fn block_admixture_text(fixture: &Fixture) -> String {
    let mut rng = fastrand::Rng::with_seed(0xb10c);
    let mut content = String::from("# This data file generated by 23andMe.\n");
    for (index, marker) in fixture.markers.iter().enumerate() {
        let (chromosome, position) = locus(index);
        let pop = if chromosome <= 11 { Superpop::Eur } else { Superpop::Afr };
        let dosage = draw_dosage(&mut rng, continental_freq(index, pop));
        content.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            marker.rsid,
            chromosome,
            position,
            call_for(marker, dosage),
        ));
    }
    content
}
