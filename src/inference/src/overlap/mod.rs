use std::ops::Range;

use log::debug;

use cairn_io::{AimDatabase, AimMarker, ReferencePanel};
use genofile::ParsedFile;
use genotype::{Chromosome, SuperpopMap};

/// The marker intersection of a parsed file with a target marker list:
/// parallel vectors over the shared markers, ordered by (chromosome,
/// position). Dosages are always observed (0, 1 or 2) - markers the user
/// is missing never enter the intersection.
#[derive(Debug, Default)]
pub struct AlignedDosages {
    rsids      : Vec<String>,
    dosages    : Vec<u8>,
    frequencies: Vec<SuperpopMap<f64>>,
    loci       : Vec<(Chromosome, u64)>,
}

impl AlignedDosages {
    #[must_use]
    pub fn len(&self) -> usize {
        self.dosages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dosages.is_empty()
    }

    #[must_use]
    pub fn rsids(&self) -> &[String] {
        &self.rsids
    }

    #[must_use]
    pub fn dosages(&self) -> &[u8] {
        &self.dosages
    }

    #[must_use]
    pub fn frequencies(&self) -> &[SuperpopMap<f64>] {
        &self.frequencies
    }

    #[must_use]
    pub fn loci(&self) -> &[(Chromosome, u64)] {
        &self.loci
    }

    /// Contiguous index ranges of the markers of each chromosome, in
    /// chromosome order. Relies on the locus ordering invariant.
    #[must_use]
    pub fn chromosome_ranges(&self) -> Vec<(Chromosome, Range<usize>)> {
        let mut ranges: Vec<(Chromosome, Range<usize>)> = Vec::new();
        for (index, &(chromosome, _)) in self.loci.iter().enumerate() {
            match ranges.last_mut() {
                Some((current, range)) if *current == chromosome => range.end = index + 1,
                _ => ranges.push((chromosome, index..index + 1)),
            }
        }
        ranges
    }

    pub(crate) fn push(&mut self, marker: &AimMarker, dosage: u8) {
        self.rsids.push(marker.rsid.clone());
        self.dosages.push(dosage);
        self.frequencies.push(marker.frequencies);
        self.loci.push((marker.chromosome, marker.position));
    }
}

/// Dosage of the user's call relative to a marker's (ref, alt) pair,
/// flipping to the complementary strand when the call only matches there.
/// Returns `None` when the marker is palindromic or the base sets are
/// irreconcilable.
fn dosage_against(marker: &AimMarker, parsed: &ParsedFile) -> Option<u8> {
    // Strand-ambiguous markers cannot be reconciled; drop them outright.
    if marker.is_palindromic() {
        return None;
    }
    let call = parsed.get(&marker.rsid)?.call;

    if call.matches(marker.reference, marker.alternate) {
        return Some(call.count_of(marker.alternate));
    }

    // Strand flip: the vendor typed the opposite strand.
    let flipped = call.complement();
    if flipped.matches(marker.reference, marker.alternate) {
        return Some(flipped.count_of(marker.alternate));
    }

    None
}

/// Intersect the parsed file with a target marker list (C4). `markers`
/// must be iterated in (chromosome, position) order - which is how
/// [`AimDatabase::iter`] yields them.
pub fn align<'a>(
    parsed: &ParsedFile,
    markers: impl IntoIterator<Item = &'a AimMarker>,
) -> AlignedDosages {
    let mut aligned = AlignedDosages::default();
    for marker in markers {
        if let Some(dosage) = dosage_against(marker, parsed) {
            aligned.push(marker, dosage);
        }
    }
    debug!("Marker intersection: {} shared markers", aligned.len());
    aligned
}

/// An [`AlignedDosages`] restricted to markers the reference panel also
/// carries, together with the matrix row of each shared marker.
#[derive(Debug)]
pub struct PanelAlignment {
    pub aligned: AlignedDosages,
    pub rows   : Vec<usize>,
}

impl PanelAlignment {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Intersect the parsed file with the panel's markers. The panel document
/// carries bare rsids; (ref, alt) and the locus are resolved through the
/// AIM database, so panel rsids unknown to the database are dropped.
pub fn align_to_panel(
    parsed: &ParsedFile,
    aim: &AimDatabase,
    panel: &ReferencePanel,
) -> PanelAlignment {
    let mut aligned = AlignedDosages::default();
    let mut rows = Vec::new();
    for marker in aim.iter() {
        let Some(row) = panel.row_index(&marker.rsid) else {
            continue;
        };
        if let Some(dosage) = dosage_against(marker, parsed) {
            aligned.push(marker, dosage);
            rows.push(row);
        }
    }
    debug!("Panel intersection: {} shared markers", rows.len());
    PanelAlignment { aligned, rows }
}
