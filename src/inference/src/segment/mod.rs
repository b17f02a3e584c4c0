use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use genotype::{Chromosome, Confidence, Superpop};

use crate::hmm::MarkerPosterior;

/// Segments shorter than this merge into an identically-labelled
/// neighbour.
pub const MIN_SEGMENT_BP: u64 = 500_000;

/// Which haplotype a segment was called on. Unphased input always yields
/// [`Parent::Unphased`]; the phased variants exist for callers that feed
/// the segmenter two haplotype dosage streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Parent {
    Maternal,
    Paternal,
    HaplotypeA,
    HaplotypeB,
    Unphased,
}

impl std::fmt::Display for Parent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maternal   => write!(f, "maternal"),
            Self::Paternal   => write!(f, "paternal"),
            Self::HaplotypeA => write!(f, "haplotypeA"),
            Self::HaplotypeB => write!(f, "haplotypeB"),
            Self::Unphased   => write!(f, "unphased"),
        }
    }
}

/// A contiguous stretch of one chromosome assigned a single ancestry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub chromosome: Chromosome,
    pub start: u64,
    pub end: u64,
    pub category: Superpop,
    pub confidence: Confidence,
    pub parent: Parent,
}

/// The complete local-ancestry partition of a genome.
#[derive(Debug, Clone, Serialize)]
pub struct LocalAncestry {
    pub segments: Vec<Segment>,
    #[serde(rename = "segmentsByChromosome")]
    pub by_chromosome: BTreeMap<Chromosome, Vec<Segment>>,
}

impl LocalAncestry {
    fn from_segments(segments: Vec<Segment>) -> Self {
        let mut by_chromosome: BTreeMap<Chromosome, Vec<Segment>> = BTreeMap::new();
        for segment in &segments {
            by_chromosome.entry(segment.chromosome).or_default().push(segment.clone());
        }
        Self { segments, by_chromosome }
    }
}

/// Walk the smoothed markers and emit merged ancestry segments (C8).
/// `markers` must be ordered by (chromosome, position), which is how
/// [`crate::hmm::smooth`] yields them.
#[must_use]
pub fn segment_markers(markers: &[MarkerPosterior], parent: Parent) -> LocalAncestry {
    let mut segments = Vec::new();

    let mut start = 0usize;
    for index in 1..=markers.len() {
        let boundary = index == markers.len()
            || markers[index].chromosome != markers[start].chromosome;
        if boundary {
            segments.extend(segment_chromosome(&markers[start..index], parent));
            start = index;
        }
    }

    debug!("Segmenter: {} segments over {} markers", segments.len(), markers.len());
    LocalAncestry::from_segments(segments)
}

/// Segment a single chromosome's marker run.
fn segment_chromosome(markers: &[MarkerPosterior], parent: Parent) -> Vec<Segment> {
    let Some(first) = markers.first() else {
        return Vec::new();
    };
    let chromosome = first.chromosome;
    let chromosome_end = chromosome
        .length()
        .max(markers[markers.len() - 1].position + 1);

    // ---- Raw runs: a new segment starts at every arg-max label change.
    let mut raw: Vec<Segment> = Vec::new();
    let mut run_start = 0usize;
    for index in 1..=markers.len() {
        let run_ends = index == markers.len() || markers[index].label != markers[run_start].label;
        if !run_ends {
            continue;
        }
        let end = if index == markers.len() {
            chromosome_end
        } else {
            markers[index].position
        };
        raw.push(Segment {
            chromosome,
            start: markers[run_start].position,
            end,
            category: markers[run_start].label,
            confidence: markers[run_start..index]
                .iter()
                .map(|marker| marker.confidence)
                .min()
                .unwrap_or(Confidence::Low),
            parent,
        });
        run_start = index;
    }

    merge_short_segments(raw)
}

/// Collapse sub-[`MIN_SEGMENT_BP`] islands whose two neighbours share a
/// label into the longer neighbour, then merge any adjacent
/// same-category pairs.
fn merge_short_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    loop {
        let island = (1..segments.len().saturating_sub(1)).find(|&index| {
            segments[index].end - segments[index].start < MIN_SEGMENT_BP
                && segments[index - 1].category == segments[index + 1].category
                && segments[index - 1].category != segments[index].category
        });
        let Some(index) = island else { break };

        // Absorb into the longer neighbour; the adjacency pass below then
        // bridges the two flanking segments into one.
        let prev_len = segments[index - 1].end - segments[index - 1].start;
        let next_len = segments[index + 1].end - segments[index + 1].start;
        if prev_len >= next_len {
            segments[index - 1].end = segments[index].end;
            segments[index - 1].confidence =
                segments[index - 1].confidence.min(segments[index].confidence);
        } else {
            segments[index + 1].start = segments[index].start;
            segments[index + 1].confidence =
                segments[index + 1].confidence.min(segments[index].confidence);
        }
        segments.remove(index);
    }

    // ---- Final pass: adjacent segments with one category always merge.
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if last.category == segment.category && last.end == segment.start => {
                last.end = segment.end;
                last.confidence = last.confidence.min(segment.confidence);
            }
            _ => merged.push(segment),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn marker(chromosome: u8, position: u64, label: Superpop, confidence: Confidence) -> MarkerPosterior {
        MarkerPosterior {
            chromosome: Chromosome::Autosome(chromosome),
            position,
            label,
            confidence,
            posterior: 0.9,
        }
    }

    fn eur(chromosome: u8, position: u64) -> MarkerPosterior {
        marker(chromosome, position, Superpop::Eur, Confidence::High)
    }

    fn afr(chromosome: u8, position: u64) -> MarkerPosterior {
        marker(chromosome, position, Superpop::Afr, Confidence::High)
    }

    #[test]
    fn single_run_spans_the_chromosome() {
        let markers: Vec<_> = (0..10).map(|i| eur(1, 1_000_000 + i * 1_000_000)).collect();
        let ancestry = segment_markers(&markers, Parent::Unphased);

        assert_eq!(ancestry.segments.len(), 1);
        let segment = &ancestry.segments[0];
        assert_eq!(segment.start, 1_000_000);
        assert_eq!(segment.end, Chromosome::Autosome(1).length());
        assert_eq!(segment.category, Superpop::Eur);
        assert_eq!(segment.parent, Parent::Unphased);
    }

    #[test]
    fn label_changes_open_new_segments() {
        let mut markers: Vec<_> = (0..5).map(|i| eur(1, 1_000_000 + i * 2_000_000)).collect();
        markers.extend((0..5).map(|i| afr(1, 11_000_000 + i * 2_000_000)));
        let ancestry = segment_markers(&markers, Parent::Unphased);

        assert_eq!(ancestry.segments.len(), 2);
        assert_eq!(ancestry.segments[0].category, Superpop::Eur);
        assert_eq!(ancestry.segments[0].end, 11_000_000); // next run's first marker
        assert_eq!(ancestry.segments[1].start, 11_000_000);
        assert_eq!(ancestry.segments[1].category, Superpop::Afr);
    }

    #[test]
    fn segments_tile_without_overlap() {
        let mut markers = Vec::new();
        for (i, label) in [Superpop::Eur, Superpop::Afr, Superpop::Eas, Superpop::Eur]
            .iter()
            .enumerate()
        {
            for j in 0..4u64 {
                markers.push(marker(2, 1_000_000 + (i as u64 * 4 + j) * 2_000_000, *label, Confidence::High));
            }
        }
        let ancestry = segment_markers(&markers, Parent::Unphased);

        let segments = &ancestry.by_chromosome[&Chromosome::Autosome(2)];
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!(pair[0].start < pair[0].end);
        }
    }

    #[test]
    fn short_islands_are_absorbed() {
        // A 100 kb AFR island inside a long EUR run disappears.
        let mut markers: Vec<_> = (0..5).map(|i| eur(1, 1_000_000 + i * 1_000_000)).collect();
        markers.push(afr(1, 6_000_000));
        markers.push(marker(1, 6_100_000, Superpop::Eur, Confidence::High)); // closes the island at 100 kb
        markers.extend((0..5).map(|i| eur(1, 7_000_000 + i * 1_000_000)));

        let ancestry = segment_markers(&markers, Parent::Unphased);
        assert_eq!(ancestry.segments.len(), 1);
        assert_eq!(ancestry.segments[0].category, Superpop::Eur);
    }

    #[test]
    fn long_minority_segments_survive() {
        let mut markers: Vec<_> = (0..5).map(|i| eur(1, 1_000_000 + i * 1_000_000)).collect();
        markers.extend((0..5).map(|i| afr(1, 6_000_000 + i * 1_000_000))); // 5 Mb AFR block
        markers.extend((0..5).map(|i| eur(1, 11_000_000 + i * 1_000_000)));

        let ancestry = segment_markers(&markers, Parent::Unphased);
        let categories: Vec<Superpop> = ancestry.segments.iter().map(|s| s.category).collect();
        assert_eq!(categories, vec![Superpop::Eur, Superpop::Afr, Superpop::Eur]);
    }

    #[test]
    fn confidence_is_the_run_minimum() {
        let markers = vec![
            marker(1, 1_000_000, Superpop::Eur, Confidence::High),
            marker(1, 2_000_000, Superpop::Eur, Confidence::Low),
            marker(1, 3_000_000, Superpop::Eur, Confidence::High),
        ];
        let ancestry = segment_markers(&markers, Parent::Unphased);
        assert_eq!(ancestry.segments[0].confidence, Confidence::Low);
    }

    #[test]
    fn chromosomes_are_segmented_independently() {
        let markers = vec![
            eur(1, 1_000_000),
            eur(1, 2_000_000),
            afr(2, 1_000_000),
            afr(2, 2_000_000),
        ];
        let ancestry = segment_markers(&markers, Parent::Unphased);

        assert_eq!(ancestry.segments.len(), 2);
        assert_eq!(ancestry.by_chromosome.len(), 2);
        assert_eq!(ancestry.by_chromosome[&Chromosome::Autosome(1)][0].category, Superpop::Eur);
        assert_eq!(ancestry.by_chromosome[&Chromosome::Autosome(2)][0].category, Superpop::Afr);
    }

    #[test]
    fn segmentation_is_idempotent_on_labels() {
        // Feeding the same label sequence twice yields identical output.
        let mut markers: Vec<_> = (0..6).map(|i| eur(3, 1_000_000 + i * 1_500_000)).collect();
        markers.extend((0..6).map(|i| afr(3, 10_000_000 + i * 1_500_000)));

        let first = segment_markers(&markers, Parent::Unphased);
        let second = segment_markers(&markers, Parent::Unphased);
        assert_eq!(first.segments, second.segments);
    }
}
