use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::BufReader,
    path::Path,
};

use ahash::AHashMap;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use genotype::{dosage, Superpop};

mod error;
pub use error::PanelError;

/// One reference individual: its subpopulation code, continental
/// superpopulation, and its column offset within every genotype string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleInfo {
    pub id: String,
    pub population: String,
    pub super_population: Superpop,
    pub index: usize,
}

/// A subpopulation entry out of the panel metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationInfo {
    pub code: String,
    #[serde(rename = "superPop")]
    pub super_pop: Superpop,
    pub count: usize,
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PanelMetadataBlock {
    rsids: Vec<String>,
    sample_ids: Vec<String>,
}

/// On-disk shape of the packed genotype document.
#[derive(Debug, Deserialize)]
pub struct PanelDocument {
    metadata: PanelMetadataBlock,
    genotypes: HashMap<String, String>,
}

/// On-disk shape of the panel metadata document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelMetaDocument {
    populations: BTreeMap<String, PopulationInfo>,
    sample_info: Vec<SampleInfo>,
}

/// The reference panel: N labelled individuals genotyped over M markers.
///
/// The packed ASCII genotype strings are decoded once at load time into a
/// contiguous row-major dosage matrix (one row per marker, one byte per
/// sample) so that per-marker scans stay cache-friendly.
#[derive(Debug)]
pub struct ReferencePanel {
    rsids      : Vec<String>,
    sample_ids : Vec<String>,
    samples    : Vec<SampleInfo>,
    populations: BTreeMap<String, PopulationInfo>,
    matrix     : Vec<u8>,
    row_of     : AHashMap<String, usize>,
}

impl ReferencePanel {
    /// Decode and validate the two panel documents.
    ///
    /// # Errors
    /// - a rsid listed in the metadata without a genotype string;
    /// - a genotype string whose length differs from the sample count;
    /// - a byte outside the packed `{'0','1','2','9'}` alphabet;
    /// - a sample whose column index exceeds the sample count.
    pub fn from_documents(
        document: PanelDocument,
        metadata: PanelMetaDocument,
    ) -> Result<Self, PanelError> {
        let PanelMetadataBlock { rsids, sample_ids } = document.metadata;
        let n_samples = sample_ids.len();

        // ---- Decode the packed strings into the dosage matrix, in rsid order.
        let mut matrix = Vec::with_capacity(rsids.len() * n_samples);
        let mut row_of = AHashMap::with_capacity(rsids.len());
        for (row, rsid) in rsids.iter().enumerate() {
            let packed = document
                .genotypes
                .get(rsid)
                .ok_or_else(|| PanelError::MissingGenotypes(rsid.clone()))?;
            if packed.len() != n_samples {
                return Err(PanelError::LengthMismatch {
                    rsid: rsid.clone(),
                    expected: n_samples,
                    found: packed.len(),
                });
            }
            for &byte in packed.as_bytes() {
                let decoded = dosage::decode(byte)
                    .ok_or_else(|| PanelError::InvalidDosage { rsid: rsid.clone(), byte })?;
                matrix.push(decoded);
            }
            row_of.insert(rsid.clone(), row);
        }

        // ---- Every declared sample must address a valid matrix column.
        for sample in &metadata.sample_info {
            if sample.index >= n_samples {
                return Err(PanelError::InvalidSampleIndex {
                    id: sample.id.clone(),
                    index: sample.index,
                    samples: n_samples,
                });
            }
        }
        let mut samples = metadata.sample_info;
        samples.sort_by_key(|sample| sample.index);

        Ok(Self {
            rsids,
            sample_ids,
            samples,
            populations: metadata.populations,
            matrix,
            row_of,
        })
    }

    /// Load the panel from its genotype and metadata JSON documents.
    pub fn from_paths(panel_path: &Path, meta_path: &Path) -> Result<Self> {
        let document: PanelDocument = serde_json::from_reader(BufReader::new(
            File::open(panel_path)
                .with_context(|| format!("While opening reference panel {}", panel_path.display()))?,
        ))
        .with_context(|| format!("While deserializing reference panel {}", panel_path.display()))?;

        let metadata: PanelMetaDocument = serde_json::from_reader(BufReader::new(
            File::open(meta_path)
                .with_context(|| format!("While opening panel metadata {}", meta_path.display()))?,
        ))
        .with_context(|| format!("While deserializing panel metadata {}", meta_path.display()))?;

        let panel = Self::from_documents(document, metadata)
            .with_context(|| format!("While validating reference panel {}", panel_path.display()))?;
        info!(
            "Loaded reference panel: {} samples x {} markers, {} subpopulations",
            panel.n_samples(),
            panel.n_markers(),
            panel.populations.len()
        );
        Ok(panel)
    }

    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    #[must_use]
    pub fn n_markers(&self) -> usize {
        self.rsids.len()
    }

    #[must_use]
    pub fn rsids(&self) -> &[String] {
        &self.rsids
    }

    #[must_use]
    pub fn contains_rsid(&self, rsid: &str) -> bool {
        self.row_of.contains_key(rsid)
    }

    #[must_use]
    pub fn row_index(&self, rsid: &str) -> Option<usize> {
        self.row_of.get(rsid).copied()
    }

    /// The decoded dosage row for a marker: one byte per sample.
    #[must_use]
    pub fn row(&self, index: usize) -> &[u8] {
        let n = self.n_samples();
        &self.matrix[index * n..(index + 1) * n]
    }

    /// Dosage of one sample at one marker row (9 = missing).
    #[must_use]
    pub fn dosage(&self, row: usize, column: usize) -> u8 {
        self.matrix[row * self.n_samples() + column]
    }

    /// All labelled samples, ordered by column index.
    #[must_use]
    pub fn samples(&self) -> &[SampleInfo] {
        &self.samples
    }

    /// Labelled samples belonging to one continental superpopulation.
    pub fn samples_in(&self, superpop: Superpop) -> impl Iterator<Item = &SampleInfo> {
        self.samples
            .iter()
            .filter(move |sample| sample.super_population == superpop)
    }

    /// Labelled samples belonging to one subpopulation code.
    pub fn samples_in_population<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a SampleInfo> {
        self.samples.iter().filter(move |sample| sample.population == code)
    }

    /// Subpopulation codes of one continent, in lexicographic order.
    #[must_use]
    pub fn subpopulations_of(&self, superpop: Superpop) -> Vec<&PopulationInfo> {
        self.populations
            .values()
            .filter(|population| population.super_pop == superpop)
            .collect()
    }
}
