use std::{fs::File, io::BufReader, path::Path};

use ahash::AHashMap;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use genotype::{Allele, Chromosome, SuperpopMap};

mod error;
pub use error::AimError;

/// Diagnostics block carried at the top of the AIM database document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AimMetadata {
    pub version      : String,
    pub total_markers: usize,
    pub last_updated : String,
    pub description  : String,
}

/// One ancestry-informative marker: a biallelic SNP together with its
/// alternate-allele frequency in each continental superpopulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AimMarker {
    pub rsid: String,
    pub chromosome: Chromosome,
    pub position: u64,
    #[serde(rename = "ref")]
    pub reference: Allele,
    #[serde(rename = "alt")]
    pub alternate: Allele,
    pub frequencies: SuperpopMap<f64>,
}

impl AimMarker {
    /// `true` when the (ref, alt) pair is strand-ambiguous (A/T or C/G).
    #[must_use]
    pub fn is_palindromic(&self) -> bool {
        self.reference.is_palindromic_with(self.alternate)
    }
}

/// On-disk shape of the AIM database document.
#[derive(Debug, Serialize, Deserialize)]
pub struct AimDocument {
    pub metadata: AimMetadata,
    pub markers : Vec<AimMarker>,
}

/// The in-memory AIM database: an immutable, rsid-indexed catalogue of
/// markers, ordered by (chromosome, position). Loaded once at startup
/// and passed by reference to the inference functions.
#[derive(Debug)]
pub struct AimDatabase {
    pub metadata: AimMetadata,
    markers     : Vec<AimMarker>,
    by_rsid     : AHashMap<String, usize>,
}

impl AimDatabase {
    /// Validate and index a deserialised document.
    ///
    /// # Errors
    /// if any marker carries a frequency outside [0, 1].
    pub fn from_document(mut document: AimDocument) -> Result<Self, AimError> {
        for marker in &document.markers {
            if marker.frequencies.values().any(|freq| !(0.0..=1.0).contains(freq)) {
                return Err(AimError::FrequencyOutOfRange(marker.rsid.clone()));
            }
        }

        // Locus order is what the downstream HMM walks; enforce it here
        // rather than trusting the file.
        document.markers.sort_by(|a, b| {
            (a.chromosome, a.position).cmp(&(b.chromosome, b.position))
        });

        let by_rsid = document
            .markers
            .iter()
            .enumerate()
            .map(|(index, marker)| (marker.rsid.clone(), index))
            .collect();

        Ok(Self { metadata: document.metadata, markers: document.markers, by_rsid })
    }

    /// Load the database from its JSON document.
    pub fn from_path(path: &Path) -> Result<Self> {
        let reader = BufReader::new(
            File::open(path).with_context(|| format!("While opening AIM database {}", path.display()))?,
        );
        let document: AimDocument = serde_json::from_reader(reader)
            .with_context(|| format!("While deserializing AIM database {}", path.display()))?;
        let database = Self::from_document(document)
            .with_context(|| format!("While validating AIM database {}", path.display()))?;
        info!(
            "Loaded AIM database v{} ({} markers, updated {})",
            database.metadata.version,
            database.len(),
            database.metadata.last_updated
        );
        Ok(database)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[must_use]
    pub fn get(&self, rsid: &str) -> Option<&AimMarker> {
        self.by_rsid.get(rsid).map(|&index| &self.markers[index])
    }

    #[must_use]
    pub fn contains(&self, rsid: &str) -> bool {
        self.by_rsid.contains_key(rsid)
    }

    /// Markers in (chromosome, position) order.
    pub fn iter(&self) -> impl Iterator<Item = &AimMarker> {
        self.markers.iter()
    }

    /// Ordered rsid list, for join operations.
    pub fn rsids(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().map(|marker| marker.rsid.as_str())
    }
}
