use std::{collections::HashMap, thread, time::Duration};

use log::warn;
use reqwest::{blocking::Client, header::ACCEPT, StatusCode};
use serde::Deserialize;

use crate::error::AimBuildError;

/// Hard ceiling on the number of rsids per service request.
pub const MAX_BATCH_SIZE: usize = 200;

/// Retry cap for throttled (HTTP 429) requests.
const MAX_RETRIES: u32 = 3;

/// One genomic placement of a variant.
#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    pub seq_region_name: String,
    pub start: u64,
    /// e.g. "A/G"; more than two slash-separated alleles marks a
    /// multi-allelic site.
    pub allele_string: String,
}

/// One population-frequency record attached to a variant.
#[derive(Debug, Clone, Deserialize)]
pub struct PopulationFrequency {
    pub population: String,
    pub allele: String,
    pub frequency: f64,
}

/// The variant document returned by the service, keyed by rsid.
#[derive(Debug, Clone, Deserialize)]
pub struct VariantDocument {
    #[serde(default)]
    pub var_class: Option<String>,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub populations: Vec<PopulationFrequency>,
}

/// Blocking client for the external variant service:
/// `POST {base}/variation/human?pops=1` with `{"ids": [...]}`.
pub struct VariantClient {
    base_url: String,
    client: Client,
}

impl VariantClient {
    /// # Errors
    /// if the underlying HTTP client cannot be constructed.
    pub fn new(base_url: &str) -> Result<Self, AimBuildError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    /// Fetch variant documents for one batch of rsids.
    ///
    /// HTTP 429 responses back off for 2^attempt seconds and retry up to
    /// [`MAX_RETRIES`] times; any other non-2xx status is returned as
    /// [`AimBuildError::ExternalService`] so the caller can drop the
    /// batch.
    ///
    /// # Panics
    /// if `rsids` exceeds [`MAX_BATCH_SIZE`] entries.
    pub fn fetch_batch(
        &self,
        rsids: &[String],
    ) -> Result<HashMap<String, VariantDocument>, AimBuildError> {
        assert!(rsids.len() <= MAX_BATCH_SIZE, "batch exceeds the service request ceiling");

        let url = format!("{}/variation/human?pops=1", self.base_url);
        let body = serde_json::json!({ "ids": rsids });

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&url)
                .header(ACCEPT, "application/json")
                .json(&body)
                .send()?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= MAX_RETRIES {
                    return Err(AimBuildError::Throttled(MAX_RETRIES));
                }
                let backoff = 2u64.pow(attempt);
                warn!("Variant service throttled the request; backing off for {backoff}s");
                thread::sleep(Duration::from_secs(backoff));
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                return Err(AimBuildError::ExternalService { status: status.as_u16() });
            }
            return Ok(response.json()?);
        }
    }
}
