//! Identifier mapping against the pathway database's mapping service.
//!
//! When no service is configured every identifier maps to its
//! upper-cased self. Mapping too few identifiers is a deterministic
//! failure: retrying the same request cannot succeed.

use std::collections::HashMap;
use std::time::Duration;

use gsa_common::{GsaError, Result};

/// Maps submitted identifiers to pathway database identifiers
pub struct IdentifierMapper {
    endpoint: Option<(reqwest::Client, String)>,
    min_mapped: usize,
}

impl IdentifierMapper {
    pub fn new(service_url: Option<String>, min_mapped: usize) -> Result<Self> {
        let endpoint = match service_url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .map_err(|e| GsaError::Infrastructure(e.to_string()))?;
                Some((client, url))
            }
            None => None,
        };
        Ok(Self {
            endpoint,
            min_mapped,
        })
    }

    /// Map all identifiers, enforcing the minimum counts
    pub async fn map_identifiers(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        if identifiers.len() <= 1 {
            return Err(GsaError::Validation(
                "Analysis requires more than one gene.".to_string(),
            ));
        }

        let mappings = match &self.endpoint {
            Some((client, url)) => self.map_remote(client, url, identifiers).await?,
            None => identifiers
                .iter()
                .map(|id| (id.clone(), vec![id.trim().to_uppercase()]))
                .collect(),
        };

        if mappings.is_empty() {
            return Err(GsaError::Validation(
                "Failed to map any submitted identifiers".to_string(),
            ));
        }
        if mappings.len() < self.min_mapped {
            return Err(GsaError::Validation(format!(
                "Only {} identifiers could be mapped to pathway database entries. This is \
                 insufficient to perform reliable analyses. Please submit at least {} genes / \
                 proteins for your analysis.",
                mappings.len(),
                self.min_mapped
            )));
        }

        tracing::debug!(
            submitted = identifiers.len(),
            mapped = mappings.len(),
            "Identifier mapping finished"
        );
        Ok(mappings)
    }

    async fn map_remote(
        &self,
        client: &reqwest::Client,
        url: &str,
        identifiers: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        let response = client
            .post(url)
            .json(&identifiers)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach identifier mapping service");
                GsaError::DataSource(
                    "Failed to contact identifier mapping service. Please try again later."
                        .to_string(),
                )
            })?;

        if !response.status().is_success() {
            return Err(GsaError::DataSource(format!(
                "Identifier mapping service rejected the request ({})",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            GsaError::DataSource(format!("Identifier mapping response is malformed: {}", e))
        })
    }
}
