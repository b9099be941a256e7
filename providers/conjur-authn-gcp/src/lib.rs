//! Identity evidence from the GCP instance metadata service.
//!
//! The agent proves its identity to Conjur with a Google-signed identity
//! token whose audience names the Conjur account and host. Fetching the
//! token is a single metadata GET; retries and refresh cadence belong to
//! the orchestration layer.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use conjur_agent_core::{Error as AgentError, IdentityEvidence, IdentityEvidenceProvider};

const DEFAULT_METADATA_BASE: &str = "http://metadata.google.internal";
const IDENTITY_PATH: &str = "computeMetadata/v1/instance/service-accounts/default/identity";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    #[error("metadata endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("cannot build metadata request: {0}")]
    InvalidRequest(String),
    #[error("metadata endpoint returned {status}: {body}")]
    InvalidResponse { status: u16, body: String },
}

impl From<MetadataError> for AgentError {
    fn from(err: MetadataError) -> Self {
        AgentError::EvidenceUnavailable(err.to_string())
    }
}

/// Fetches a Conjur-audience identity token from the instance metadata
/// endpoint. One request per call, no internal retry.
pub struct GcpMetadataProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl GcpMetadataProvider {
    pub fn new(client: reqwest::Client) -> Self {
        let base_url = Url::parse(DEFAULT_METADATA_BASE).expect("default metadata URL parses");
        Self { client, base_url }
    }

    /// Point the provider at a different metadata host. Used by tests and
    /// by emulated environments.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, MetadataError> {
        self.base_url = Url::parse(base_url)
            .map_err(|err| MetadataError::InvalidRequest(err.to_string()))?;
        Ok(self)
    }

    fn identity_url(&self, account: &str, username: &str) -> Result<Url, MetadataError> {
        if account.is_empty() || username.is_empty() {
            return Err(MetadataError::InvalidRequest(
                "account and username must not be empty".into(),
            ));
        }
        let mut url = self
            .base_url
            .join(IDENTITY_PATH)
            .map_err(|err| MetadataError::InvalidRequest(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("audience", &format!("conjur/{account}/{username}"))
            .append_pair("format", "full");
        Ok(url)
    }
}

#[async_trait]
impl IdentityEvidenceProvider for GcpMetadataProvider {
    async fn fetch_evidence(
        &self,
        account: &str,
        username: &str,
    ) -> conjur_agent_core::Result<IdentityEvidence> {
        let url = self.identity_url(account, username)?;
        tracing::debug!(host = %self.base_url, "requesting identity token from instance metadata");

        let response = self
            .client
            .get(url)
            .header(METADATA_FLAVOR_HEADER, "Google")
            .send()
            .await
            .map_err(|err| MetadataError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::InvalidResponse {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let token = response
            .bytes()
            .await
            .map_err(|err| MetadataError::Unreachable(err.to_string()))?;
        if token.is_empty() {
            return Err(MetadataError::InvalidResponse {
                status: status.as_u16(),
                body: "empty identity token".into(),
            }
            .into());
        }
        Ok(IdentityEvidence::new(token.to_vec()))
    }
}
