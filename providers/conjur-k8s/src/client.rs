use std::collections::BTreeMap;

use async_trait::async_trait;
use http::{header, Request};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;

use conjur_agent_core::{Error, Result};

const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";

/// Boundary to the cluster API. Reads hand back the secret's raw `data`
/// entries; writes take the exact wire payload so plaintext never passes
/// through a structured serializer on the way out.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>>;
    async fn patch_secret(&self, name: &str, payload: &[u8]) -> Result<()>;
}

/// Cluster client over a process-scoped `kube::Client`, pinned to the pod
/// namespace. The client is constructed once at startup and injected.
pub struct KubeSecretsClient {
    client: kube::Client,
    namespace: String,
}

impl KubeSecretsClient {
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl SecretsClient for KubeSecretsClient {
    async fn get_secret(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        tracing::debug!(secret = %name, namespace = %self.namespace, "retrieving k8s secret");
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let secret = api.get(name).await.map_err(|err| Error::SecretFetchFailed {
            secret: name.to_string(),
            reason: err.to_string(),
        })?;
        Ok(secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect())
    }

    async fn patch_secret(&self, name: &str, payload: &[u8]) -> Result<()> {
        let path = format!("/api/v1/namespaces/{}/secrets/{}", self.namespace, name);
        let request = Request::patch(path)
            .header(header::CONTENT_TYPE, STRATEGIC_MERGE_PATCH)
            .body(payload.to_vec())
            .map_err(|err| Error::PatchRejected {
                secret: name.to_string(),
                reason: err.to_string(),
            })?;
        self.client
            .request_text(request)
            .await
            .map_err(|err| Error::PatchRejected {
                secret: name.to_string(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}
