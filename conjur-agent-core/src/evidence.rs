use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::errors::Result;

/// Platform-issued proof of workload identity. Opaque bytes, zeroed on
/// drop, intentionally without `Debug` so it cannot end up in logs.
pub struct IdentityEvidence(Zeroizing<Vec<u8>>);

impl IdentityEvidence {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Single-shot source of identity evidence for one platform. Retries are
/// the caller's concern; implementations issue exactly one request per
/// call.
///
/// The authenticator depends only on this trait, so adding another
/// platform (a different metadata service, a mounted service-account
/// token) never touches the authentication state machine.
#[async_trait]
pub trait IdentityEvidenceProvider: Send + Sync {
    async fn fetch_evidence(&self, account: &str, username: &str) -> Result<IdentityEvidence>;
}
