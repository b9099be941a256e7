use std::time::Duration;

use anyhow::{Context, Result};

/// Build the process-scoped HTTP client used for every Conjur call.
///
/// When a CA bundle is supplied it becomes a pinned trust anchor for the
/// appliance's TLS endpoint; PEM is tried first, DER as a fallback.
pub fn build_client(ca_bundle: Option<&[u8]>, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(ca) = ca_bundle {
        let cert = reqwest::Certificate::from_pem(ca)
            .or_else(|_| reqwest::Certificate::from_der(ca))
            .context("failed to parse Conjur CA bundle")?;
        builder = builder.add_root_certificate(cert);
    }
    builder.build().context("failed to build Conjur HTTP client")
}
