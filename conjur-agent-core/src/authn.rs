use std::sync::Arc;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::evidence::IdentityEvidenceProvider;
use crate::token::AccessTokenStore;

/// Connection parameters for the Conjur authentication endpoint.
#[derive(Clone)]
pub struct AuthnConfig {
    authn_url: Url,
    account: String,
    username: String,
    base64_encode_evidence: bool,
}

impl AuthnConfig {
    /// `authn_url` points at the authenticator mount, e.g.
    /// `https://conjur.example.com/authn-gcp`.
    pub fn new(
        authn_url: &str,
        account: impl Into<String>,
        username: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let authn_url = Url::parse(authn_url).context("invalid Conjur authn URL")?;
        anyhow::ensure!(
            !authn_url.cannot_be_a_base(),
            "Conjur authn URL cannot serve as a base URL"
        );
        Ok(Self {
            authn_url,
            account: account.into(),
            username: username.into(),
            base64_encode_evidence: false,
        })
    }

    /// Base64-encode the evidence before transmission. Protocol
    /// compatibility switch for appliances behind proxies that mangle raw
    /// token bodies; not a security boundary.
    pub fn base64_encode_evidence(mut self, enabled: bool) -> Self {
        self.base64_encode_evidence = enabled;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn authenticate_url(&self) -> Url {
        let mut url = self.authn_url.clone();
        url.path_segments_mut()
            .expect("authn URL validated as a base URL")
            .pop_if_empty()
            .push(&self.account)
            .push(&self.username)
            .push("authenticate");
        url
    }
}

/// Runs the authentication protocol once: fetch identity evidence,
/// exchange it at the Conjur authn endpoint, persist the returned session
/// artifact. A fresh call is made per attempt or token refresh; no state
/// survives between calls.
pub struct Authenticator {
    client: reqwest::Client,
    config: AuthnConfig,
    provider: Arc<dyn IdentityEvidenceProvider>,
    store: Arc<dyn AccessTokenStore>,
}

impl Authenticator {
    pub fn new(
        client: reqwest::Client,
        config: AuthnConfig,
        provider: Arc<dyn IdentityEvidenceProvider>,
        store: Arc<dyn AccessTokenStore>,
    ) -> Self {
        Self {
            client,
            config,
            provider,
            store,
        }
    }

    /// FETCH_EVIDENCE -> EXCHANGE -> PERSIST. The first failing step aborts
    /// the run; a previously persisted artifact is never touched on
    /// failure.
    pub async fn authenticate(&self) -> Result<()> {
        tracing::info!(
            account = %self.config.account,
            username = %self.config.username,
            "authenticating with Conjur"
        );

        let evidence = self
            .provider
            .fetch_evidence(&self.config.account, &self.config.username)
            .await?;

        let artifact = self.exchange(evidence.as_bytes()).await?;

        self.store.write(&artifact)?;
        tracing::info!("authentication succeeded, session artifact stored");
        Ok(())
    }

    async fn exchange(&self, evidence: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let body = if self.config.base64_encode_evidence {
            STANDARD.encode(evidence).into_bytes()
        } else {
            evidence.to_vec()
        };

        let response = self
            .client
            .post(self.config.authenticate_url())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|err| Error::VaultUnreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthenticationRejected {
                status: status.as_u16(),
                body,
            });
        }

        let artifact = response
            .bytes()
            .await
            .map_err(|err| Error::VaultUnreachable(err.to_string()))?;
        if artifact.is_empty() {
            return Err(Error::AuthenticationRejected {
                status: status.as_u16(),
                body: "empty session artifact".into(),
            });
        }
        Ok(Zeroizing::new(artifact.to_vec()))
    }
}
