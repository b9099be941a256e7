use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::token::AccessTokenStore;

/// Source of vault variable values, keyed by variable identifier. The
/// resolution engine depends only on this trait.
#[async_trait]
pub trait VariableSource: Send + Sync {
    async fn fetch_variable(&self, variable: &str) -> Result<Zeroizing<Vec<u8>>>;
}

/// Retrieves variable values from the Conjur appliance, authorizing each
/// call with the current session artifact read back from the token store.
pub struct ConjurClient {
    client: reqwest::Client,
    appliance_url: Url,
    account: String,
    store: Arc<dyn AccessTokenStore>,
}

impl ConjurClient {
    pub fn new(
        client: reqwest::Client,
        appliance_url: &str,
        account: impl Into<String>,
        store: Arc<dyn AccessTokenStore>,
    ) -> anyhow::Result<Self> {
        let appliance_url = Url::parse(appliance_url).context("invalid Conjur appliance URL")?;
        anyhow::ensure!(
            !appliance_url.cannot_be_a_base(),
            "Conjur appliance URL cannot serve as a base URL"
        );
        Ok(Self {
            client,
            appliance_url,
            account: account.into(),
            store,
        })
    }

    fn variable_url(&self, variable: &str) -> Url {
        let mut url = self.appliance_url.clone();
        url.path_segments_mut()
            .expect("appliance URL validated as a base URL")
            .pop_if_empty()
            .extend(["secrets", self.account.as_str(), "variable", variable]);
        url
    }
}

#[async_trait]
impl VariableSource for ConjurClient {
    async fn fetch_variable(&self, variable: &str) -> Result<Zeroizing<Vec<u8>>> {
        let token = self.store.read()?;
        let authorization = Zeroizing::new(format!("Token token=\"{}\"", STANDARD.encode(&token)));

        let response = self
            .client
            .get(self.variable_url(variable))
            .header(reqwest::header::AUTHORIZATION, authorization.as_str())
            .send()
            .await
            .map_err(|err| Error::VariableFetchFailed {
                variable: variable.to_string(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::VariableFetchFailed {
                variable: variable.to_string(),
                reason: format!("{status} {body}"),
            });
        }

        let value = response
            .bytes()
            .await
            .map_err(|err| Error::VariableFetchFailed {
                variable: variable.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Zeroizing::new(value.to_vec()))
    }
}
