use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_TOKEN_FILE: &str = "/run/conjur/access-token";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 360;
const DEFAULT_RETRY_COUNT_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerMode {
    /// Provision once and exit; the workload starts afterwards.
    Init,
    /// Keep running, re-authenticating and re-provisioning on the refresh
    /// interval.
    Sidecar,
}

impl ContainerMode {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "" | "init" => Ok(Self::Init),
            "sidecar" | "application" => Ok(Self::Sidecar),
            other => bail!("unsupported CONTAINER_MODE `{other}`"),
        }
    }
}

/// Agent configuration, environment-driven for parity with the deployment
/// manifests the Conjur ecosystem ships.
#[derive(Clone)]
pub struct AgentConfig {
    pub appliance_url: String,
    pub authn_url: String,
    pub account: String,
    pub username: String,
    pub ssl_certificate: Option<String>,
    pub cert_file: Option<PathBuf>,
    pub token_file: PathBuf,
    pub base64_token: bool,
    pub pod_namespace: String,
    pub required_secrets: Vec<String>,
    pub container_mode: ContainerMode,
    pub refresh_interval: Duration,
    pub retry_count_limit: usize,
    pub http_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let appliance_url = std::env::var("CONJUR_APPLIANCE_URL")
            .context("set CONJUR_APPLIANCE_URL to the Conjur appliance URL")?;
        let account =
            std::env::var("CONJUR_ACCOUNT").context("set CONJUR_ACCOUNT to the Conjur account")?;
        let username = std::env::var("CONJUR_AUTHN_LOGIN")
            .context("set CONJUR_AUTHN_LOGIN to the authenticated host identity")?;
        let authn_url = std::env::var("CONJUR_AUTHN_URL")
            .unwrap_or_else(|_| format!("{}/authn-gcp", appliance_url.trim_end_matches('/')));

        let ssl_certificate = std::env::var("CONJUR_SSL_CERTIFICATE").ok();
        let cert_file = std::env::var("CONJUR_CERT_FILE").ok().map(PathBuf::from);
        let token_file = std::env::var("CONJUR_AUTHN_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_FILE));
        let base64_token = std::env::var("CONJUR_BASE64_TOKEN")
            .map(|value| truthy(&value))
            .unwrap_or(false);

        let pod_namespace = std::env::var("MY_POD_NAMESPACE")
            .context("set MY_POD_NAMESPACE to the pod's namespace")?;
        let required_secrets = std::env::var("K8S_SECRETS")
            .context("set K8S_SECRETS to the comma-separated list of managed secrets")
            .map(|value| split_secret_names(&value))?;
        if required_secrets.is_empty() {
            bail!("K8S_SECRETS names no secrets");
        }

        let container_mode = ContainerMode::parse(
            std::env::var("CONTAINER_MODE").unwrap_or_default().as_str(),
        )?;
        let refresh_interval = duration_env(
            "TOKEN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_REFRESH_INTERVAL_SECS,
        )?;
        let http_timeout = duration_env("CONJUR_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        let retry_count_limit = match std::env::var("RETRY_COUNT_LIMIT") {
            Ok(value) => value
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .with_context(|| format!("invalid RETRY_COUNT_LIMIT `{value}`"))?,
            Err(_) => DEFAULT_RETRY_COUNT_LIMIT,
        };

        Ok(Self {
            appliance_url,
            authn_url,
            account,
            username,
            ssl_certificate,
            cert_file,
            token_file,
            base64_token,
            pod_namespace,
            required_secrets,
            container_mode,
            refresh_interval,
            retry_count_limit,
            http_timeout,
        })
    }

    /// Inline PEM takes precedence over the mounted bundle file.
    pub fn load_ca_bundle(&self) -> Result<Option<Vec<u8>>> {
        if let Some(pem) = &self.ssl_certificate {
            return Ok(Some(pem.clone().into_bytes()));
        }
        if let Some(path) = &self.cert_file {
            return fs::read(path)
                .map(Some)
                .with_context(|| format!("failed to read CONJUR_CERT_FILE {}", path.display()));
        }
        Ok(None)
    }
}

/// The toggle contract: case-insensitive `"true"` enables, anything else
/// disables.
pub fn truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

fn split_secret_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn duration_env(var: &str, default_secs: u64) -> Result<Duration> {
    match std::env::var(var) {
        Ok(value) => value
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .with_context(|| format!("invalid {var} `{value}`")),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
