mod config;
mod telemetry;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use conjur_agent_core::{
    http, retry, AccessTokenStore, AuthnConfig, Authenticator, ConjurClient, FileTokenStore,
    IdentityEvidenceProvider,
};
use conjur_authn_gcp::GcpMetadataProvider;
use conjur_k8s::{KubeSecretsClient, SecretPatcher, SecretResolver};

use config::{AgentConfig, ContainerMode};

#[derive(Parser)]
#[command(
    name = "conjur-secrets-agent",
    about = "Authenticates to Conjur with GCP identity and provisions Kubernetes secrets"
)]
struct AgentArgs {
    /// Print the effective configuration at startup
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("agent exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let args = AgentArgs::parse();
    telemetry::init()?;

    let config = AgentConfig::from_env()?;
    if args.verbose {
        println!(
            "config loaded (appliance={}, account={}, login={}, namespace={}, secrets={}, mode={:?})",
            config.appliance_url,
            config.account,
            config.username,
            config.pod_namespace,
            config.required_secrets.join(","),
            config.container_mode,
        );
    }

    // The CA bundle may be projected into the pod after this container
    // starts; gate on its appearance before loading it.
    if let Some(path) = &config.cert_file {
        retry::wait_for(|| retry::verify_file_exists(path), config.retry_count_limit)
            .await
            .with_context(|| format!("CA bundle never appeared at {}", path.display()))?;
    }
    let ca_bundle = config.load_ca_bundle()?;

    let http_client = http::build_client(ca_bundle.as_deref(), config.http_timeout)?;
    let kube_client = kube::Client::try_default()
        .await
        .context("failed to build in-cluster Kubernetes client")?;

    let store: Arc<dyn AccessTokenStore> = Arc::new(FileTokenStore::new(&config.token_file));
    let provider: Arc<dyn IdentityEvidenceProvider> =
        Arc::new(GcpMetadataProvider::new(http_client.clone()));
    let authn_config = AuthnConfig::new(
        &config.authn_url,
        config.account.as_str(),
        config.username.as_str(),
    )?
    .base64_encode_evidence(config.base64_token);

    let conjur = ConjurClient::new(
        http_client.clone(),
        &config.appliance_url,
        config.account.as_str(),
        store.clone(),
    )?;
    let cluster = KubeSecretsClient::new(kube_client, config.pod_namespace.as_str());

    authenticate_with_retry(&config, &http_client, &authn_config, &provider, &store).await?;
    provision(&config, &cluster, &conjur).await?;

    match config.container_mode {
        ContainerMode::Init => {
            tracing::info!("provisioning complete, exiting");
            Ok(())
        }
        ContainerMode::Sidecar => loop {
            tokio::time::sleep(config.refresh_interval).await;
            authenticate_with_retry(&config, &http_client, &authn_config, &provider, &store)
                .await?;
            provision(&config, &cluster, &conjur).await?;
        },
    }
}

/// One authentication round per attempt, under the configured retry
/// budget. Each attempt runs the full state machine on a fresh instance.
async fn authenticate_with_retry(
    config: &AgentConfig,
    http_client: &reqwest::Client,
    authn_config: &AuthnConfig,
    provider: &Arc<dyn IdentityEvidenceProvider>,
    store: &Arc<dyn AccessTokenStore>,
) -> anyhow::Result<()> {
    retry::wait_for(
        || {
            let authenticator = Authenticator::new(
                http_client.clone(),
                authn_config.clone(),
                provider.clone(),
                store.clone(),
            );
            async move { authenticator.authenticate().await }
        },
        config.retry_count_limit,
    )
    .await
    .context("authentication did not succeed within the retry budget")
}

async fn provision(
    config: &AgentConfig,
    cluster: &KubeSecretsClient,
    conjur: &ConjurClient,
) -> anyhow::Result<()> {
    let resolved = SecretResolver::new(cluster, conjur)
        .resolve(&config.required_secrets)
        .await?;
    if resolved.is_empty() {
        tracing::info!("none of the required secrets carry a conjur-map, nothing to provision");
        return Ok(());
    }
    SecretPatcher::new(cluster).apply(resolved).await?;
    tracing::info!("provisioning cycle complete");
    Ok(())
}
