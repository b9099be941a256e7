//! Resolution and patching against in-process fakes of the cluster API
//! and the vault.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use zeroize::Zeroizing;

use conjur_agent_core::{Error, Result, VariableSource};
use conjur_k8s::{SecretPatcher, SecretResolver, SecretsClient};

#[derive(Default)]
struct FakeCluster {
    secrets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    reject_patches_for: HashSet<String>,
    patches: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeCluster {
    fn with_secret(mut self, name: &str, data: &[(&str, &str)]) -> Self {
        self.secrets.insert(
            name.to_string(),
            data.iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
        );
        self
    }

    fn rejecting(mut self, name: &str) -> Self {
        self.reject_patches_for.insert(name.to_string());
        self
    }

    fn patched(&self) -> Vec<(String, Vec<u8>)> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretsClient for FakeCluster {
    async fn get_secret(&self, name: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::SecretFetchFailed {
                secret: name.to_string(),
                reason: format!("secrets \"{name}\" not found"),
            })
    }

    async fn patch_secret(&self, name: &str, payload: &[u8]) -> Result<()> {
        if self.reject_patches_for.contains(name) {
            return Err(Error::PatchRejected {
                secret: name.to_string(),
                reason: "forbidden".to_string(),
            });
        }
        self.patches
            .lock()
            .unwrap()
            .push((name.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeVault {
    variables: BTreeMap<String, Vec<u8>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeVault {
    fn with_variable(mut self, id: &str, value: &str) -> Self {
        self.variables.insert(id.to_string(), value.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl VariableSource for FakeVault {
    async fn fetch_variable(&self, variable: &str) -> Result<Zeroizing<Vec<u8>>> {
        self.fetches.lock().unwrap().push(variable.to_string());
        self.variables
            .get(variable)
            .map(|v| Zeroizing::new(v.clone()))
            .ok_or_else(|| Error::VariableFetchFailed {
                variable: variable.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn manifest_round_trips_into_destination_keyed_values() {
    let cluster = FakeCluster::default().with_secret(
        "secretX",
        &[("conjur-map", "user: var1\npass: var2"), ("unrelated", "kept")],
    );
    let vault = FakeVault::default()
        .with_variable("var1", "alice")
        .with_variable("var2", "s3cr3t");

    let resolved = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["secretX"]))
        .await
        .unwrap();

    assert_eq!(resolved.len(), 1);
    let fields = &resolved["secretX"];
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].0, "user");
    assert_eq!(fields[0].1.as_slice(), b"alice");
    assert_eq!(fields[1].0, "pass");
    assert_eq!(fields[1].1.as_slice(), b"s3cr3t");
}

#[tokio::test]
async fn secrets_without_a_manifest_are_skipped() {
    let cluster = FakeCluster::default()
        .with_secret("plain", &[("password", "unmanaged")])
        .with_secret("managed", &[("conjur-map", "user: var1")]);
    let vault = FakeVault::default().with_variable("var1", "alice");

    let resolved = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["plain", "managed"]))
        .await
        .unwrap();

    assert!(!resolved.contains_key("plain"));
    assert!(resolved.contains_key("managed"));
}

#[tokio::test]
async fn missing_secret_fails_resolution_naming_it() {
    let cluster = FakeCluster::default();
    let vault = FakeVault::default();

    let err = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["missing"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SecretFetchFailed { secret, .. } if secret == "missing"));
}

#[tokio::test]
async fn malformed_manifest_halts_before_any_vault_fetch() {
    let cluster = FakeCluster::default()
        .with_secret("broken", &[("conjur-map", "user: var1\nuserinvalid")])
        .with_secret("fine", &[("conjur-map", "pass: var2")]);
    let vault = FakeVault::default()
        .with_variable("var1", "alice")
        .with_variable("var2", "s3cr3t");

    let err = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["broken", "fine"]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        Error::ManifestParseError {
            secret: "broken".to_string(),
            entry: "userinvalid".to_string(),
        }
    );
    assert!(vault.fetches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_variable_id_keeps_the_later_destination() {
    let cluster = FakeCluster::default()
        .with_secret("first", &[("conjur-map", "old: shared-var")])
        .with_secret("second", &[("conjur-map", "new: shared-var")]);
    let vault = FakeVault::default().with_variable("shared-var", "value");

    let resolved = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["first", "second"]))
        .await
        .unwrap();

    assert!(!resolved.contains_key("first"));
    assert_eq!(resolved["second"][0].0, "new");
    // The shared variable is still fetched only once.
    assert_eq!(*vault.fetches.lock().unwrap(), vec!["shared-var"]);
}

#[tokio::test]
async fn variable_fetch_failure_aborts_the_whole_cycle() {
    let cluster =
        FakeCluster::default().with_secret("secretX", &[("conjur-map", "user: absent-var")]);
    let vault = FakeVault::default();

    let err = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["secretX"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VariableFetchFailed { variable, .. } if variable == "absent-var"));
}

#[tokio::test]
async fn resolved_values_are_patched_with_the_exact_wire_body() {
    let cluster =
        FakeCluster::default().with_secret("secretX", &[("conjur-map", "user: var1\npass: var2")]);
    let vault = FakeVault::default()
        .with_variable("var1", "alice")
        .with_variable("var2", "s3cr3t");

    let resolved = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["secretX"]))
        .await
        .unwrap();
    SecretPatcher::new(&cluster).apply(resolved).await.unwrap();

    let patches = cluster.patched();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].0, "secretX");
    assert_eq!(
        patches[0].1,
        br#"{"stringData":{"user":"alice","pass":"s3cr3t"}}"#
    );
}

#[tokio::test]
async fn empty_field_map_issues_no_network_call() {
    let cluster = FakeCluster::default();
    let mut resolved = conjur_k8s::ResolvedSecrets::new();
    resolved.insert("empty".to_string(), Vec::new());

    let err = SecretPatcher::new(&cluster).apply(resolved).await.unwrap_err();
    assert_eq!(
        err,
        Error::EmptyPatchPayload {
            secret: "empty".to_string()
        }
    );
    assert!(cluster.patched().is_empty());
}

#[tokio::test]
async fn first_rejection_aborts_the_remaining_patches() {
    let cluster = FakeCluster::default()
        .with_secret("a-creds", &[("conjur-map", "user: var1")])
        .with_secret("b-creds", &[("conjur-map", "pass: var2")])
        .rejecting("a-creds");
    let vault = FakeVault::default()
        .with_variable("var1", "alice")
        .with_variable("var2", "s3cr3t");

    let resolved = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["a-creds", "b-creds"]))
        .await
        .unwrap();
    let err = SecretPatcher::new(&cluster).apply(resolved).await.unwrap_err();

    assert!(matches!(err, Error::PatchRejected { secret, .. } if secret == "a-creds"));
    assert!(cluster.patched().is_empty());
}

#[tokio::test]
async fn best_effort_mode_attempts_every_destination() {
    let cluster = FakeCluster::default()
        .with_secret("a-creds", &[("conjur-map", "user: var1")])
        .with_secret("b-creds", &[("conjur-map", "pass: var2")])
        .rejecting("a-creds");
    let vault = FakeVault::default()
        .with_variable("var1", "alice")
        .with_variable("var2", "s3cr3t");

    let resolved = SecretResolver::new(&cluster, &vault)
        .resolve(&names(&["a-creds", "b-creds"]))
        .await
        .unwrap();
    SecretPatcher::new(&cluster)
        .best_effort(true)
        .apply(resolved)
        .await
        .unwrap();

    let patches = cluster.patched();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].0, "b-creds");
}
