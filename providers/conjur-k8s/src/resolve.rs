use std::collections::{BTreeMap, HashMap};

use zeroize::Zeroizing;

use conjur_agent_core::{Error, Result, VariableSource};

use crate::client::SecretsClient;

/// Reserved data key holding a secret's declarative manifest: one
/// `field: variableId` entry per line.
pub const CONJUR_MAP_KEY: &str = "conjur-map";

/// Resolved values keyed by destination secret, in manifest order.
/// Variable identifiers are gone by this point; the destination is the
/// only durable key.
pub type ResolvedSecrets = BTreeMap<String, Vec<(String, Zeroizing<Vec<u8>>)>>;

/// Builds the variable index from the required secrets' manifests and
/// fetches every distinct variable from the vault. Fails on the first
/// error; downstream patching always sees a complete value set.
pub struct SecretResolver<'a> {
    secrets: &'a dyn SecretsClient,
    vault: &'a dyn VariableSource,
}

impl<'a> SecretResolver<'a> {
    pub fn new(secrets: &'a dyn SecretsClient, vault: &'a dyn VariableSource) -> Self {
        Self { secrets, vault }
    }

    pub async fn resolve(&self, required_secrets: &[String]) -> Result<ResolvedSecrets> {
        // variable id -> (secret name, field name). A variable id declared
        // twice keeps the later destination; this is long-standing,
        // documented behaviour rather than a conflict error.
        let mut index: HashMap<String, (String, String)> = HashMap::new();
        let mut fetch_order: Vec<String> = Vec::new();

        for name in required_secrets {
            let data = self.secrets.get_secret(name).await?;
            let Some(manifest) = data.get(CONJUR_MAP_KEY) else {
                tracing::debug!(secret = %name, "no conjur-map entry, skipping");
                continue;
            };
            for (field, variable) in parse_manifest(name, manifest)? {
                if !index.contains_key(&variable) {
                    fetch_order.push(variable.clone());
                }
                index.insert(variable, (name.clone(), field));
            }
        }

        let mut resolved = ResolvedSecrets::new();
        for variable in fetch_order {
            let Some((secret, field)) = index.remove(&variable) else {
                continue;
            };
            let value = self.vault.fetch_variable(&variable).await?;
            let fields = resolved.entry(secret).or_default();
            match fields.iter_mut().find(|(existing, _)| *existing == field) {
                Some(entry) => entry.1 = value,
                None => fields.push((field, value)),
            }
        }
        Ok(resolved)
    }
}

fn parse_manifest(secret: &str, raw: &[u8]) -> Result<Vec<(String, String)>> {
    let text = std::str::from_utf8(raw).map_err(|_| Error::ManifestParseError {
        secret: secret.to_string(),
        entry: "<manifest is not valid utf-8>".to_string(),
    })?;

    let mut entries = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .split_once(": ")
            .filter(|(field, variable)| !field.is_empty() && !variable.is_empty());
        let Some((field, variable)) = parsed else {
            return Err(Error::ManifestParseError {
                secret: secret.to_string(),
                entry: line.to_string(),
            });
        };
        entries.push((field.to_string(), variable.to_string()));
    }
    Ok(entries)
}
