//! Kubernetes side of the provisioning pipeline: reading `conjur-map`
//! manifests out of cluster Secret objects, resolving them against the
//! vault, and patching the resolved values back in.

pub mod client;
pub mod patch;
pub mod resolve;

pub use client::{KubeSecretsClient, SecretsClient};
pub use patch::SecretPatcher;
pub use resolve::{ResolvedSecrets, SecretResolver, CONJUR_MAP_KEY};
