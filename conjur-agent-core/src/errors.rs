use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the agent. Messages carry identifiers (secret
/// names, variable ids, status codes) and never secret material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("identity evidence unavailable: {0}")]
    EvidenceUnavailable(String),
    #[error("conjur endpoint unreachable: {0}")]
    VaultUnreachable(String),
    #[error("authentication rejected: {status} {body}")]
    AuthenticationRejected { status: u16, body: String },
    #[error("failed to persist access token: {0}")]
    TokenPersistFailed(String),
    #[error("failed to read access token: {0}")]
    TokenUnavailable(String),
    #[error("failed to retrieve k8s secret `{secret}`: {reason}")]
    SecretFetchFailed { secret: String, reason: String },
    #[error("malformed conjur-map entry `{entry}` in k8s secret `{secret}`")]
    ManifestParseError { secret: String, entry: String },
    #[error("failed to retrieve variable `{variable}`: {reason}")]
    VariableFetchFailed { variable: String, reason: String },
    #[error("patch rejected for k8s secret `{secret}`: {reason}")]
    PatchRejected { secret: String, reason: String },
    #[error("no fields to patch for k8s secret `{secret}`")]
    EmptyPatchPayload { secret: String },
    #[error("gave up after {attempts} attempts: {reason}")]
    RetryExhausted { attempts: usize, reason: String },
}
