//! Core building blocks for the Conjur Kubernetes secrets agent: the
//! authentication protocol, the access-token store, variable retrieval,
//! and the bounded-retry primitive that gates startup ordering.

pub mod authn;
pub mod conjur;
pub mod errors;
pub mod evidence;
pub mod http;
pub mod retry;
pub mod token;

pub use authn::{AuthnConfig, Authenticator};
pub use conjur::{ConjurClient, VariableSource};
pub use errors::{Error, Result};
pub use evidence::{IdentityEvidence, IdentityEvidenceProvider};
pub use token::{AccessTokenStore, FileTokenStore};
