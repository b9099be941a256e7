use zeroize::Zeroizing;

use conjur_agent_core::{Error, Result};

use crate::client::SecretsClient;
use crate::resolve::ResolvedSecrets;

/// Rewrites destination secrets with their resolved values. Fail-fast by
/// default: the first rejected patch aborts the remaining destinations.
pub struct SecretPatcher<'a> {
    secrets: &'a dyn SecretsClient,
    best_effort: bool,
}

impl<'a> SecretPatcher<'a> {
    pub fn new(secrets: &'a dyn SecretsClient) -> Self {
        Self {
            secrets,
            best_effort: false,
        }
    }

    /// Keep patching the remaining destinations when one is rejected,
    /// logging each failure instead of aborting the batch.
    pub fn best_effort(mut self, enabled: bool) -> Self {
        self.best_effort = enabled;
        self
    }

    pub async fn apply(&self, resolved: ResolvedSecrets) -> Result<()> {
        for (secret, fields) in resolved {
            match self.patch_one(&secret, fields).await {
                Ok(()) => {}
                Err(err) if self.best_effort => {
                    tracing::warn!(secret = %secret, error = %err, "patch failed, continuing");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn patch_one(
        &self,
        secret: &str,
        fields: Vec<(String, Zeroizing<Vec<u8>>)>,
    ) -> Result<()> {
        let payload = build_payload(secret, &fields)?;
        let field_count = fields.len();
        // The payload owns the only remaining plaintext; the source values
        // zero out here.
        drop(fields);

        tracing::info!(secret = %secret, fields = field_count, "patching k8s secret");
        self.secrets.patch_secret(secret, &payload).await
        // `payload` is a Zeroizing buffer: it is wiped when this frame
        // unwinds, on the error path as much as on success.
    }
}

/// Build the strategic-merge body `{"stringData":{"f1":"v1",...}}` by
/// direct buffer writes. Field names and values are escaped in place while
/// they are appended; the plaintext never passes through a structured
/// JSON container.
fn build_payload(
    secret: &str,
    fields: &[(String, Zeroizing<Vec<u8>>)],
) -> Result<Zeroizing<Vec<u8>>> {
    if fields.is_empty() {
        return Err(Error::EmptyPatchPayload {
            secret: secret.to_string(),
        });
    }

    let mut payload = Zeroizing::new(Vec::new());
    payload.extend_from_slice(b"{\"stringData\":{");
    for (i, (field, value)) in fields.iter().enumerate() {
        if i > 0 {
            payload.push(b',');
        }
        push_json_string(&mut payload, field.as_bytes());
        payload.push(b':');
        push_json_string(&mut payload, value);
    }
    payload.extend_from_slice(b"}}");
    Ok(payload)
}

fn push_json_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'"');
    for &byte in bytes {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x00..=0x1f => {
                out.extend_from_slice(format!("\\u{byte:04x}").as_bytes());
            }
            _ => out.push(byte),
        }
    }
    out.push(b'"');
}
