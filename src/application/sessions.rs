//! Session verification shared by the WebSocket endpoint and the JSON API.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use crate::domain::types::Identity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session credential")]
    Missing,
    #[error("invalid session credential")]
    Invalid,
}

/// The session/identity provider. Implementations map an opaque credential to
/// the identity that owns it.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Sessions fixed at startup from configuration. Only token digests are
/// kept in memory.
pub struct StaticSessions {
    entries: Vec<(Vec<u8>, Identity)>,
}

impl StaticSessions {
    pub fn new<I, T>(sessions: I) -> Self
    where
        I: IntoIterator<Item = (T, Identity)>,
        T: AsRef<str>,
    {
        let entries = sessions
            .into_iter()
            .map(|(token, identity)| (hash_token(token.as_ref()), identity))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionVerifier for StaticSessions {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }
        let hashed = hash_token(credential);

        // Compare against every entry so timing does not reveal the position.
        let mut found = None;
        for (digest, identity) in &self.entries {
            if digest.ct_eq(&hashed).unwrap_u8() == 1 {
                found = Some(identity);
            }
        }

        match found {
            Some(identity) => Ok(identity.clone()),
            None => {
                debug!(
                    target = "voxline::auth",
                    fingerprint = %hex::encode(&hashed[..4]),
                    "Rejected session credential"
                );
                Err(AuthError::Invalid)
            }
        }
    }
}

fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
