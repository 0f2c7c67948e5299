//! Expiring signed URLs for direct object upload and download.
//!
//! A URL carries `expires` (unix seconds) and `signature`, the hex SHA-256 of
//! the secret, method, bucket, object and expiry separated by NUL bytes.

use crate::error::{StorageError, StorageResult};
use sdms_core::config::UrlSigningConfig;
use sha2::{Digest, Sha256};
use std::time::Duration;
use time::OffsetDateTime;

/// What a signed URL permits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedMethod {
    Upload,
    Download,
}

impl SignedMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedMethod::Upload => "PUT",
            SignedMethod::Download => "GET",
        }
    }
}

/// An issued URL and when it stops being valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: OffsetDateTime,
}

/// Issues and verifies signed object URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
    expiry: Duration,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>, expiry: Duration) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            expiry,
        }
    }

    /// Build from configuration. Without a configured secret a random one is
    /// generated, so URLs do not survive a restart.
    pub fn from_config(config: &UrlSigningConfig) -> Self {
        let secret = match &config.secret {
            Some(secret) => secret.clone().into_bytes(),
            None => {
                tracing::warn!("no signing secret configured; signed URLs are per-process");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
                    .into_bytes()
            }
        };
        Self::new(secret, config.base_url.clone(), config.expiry())
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn sign(&self, method: SignedMethod, bucket: &str, object: &str) -> SignedUrl {
        self.sign_at(method, bucket, object, OffsetDateTime::now_utc())
    }

    pub fn sign_at(
        &self,
        method: SignedMethod,
        bucket: &str,
        object: &str,
        now: OffsetDateTime,
    ) -> SignedUrl {
        let expires_at = now + self.expiry;
        let expires = expires_at.unix_timestamp();
        let signature = self.signature(method, bucket, object, expires);
        SignedUrl {
            url: format!(
                "{}/{bucket}/{object}?method={}&expires={expires}&signature={signature}",
                self.base_url,
                method.as_str()
            ),
            expires_at,
        }
    }

    pub fn verify(
        &self,
        method: SignedMethod,
        bucket: &str,
        object: &str,
        expires: i64,
        signature: &str,
    ) -> StorageResult<()> {
        self.verify_at(method, bucket, object, expires, signature, OffsetDateTime::now_utc())
    }

    pub fn verify_at(
        &self,
        method: SignedMethod,
        bucket: &str,
        object: &str,
        expires: i64,
        signature: &str,
        now: OffsetDateTime,
    ) -> StorageResult<()> {
        let expected = self.signature(method, bucket, object, expires);
        if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            return Err(StorageError::InvalidSignature(format!("{bucket}/{object}")));
        }
        if now.unix_timestamp() > expires {
            return Err(StorageError::SignatureExpired);
        }
        Ok(())
    }

    fn signature(&self, method: SignedMethod, bucket: &str, object: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        for part in [method.as_str(), bucket, object] {
            hasher.update([0u8]);
            hasher.update(part.as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(expires.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new(
            "0123456789abcdef",
            "http://localhost:8080/blob/",
            Duration::from_secs(600),
        )
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        url.split(['?', '&'])
            .find_map(|kv| kv.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[test]
    fn test_signed_url_verifies_until_expiry() {
        let signer = signer();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let signed = signer.sign_at(SignedMethod::Download, "bucket-a", "ds/0", now);

        assert!(signed.url.starts_with("http://localhost:8080/blob/bucket-a/ds/0?"));
        let expires: i64 = query_param(&signed.url, "expires").parse().unwrap();
        let signature = query_param(&signed.url, "signature");
        assert_eq!(expires, 1_700_000_600);

        signer
            .verify_at(SignedMethod::Download, "bucket-a", "ds/0", expires, signature, now)
            .unwrap();

        let later = now + Duration::from_secs(601);
        assert!(matches!(
            signer.verify_at(SignedMethod::Download, "bucket-a", "ds/0", expires, signature, later),
            Err(StorageError::SignatureExpired)
        ));
    }

    #[test]
    fn test_signature_binds_method_object_and_expiry() {
        let signer = signer();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let signed = signer.sign_at(SignedMethod::Download, "bucket-a", "ds/0", now);
        let expires: i64 = query_param(&signed.url, "expires").parse().unwrap();
        let signature = query_param(&signed.url, "signature");

        let bad = [
            signer.verify_at(SignedMethod::Upload, "bucket-a", "ds/0", expires, signature, now),
            signer.verify_at(SignedMethod::Download, "bucket-a", "ds/1", expires, signature, now),
            signer.verify_at(SignedMethod::Download, "bucket-a", "ds/0", expires + 60, signature, now),
        ];
        for result in bad {
            assert!(matches!(result, Err(StorageError::InvalidSignature(_))));
        }

        let other = UrlSigner::new("another-secret-0000", "http://x", Duration::from_secs(600));
        assert!(
            other
                .verify_at(SignedMethod::Download, "bucket-a", "ds/0", expires, signature, now)
                .is_err()
        );
    }
}
