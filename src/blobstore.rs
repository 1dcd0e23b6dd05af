//! S3-compatible object storage client.
//!
//! Downloads uploaded documents and uploads generated reports using the
//! S3 REST API with AWS Signature V4 authentication. Supports custom
//! endpoints for S3-compatible services (Cloudflare R2, MinIO) via
//! `storage.endpoint_url`.
//!
//! Uses only pure-Rust dependencies (`hmac`, `sha2`) for AWS signing — no
//! C library dependencies, making it compatible with all build
//! environments.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! bucket = "auditor-uploads"
//! region = "auto"
//! endpoint_url = "https://<account>.r2.cloudflarestorage.com"
//! ```
//!
//! # Environment Variables
//!
//! Credentials are read from environment variables:
//! - `AUDITOR_STORAGE_ACCESS_KEY_ID` — required
//! - `AUDITOR_STORAGE_SECRET_ACCESS_KEY` — required

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// Metadata returned by a `HEAD` request, without the object body.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// Credentials for the object store, loaded from the environment.
struct StorageCredentials {
    access_key_id: String,
    secret_access_key: String,
}

impl StorageCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AUDITOR_STORAGE_ACCESS_KEY_ID")
            .context("AUDITOR_STORAGE_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AUDITOR_STORAGE_SECRET_ACCESS_KEY")
            .context("AUDITOR_STORAGE_SECRET_ACCESS_KEY environment variable not set")?;

        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

/// Client for the document/report object store.
pub struct BlobStore {
    config: StorageConfig,
    creds: StorageCredentials,
    client: reqwest::Client,
}

impl BlobStore {
    /// Create a client from configuration, reading credentials from the
    /// environment.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let creds = StorageCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            creds,
            client,
        })
    }

    /// Download an object's bytes with a signed GET request.
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self.send_signed(Method::GET, key, Vec::new(), None).await?;

        if !resp.status().is_success() {
            bail!(
                "GetObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
        }

        let bytes = resp.bytes().await?;
        info!(key, bytes = bytes.len(), "downloaded object");
        Ok(bytes.to_vec())
    }

    /// Fetch object metadata (content type, size) without the body.
    pub async fn head_object(&self, key: &str) -> Result<ObjectMeta> {
        let resp = self.send_signed(Method::HEAD, key, Vec::new(), None).await?;

        if !resp.status().is_success() {
            bail!(
                "HeadObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_length = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        Ok(ObjectMeta {
            content_type,
            content_length,
        })
    }

    /// Upload an object with a signed PUT request.
    pub async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let size = data.len();
        let resp = self
            .send_signed(Method::PUT, key, data, Some(content_type))
            .await?;

        if !resp.status().is_success() {
            bail!(
                "PutObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            );
        }

        info!(key, bytes = size, "uploaded object");
        Ok(())
    }

    /// Build, sign (SigV4), and send a request for the given object key.
    async fn send_signed(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response> {
        let host = self.host();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        // Custom endpoints (R2, MinIO) address the bucket path-style; the
        // standard AWS host carries the bucket in the hostname.
        let canonical_uri = if self.config.endpoint_url.is_some() {
            format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key)
        } else {
            format!("/{}", encoded_key)
        };
        let url = format!("https://{}{}", host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(&body);

        // Canonical headers, sorted by name.
        let headers = [
            ("host", host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        let signed_headers = headers.map(|(k, _)| k).join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);

        if let Some(ct) = content_type {
            req = req.header("Content-Type", ct);
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        req.send()
            .await
            .with_context(|| format!("request to s3://{}/{} failed", self.config.bucket, key))
    }

    /// Hostname for the configured bucket: the custom endpoint when set,
    /// otherwise the standard virtual-hosted S3 address.
    fn host(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            )
        }
    }
}

// ============ AWS SigV4 Helpers ============

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
///
/// Encodes all characters except unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

/// Map a file extension to a MIME type, used as a fallback when the
/// object store returns no content type.
pub fn detect_content_type(key: &str) -> String {
    let lower = key.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf".to_string()
    } else if lower.ends_with(".doc") || lower.ends_with(".docx") {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string()
    } else if lower.ends_with(".csv") {
        "text/csv".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode_unreserved_passthrough() {
        assert_eq!(uri_encode("uploads/doc-1.pdf"), "uploads%2Fdoc-1.pdf");
        assert_eq!(uri_encode("abc_XYZ.0~"), "abc_XYZ.0~");
    }

    #[test]
    fn test_uri_encode_special_chars() {
        assert_eq!(uri_encode("a b"), "a%20b");
        assert_eq!(uri_encode("100%"), "100%25");
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        let a = derive_signing_key("secret", "20240115", "auto", "s3");
        let b = derive_signing_key("secret", "20240115", "auto", "s3");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_hex_sha256_empty_payload() {
        // Well-known SHA-256 of the empty string, used for GET/HEAD payloads.
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type("a/b/report.PDF"), "application/pdf");
        assert_eq!(detect_content_type("ledger.csv"), "text/csv");
        assert_eq!(
            detect_content_type("notes.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(detect_content_type("blob"), "application/octet-stream");
    }
}
