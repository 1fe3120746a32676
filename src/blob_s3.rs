//! S3-compatible blob backend.
//!
//! Downloads objects with a signed `GetObject` request using
//! [AWS Signature Version 4](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-auth-using-authorization-header.html).
//! Signing uses pure-Rust `hmac` + `sha2`, so the backend works against AWS,
//! MinIO, LocalStack, and Google Cloud Storage's interoperability endpoint
//! (`endpoint_url = "https://storage.googleapis.com"` with HMAC keys).
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO, path-style addressing
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional
//!
//! Without `endpoint_url` requests use virtual-hosted addressing
//! (`<bucket>.s3.<region>.amazonaws.com`); with it, path-style
//! (`<endpoint>/<bucket>/<key>`).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::blob::BlobStore;
use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3BlobStore {
    config: StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    pub fn from_env(config: StorageConfig) -> Result<Self> {
        Ok(Self {
            config,
            creds: AwsCredentials::from_env()?,
            client: reqwest::Client::new(),
        })
    }
}

/// Where a request goes and what gets signed.
#[derive(Debug, PartialEq, Eq)]
struct ObjectLocation {
    url: String,
    host: String,
    canonical_uri: String,
}

fn object_location(config: &StorageConfig, bucket: &str, key: &str) -> ObjectLocation {
    let encoded_key = key
        .trim_start_matches('/')
        .split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/");

    match config.endpoint_url {
        Some(ref endpoint) => {
            let scheme = if endpoint.starts_with("http://") {
                "http"
            } else {
                "https"
            };
            let host = endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string();
            let canonical_uri = format!("/{}/{}", uri_encode(bucket), encoded_key);
            ObjectLocation {
                url: format!("{}://{}{}", scheme, host, canonical_uri),
                host,
                canonical_uri,
            }
        }
        None => {
            let host = format!("{}.s3.{}.amazonaws.com", bucket, config.region);
            let canonical_uri = format!("/{}", encoded_key);
            ObjectLocation {
                url: format!("https://{}{}", host, canonical_uri),
                host,
                canonical_uri,
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend(&self) -> &str {
        "s3"
    }

    async fn fetch(&self, bucket: &str, path: &str) -> Result<Bytes> {
        let location = object_location(&self.config, bucket, path);
        let signed = sign_get(&location, &self.config.region, &self.creds, Utc::now())?;

        let mut req = self.client.get(&location.url);
        for (name, value) in &signed {
            if name != "host" {
                req = req.header(name.as_str(), value.as_str());
            }
        }

        tracing::debug!(bucket, path, "Downloading object");
        let resp = req
            .send()
            .await
            .map_err(|e| anyhow!("Failed to get {}/{}: {}", bucket, path, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "GetObject failed (HTTP {}) for {}/{}: {}",
                status,
                bucket,
                path,
                body.chars().take(500).collect::<String>()
            );
        }

        Ok(resp.bytes().await?)
    }
}

/// Build the signed header set (including `authorization`) for an unsigned-body GET.
fn sign_get(
    location: &ObjectLocation,
    region: &str,
    creds: &AwsCredentials,
    now: DateTime<Utc>,
) -> Result<Vec<(String, String)>> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let mut headers = vec![
        ("host".to_string(), location.host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "GET\n{}\n\n{}\n{}\n{}",
        location.canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3")?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    headers.push((
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
    ));
    Ok(headers)
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// SigV4 signing key: `HMAC(HMAC(HMAC(HMAC("AWS4"+secret, date), region), service), "aws4_request")`.
fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
