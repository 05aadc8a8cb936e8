//! S3 REST backend with AWS Signature V4 authentication.
//!
//! Talks to S3 or any S3-compatible service (MinIO, LocalStack) using
//! `reqwest` plus pure-Rust signing (`hmac`, `sha2`). Standard endpoints
//! use virtual-hosted addressing; custom endpoints use path-style so
//! local stand-ins work without DNS tricks. `ListObjectsV2` pagination is
//! followed via continuation tokens.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use sha2::{Digest, Sha256};

use super::{BlobStore, StorageError};
use crate::config::get_config;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from the environment.
#[derive(Clone)]
pub(crate) struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    fn from_env() -> Result<Self, StorageError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| StorageError::Credentials("AWS_ACCESS_KEY_ID not set".to_string()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| StorageError::Credentials("AWS_SECRET_ACCESS_KEY not set".to_string()))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Blob store backend speaking the S3 REST API.
pub struct S3BlobStore {
    client: Client,
    region: String,
    endpoint: Option<String>,
    credentials: Credentials,
}

impl S3BlobStore {
    /// Construct a backend from the process configuration and environment credentials.
    pub fn new() -> Result<Self, StorageError> {
        let config = get_config();
        Self::with_endpoint(
            config.storage_region.clone(),
            config.storage_endpoint.clone(),
        )
    }

    /// Construct a backend against an explicit region/endpoint pair.
    pub fn with_endpoint(
        region: String,
        endpoint: Option<String>,
    ) -> Result<Self, StorageError> {
        let credentials = Credentials::from_env()?;
        let client = Client::builder().user_agent("docqa/0.1").build()?;
        let endpoint = endpoint
            .map(|value| normalize_endpoint(&value))
            .transpose()?;
        tracing::debug!(
            region = %region,
            endpoint = ?endpoint,
            "Initialized S3 blob store client"
        );

        Ok(Self {
            client,
            region,
            endpoint,
            credentials,
        })
    }

    fn host_and_uri(&self, bucket: &str, key: &str) -> (String, String, String) {
        let encoded_key = key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        match &self.endpoint {
            Some(endpoint) => {
                let (scheme, host) = split_endpoint(endpoint);
                let uri = if key.is_empty() {
                    format!("/{bucket}")
                } else {
                    format!("/{bucket}/{encoded_key}")
                };
                (scheme.to_string(), host.to_string(), uri)
            }
            None => {
                let host = format!("{bucket}.s3.{}.amazonaws.com", self.region);
                let uri = if key.is_empty() {
                    "/".to_string()
                } else {
                    format!("/{encoded_key}")
                };
                ("https".to_string(), host, uri)
            }
        }
    }

    /// Build and send a signed request, returning the raw response.
    async fn signed_request(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        query: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StorageError> {
        let (scheme, host, canonical_uri) = self.host_and_uri(bucket, key);

        let now = time::OffsetDateTime::now_utc();
        let date_stamp = format!(
            "{:04}{:02}{:02}",
            now.year(),
            now.month() as u8,
            now.day()
        );
        let amz_date = format!(
            "{date_stamp}T{:02}{:02}{:02}Z",
            now.hour(),
            now.minute(),
            now.second()
        );

        let mut sorted_query = query.to_vec();
        sorted_query.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted_query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let payload_hash = hex_sha256(&body);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String =
            headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_querystring}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
        );

        let credential_scope = format!("{date_stamp}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id
        );

        let url = if canonical_querystring.is_empty() {
            format!("{scheme}://{host}{canonical_uri}")
        } else {
            format!("{scheme}://{host}{canonical_uri}?{canonical_querystring}")
        };

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", authorization)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("x-amz-security-token", token);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        Ok(request.send().await?)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let response = self
            .signed_request(Method::PUT, bucket, key, &[], bytes)
            .await?;
        if response.status().is_success() {
            tracing::debug!(bucket, key, "Object stored");
            Ok(())
        } else {
            Err(unexpected_status(response).await)
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .signed_request(Method::GET, bucket, key, &[], Vec::new())
            .await?;
        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(unexpected_status(response).await),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(token) = &continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let response = self
                .signed_request(Method::GET, bucket, "", &query, Vec::new())
                .await?;
            if !response.status().is_success() {
                return Err(unexpected_status(response).await);
            }

            let xml = response.text().await?;
            let (batch, truncated, next_token) = parse_list_response(&xml);
            keys.extend(batch);

            if truncated {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        Ok(keys)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let response = self
            .signed_request(Method::DELETE, bucket, key, &[], Vec::new())
            .await?;
        match response.status() {
            // S3 reports 204 for deletes, including absent keys.
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected_status(response).await),
        }
    }
}

async fn unexpected_status(response: reqwest::Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = StorageError::UnexpectedStatus {
        status,
        body: body.chars().take(500).collect(),
    };
    tracing::error!(error = %error, "Blob store request failed");
    error
}

fn normalize_endpoint(value: &str) -> Result<String, StorageError> {
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidEndpoint(value.to_string()));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("https://{trimmed}"))
    }
}

fn split_endpoint(endpoint: &str) -> (&str, &str) {
    match endpoint.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("https", endpoint),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key for a date, region, and service.
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per RFC 3986, leaving only unreserved characters bare.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    result
}

/// Parse a `ListObjectsV2` XML response into keys plus pagination state.
fn parse_list_response(xml: &str) -> (Vec<String>, bool, Option<String>) {
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut keys = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        if let Some(key) = extract_xml_value(block, "Key")
            && !key.is_empty()
        {
            keys.push(key);
        }
        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    (keys, is_truncated, next_token)
}

/// Extract the text content of a simple, non-nested XML tag.
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)?;
    let value_start = start + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}
