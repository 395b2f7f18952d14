use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{AppError, AppResult};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// The only headers the scan needs. Requesting `format=metadata` with this
/// allowlist keeps message bodies off the wire entirely.
const METADATA_HEADERS: &str = "From,List-Unsubscribe,List-Unsubscribe-Post,Subject";

#[derive(Debug, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageMetadata {
    pub payload: Option<MessagePayload>,
    #[serde(rename = "internalDate")]
    pub internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// The slice of the remote mail API the scanner consumes. Behind a trait so
/// the pipeline can be driven by an in-memory double in tests.
#[async_trait]
pub trait MailApi: Send + Sync {
    /// One page of message-id references matching `query`.
    async fn list_page(
        &self,
        token: &str,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> AppResult<MessageList>;

    /// Metadata-only fetch for a single message.
    async fn message_metadata(&self, token: &str, id: &str) -> AppResult<MessageMetadata>;
}

pub struct GmailClient {
    http: reqwest::Client,
}

impl GmailClient {
    /// Every request made through this client carries the given timeout; a
    /// hung remote call fails instead of stalling the pipeline.
    pub fn new(request_timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Unexpected(format!("building http client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_page(
        &self,
        token: &str,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> AppResult<MessageList> {
        let url = format!("{GMAIL_API_BASE}/users/me/messages");
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", page_size.to_string()),
            ("q", query.to_string()),
        ];
        if let Some(pt) = page_token {
            params.push(("pageToken", pt.to_string()));
        }

        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::Discovery(format!("message list request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(AppError::Discovery(format!(
                "message list failed with status {}",
                res.status()
            )));
        }
        res.json()
            .await
            .map_err(|e| AppError::Discovery(format!("decoding message list: {e}")))
    }

    async fn message_metadata(&self, token: &str, id: &str) -> AppResult<MessageMetadata> {
        let url = format!("{GMAIL_API_BASE}/users/me/messages/{id}");
        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("format", "metadata"), ("metadataHeaders", METADATA_HEADERS)])
            .send()
            .await
            .map_err(|e| AppError::Network(format!("message get request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(AppError::Network(format!(
                "message get failed with status {}",
                res.status()
            )));
        }
        res.json()
            .await
            .map_err(|e| AppError::Network(format!("decoding message metadata: {e}")))
    }
}
