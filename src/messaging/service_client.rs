// src/messaging/service_client.rs
//! REST side of the messages resource: the authoritative unread snapshot and
//! read-state persistence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use crate::app_log;
use crate::auth::SessionToken;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::types::events::UnreadCounts;

const UNREAD_COUNT_ENDPOINT: &str = "/unread-count";
const READ_ENDPOINT: &str = "read";

#[async_trait]
pub trait MessagesApi: Send + Sync {
    /// Full peer -> unread map for the signed-in user.
    async fn unread_counts(&self, token: &SessionToken) -> Result<UnreadCounts>;

    /// Persist "everything from `peer` has been read".
    async fn mark_read(&self, token: &SessionToken, peer: &str) -> Result<()>;
}

pub struct HttpMessagesApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMessagesApi {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.messages_url(),
        })
    }

    /// `{messages}/read/{peer}` with the peer id as one encoded segment.
    fn read_url(&self, peer: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid messages URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Messages URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .push(READ_ENDPOINT)
            .push(peer);
        Ok(url)
    }

    async fn error_from(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        SyncError::Http {
            status: status.as_u16(),
            body,
        }
        .into()
    }
}

#[async_trait]
impl MessagesApi for HttpMessagesApi {
    async fn unread_counts(&self, token: &SessionToken) -> Result<UnreadCounts> {
        let url = format!("{}{}", self.base_url, UNREAD_COUNT_ENDPOINT);
        app_log!(trace, "Fetching unread counts: {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", url))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json::<UnreadCounts>()
            .await
            .context("Failed to parse unread counts")
    }

    async fn mark_read(&self, token: &SessionToken, peer: &str) -> Result<()> {
        let url = self.read_url(peer)?;
        app_log!(trace, "Persisting read state: {}", url);

        let response = self
            .client
            .patch(url.clone())
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .send()
            .await
            .with_context(|| format!("Failed to PATCH {}", url))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }
}
