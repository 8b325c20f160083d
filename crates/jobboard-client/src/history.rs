//! REST calls the client makes alongside the push channel: the initial
//! history page and read-state updates.

use reqwest::Client;

use jobboard_types::api::{NotificationPage, UnreadCountResponse};
use jobboard_types::models::Notification;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: Client,
    base_url: String,
    page_size: u32,
}

impl HistoryClient {
    pub fn new(base_url: impl Into<String>, page_size: u32) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Newest page of the caller's history.
    pub async fn fetch_latest(&self, token: &str) -> Result<Vec<Notification>, ClientError> {
        let response = self
            .http
            .get(self.url("/notifications"))
            .query(&[("limit", self.page_size)])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        let page: NotificationPage = response.json().await?;
        Ok(page.notifications)
    }

    pub async fn mark_read(&self, token: &str, id: i64) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("/notifications/{id}/read")))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            status => Err(ClientError::Status(status)),
        }
    }

    pub async fn unread_count(&self, token: &str) -> Result<u64, ClientError> {
        let response = self
            .http
            .get(self.url("/notifications/unread-count"))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        let body: UnreadCountResponse = response.json().await?;
        Ok(body.count)
    }
}
