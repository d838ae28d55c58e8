use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::complaint::{
    Category, Complaint, ComplaintId, ComplaintPatch, ComplaintStatus, NewComplaint,
};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::pipeline::StatusFilter;

const HTTP_TIMEOUT_SECS: u64 = 15;

/// Server-side list filter, mirroring `GET /complaints` query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    pub status: StatusFilter,
    pub specialization: Option<Category>,
}

impl ListQuery {
    /// Only non-empty parameters are sent.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        let search = self.search.trim();
        if !search.is_empty() {
            params.push(("complaint_like", search.to_string()));
        }
        if let StatusFilter::Only(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(category) = &self.specialization {
            let value = category.as_str().trim();
            if !value.is_empty() {
                params.push(("specialization", value.to_string()));
            }
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: Option<String>,
    data: T,
}

#[derive(Serialize)]
struct StatusBody {
    status: ComplaintStatus,
}

#[derive(Serialize)]
struct RecommendationBody<'a> {
    complaint: &'a str,
}

#[async_trait]
pub trait ComplaintBackend: Send + Sync {
    async fn list(&self, query: &ListQuery) -> AppResult<Vec<Complaint>>;

    /// Returns the record as acknowledged by the server.
    async fn change_status(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> AppResult<Complaint>;

    async fn create(&self, complaint: &NewComplaint) -> AppResult<()>;

    async fn edit(&self, id: &ComplaintId, patch: &ComplaintPatch) -> AppResult<()>;

    async fn delete(&self, id: &ComplaintId) -> AppResult<()>;

    async fn recommendation(&self, complaint: &str) -> AppResult<String>;
}

#[derive(Clone)]
pub struct ComplaintsApi {
    http: Client,
    base_url: String,
}

impl ComplaintsApi {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Self::with_base_url(&config.backend_base_url)
    }

    pub fn with_base_url(base_url: &str) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("complaint-intake/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl ComplaintBackend for ComplaintsApi {
    async fn list(&self, query: &ListQuery) -> AppResult<Vec<Complaint>> {
        let params = query.params();
        debug!(?params, "fetching complaints");
        let response = self
            .http
            .get(self.url("complaints"))
            .query(&params)
            .send()
            .await?;
        read_data(response).await
    }

    async fn change_status(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> AppResult<Complaint> {
        let response = self
            .http
            .patch(self.url(&format!("complaints/{id}")))
            .json(&StatusBody { status })
            .send()
            .await?;
        read_data(response).await
    }

    async fn create(&self, complaint: &NewComplaint) -> AppResult<()> {
        let response = self
            .http
            .post(self.url("complaints"))
            .json(complaint)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn edit(&self, id: &ComplaintId, patch: &ComplaintPatch) -> AppResult<()> {
        let response = self
            .http
            .patch(self.url(&format!("complaints/{id}")))
            .json(patch)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn delete(&self, id: &ComplaintId) -> AppResult<()> {
        let response = self
            .http
            .delete(self.url(&format!("complaints/{id}")))
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    async fn recommendation(&self, complaint: &str) -> AppResult<String> {
        let response = self
            .http
            .post(self.url("recommendation"))
            .json(&RecommendationBody { complaint })
            .send()
            .await?;
        read_data(response).await
    }
}

async fn ensure_success(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), message = %message, "backend request failed");
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_data<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    let response = ensure_success(response).await?;
    let body = response.bytes().await?;
    let envelope: Envelope<T> = serde_json::from_slice(&body)?;
    if let Some(message) = envelope.message.as_deref() {
        debug!(%message, "backend response");
    }
    Ok(envelope.data)
}
