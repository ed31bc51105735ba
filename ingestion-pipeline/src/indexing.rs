use std::time::Duration;

use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::pipeline::{IndexingTrigger, Locator, ReadinessCheck};

#[derive(Debug, Serialize)]
struct GenerateVectorsRequest<'a> {
    file_url: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CheckVectorsRequest<'a> {
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckVectorsResponse {
    exists: bool,
}

/// HTTP client for the remote indexing service.
#[derive(Clone)]
pub struct IndexingClient {
    http: reqwest::Client,
    base_url: Url,
}

impl IndexingClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AppError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|err| {
            AppError::Validation(format!("invalid indexing base url {base_url}: {err}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.indexing_base_url,
            Duration::from_millis(config.indexing_request_timeout_ms),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|err| AppError::Validation(format!("invalid indexing endpoint {path}: {err}")))
    }
}

#[async_trait]
impl IndexingTrigger for IndexingClient {
    #[instrument(level = "trace", skip_all, fields(owner_id = %owner_id, key = %locator.key))]
    async fn trigger(&self, locator: &Locator, owner_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(self.endpoint("generate_vectors")?)
            .json(&GenerateVectorsRequest {
                file_url: &locator.url,
                user_id: owner_id,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Processing(format!(
                "indexing service returned {status}: {body}"
            )));
        }

        debug!(%status, "indexing triggered");
        Ok(())
    }
}

#[async_trait]
impl ReadinessCheck for IndexingClient {
    /// Any non-2xx answer means "not ready yet"; only transport and decoding
    /// problems are errors.
    async fn check(&self, owner_id: &str) -> Result<bool, AppError> {
        let response = self
            .http
            .post(self.endpoint("check_vectors")?)
            .json(&CheckVectorsRequest { user_id: owner_id })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(owner_id, %status, "readiness check answered with an error status");
            return Ok(false);
        }

        let body: CheckVectorsResponse = response.json().await?;
        Ok(body.exists)
    }
}
