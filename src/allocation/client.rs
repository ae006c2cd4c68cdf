use std::time::Duration;

use reqwest::{header, Client, Request, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::AllocationSettings;

use super::error::AllocationError;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub item_id: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AllocationRequest {
    pub fn single(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            quantity: 1,
            allocated_to: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AllocationReceipt {
    pub status: u16,
    /// Response body as JSON, or as a JSON string when it was not JSON.
    pub body: Value,
}

pub struct AllocationClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl AllocationClient {
    pub fn new(base_url: &str, path: &str, token: &str) -> Result<Self, AllocationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Self::with_client(http, base_url, path, token)
    }

    pub fn from_settings(settings: &AllocationSettings, token: &str) -> Result<Self, AllocationError> {
        Self::new(&settings.base_url, &settings.allocations_path, token)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        path: &str,
        token: &str,
    ) -> Result<Self, AllocationError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AllocationError::MissingToken);
        }

        // Without a trailing slash `join` would replace the last segment.
        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join(path.trim_start_matches('/')))
            .map_err(|err| AllocationError::InvalidEndpoint(format!("{base_url}: {err}")))?;

        Ok(Self {
            http,
            endpoint,
            token: token.to_string(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build_request(&self, request: &AllocationRequest) -> Result<Request, AllocationError> {
        Ok(self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json")
            .json(request)
            .build()?)
    }

    pub async fn allocate(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationReceipt, AllocationError> {
        let http_request = self.build_request(request)?;
        let response = self.http.execute(http_request).await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            log_warn!(
                "Allocation of '{}' rejected with {}: {}",
                request.item_id,
                status,
                text
            );
            return Err(AllocationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        log_info!("Allocated '{}' ({})", request.item_id, status);
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(AllocationReceipt {
            status: status.as_u16(),
            body,
        })
    }
}
