//! HTTP implementation of [`WorkflowService`]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use workflow_graph::{DatatypeLattice, ModuleDefinition, WorkflowDocument};

use crate::config::EditorConfig;
use crate::error::ServiceError;
use crate::service::{BuildModuleRequest, SaveAsRequest, SaveRequest, SaveResponse, WorkflowService};

const API_KEY_HEADER: &str = "x-api-key";

/// Workflow service reached over HTTP
pub struct HttpWorkflowService {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    /// Root URL of the service, without trailing slash
    base_url: String,
    api_key: Option<String>,
}

impl HttpWorkflowService {
    pub fn new(config: &EditorConfig) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a service path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Send a request and fail on non-success statuses
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::warn!("Workflow service error {}: {}", status, body);
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

/// Connection failures and timeouts become [`ServiceError::Unavailable`]
fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_connect() || e.is_timeout() {
        log::warn!("Workflow service unreachable: {}", e);
        ServiceError::Unavailable(e.to_string())
    } else {
        ServiceError::Http(e)
    }
}

/// The save-as endpoint answers with the bare id, sometimes JSON-quoted
fn parse_workflow_id(body: &str) -> Result<String, ServiceError> {
    let body = body.trim();
    let id = serde_json::from_str::<String>(body).unwrap_or_else(|_| body.to_string());
    if id.is_empty() {
        return Err(ServiceError::Decode("Empty workflow id".to_string()));
    }
    Ok(id)
}

#[async_trait]
impl WorkflowService for HttpWorkflowService {
    async fn build_module(&self, request: &BuildModuleRequest) -> Result<ModuleDefinition, ServiceError> {
        let url = self.endpoint("api/workflows/build_module");
        log::debug!("Building {} module {:?}", request.kind, request.content_id);
        let response = self.send(self.http_client.post(&url).json(request)).await?;
        Self::decode(response).await
    }

    async fn load_workflow(&self, id: &str) -> Result<serde_json::Value, ServiceError> {
        let url = self.endpoint("workflow/load_workflow");
        let response = self
            .send(self.http_client.get(&url).query(&[("id", id)]))
            .await?;
        Self::decode(response).await
    }

    async fn save_workflow(&self, id: &str, document: &WorkflowDocument) -> Result<SaveResponse, ServiceError> {
        let url = self.endpoint(&format!("api/workflows/{}", id));
        let body = SaveRequest { workflow: document };
        let response = self.send(self.http_client.put(&url).json(&body)).await?;
        Self::decode(response).await
    }

    async fn save_workflow_as(&self, request: &SaveAsRequest) -> Result<String, ServiceError> {
        let url = self.endpoint("workflow/save_workflow_as");
        let response = self.send(self.http_client.post(&url).json(request)).await?;
        let body = response.text().await?;
        parse_workflow_id(&body)
    }

    async fn datatypes_mapping(&self) -> Result<DatatypeLattice, ServiceError> {
        let url = self.endpoint("api/datatypes/mapping");
        let response = self.send(self.http_client.get(&url)).await?;
        Self::decode(response).await
    }
}
