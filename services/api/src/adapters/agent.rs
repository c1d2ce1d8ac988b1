//! services/api/src/adapters/agent.rs
//!
//! An HTTP client for the external agent workflow API, implementing the
//! `AgentWorkflowService` port.

use async_trait::async_trait;
use learning_space_core::domain::ContentKind;
use learning_space_core::ports::{AgentReply, AgentWorkflowService, PortError, PortResult, WorkflowRequest};
use reqwest::{Client, Response};
use tracing::debug;
use uuid::Uuid;

const INVOKE_PATH: &str = "/api/workflows/invoke";

#[derive(Clone)]
pub struct HttpAgentClient {
    client: Client,
    base_url: Option<String>,
}

impl HttpAgentClient {
    /// `base_url` is the agent API root; `None` leaves the client unconfigured.
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    fn url(&self, path: &str) -> PortResult<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}{}", base, path))
            .ok_or_else(|| PortError::Configuration("Agent API URL not configured".to_string()))
    }

    async fn post(&self, path: &str, request: &WorkflowRequest) -> PortResult<AgentReply> {
        let url = self.url(path)?;
        debug!(%url, "POST to agent API");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json::<AgentReply>()
            .await
            .map_err(|e| PortError::Unexpected(format!("invalid agent response: {}", e)))
    }
}

/// Turns a non-2xx response into `PortError::Upstream` carrying the body text.
async fn check_status(response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PortError::Upstream {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AgentWorkflowService for HttpAgentClient {
    async fn invoke_workflow(&self, request: &WorkflowRequest) -> PortResult<AgentReply> {
        self.post(INVOKE_PATH, request).await
    }

    async fn generate(&self, kind: ContentKind, request: &WorkflowRequest) -> PortResult<AgentReply> {
        self.post(kind.endpoint(), request).await
    }

    async fn notify_deleted(&self, space_id: Uuid, user_id: &str) -> PortResult<()> {
        let url = self.url(&format!("/api/learning-spaces/{}", space_id))?;
        let response = self
            .client
            .delete(&url)
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}
