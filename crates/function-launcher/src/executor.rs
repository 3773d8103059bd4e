// ABOUTME: Execution backend client.
// ABOUTME: Executor trait used by the dispatch loop and an HTTP implementation posting start requests.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;

use crate::error::{LauncherError, StartFailure};
use crate::function::Function;

/// Starts functions somewhere else. Only "started or not" comes back;
/// the function's own result is never awaited.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn start(&self, function: &Function, session_info: &[u8]) -> Result<(), StartFailure>;
}

/// Header naming the runtime the executor should use.
pub const RUNTIME_ID_HEADER: &str = "RuntimeId";

/// Per-request timeout for start calls.
pub const EXECUTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Executor reached over HTTP at `{host}/{executor}/function/{id}`.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    host: String,
}

#[derive(Serialize)]
struct StartRequest {
    uuid: String,
    /// Base64 of the opaque session blob.
    session_info: String,
}

impl HttpExecutor {
    pub fn new(host: impl Into<String>) -> Result<Self, LauncherError> {
        let client = Client::builder()
            .timeout(EXECUTOR_TIMEOUT)
            .connect_timeout(EXECUTOR_TIMEOUT)
            .build()
            .map_err(|e| LauncherError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    /// Start URL for a function.
    pub fn start_url(&self, function: &Function) -> String {
        format!(
            "{}/{}/function/{}",
            self.host,
            function.executor(),
            function.id()
        )
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn start(&self, function: &Function, session_info: &[u8]) -> Result<(), StartFailure> {
        let url = self.start_url(function);
        tracing::debug!(
            function_id = %function.id(),
            executor = %function.executor(),
            runtime = %function.runtime(),
            "Starting function"
        );

        let body = StartRequest {
            uuid: function.id().to_string(),
            session_info: base64::engine::general_purpose::STANDARD.encode(session_info),
        };

        let response = self
            .client
            .post(&url)
            .header(RUNTIME_ID_HEADER, function.runtime())
            .json(&body)
            .send()
            .await
            .map_err(|e| StartFailure::Request(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StartFailure::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        tracing::debug!(function_id = %function.id(), response = %text, "Executor accepted start");
        Ok(())
    }
}
