//! `POST /chat/completion` over browser `fetch()` via gloo-net.

use async_trait::async_trait;
use gloo_net::http::Request;

use console_core::ports::{CompletionPort, Credential};
use console_types::{
    ConsoleError, Result,
    config::ApiConfig,
    wire::{CompletionRequest, CompletionResponse},
};

pub struct HttpCompletionClient {
    url: String,
}

impl HttpCompletionClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            url: config.completion_url(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait(?Send)]
impl CompletionPort for HttpCompletionClient {
    async fn complete(
        &self,
        req: CompletionRequest,
        credential: &Credential,
    ) -> Result<CompletionResponse> {
        log::debug!(
            "POST {} (approval: {}, session: {:?})",
            self.url,
            req.is_approval,
            req.session_id.as_ref().map(|s| s.as_str()),
        );

        let response = Request::post(&self.url)
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", credential.token))
            .json(&req)
            .map_err(|e| ConsoleError::Network(e.to_string()))?
            .send()
            .await
            .map_err(|e| ConsoleError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ConsoleError::Network(e.to_string()))?;

        if response.ok() {
            return Ok(serde_json::from_str(&text)?);
        }

        // Error statuses usually carry `{ error }`; surface it verbatim
        match serde_json::from_str::<CompletionResponse>(&text) {
            Ok(body) if body.error.is_some() => Ok(body),
            _ => Err(ConsoleError::Network(format!("HTTP {}: {}", status, text))),
        }
    }
}
