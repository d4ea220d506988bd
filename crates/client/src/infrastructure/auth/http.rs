//! Token generation and scene loading over HTTPS.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use inworld_shared::{AccessTokenRequest, LoadSceneRequest, LoadSceneResponse, Token};

use super::signature::authorization_header;
use crate::config::ClientConfig;
use crate::infrastructure::ports::{AuthError, AuthPort, ClockPort};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const SESSION_ID_HEADER: &str = "Grpc-Metadata-session-id";

/// HTTP implementation of [`AuthPort`].
#[derive(Clone)]
pub struct HttpAuthClient {
    client: Client,
    config: ClientConfig,
    clock: Arc<dyn ClockPort>,
}

impl HttpAuthClient {
    pub fn new(config: ClientConfig, clock: Arc<dyn ClockPort>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            clock,
        }
    }

    fn token_request(&self, workspace: &str) -> Result<RequestBuilder, AuthError> {
        let (Some(key), Some(secret)) = (&self.config.api_key, &self.config.api_secret) else {
            return Err(AuthError::MissingCredentials);
        };

        let body = AccessTokenRequest {
            api_key: key.clone(),
            resource_id: workspace.to_string(),
        };
        let authorization =
            authorization_header(key, secret, &self.config.runtime_host, self.clock.now());

        Ok(self
            .client
            .post(self.config.token_url())
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&body))
    }

    fn scene_request(&self, token: &Token, scene: &str, request: &LoadSceneRequest) -> RequestBuilder {
        self.client
            .post(self.config.load_scene_url(scene))
            .header(SESSION_ID_HEADER, &token.session_id)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token.token))
            .json(request)
    }
}

impl std::fmt::Debug for HttpAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthClient")
            .field("web_host", &self.config.web_host)
            .finish_non_exhaustive()
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;
        return Err(AuthError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl AuthPort for HttpAuthClient {
    async fn generate_token(&self, workspace: &str) -> Result<Token, AuthError> {
        let response = self
            .token_request(workspace)?
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let token: Token = read_json(response).await?;
        tracing::debug!(session_id = %token.session_id, "Session token issued");
        Ok(token)
    }

    async fn load_scene(
        &self,
        token: &Token,
        scene: &str,
        request: &LoadSceneRequest,
    ) -> Result<LoadSceneResponse, AuthError> {
        let response = self
            .scene_request(token, scene, request)
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let loaded: LoadSceneResponse = read_json(response).await?;
        tracing::debug!(scene, agents = loaded.agents.len(), "Scene loaded");
        Ok(loaded)
    }
}
