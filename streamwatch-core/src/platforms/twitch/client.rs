// File: streamwatch-core/src/platforms/twitch/client.rs

use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::info;

use crate::Error;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// A small wrapper client for calling Helix endpoints with an
/// app-access token.
pub struct TwitchHelixClient {
    http: Arc<ReqwestClient>,
    bearer_token: String,
    client_id: String,
}

impl TwitchHelixClient {
    /// Create a client from an already-obtained bearer token.
    pub fn new(bearer_token: &str, client_id: &str) -> Self {
        Self {
            http: Arc::new(ReqwestClient::new()),
            bearer_token: bearer_token.to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Fetch an app-access token via the client-credentials grant and
    /// build a client around it. Errors here are fatal startup errors.
    pub async fn authenticate(client_id: &str, client_secret: &str) -> Result<Self, Error> {
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(Error::Auth("Twitch client id/secret missing".into()));
        }

        let http = Arc::new(ReqwestClient::new());
        let resp = http
            .post("https://id.twitch.tv/oauth2/token")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Twitch token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "Twitch token request: HTTP {status} => {body_text}"
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Twitch token parse error: {e}")))?;

        info!("Obtained Twitch app-access token");
        Ok(Self {
            http,
            bearer_token: token.access_token,
            client_id: client_id.to_string(),
        })
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn http_client(&self) -> Arc<ReqwestClient> {
        self.http.clone()
    }
}
