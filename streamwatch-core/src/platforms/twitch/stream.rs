// ========================================================
// File: streamwatch-core/src/platforms/twitch/stream.rs
// ========================================================
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::platforms::twitch::client::TwitchHelixClient;
use crate::Error;
use streamwatch_common::models::StreamSnapshot;
use streamwatch_common::traits::platform_traits::StreamStatusProvider;

/// Response from the "Get Streams" endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamsResponse {
    pub data: Vec<StreamData>,
}

/// Single stream data record.
#[derive(Debug, Deserialize)]
pub struct StreamData {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    pub game_id: String,
    pub game_name: String,
    #[serde(rename = "type")]
    pub type_field: String, // "live", or "" during outages
    pub title: String,
    pub viewer_count: u32,
    pub started_at: String,
    pub language: String,
}

/// Queries "Get Streams" for one login. `Ok(None)` means the channel is
/// offline (the endpoint returns an empty data array).
pub async fn fetch_stream(
    client: &TwitchHelixClient,
    twitch_login: &str,
) -> Result<Option<StreamSnapshot>, Error> {
    let streams_url = format!(
        "https://api.twitch.tv/helix/streams?user_login={}",
        twitch_login
    );
    let resp = client
        .http_client()
        .get(&streams_url)
        .header("Client-Id", client.client_id())
        .header("Authorization", format!("Bearer {}", client.bearer_token()))
        .send()
        .await
        .map_err(|e| Error::Platform(format!("fetch_stream network error: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        return Err(Error::Platform(format!(
            "fetch_stream: HTTP {status} => {body_text}"
        )));
    }

    let body = resp.text().await?;
    let streams: StreamsResponse = serde_json::from_str(&body)
        .map_err(|e| Error::Platform(format!("fetch_stream parse error: {e}")))?;

    let Some(stream) = streams.data.first() else {
        debug!("No live stream for {twitch_login}");
        return Ok(None);
    };
    if stream.type_field != "live" {
        debug!("Stream for {twitch_login} has type {:?}, not live", stream.type_field);
        return Ok(None);
    }

    debug!(
        "Live: {} playing {:?} ({} viewers)",
        stream.user_login, stream.game_name, stream.viewer_count
    );
    Ok(Some(StreamSnapshot {
        title: stream.title.clone(),
        game_name: stream.game_name.clone(),
        viewer_count: stream.viewer_count,
    }))
}

#[async_trait]
impl StreamStatusProvider for TwitchHelixClient {
    async fn fetch_stream(&self, twitch_login: &str) -> Result<Option<StreamSnapshot>, Error> {
        fetch_stream(self, twitch_login).await
    }
}
