use log::debug;
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::{
    config::ServerConfiguration,
    event::NowPlayingItem,
    lyrics::{parse_lyrics, LyricFetcher, LyricSet, Ticks},
};

/// Minimal client for a Jellyfin-style media server.
#[derive(Debug, Clone)]
pub struct MediaServer {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub now_playing_item: Option<NowPlayingItem>,
    #[serde(default)]
    pub play_state: PlayState,
    /// Media type of the queued item, if any.
    #[serde(default)]
    pub next_media_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayState {
    #[serde(default)]
    pub position_ticks: Option<Ticks>,
    #[serde(default)]
    pub is_paused: bool,
}

impl MediaServer {
    pub fn new(config: &ServerConfiguration) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(
            AUTHORIZATION,
            format!("MediaBrowser Token=\"{}\"", self.api_key),
        )
    }

    pub async fn sessions(&self) -> anyhow::Result<Vec<SessionInfo>> {
        let resp = self
            .authorized(self.client.get(self.url("Sessions?ActiveWithinSeconds=960")))
            .send()
            .await?
            .error_for_status()?;
        resp.json::<Vec<SessionInfo>>()
            .await
            .map_err(anyhow::Error::from)
    }

    pub async fn seek(&self, session_id: &str, position: Ticks) -> anyhow::Result<()> {
        self.authorized(self.client.post(self.url(&format!(
            "Sessions/{session_id}/Playing/Seek?SeekPositionTicks={position}"
        ))))
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    pub async fn unpause(&self, session_id: &str) -> anyhow::Result<()> {
        self.authorized(
            self.client
                .post(self.url(&format!("Sessions/{session_id}/Playing/Unpause"))),
        )
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LyricFetcher for MediaServer {
    async fn fetch_lyrics(&self, item: &NowPlayingItem) -> anyhow::Result<Option<LyricSet>> {
        let resp = self
            .authorized(self.client.get(self.url(&format!("Audio/{}/Lyrics", item.id))))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            // Song does not have lyrics
            debug!("Server has no lyrics for {}", item.id);
            Ok(None)
        } else {
            let body = resp.error_for_status()?.text().await?;
            parse_lyrics(&body)
        }
    }
}
