//! Source distante : l'API REST d'un serveur PMOVideo

use super::client::StateSource;
use crate::profile::{ProfileId, ProfileState};
use crate::signal::SignalKind;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SignalBody {
    #[serde(default)]
    timestamp: i64,
}

/// Client HTTP de `/api/video`
///
/// Les signaux sur front (rafraîchissement, configuration) sont consommés
/// par le serveur à la lecture.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/video/{}", self.base_url, path)
    }
}

fn http_error(e: reqwest::Error) -> Error {
    Error::Other(anyhow::Error::new(e).context("video API request failed"))
}

fn signal_path(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::Volume => "signals/volume",
        SignalKind::Mute => "signals/mute",
        SignalKind::DashboardRefresh => "signals/refresh",
        SignalKind::ConfigChange => "signals/config",
    }
}

#[async_trait]
impl StateSource for HttpSource {
    async fn fetch_state(&self, profile: &ProfileId) -> Result<ProfileState> {
        self.client
            .get(self.url("state"))
            .query(&[("profile", profile.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?
            .json::<ProfileState>()
            .await
            .map_err(http_error)
    }

    async fn check_signal(&self, profile: &ProfileId, kind: SignalKind) -> Result<i64> {
        let body = self
            .client
            .get(self.url(signal_path(kind)))
            .query(&[("profile", profile.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_error)?
            .json::<SignalBody>()
            .await
            .map_err(http_error)?;
        Ok(body.timestamp)
    }
}
