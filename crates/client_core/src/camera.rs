//! HTTP configuration endpoints of the camera.

use std::{collections::BTreeMap, time::Duration};

use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::CameraError;

pub const DEFAULT_HTTP_PORT: u16 = 80;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CameraClient {
    http: reqwest::Client,
    base: Url,
}

impl CameraClient {
    pub fn new(host: &str, port: u16) -> Result<Self, CameraError> {
        let base = Url::parse(&format!("http://{host}:{port}/"))?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Set one camera variable, e.g. `framesize` or `quality`.
    pub async fn update_config(&self, var: &str, value: &str) -> Result<(), CameraError> {
        let mut url = self.base.join("control")?;
        url.query_pairs_mut()
            .append_pair("var", var)
            .append_pair("val", value);
        self.http.get(url).send().await?.error_for_status()?;
        info!(var, value, "camera setting updated");
        Ok(())
    }

    /// Current camera settings keyed by variable name.
    pub async fn fetch_status(&self) -> Result<BTreeMap<String, Value>, CameraError> {
        let url = self.base.join("status")?;
        let status = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<BTreeMap<String, Value>>()
            .await?;
        debug!(settings = status.len(), "camera status fetched");
        Ok(status)
    }

    /// Still image address; `cache_buster` keeps intermediaries from serving
    /// an old capture.
    pub fn capture_url(&self, cache_buster: u64) -> Result<Url, CameraError> {
        let mut url = self.base.join("capture")?;
        url.query_pairs_mut()
            .append_pair("_cb", &cache_buster.to_string());
        Ok(url)
    }
}
