//! Read-only Steam web clients and local Steam account discovery.

mod owned;
mod store_tags;
mod user;

use std::{future::Future, time::Duration};

use anyhow::{Context, Result};

pub use owned::{owned_games_url, owned_playtime_hours};
pub use store_tags::{import_store_tags, store_tags, TagImportProgress};
pub use user::{detect_local_steam_id64, parse_login_users};

/// Minimal async HTTP GET used by the Steam clients.
pub trait HttpGet: Sync {
    /// Fetch `url` and return the body. Non-success statuses are errors.
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// `reqwest`-backed [`HttpGet`] with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    /// Build a client that gives up on a request after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gamedice/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpGet for ReqwestHttp {
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", redact(url)))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", redact(url)))?;
        response
            .text()
            .await
            .with_context(|| format!("failed to read response from {}", redact(url)))
    }
}

/// Strip the query string so API keys never reach logs or error messages.
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
