use std::time::Duration;

use blog_common::{http::HttpServerConfig, rpc::RpcEndpoint};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub server: HttpServerConfig,
    pub identity: RpcEndpoint,
    pub content: RpcEndpoint,
    pub metrics: RpcEndpoint,
    /// Budget of every downstream call, in milliseconds.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// `*` or a comma separated list of origins.
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
    /// Prefix of the address handed out for link articles.
    #[serde(default = "default_article_url_base")]
    pub article_url_base: String,
}

fn default_log_filter() -> String {
    "info,tower_http=debug".into()
}

fn default_deadline_ms() -> u64 {
    2_000
}

fn default_cors_allow_origin() -> String {
    "*".into()
}

fn default_article_url_base() -> String {
    "/articles".into()
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        blog_common::settings::load("gateway")
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}
