use std::time::Duration;

use blog_common::{database::DatabaseSettings, http::HttpServerConfig, rpc::RpcEndpoint};
use serde::Deserialize;

use crate::domain::authority::AuthorityConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub server: HttpServerConfig,
    pub database: DatabaseSettings,
    pub identity: RpcEndpoint,
    #[serde(default)]
    pub events: EventSettings,
    /// Deadline the gateway gives a whole Content call, in milliseconds.
    #[serde(default = "default_upstream_deadline_ms")]
    pub upstream_deadline_ms: u64,
    /// Time a read may spend on author names, in milliseconds.
    #[serde(default = "default_author_budget_ms")]
    pub author_budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

fn default_log_filter() -> String {
    "info,tower_http=debug,sqlx=warn".into()
}

fn default_publish_timeout_ms() -> u64 {
    250
}

fn default_upstream_deadline_ms() -> u64 {
    2_000
}

fn default_author_budget_ms() -> u64 {
    250
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        blog_common::settings::load("content")
    }

    pub fn authority_config(&self) -> anyhow::Result<AuthorityConfig> {
        bounded_config(
            self.author_budget_ms,
            self.events.publish_timeout_ms,
            self.upstream_deadline_ms,
        )
    }
}

/// Optional work of a read must fit strictly below the caller's deadline.
fn bounded_config(
    author_budget_ms: u64,
    publish_timeout_ms: u64,
    upstream_deadline_ms: u64,
) -> anyhow::Result<AuthorityConfig> {
    let config = AuthorityConfig {
        author_budget: Duration::from_millis(author_budget_ms),
        publish_timeout: Duration::from_millis(publish_timeout_ms),
    };
    let upstream = Duration::from_millis(upstream_deadline_ms);
    anyhow::ensure!(
        config.budget() < upstream,
        "author_budget_ms + events.publish_timeout_ms ({} ms) must stay below upstream_deadline_ms ({} ms)",
        config.budget().as_millis(),
        upstream.as_millis()
    );
    Ok(config)
}
