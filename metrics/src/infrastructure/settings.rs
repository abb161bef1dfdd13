use blog_common::{
    database::DatabaseSettings, events::consumer::ConsumerSettings, http::HttpServerConfig,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub server: HttpServerConfig,
    pub database: DatabaseSettings,
    pub consumer: ConsumerSettings,
}

fn default_log_filter() -> String {
    "info,tower_http=debug,sqlx=warn".into()
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        blog_common::settings::load("metrics")
    }
}
