use blog_common::database::DatabaseSettings;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub database: DatabaseSettings,
}

fn default_log_filter() -> String {
    "info,sqlx=warn".into()
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        blog_common::settings::load("migration")
    }
}
