use std::env;

use anyhow::Context;
use config::{Config, Environment, File};
use dotenvy::dotenv;
use serde::de::DeserializeOwned;

/// Loads the settings of `service`.
///
/// Sources, later ones overriding earlier ones: `./config/<service>.yaml`,
/// the optional `./config/<service>-<RUN_MODE>.yaml` and `APP_*` environment
/// variables with `__` between nested keys (`APP_DATABASE__HOST`).
pub fn load<T: DeserializeOwned>(service: &str) -> anyhow::Result<T> {
    dotenv().ok();
    let run_mode = load_env("RUN_MODE", "development");

    let s = Config::builder()
        .add_source(File::with_name(&format!("./config/{service}")))
        .add_source(File::with_name(&format!("./config/{service}-{run_mode}")).required(false))
        .add_source(
            Environment::with_prefix("app")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("failed to assemble {service} config"))?;

    s.try_deserialize()
        .with_context(|| format!("failed to read {service} config"))
}

fn load_env(key: &str, default_value: &'static str) -> String {
    env::var(key).unwrap_or_else(|_| default_value.into())
}
