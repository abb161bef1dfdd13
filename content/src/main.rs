use blog_common::{
    database::Database,
    events::PostgresEventBus,
    http::{HttpServer, shutdown_signal},
    rpc::HttpIdentityClient,
    telemetry,
};

use crate::{
    domain::authority::ArticleAuthority,
    infrastructure::{
        http::rpc_routes, persistence::PostgresArticleRepository, settings::Settings,
    },
};

mod domain;
mod infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init(&settings.log_filter);

    let database = Database::connect(&settings.database).await?;
    let identity = HttpIdentityClient::new(&settings.identity)?;
    let config = settings.authority_config()?;
    tracing::info!(
        author_budget_ms = config.author_budget.as_millis(),
        publish_timeout_ms = config.publish_timeout.as_millis(),
        upstream_deadline_ms = settings.upstream_deadline_ms,
        "content configured"
    );

    let authority = ArticleAuthority::new(
        PostgresArticleRepository::new(database.clone()),
        identity,
        PostgresEventBus::new(database),
        config,
    );

    let http_server = HttpServer::new(rpc_routes(authority), &settings.server).await?;
    http_server.run(shutdown_signal()).await
}
