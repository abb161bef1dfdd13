use blog_common::{
    http::{HttpServer, shutdown_signal},
    rpc::{HttpContentClient, HttpIdentityClient, HttpMetricsClient},
    telemetry,
};

use crate::{
    domain::aggregator::Aggregator,
    infrastructure::{
        AppStateImpl,
        http::{cors_layer, router},
        settings::Settings,
    },
};

mod domain;
mod infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init(&settings.log_filter);

    let aggregator = Aggregator::new(
        HttpIdentityClient::new(&settings.identity)?,
        HttpContentClient::new(&settings.content)?,
        HttpMetricsClient::new(&settings.metrics)?,
        settings.deadline(),
    );
    let state = AppStateImpl::new(aggregator, &settings.article_url_base);
    let cors = cors_layer(&settings.cors_allow_origin)?;
    tracing::info!(
        identity = %settings.identity.url,
        content = %settings.content.url,
        metrics = %settings.metrics.url,
        deadline_ms = settings.deadline_ms,
        "gateway configured"
    );

    let http_server = HttpServer::new(router(state, cors), &settings.server).await?;
    http_server.run(shutdown_signal()).await
}
