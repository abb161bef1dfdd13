use blog_common::{
    database::Database,
    events::{
        ARTICLE_EVENTS_PATTERN, ARTICLES_EXCHANGE, Consumer, MessageBroker, PostgresEventBus,
        RoutingPattern,
    },
    http::{HttpServer, shutdown_signal},
    telemetry,
};
use tokio::sync::watch;

use crate::{
    domain::aggregator::StatsAggregator,
    infrastructure::{
        http::rpc_routes, persistence::PostgresStatsRepository, settings::Settings,
    },
};

mod domain;
mod infrastructure;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init(&settings.log_filter);

    let database = Database::connect(&settings.database).await?;
    let aggregator = StatsAggregator::new(PostgresStatsRepository::new(database.clone()));

    let bus = PostgresEventBus::new(database);
    let queue = settings.consumer.queue.clone();
    bus.bind_queue(
        &queue,
        ARTICLES_EXCHANGE,
        &RoutingPattern::new(ARTICLE_EVENTS_PATTERN),
    )
    .await?;
    tracing::info!(%queue, exchange = ARTICLES_EXCHANGE, pattern = ARTICLE_EVENTS_PATTERN, "queue bound");

    // the consumer stops with the server, or when the server exits with an error
    let (stop, mut stopped) = watch::channel(());
    let consumer = Consumer::new(bus, aggregator.clone(), queue).with_settings(&settings.consumer);
    let consumer_task = tokio::spawn(consumer.run(async move {
        let _ = stopped.changed().await;
    }));

    let http_server = HttpServer::new(rpc_routes(aggregator), &settings.server).await?;
    let served = http_server
        .run(async move {
            shutdown_signal().await;
            let _ = stop.send(());
        })
        .await;

    consumer_task.await?;
    served
}
