use axum::{Json, Router, extract::State, routing::post};
use blog_common::rpc::{
    MetricsService,
    server::RpcResult,
    wire::{
        ArticleStatsRequest, ArticleStatsResponse, BulkStatsRequest, BulkStatsResponse,
        LikeRequest, LikeStatusResponse, RecordViewRequest, SuccessResponse, paths,
    },
};

/// RPC surface of the metrics service.
pub fn rpc_routes<M: MetricsService>(service: M) -> Router {
    Router::new()
        .route(paths::RECORD_VIEW, post(record_view::<M>))
        .route(paths::RECORD_LIKE, post(record_like::<M>))
        .route(paths::REMOVE_LIKE, post(remove_like::<M>))
        .route(paths::GET_ARTICLE_STATS, post(get_article_stats::<M>))
        .route(paths::GET_USER_LIKE_STATUS, post(get_user_like_status::<M>))
        .route(paths::GET_BULK_STATS, post(get_bulk_stats::<M>))
        .with_state(service)
}

async fn record_view<M: MetricsService>(
    State(service): State<M>,
    Json(request): Json<RecordViewRequest>,
) -> RpcResult<SuccessResponse> {
    service
        .record_view(request.article_id, request.user_id)
        .await?;
    Ok(Json(SuccessResponse::OK))
}

async fn record_like<M: MetricsService>(
    State(service): State<M>,
    Json(request): Json<LikeRequest>,
) -> RpcResult<SuccessResponse> {
    service
        .record_like(request.article_id, request.user_id)
        .await?;
    Ok(Json(SuccessResponse::OK))
}

async fn remove_like<M: MetricsService>(
    State(service): State<M>,
    Json(request): Json<LikeRequest>,
) -> RpcResult<SuccessResponse> {
    service
        .remove_like(request.article_id, request.user_id)
        .await?;
    Ok(Json(SuccessResponse::OK))
}

async fn get_article_stats<M: MetricsService>(
    State(service): State<M>,
    Json(request): Json<ArticleStatsRequest>,
) -> RpcResult<ArticleStatsResponse> {
    let counters = service.get_article_stats(request.article_id).await?;
    Ok(Json(counters.into()))
}

async fn get_user_like_status<M: MetricsService>(
    State(service): State<M>,
    Json(request): Json<LikeRequest>,
) -> RpcResult<LikeStatusResponse> {
    let liked = service
        .get_user_like_status(request.article_id, request.user_id)
        .await?;
    Ok(Json(LikeStatusResponse { liked }))
}

async fn get_bulk_stats<M: MetricsService>(
    State(service): State<M>,
    Json(request): Json<BulkStatsRequest>,
) -> RpcResult<BulkStatsResponse> {
    let stats = service
        .get_bulk_stats(request.article_ids, request.viewer_id)
        .await?;
    Ok(Json(BulkStatsResponse { stats }))
}

#[cfg(test)]
mod tests {
    use blog_common::{
        ArticleCounters, ServiceError, Viewer,
        rpc::{HttpMetricsClient, RpcEndpoint},
        test_utils::{article_id, user_id},
    };
    use tokio::net::TcpListener;

    use super::*;
    use crate::domain::{
        aggregator::StatsAggregator, repository::memory::InMemoryStatsRepository,
    };

    async fn serve(repository: InMemoryStatsRepository) -> HttpMetricsClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = rpc_routes(StatsAggregator::new(repository));
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        HttpMetricsClient::new(&RpcEndpoint {
            url: format!("http://{addr}"),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn counters_over_rpc() {
        let client = serve(InMemoryStatsRepository::default()).await;

        client.record_view(article_id(1), Viewer::Anonymous).await.unwrap();
        client.record_like(article_id(1), user_id(2)).await.unwrap();
        client.record_like(article_id(1), user_id(2)).await.unwrap();

        assert_eq!(
            client.get_article_stats(article_id(1)).await.unwrap(),
            ArticleCounters { views: 1, likes: 1 }
        );
        assert!(client.get_user_like_status(article_id(1), user_id(2)).await.unwrap());

        client.remove_like(article_id(1), user_id(2)).await.unwrap();
        let rows = client
            .get_bulk_stats(vec![article_id(1), article_id(2)], Viewer::User(user_id(2)))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].views, 1);
        assert!(!rows[0].viewer_liked);
        assert_eq!(rows[1].article_id, article_id(2));
    }

    #[tokio::test]
    async fn storage_outage_makes_metrics_unavailable() {
        let repository = InMemoryStatsRepository::default();
        repository.set_failing(true);
        let client = serve(repository).await;

        let result = client.get_article_stats(article_id(1)).await;
        assert!(matches!(
            result,
            Err(ServiceError::Unavailable { service, .. }) if service == "metrics"
        ));
    }
}
