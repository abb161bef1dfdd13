use blog_common::{
    ArticleCounters, ArticleId, ArticleStats, ServiceError, UserId, Viewer,
    events::{ArticleEvent, EventHandler, HandleError},
    rpc::MetricsService,
};

use crate::domain::repository::StatsRepository;

/// Owns view counters and like membership. Serves the metrics RPC and
/// applies article events from the bus to the same store.
#[derive(Clone)]
pub struct StatsAggregator<R> {
    repository: R,
}

impl<R: StatsRepository> StatsAggregator<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

impl<R: StatsRepository> MetricsService for StatsAggregator<R> {
    async fn record_view(&self, article_id: ArticleId, viewer: Viewer) -> Result<(), ServiceError> {
        self.repository.record_view(article_id, viewer).await
    }

    async fn record_like(&self, article_id: ArticleId, user: UserId) -> Result<(), ServiceError> {
        let added = self.repository.add_like(article_id, user).await?;
        tracing::debug!(%article_id, %user, added, "like recorded");
        Ok(())
    }

    async fn remove_like(&self, article_id: ArticleId, user: UserId) -> Result<(), ServiceError> {
        let removed = self.repository.remove_like(article_id, user).await?;
        tracing::debug!(%article_id, %user, removed, "like removed");
        Ok(())
    }

    async fn get_article_stats(&self, article_id: ArticleId) -> Result<ArticleCounters, ServiceError> {
        self.repository.counters(article_id).await
    }

    async fn get_user_like_status(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> Result<bool, ServiceError> {
        self.repository.is_liked(article_id, user).await
    }

    async fn get_bulk_stats(
        &self,
        article_ids: Vec<ArticleId>,
        viewer: Viewer,
    ) -> Result<Vec<ArticleStats>, ServiceError> {
        if article_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.repository.bulk_stats(&article_ids, viewer).await
    }
}

fn handle_error(error: ServiceError) -> HandleError {
    if error.is_dependency_failure() {
        HandleError::Transient(error.to_string())
    } else {
        HandleError::Rejected(error.to_string())
    }
}

impl<R: StatsRepository> EventHandler for StatsAggregator<R> {
    async fn handle(&self, event: &ArticleEvent) -> Result<(), HandleError> {
        match *event {
            ArticleEvent::Created { article_id, .. } => {
                tracing::debug!(%article_id, "article created, nothing to count yet");
                Ok(())
            }
            ArticleEvent::Viewed { article_id, viewer } => self
                .repository
                .record_view(article_id, viewer)
                .await
                .map_err(handle_error),
            ArticleEvent::Liked { article_id, user } => self
                .repository
                .add_like(article_id, user)
                .await
                .map(drop)
                .map_err(handle_error),
            ArticleEvent::Unliked { article_id, user } => self
                .repository
                .remove_like(article_id, user)
                .await
                .map(drop)
                .map_err(handle_error),
        }
    }
}
