use std::future::Future;

use blog_common::{ArticleCounters, ArticleId, ArticleStats, ServiceError, UserId, Viewer};

/// View occurrences and like membership of articles.
pub trait StatsRepository: Clone + Send + Sync + 'static {
    fn record_view(
        &self,
        article_id: ArticleId,
        viewer: Viewer,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// true when the pair was not yet a member.
    fn add_like(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> impl Future<Output = Result<bool, ServiceError>> + Send;

    /// true when the pair was a member.
    fn remove_like(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> impl Future<Output = Result<bool, ServiceError>> + Send;

    fn counters(
        &self,
        article_id: ArticleId,
    ) -> impl Future<Output = Result<ArticleCounters, ServiceError>> + Send;

    fn is_liked(
        &self,
        article_id: ArticleId,
        user: UserId,
    ) -> impl Future<Output = Result<bool, ServiceError>> + Send;

    /// One row per id of `article_ids`, in the same order.
    fn bulk_stats(
        &self,
        article_ids: &[ArticleId],
        viewer: Viewer,
    ) -> impl Future<Output = Result<Vec<ArticleStats>, ServiceError>> + Send;
}

#[cfg(test)]
pub mod memory {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct State {
        views: HashMap<ArticleId, Vec<Viewer>>,
        likes: BTreeSet<(ArticleId, UserId)>,
        failing: bool,
    }

    #[derive(Clone, Default)]
    pub struct InMemoryStatsRepository {
        state: Arc<Mutex<State>>,
    }

    impl InMemoryStatsRepository {
        pub fn set_failing(&self, failing: bool) {
            self.state.lock().unwrap().failing = failing;
        }

        pub fn views_by(&self, article_id: ArticleId) -> Vec<Viewer> {
            self.state
                .lock()
                .unwrap()
                .views
                .get(&article_id)
                .cloned()
                .unwrap_or_default()
        }

        fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, ServiceError> {
            let mut state = self.state.lock().unwrap();
            if state.failing {
                return Err(ServiceError::unavailable("database", "connection refused"));
            }
            Ok(f(&mut state))
        }
    }

    fn counters_of(state: &State, article_id: ArticleId) -> ArticleCounters {
        ArticleCounters {
            views: state.views.get(&article_id).map_or(0, Vec::len) as u64,
            likes: state.likes.iter().filter(|(id, _)| *id == article_id).count() as u64,
        }
    }

    impl StatsRepository for InMemoryStatsRepository {
        async fn record_view(&self, article_id: ArticleId, viewer: Viewer) -> Result<(), ServiceError> {
            self.with_state(|state| state.views.entry(article_id).or_default().push(viewer))
        }

        async fn add_like(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
            self.with_state(|state| state.likes.insert((article_id, user)))
        }

        async fn remove_like(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
            self.with_state(|state| state.likes.remove(&(article_id, user)))
        }

        async fn counters(&self, article_id: ArticleId) -> Result<ArticleCounters, ServiceError> {
            self.with_state(|state| counters_of(state, article_id))
        }

        async fn is_liked(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
            self.with_state(|state| state.likes.contains(&(article_id, user)))
        }

        async fn bulk_stats(
            &self,
            article_ids: &[ArticleId],
            viewer: Viewer,
        ) -> Result<Vec<ArticleStats>, ServiceError> {
            self.with_state(|state| {
                article_ids
                    .iter()
                    .map(|&article_id| {
                        let counters = counters_of(state, article_id);
                        ArticleStats {
                            article_id,
                            views: counters.views,
                            likes: counters.likes,
                            viewer_liked: viewer
                                .user_id()
                                .is_some_and(|user| state.likes.contains(&(article_id, user))),
                        }
                    })
                    .collect()
            })
        }
    }
}
