use std::sync::Arc;

use blog_common::rpc::{ContentService, IdentityService, MetricsService};

use crate::domain::{AppState, aggregator::Aggregator};

pub mod http;
pub mod settings;

pub struct AppStateImpl<I, C, M> {
    aggregator: Arc<Aggregator<I, C, M>>,
    article_url_base: Arc<str>,
}

impl<I, C, M> AppStateImpl<I, C, M> {
    pub fn new(aggregator: Aggregator<I, C, M>, article_url_base: &str) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            article_url_base: Arc::from(article_url_base),
        }
    }
}

impl<I, C, M> Clone for AppStateImpl<I, C, M> {
    fn clone(&self) -> Self {
        Self {
            aggregator: Arc::clone(&self.aggregator),
            article_url_base: Arc::clone(&self.article_url_base),
        }
    }
}

impl<I, C, M> AppState for AppStateImpl<I, C, M>
where
    I: IdentityService,
    C: ContentService,
    M: MetricsService,
{
    type I = I;
    type C = C;
    type M = M;

    fn aggregator(&self) -> &Aggregator<I, C, M> {
        &self.aggregator
    }

    fn article_url_base(&self) -> &str {
        &self.article_url_base
    }
}
