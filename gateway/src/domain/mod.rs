use blog_common::rpc::{ContentService, IdentityService, MetricsService};

use crate::domain::aggregator::Aggregator;

pub mod aggregator;

/// The global application state shared between all request handlers.
pub trait AppState: Clone + Send + Sync + 'static {
    type I: IdentityService;
    type C: ContentService;
    type M: MetricsService;

    fn aggregator(&self) -> &Aggregator<Self::I, Self::C, Self::M>;

    /// Prefix of the shareable address of a link article.
    fn article_url_base(&self) -> &str;
}
