use serde::{Deserialize, Serialize};

use crate::domain::ArticleId;

/// View and like totals of one article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCounters {
    pub views: u64,
    pub likes: u64,
}

/// One row of a bulk stats answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStats {
    pub article_id: ArticleId,
    pub views: u64,
    pub likes: u64,
    pub viewer_liked: bool,
}

impl ArticleStats {
    pub fn empty(article_id: ArticleId) -> Self {
        Self {
            article_id,
            views: 0,
            likes: 0,
            viewer_liked: false,
        }
    }
}
