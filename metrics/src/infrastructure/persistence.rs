use blog_common::{
    ArticleCounters, ArticleId, ArticleStats, ServiceError, UserId, Viewer, database::Database,
};
use sqlx::{Row, postgres::PgRow};

use crate::domain::repository::StatsRepository;

const RECORD_VIEW: &str = "INSERT INTO article_views (article_id, user_id) VALUES ($1, $2)";

const ADD_LIKE: &str = "INSERT INTO article_likes (article_id, user_id) VALUES ($1, $2) \
    ON CONFLICT (article_id, user_id) DO NOTHING";

const REMOVE_LIKE: &str = "DELETE FROM article_likes WHERE article_id = $1 AND user_id = $2";

const COUNTERS: &str = "SELECT \
    (SELECT count(*) FROM article_views WHERE article_id = $1) AS views, \
    (SELECT count(*) FROM article_likes WHERE article_id = $1) AS likes";

const IS_LIKED: &str =
    "SELECT EXISTS (SELECT 1 FROM article_likes WHERE article_id = $1 AND user_id = $2)";

// $2 is NULL for an anonymous viewer, which never matches a like
const BULK_STATS: &str = "SELECT ids.article_id, \
    (SELECT count(*) FROM article_views v WHERE v.article_id = ids.article_id) AS views, \
    (SELECT count(*) FROM article_likes l WHERE l.article_id = ids.article_id) AS likes, \
    EXISTS (SELECT 1 FROM article_likes l \
        WHERE l.article_id = ids.article_id AND l.user_id = $2) AS viewer_liked \
    FROM UNNEST($1::bigint[]) WITH ORDINALITY AS ids(article_id, position) \
    ORDER BY ids.position";

#[derive(Clone)]
pub struct PostgresStatsRepository {
    database: Database,
}

impl PostgresStatsRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn count(row: &PgRow, column: &str) -> Result<u64, ServiceError> {
    let value: i64 = row.try_get(column)?;
    Ok(value.max(0) as u64)
}

fn stats_from_row(row: &PgRow, article_id: ArticleId) -> Result<ArticleStats, ServiceError> {
    Ok(ArticleStats {
        article_id,
        views: count(row, "views")?,
        likes: count(row, "likes")?,
        viewer_liked: row.try_get("viewer_liked")?,
    })
}

impl StatsRepository for PostgresStatsRepository {
    async fn record_view(&self, article_id: ArticleId, viewer: Viewer) -> Result<(), ServiceError> {
        sqlx::query(RECORD_VIEW)
            .bind(article_id.into_inner())
            .bind(viewer.user_id().map(UserId::into_inner))
            .execute(self.database.database_pool())
            .await?;
        Ok(())
    }

    async fn add_like(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
        let result = sqlx::query(ADD_LIKE)
            .bind(article_id.into_inner())
            .bind(user.into_inner())
            .execute(self.database.database_pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_like(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
        let result = sqlx::query(REMOVE_LIKE)
            .bind(article_id.into_inner())
            .bind(user.into_inner())
            .execute(self.database.database_pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn counters(&self, article_id: ArticleId) -> Result<ArticleCounters, ServiceError> {
        let row = sqlx::query(COUNTERS)
            .bind(article_id.into_inner())
            .fetch_one(self.database.database_pool())
            .await?;
        Ok(ArticleCounters {
            views: count(&row, "views")?,
            likes: count(&row, "likes")?,
        })
    }

    async fn is_liked(&self, article_id: ArticleId, user: UserId) -> Result<bool, ServiceError> {
        let liked: bool = sqlx::query_scalar(IS_LIKED)
            .bind(article_id.into_inner())
            .bind(user.into_inner())
            .fetch_one(self.database.database_pool())
            .await?;
        Ok(liked)
    }

    async fn bulk_stats(
        &self,
        article_ids: &[ArticleId],
        viewer: Viewer,
    ) -> Result<Vec<ArticleStats>, ServiceError> {
        let ids: Vec<i64> = article_ids.iter().map(|id| id.into_inner()).collect();
        let rows = sqlx::query(BULK_STATS)
            .bind(ids.as_slice())
            .bind(viewer.user_id().map(UserId::into_inner))
            .fetch_all(self.database.database_pool())
            .await?;

        rows.iter()
            .zip(article_ids)
            .map(|(row, &article_id)| stats_from_row(row, article_id))
            .collect()
    }
}
