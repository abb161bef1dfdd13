use blog_common::{
    AccessToken, Article, ArticleAccess, ArticleDraft, ArticleId, CREATED_FIELD_NAME,
    ServiceError, UPDATED_FIELD_NAME, USER_ID_FIELD_NAME, UserId, Visibility, database::Database,
    rpc::Page,
};
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};

use crate::domain::repository::ArticleRepository;

const ARTICLE_COLUMNS: &str =
    "id, user_id, title, content, visibility, access_token, created_at, updated_at";

fn insert_article() -> String {
    format!(
        "INSERT INTO articles (user_id, title, content, visibility, access_token, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {ARTICLE_COLUMNS}"
    )
}

fn select_article(lock: bool) -> String {
    let lock = if lock { " FOR UPDATE" } else { "" };
    format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1{lock}")
}

fn update_article() -> String {
    format!(
        "UPDATE articles SET title = $2, content = $3, visibility = $4, access_token = $5, updated_at = $6 \
         WHERE id = $1 RETURNING {ARTICLE_COLUMNS}"
    )
}

const DELETE_ARTICLE: &str = "DELETE FROM articles WHERE id = $1";

fn list_public() -> String {
    format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles WHERE visibility = 'public' \
         ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
    )
}

fn list_by_owner() -> String {
    format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles WHERE user_id = $1 AND ($2 OR visibility = 'public') \
         ORDER BY created_at DESC, id DESC"
    )
}

/// Articles stored in the `articles` table of the content database.
#[derive(Clone)]
pub struct PostgresArticleRepository {
    database: Database,
}

impl PostgresArticleRepository {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn corrupt(column: &str, cause: impl std::fmt::Display) -> ServiceError {
    ServiceError::unavailable("database", format!("bad `{column}` column: {cause}"))
}

fn article_from_row(row: &PgRow) -> Result<Article, ServiceError> {
    let id: i64 = row.try_get("id")?;
    let owner: i64 = row.try_get(USER_ID_FIELD_NAME)?;
    let visibility: String = row.try_get("visibility")?;
    let token: Option<String> = row.try_get("access_token")?;
    let created_at: DateTime<Utc> = row.try_get(CREATED_FIELD_NAME)?;
    let updated_at: DateTime<Utc> = row.try_get(UPDATED_FIELD_NAME)?;

    let visibility: Visibility = visibility
        .parse()
        .map_err(|error| corrupt("visibility", error))?;
    let access = ArticleAccess::from_parts(visibility, token)?;

    Ok(Article {
        id: ArticleId::try_new(id).map_err(|error| corrupt("id", error))?,
        owner: UserId::try_new(owner).map_err(|error| corrupt(USER_ID_FIELD_NAME, error))?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        access,
        created_at,
        updated_at,
    })
}

impl ArticleRepository for PostgresArticleRepository {
    async fn insert(
        &self,
        owner: UserId,
        draft: &ArticleDraft,
        access: &ArticleAccess,
    ) -> Result<Article, ServiceError> {
        let title: &str = draft.title.as_ref();
        let content: &str = draft.content.as_ref();
        let row = sqlx::query(&insert_article())
            .bind(owner.into_inner())
            .bind(title)
            .bind(content)
            .bind(access.visibility().as_str())
            .bind(access.token().map(AccessToken::as_str))
            .bind(Utc::now())
            .fetch_one(self.database.database_pool())
            .await?;
        article_from_row(&row)
    }

    async fn find_by_id(&self, id: ArticleId) -> Result<Option<Article>, ServiceError> {
        let row = sqlx::query(&select_article(false))
            .bind(id.into_inner())
            .fetch_optional(self.database.database_pool())
            .await?;
        row.as_ref().map(article_from_row).transpose()
    }

    async fn update<F>(&self, id: ArticleId, revise: F) -> Result<Article, ServiceError>
    where
        F: FnOnce(Article) -> Result<Article, ServiceError> + Send + 'static,
    {
        let mut transaction = self.database.database_pool().begin().await?;

        let current = sqlx::query(&select_article(true))
            .bind(id.into_inner())
            .fetch_optional(&mut *transaction)
            .await?
            .ok_or(ServiceError::NotFound)?;
        let revised = revise(article_from_row(&current)?)?;

        let row = sqlx::query(&update_article())
            .bind(id.into_inner())
            .bind(&revised.title)
            .bind(&revised.content)
            .bind(revised.visibility().as_str())
            .bind(revised.access_token().map(AccessToken::as_str))
            .bind(revised.updated_at)
            .fetch_one(&mut *transaction)
            .await?;
        let stored = article_from_row(&row)?;

        transaction.commit().await?;
        Ok(stored)
    }

    async fn delete<F>(&self, id: ArticleId, authorize: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&Article) -> Result<(), ServiceError> + Send + 'static,
    {
        let mut transaction = self.database.database_pool().begin().await?;

        let current = sqlx::query(&select_article(true))
            .bind(id.into_inner())
            .fetch_optional(&mut *transaction)
            .await?
            .ok_or(ServiceError::NotFound)?;
        authorize(&article_from_row(&current)?)?;

        sqlx::query(DELETE_ARTICLE)
            .bind(id.into_inner())
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(())
    }

    async fn list_public(&self, page: Page) -> Result<Vec<Article>, ServiceError> {
        let rows = sqlx::query(&list_public())
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(self.database.database_pool())
            .await?;
        rows.iter().map(article_from_row).collect()
    }

    async fn list_by_owner(
        &self,
        owner: UserId,
        include_hidden: bool,
    ) -> Result<Vec<Article>, ServiceError> {
        let rows = sqlx::query(&list_by_owner())
            .bind(owner.into_inner())
            .bind(include_hidden)
            .fetch_all(self.database.database_pool())
            .await?;
        rows.iter().map(article_from_row).collect()
    }
}
