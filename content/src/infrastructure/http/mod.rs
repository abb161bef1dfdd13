use axum::{Json, Router, extract::State, routing::post};
use blog_common::{
    ArticleDraft,
    rpc::{
        ContentService,
        server::RpcResult,
        wire::{
            ArticleDto, ArticleListResponse, ArticleResponse, AuthoredArticleDto,
            CreateArticleRequest, DeleteArticleRequest, GetArticleRequest, ListArticlesRequest,
            ListUserArticlesRequest, SuccessResponse, UpdateArticleRequest, paths,
        },
    },
};

/// RPC surface of the content service.
pub fn rpc_routes<C: ContentService>(service: C) -> Router {
    Router::new()
        .route(paths::CREATE_ARTICLE, post(create_article::<C>))
        .route(paths::GET_ARTICLE, post(get_article::<C>))
        .route(paths::UPDATE_ARTICLE, post(update_article::<C>))
        .route(paths::DELETE_ARTICLE, post(delete_article::<C>))
        .route(paths::LIST_ARTICLES, post(list_articles::<C>))
        .route(paths::LIST_USER_ARTICLES, post(list_user_articles::<C>))
        .with_state(service)
}

async fn create_article<C: ContentService>(
    State(service): State<C>,
    Json(request): Json<CreateArticleRequest>,
) -> RpcResult<ArticleResponse> {
    let draft = ArticleDraft::parse(request.title, request.content, request.visibility)?;
    let article = service.create_article(request.owner_id, draft).await?;
    Ok(Json(ArticleResponse {
        article: ArticleDto::from(&article),
    }))
}

async fn get_article<C: ContentService>(
    State(service): State<C>,
    Json(request): Json<GetArticleRequest>,
) -> RpcResult<AuthoredArticleDto> {
    let found = service
        .get_article(request.article_id, request.viewer_id, request.access_token)
        .await?;
    Ok(Json(AuthoredArticleDto::from(&found)))
}

async fn update_article<C: ContentService>(
    State(service): State<C>,
    Json(request): Json<UpdateArticleRequest>,
) -> RpcResult<ArticleResponse> {
    let draft = ArticleDraft::parse(request.title, request.content, request.visibility)?;
    let article = service
        .update_article(request.article_id, request.owner_id, draft)
        .await?;
    Ok(Json(ArticleResponse {
        article: ArticleDto::from(&article),
    }))
}

async fn delete_article<C: ContentService>(
    State(service): State<C>,
    Json(request): Json<DeleteArticleRequest>,
) -> RpcResult<SuccessResponse> {
    service
        .delete_article(request.article_id, request.owner_id)
        .await?;
    Ok(Json(SuccessResponse::OK))
}

async fn list_articles<C: ContentService>(
    State(service): State<C>,
    Json(request): Json<ListArticlesRequest>,
) -> RpcResult<ArticleListResponse> {
    let articles = service
        .list_articles(request.viewer_id, request.page)
        .await?;
    Ok(Json(ArticleListResponse {
        articles: articles.iter().map(AuthoredArticleDto::from).collect(),
    }))
}

async fn list_user_articles<C: ContentService>(
    State(service): State<C>,
    Json(request): Json<ListUserArticlesRequest>,
) -> RpcResult<ArticleListResponse> {
    let articles = service
        .list_user_articles(request.user_id, request.viewer_id)
        .await?;
    Ok(Json(ArticleListResponse {
        articles: articles.iter().map(AuthoredArticleDto::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use blog_common::{
        ServiceError, Viewer, Visibility,
        events::InMemoryEventBus,
        rpc::{HttpContentClient, Page, RpcEndpoint, server::RpcError},
        test_utils::{FakeIdentity, user_id},
    };
    use tokio::net::TcpListener;

    use super::*;
    use crate::domain::{
        authority::{ArticleAuthority, AuthorityConfig},
        repository::memory::InMemoryArticleRepository,
    };

    async fn client() -> HttpContentClient {
        let authority = ArticleAuthority::new(
            InMemoryArticleRepository::default(),
            FakeIdentity::new().with_user(1, "ada", "t1"),
            InMemoryEventBus::new(),
            AuthorityConfig::default(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = rpc_routes(authority);
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        HttpContentClient::new(&RpcEndpoint {
            url: format!("http://{addr}"),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    fn draft(visibility: Visibility) -> ArticleDraft {
        ArticleDraft::parse("Over the wire", "body text long enough", visibility).unwrap()
    }

    #[tokio::test]
    async fn article_lifecycle_over_rpc() {
        let client = client().await;

        let created = client
            .create_article(user_id(1), draft(Visibility::Link))
            .await
            .unwrap();
        let token = created.access_token().unwrap().as_str().to_owned();

        let read = client
            .get_article(created.id, Viewer::Anonymous, Some(token))
            .await
            .unwrap();
        assert_eq!(read.article, created);
        assert_eq!(read.author.as_deref(), Some("ada"));

        let updated = client
            .update_article(created.id, user_id(1), draft(Visibility::Public))
            .await
            .unwrap();
        assert!(updated.access_token().is_none());

        let listed = client
            .list_articles(Viewer::Anonymous, Page::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        client.delete_article(created.id, user_id(1)).await.unwrap();
        let gone = client.get_article(created.id, Viewer::Anonymous, None).await;
        assert_eq!(gone, Err(ServiceError::NotFound));
    }

    #[tokio::test]
    async fn refusals_survive_the_wire() {
        let client = client().await;
        let created = client
            .create_article(user_id(1), draft(Visibility::Private))
            .await
            .unwrap();

        let denied = client
            .get_article(created.id, Viewer::User(user_id(2)), None)
            .await;
        assert_eq!(denied, Err(ServiceError::AccessDenied));

        let own = client
            .list_user_articles(user_id(1), Viewer::User(user_id(1)))
            .await
            .unwrap();
        assert_eq!(own.len(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_is_a_validation_failure() {
        let authority = ArticleAuthority::new(
            InMemoryArticleRepository::default(),
            FakeIdentity::new(),
            InMemoryEventBus::new(),
            AuthorityConfig::default(),
        );
        let request = CreateArticleRequest {
            owner_id: user_id(1),
            title: "ab".into(),
            content: "body text long enough".into(),
            visibility: Visibility::Public,
        };

        let result = create_article(State(authority), Json(request)).await;
        assert!(matches!(result, Err(RpcError(ServiceError::ValidationFailed(_)))));
    }
}
