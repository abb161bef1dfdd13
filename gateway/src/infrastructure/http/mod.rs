use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::domain::AppState;
use handlers::articles::{
    create_article, delete_article, get_article, like_article, list_articles, update_article,
};
use handlers::users::{list_user_articles, me};

mod api;
mod auth;
mod handlers;
mod querystring;

/// Public API of the gateway, mounted under `/api`.
pub fn router<S: AppState>(state: S, cors: CorsLayer) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma separated list of origins.
pub fn cors_layer(allow_origin: &str) -> anyhow::Result<CorsLayer> {
    let origins = if allow_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let list = allow_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("invalid CORS origin `{origin}`"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(list)
    };

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

fn api_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/articles", get(list_articles::<S>).post(create_article::<S>))
        .route(
            "/articles/{id}",
            get(get_article::<S>)
                .put(update_article::<S>)
                .delete(delete_article::<S>),
        )
        .route("/articles/{id}/like", post(like_article::<S>))
        .route("/users/{id}/articles", get(list_user_articles::<S>))
        .route("/auth/me", get(me::<S>))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use blog_common::{
        ServiceError, Visibility,
        rpc::{IDENTITY_SERVICE, METRICS_SERVICE},
        test_utils::{FakeContent, FakeIdentity, FakeMetrics, user_id},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::aggregator::Aggregator;
    use crate::infrastructure::AppStateImpl;

    struct Fixture {
        app: Router,
        identity: FakeIdentity,
        content: FakeContent,
        metrics: FakeMetrics,
    }

    fn fixture() -> Fixture {
        let identity = FakeIdentity::new()
            .with_user(1, "ada", "t1")
            .with_user(2, "grace", "t2");
        let content = FakeContent::new().with_author(1, "ada");
        let metrics = FakeMetrics::new();
        let state = AppStateImpl::new(
            Aggregator::new(
                identity.clone(),
                content.clone(),
                metrics.clone(),
                Duration::from_secs(2),
            ),
            "/articles",
        );
        Fixture {
            app: router(state, cors_layer("*").unwrap()),
            identity,
            content,
            metrics,
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn article_body(visibility: &str) -> Value {
        json!({ "title": "Rust notes", "content": "Ownership explained", "visibility": visibility })
    }

    #[tokio::test]
    async fn writes_require_credentials() {
        let f = fixture();

        let (status, body) = send(
            &f.app,
            request(Method::POST, "/api/articles", None, Some(article_body("public"))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["data"]["reason"], json!("unauthorized"));
        assert_eq!(body["data"]["message"], json!("authorization required"));

        let (status, body) = send(
            &f.app,
            request(Method::POST, "/api/articles", Some("forged"), Some(article_body("public"))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["data"]["message"], json!("invalid token"));
        assert_eq!(f.content.calls(FakeContent::CREATE_ARTICLE), 0);
    }

    #[tokio::test]
    async fn bad_credentials_read_as_anonymous() {
        let f = fixture();
        f.content.seed(1, "Open", Visibility::Public);
        f.content.seed(1, "Hidden", Visibility::Private);

        let (status, body) =
            send(&f.app, request(Method::GET, "/api/articles", Some("forged"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|article| article["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Open"]);
    }

    #[tokio::test]
    async fn identity_outage_splits_by_route() {
        let f = fixture();
        let article = f.content.seed(1, "Open", Visibility::Public);
        f.identity.fail(
            FakeIdentity::VALIDATE_TOKEN,
            ServiceError::unavailable(IDENTITY_SERVICE, "connection refused"),
        );

        let uri = format!("/api/articles/{}", article.id);
        let (status, body) = send(&f.app, request(Method::GET, &uri, Some("t1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["viewerLiked"], json!(false));
        assert_eq!(f.metrics.calls(FakeMetrics::GET_USER_LIKE_STATUS), 0);

        let (status, body) = send(
            &f.app,
            request(Method::POST, "/api/articles", Some("t1"), Some(article_body("public"))),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["data"]["reason"], json!("internal"));
        assert_eq!(body["data"]["message"], json!("Internal server error"));
    }

    #[tokio::test]
    async fn single_read_carries_engagement() {
        let f = fixture();
        let article = f.content.seed(1, "Open", Visibility::Public);
        f.metrics.set_views(article.id, 9);
        f.metrics.add_like(article.id, user_id(2));

        let uri = format!("/api/articles/{}", article.id);
        let (status, body) = send(&f.app, request(Method::GET, &uri, Some("t2"), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["author"], json!("ada"));
        assert_eq!(body["views"], json!(9));
        assert_eq!(body["likes"], json!(1));
        assert_eq!(body["viewerLiked"], json!(true));
        assert_eq!(body["visibility"], json!("public"));
    }

    #[tokio::test]
    async fn single_read_survives_metrics_outage() {
        let f = fixture();
        let article = f.content.seed(1, "Open", Visibility::Public);
        f.metrics.set_views(article.id, 9);
        f.metrics.add_like(article.id, user_id(2));
        f.metrics.fail(
            FakeMetrics::GET_ARTICLE_STATS,
            ServiceError::unavailable(METRICS_SERVICE, "connection refused"),
        );
        f.metrics.fail(
            FakeMetrics::GET_USER_LIKE_STATUS,
            ServiceError::unavailable(METRICS_SERVICE, "connection refused"),
        );

        let uri = format!("/api/articles/{}", article.id);
        let (status, body) = send(&f.app, request(Method::GET, &uri, Some("t2"), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], json!("Open"));
        assert_eq!(body["views"], json!(0));
        assert_eq!(body["likes"], json!(0));
        assert_eq!(body["viewerLiked"], json!(false));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_identity_degrades_single_read() {
        let f = fixture();
        let article = f.content.seed(2, "Open", Visibility::Public);
        // Content gives up on the author itself and answers well inside the deadline.
        f.content.stall(FakeContent::GET_ARTICLE, Duration::from_millis(500));
        f.identity.stall(FakeIdentity::GET_USER_BY_ID, Duration::from_secs(30));

        let uri = format!("/api/articles/{}", article.id);
        let (status, body) = send(&f.app, request(Method::GET, &uri, Some("t1"), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], json!("Open"));
        assert_eq!(body["author"], json!(""));
        assert_eq!(f.identity.calls(FakeIdentity::GET_USER_BY_ID), 1);
    }

    #[tokio::test]
    async fn read_refusals_map_to_status() {
        let f = fixture();
        let private = f.content.seed(1, "Hidden", Visibility::Private);

        let uri = format!("/api/articles/{}", private.id);
        let (status, body) = send(&f.app, request(Method::GET, &uri, Some("t2"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["data"]["reason"], json!("access_denied"));

        let (status, _) = send(&f.app, request(Method::GET, "/api/articles/404", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&f.app, request(Method::GET, "/api/articles/first", None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["message"], json!("invalid article id"));
    }

    #[tokio::test]
    async fn link_article_hands_out_share_address() {
        let f = fixture();

        let (status, created) = send(
            &f.app,
            request(Method::POST, "/api/articles", Some("t1"), Some(article_body("link"))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = created["access_token"].as_str().unwrap().to_owned();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(
            created["access_url"],
            json!(format!("/articles/{id}?access_token={token}"))
        );

        let bare = format!("/api/articles/{id}");
        let (status, _) = send(&f.app, request(Method::GET, &bare, None, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let shared = format!("/api/articles/{id}?access_token={token}");
        let (status, body) = send(&f.app, request(Method::GET, &shared, None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], json!("Rust notes"));
    }

    #[tokio::test]
    async fn invalid_bodies_are_bad_requests() {
        let f = fixture();

        let (status, body) = send(
            &f.app,
            request(
                Method::POST,
                "/api/articles",
                Some("t1"),
                Some(json!({ "title": "Hi", "content": "Ownership explained" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["reason"], json!("validation_failed"));

        let (status, _) = send(
            &f.app,
            request(Method::POST, "/api/articles", Some("t1"), Some(json!({ "title": 4 }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(f.content.calls(FakeContent::CREATE_ARTICLE), 0);
    }

    #[tokio::test]
    async fn update_and_delete_respect_ownership() {
        let f = fixture();
        let article = f.content.seed(1, "Mine", Visibility::Public);
        let uri = format!("/api/articles/{}", article.id);

        let (status, _) = send(
            &f.app,
            request(Method::PUT, &uri, Some("t2"), Some(article_body("private"))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &f.app,
            request(Method::PUT, &uri, Some("t1"), Some(article_body("private"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["visibility"], json!("private"));
        assert!(body.get("access_token").is_none());

        let (status, body) = send(&f.app, request(Method::DELETE, &uri, Some("t1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
    }

    #[tokio::test]
    async fn like_needs_explicit_flag() {
        let f = fixture();
        let article = f.content.seed(1, "Open", Visibility::Public);
        let uri = format!("/api/articles/{}/like", article.id);

        let (status, body) =
            send(&f.app, request(Method::POST, &uri, Some("t2"), Some(json!({})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"]["message"], json!("like field required"));

        let (status, body) = send(
            &f.app,
            request(Method::POST, &uri, Some("t2"), Some(json!({ "like": true }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "likes": 1 }));

        f.metrics.fail(
            FakeMetrics::REMOVE_LIKE,
            ServiceError::unavailable(METRICS_SERVICE, "connection refused"),
        );
        let (status, _) = send(
            &f.app,
            request(Method::POST, &uri, Some("t2"), Some(json!({ "like": false }))),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn listing_degrades_without_metrics() {
        let f = fixture();
        let article = f.content.seed(1, "Open", Visibility::Public);
        f.metrics.set_views(article.id, 3);
        f.metrics.fail(
            FakeMetrics::GET_BULK_STATS,
            ServiceError::timeout(METRICS_SERVICE),
        );

        let (status, body) = send(
            &f.app,
            request(Method::GET, "/api/articles?limit=10&offset=0", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["views"], json!(0));
        assert_eq!(body[0]["likes"], json!(0));
        assert_eq!(body[0]["author"], json!("ada"));

        let (status, _) =
            send(&f.app, request(Method::GET, "/api/articles?limit=many", None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_listing_and_current_user() {
        let f = fixture();
        f.content.seed(1, "Open", Visibility::Public);
        f.content.seed(1, "Draft", Visibility::Private);

        let (_, anonymous) =
            send(&f.app, request(Method::GET, "/api/users/1/articles", None, None)).await;
        assert_eq!(anonymous.as_array().unwrap().len(), 1);

        let (_, owner) =
            send(&f.app, request(Method::GET, "/api/users/1/articles", Some("t1"), None)).await;
        assert_eq!(owner.as_array().unwrap().len(), 2);

        let (status, me) = send(&f.app, request(Method::GET, "/api/auth/me", Some("t1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], json!(1));
        assert_eq!(me["username"], json!("ada"));
        assert_eq!(f.identity.calls(FakeIdentity::GET_USER_BY_ID), 1);
    }

    #[tokio::test]
    async fn cors_headers_are_attached() {
        let f = fixture();
        let mut request = request(Method::GET, "/api/articles", None, None);
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"));

        let response = f.app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("*"))
        );
        assert!(cors_layer("https://blog.example, https://admin.example").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }
}
