use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::de::DeserializeOwned;
use serde_querystring::ParseMode;

use crate::infrastructure::http::api::ApiError;

/// Query string extractor that answers malformed input with the API error
/// body instead of a plain-text rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryString<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryString<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        serde_querystring::from_str(query, ParseMode::UrlEncoded)
            .map(QueryString)
            .map_err(|error| ApiError::BadRequest(format!("invalid query string: {error}")))
    }
}

impl<T> Deref for QueryString<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Window {
        limit: Option<i64>,
        offset: Option<i64>,
    }

    async fn extract(uri: &str) -> Result<Window, ApiError> {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        QueryString::<Window>::from_request_parts(&mut parts, &())
            .await
            .map(|QueryString(window)| window)
    }

    #[tokio::test]
    async fn numbers_and_absent_keys() {
        assert_eq!(
            extract("/api/articles?limit=5&offset=10").await.unwrap(),
            Window {
                limit: Some(5),
                offset: Some(10)
            }
        );
        assert_eq!(
            extract("/api/articles").await.unwrap(),
            Window {
                limit: None,
                offset: None
            }
        );
    }

    #[tokio::test]
    async fn garbage_is_a_bad_request() {
        let result = extract("/api/articles?limit=lots").await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
