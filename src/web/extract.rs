//! Extractors whose rejections use the same JSON error body as the handlers

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::LiftClubError;

/// [`Json`] body, rejected as `ValidationFailed`
pub struct ApiJson<T>(pub T);

/// [`Path`] parameters, rejected as `ValidationFailed`
pub struct ApiPath<T>(pub T);

/// [`Query`] string, rejected as `ValidationFailed`
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for LiftClubError {
    fn from(rejection: JsonRejection) -> Self {
        LiftClubError::ValidationFailed {
            errors: vec![rejection.body_text()],
        }
    }
}

impl From<PathRejection> for LiftClubError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(inner) => {
                LiftClubError::ValidationFailed {
                    errors: vec![inner.body_text()],
                }
            }
            // Route and handler disagree on the parameters
            other => LiftClubError::Internal {
                message: other.body_text(),
            },
        }
    }
}

impl From<QueryRejection> for LiftClubError {
    fn from(rejection: QueryRejection) -> Self {
        LiftClubError::ValidationFailed {
            errors: vec![rejection.body_text()],
        }
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = LiftClubError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = LiftClubError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = LiftClubError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{self, header, StatusCode},
        response::IntoResponse,
    };
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Join {
        member_id: String,
    }

    #[derive(Debug, Deserialize)]
    struct Paging {
        #[allow(dead_code)]
        page: u32,
    }

    fn json_request(body: &'static str) -> Request {
        http::Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_bad_json_uses_error_body() {
        let err = ApiJson::<Join>::from_request(json_request(r#"{"memberId": 5}"#), &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LiftClubError::ValidationFailed { .. }));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "ValidationFailed");
        assert_eq!(body["retryable"], false);
        assert!(body["errors"][0].as_str().unwrap().contains("memberId"));
    }

    #[tokio::test]
    async fn test_missing_content_type_is_validation_error() {
        let request = http::Request::builder()
            .method("POST")
            .body(Body::from(r#"{"memberId": "rider-1"}"#))
            .unwrap();
        let err = ApiJson::<Join>::from_request(request, &()).await.err().unwrap();
        assert!(matches!(err, LiftClubError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn test_valid_json_passes_through() {
        let request = json_request(r#"{"memberId": "rider-1"}"#);
        let ApiJson(join) = ApiJson::<Join>::from_request(request, &()).await.unwrap();
        assert_eq!(join.member_id, "rider-1");
    }

    #[tokio::test]
    async fn test_bad_query_is_validation_error() {
        let (mut parts, _) = http::Request::builder()
            .uri("/api/clubs?page=two")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let err = ApiQuery::<Paging>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unrouted_path_is_internal() {
        let (mut parts, _) = http::Request::builder()
            .uri("/api/clubs/abc")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        let err = ApiPath::<Uuid>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LiftClubError::Internal { .. }));
    }
}
