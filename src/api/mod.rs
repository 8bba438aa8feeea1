//! HTTP boundary
//!
//! Every failure is answered with an `{ error, message }` body and the
//! status of the underlying [`DeployError`]; rate-limit rejections also carry
//! `Retry-After`.

use crate::deploy::{DeploymentRecord, DeploymentRequest, DeploymentService, Submitted};
use crate::error::{DeployError, ValidationError};
use crate::provision::CallerIdentity;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub const SESSION_HEADER: &str = "x-session-id";

pub type AppState = Arc<DeploymentService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/deployments", post(create_deployment))
        .route("/api/deployments/{id}", get(get_deployment))
        .route("/api/stacks", get(list_stacks))
        .route("/api/credentials", get(check_credentials))
        .with_state(service)
}

/// Serves the API on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    service: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "API listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

/// [`DeployError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub DeployError);

impl<E> From<E> for ApiError
where
    E: Into<DeployError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        let mut response = (status, Json(self.0.to_body())).into_response();
        if let Some(secs) = self.0.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[derive(Debug, Default, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StacksResponse {
    pub available: BTreeSet<String>,
    pub failures: BTreeMap<String, String>,
}

/// Header first, then the body, then the query string
fn session_from<'a>(
    headers: &'a HeaderMap,
    body: Option<&'a str>,
    query: &'a SessionQuery,
) -> Option<&'a str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(body)
        .or(query.session_id.as_deref())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

async fn create_session(State(service): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let id = service.create_session();
    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: id.to_string(),
        }),
    )
}

async fn create_deployment(
    State(service): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    body: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Submitted>), ApiError> {
    let Json(mut request) =
        body.map_err(|rejection| ValidationError::InvalidRequestBody(rejection.body_text()))?;
    request.session_id = session_from(&headers, request.session_id.as_deref(), &query).map(String::from);

    let submitted = service.submit(request)?;
    Ok((StatusCode::ACCEPTED, Json(submitted)))
}

async fn get_deployment(
    State(service): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Result<Json<DeploymentRecord>, ApiError> {
    let record = service.status(&id, session_from(&headers, None, &query))?;
    Ok(Json(record))
}

async fn list_stacks(State(service): State<AppState>) -> Json<StacksResponse> {
    let registry = service.registry();
    Json(StacksResponse {
        available: registry.list_available(),
        failures: registry.load_failures(),
    })
}

async fn check_credentials(State(service): State<AppState>) -> Result<Json<CallerIdentity>, ApiError> {
    let identity = service.provisioner().validate_credentials().await?;
    Ok(Json(identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FixedAnalyzer;
    use crate::error::ErrorBody;
    use crate::session::{GuardConfig, InMemorySessionStore, SessionGuard};
    use crate::source::LocalFetcher;
    use crate::stack::StackId;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(work: &TempDir, rate_limit: usize) -> (AppState, Router) {
        let guard = SessionGuard::new(
            Arc::new(InMemorySessionStore::new()),
            GuardConfig {
                rate_limit_per_minute: rate_limit,
                ..GuardConfig::default()
            },
        );
        let service = Arc::new(
            DeploymentService::builder(work.path())
                .guard(guard)
                .fetcher(Arc::new(LocalFetcher::new(work.path().join("empty"))))
                .analyzer(Arc::new(FixedAnalyzer::stack(StackId::Static)))
                .build(),
        );
        (Arc::clone(&service), router(service))
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn deploy_request(session: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/api/deployments").header(header::CONTENT_TYPE, "application/json");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    const BODY: &str = r#"{"repositoryUrl":"https://github.com/acme/site","projectName":"acme-site"}"#;

    #[tokio::test]
    async fn test_health() {
        let work = TempDir::new().unwrap();
        let (_, app) = app(&work, 60);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthResponse = json(response).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, crate::VERSION);
    }

    #[tokio::test]
    async fn test_create_session_returns_valid_id() {
        let work = TempDir::new().unwrap();
        let (_, app) = app(&work, 60);
        let response = app
            .oneshot(Request::post("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: SessionCreated = json(response).await;
        assert!(crate::session::SessionId::parse(&body.session_id).is_ok());
    }

    #[tokio::test]
    async fn test_missing_session_is_400() {
        let work = TempDir::new().unwrap();
        let (_, app) = app(&work, 60);
        let response = app.oneshot(deploy_request(None, BODY)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.error, "validation-error");
        assert!(body.message.contains("session"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let work = TempDir::new().unwrap();
        let (service, app) = app(&work, 60);
        let session = service.create_session();
        let response = app
            .oneshot(deploy_request(Some(session.as_str()), "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json(response).await;
        assert!(body.message.starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_accepted_then_polled_by_owner_only() {
        let work = TempDir::new().unwrap();
        let (service, app) = app(&work, 60);
        let owner = service.create_session();
        let stranger = service.create_session();

        let response = app
            .clone()
            .oneshot(deploy_request(Some(owner.as_str()), BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let submitted: serde_json::Value = json(response).await;
        let id = submitted["deploymentId"].as_str().unwrap().to_string();
        assert_eq!(submitted["status"], "pending");

        let poll = |session: String| {
            Request::get(format!("/api/deployments/{}?sessionId={}", id, session))
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(poll(owner.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: serde_json::Value = json(response).await;
        assert_eq!(record["projectName"], "acme-site");

        let response = app.oneshot(poll(stranger.to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_in_body_is_accepted() {
        let work = TempDir::new().unwrap();
        let (service, app) = app(&work, 60);
        let session = service.create_session();
        let body = format!(
            r#"{{"repositoryUrl":"https://github.com/acme/site","sessionId":"{}"}}"#,
            session
        );
        let response = app.oneshot(deploy_request(None, &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_rate_limit_sets_retry_after() {
        let work = TempDir::new().unwrap();
        let (service, app) = app(&work, 1);
        let session = service.create_session();

        let first = app
            .clone()
            .oneshot(deploy_request(Some(session.as_str()), BODY))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::ACCEPTED);

        let second = app
            .oneshot(deploy_request(Some(session.as_str()), BODY))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
        let body: ErrorBody = json(second).await;
        assert_eq!(body.error, "rate-limit-error");
    }

    #[tokio::test]
    async fn test_stacks_and_credentials() {
        let work = TempDir::new().unwrap();
        let (_, app) = app(&work, 60);

        let response = app
            .clone()
            .oneshot(Request::get("/api/stacks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stacks: StacksResponse = json(response).await;
        assert!(stacks.available.contains("static"));

        let response = app
            .oneshot(Request::get("/api/credentials").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
