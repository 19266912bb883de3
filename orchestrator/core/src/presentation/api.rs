// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP API
//!
//! axum router over the orchestrator and the source registry. Tenants are
//! addressed by namespace in the path. Authentication happens upstream.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::application::{ErrorKind, SourceRegistry, WorkloadError, WorkloadOrchestrator};
use crate::domain::cluster::Provisioned;
use crate::domain::source::SourceId;
use crate::domain::workload::{CreateWorkloadRequest, WorkloadUpdate, KEEP_REPLICAS};

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<dyn WorkloadOrchestrator>,
    pub registry: Arc<dyn SourceRegistry>,
    pub start_time: Instant,
}

pub fn app(orchestrator: Arc<dyn WorkloadOrchestrator>, registry: Arc<dyn SourceRegistry>) -> Router {
    let state = Arc::new(AppState {
        orchestrator,
        registry,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/tenants/{namespace}",
            put(create_namespace_handler).get(provision_tenant_handler),
        )
        .route("/api/tenants/{namespace}/events", get(recent_events_handler))
        .route(
            "/api/tenants/{namespace}/workloads",
            post(create_workload_handler).get(list_workloads_handler),
        )
        .route(
            "/api/tenants/{namespace}/workloads/{name}",
            get(get_workload_handler)
                .patch(update_workload_handler)
                .delete(delete_workload_handler),
        )
        .route(
            "/api/tenants/{namespace}/sources",
            post(create_source_handler).get(describe_sources_handler),
        )
        .route(
            "/api/tenants/{namespace}/sources/{id}/reconcile",
            post(reconcile_source_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

pub struct ApiError(pub WorkloadError);

impl From<WorkloadError> for ApiError {
    fn from(err: WorkloadError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::ReferenceNotFound => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::NoAddressAvailable => StatusCode::CONFLICT,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let body = json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "step": err.failed_step(),
            "rollback": err.rollback(),
            "retry_safe": err.retry_safe(),
        });
        (status_for(err.kind()), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Extractors
// ============================================================================

// Rejections surface as `InvalidRequest` in the JSON error shape.

pub struct ApiJson<T>(pub T);

pub struct ApiPath<T>(pub T);

pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(WorkloadError::InvalidRequest(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(WorkloadError::InvalidRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(WorkloadError::InvalidRequest(rejection.body_text()))
    }
}

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWorkloadBody {
    pub name: String,
    pub image: String,
    pub replicas: i32,
    pub container_port: i32,
    pub source_id: SourceId,
}

/// Omitted fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateWorkloadBody {
    pub image: Option<String>,
    pub replicas: Option<i32>,
}

impl From<UpdateWorkloadBody> for WorkloadUpdate {
    fn from(body: UpdateWorkloadBody) -> Self {
        WorkloadUpdate {
            image: body.image.unwrap_or_default(),
            replicas: body.replicas.unwrap_or(KEEP_REPLICAS),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSourceBody {
    pub url: String,
    pub registry_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DescribeQuery {
    #[serde(default)]
    pub reconcile: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn create_namespace_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.orchestrator.create_namespace(&namespace).await?;
    let status = match outcome {
        Provisioned::Created => StatusCode::CREATED,
        Provisioned::Existing => StatusCode::OK,
    };
    Ok((
        status,
        Json(json!({
            "namespace": namespace,
            "created": outcome == Provisioned::Created,
        })),
    ))
}

async fn provision_tenant_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    let summary = state.orchestrator.provision_tenant(&namespace).await?;
    Ok(Json(summary))
}

async fn recent_events_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
    ApiQuery(query): ApiQuery<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    let top_k = query.top_k.unwrap_or(DEFAULT_TOP_K);
    let events = state.orchestrator.recent_events(&namespace, top_k).await?;
    Ok(Json(json!({ "events": events })))
}

async fn create_workload_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
    ApiJson(body): ApiJson<CreateWorkloadBody>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .orchestrator
        .create_workload(CreateWorkloadRequest {
            name: body.name,
            namespace,
            image: body.image,
            replicas: body.replicas,
            container_port: body.container_port,
            source_id: body.source_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_workloads_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    let workloads = state.orchestrator.list_workloads(&namespace).await?;
    Ok(Json(workloads))
}

async fn get_workload_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((namespace, name)): ApiPath<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let details = state.orchestrator.get_workload(&namespace, &name).await?;
    Ok(Json(details))
}

async fn update_workload_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((namespace, name)): ApiPath<(String, String)>,
    ApiJson(body): ApiJson<UpdateWorkloadBody>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .update_workload(&namespace, &name, body.into())
        .await?;
    Ok(Json(outcome))
}

async fn delete_workload_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((namespace, name)): ApiPath<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state.orchestrator.delete_workload(&namespace, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_source_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
    ApiJson(body): ApiJson<CreateSourceBody>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .registry
        .create_source(&namespace, &body.url, body.registry_url)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn describe_sources_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(namespace): ApiPath<String>,
    ApiQuery(query): ApiQuery<DescribeQuery>,
) -> ApiResult<impl IntoResponse> {
    let overviews = state.registry.describe_sources(&namespace, query.reconcile).await?;
    Ok(Json(overviews))
}

async fn reconcile_source_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((namespace, id)): ApiPath<(String, SourceId)>,
) -> ApiResult<impl IntoResponse> {
    state.registry.get_tenant_source(&namespace, id).await?;
    let record = state.registry.reconcile_source(id).await?;
    Ok(Json(record))
}
