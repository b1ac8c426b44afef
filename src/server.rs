//! HTTP API server.
//!
//! Exposes the SkillBucket store as a JSON API. Route handlers only
//! translate between HTTP and [`Store`] calls; every invariant lives in the
//! store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness probe |
//! | `GET`/`POST` | `/frameworks` | List / create frameworks |
//! | `GET`/`PUT`/`DELETE` | `/frameworks/{id}` | Fetch / update / delete (cascades) |
//! | `GET`/`POST` | `/frameworks/{id}/documents` | List / register documents |
//! | `GET` | `/frameworks/{id}/chunks` | Filtered chunk list, or keyword search with `q` |
//! | `GET`/`DELETE` | `/documents/{id}` | Fetch / delete (cascades to chunks) |
//! | `POST` | `/documents/{id}/chunks` | Bulk insert chunks, all or nothing |
//! | `GET`/`DELETE` | `/chunks/{id}` | Fetch / delete |
//! | `PATCH` | `/chunks/{id}` | Fill in summary, skill or embedding fields |
//! | `GET`/`POST` | `/activities` | List (newest first) / create |
//! | `GET`/`DELETE` | `/activities/{id}` | Fetch / delete (cascades to evidence) |
//! | `GET` | `/activities/{id}/evidence` | Evidence recorded for an activity |
//! | `POST` | `/evidence` | Record evidence |
//! | `GET`/`DELETE` | `/evidence/{id}` | Fetch / delete |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "conflict", "message": "duplicate vector_id: v-1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `invalid_reference` (422), `validation` (422), `internal` (500).

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use skillbucket_core::models::{
    ChunkAnnotation, ChunkFilter, EvidenceFilter, NewActivity, NewActivityEvidence, NewFramework,
    NewFrameworkDocument, NewKnowledgeChunk,
};
use skillbucket_core::store::Store;
use skillbucket_core::StoreError;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Default number of hits for `GET /frameworks/{id}/chunks?q=`.
const DEFAULT_SEARCH_LIMIT: i64 = 20;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

/// Build the API router over any store backend.
pub fn build_router(store: Arc<dyn Store>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/frameworks",
            get(list_frameworks).post(create_framework),
        )
        .route(
            "/frameworks/{id}",
            get(get_framework).put(update_framework).delete(delete_framework),
        )
        .route(
            "/frameworks/{id}/documents",
            get(list_documents).post(create_document),
        )
        .route("/frameworks/{id}/chunks", get(list_chunks))
        .route("/documents/{id}", get(get_document).delete(delete_document))
        .route("/documents/{id}/chunks", post(insert_chunks))
        .route(
            "/chunks/{id}",
            get(get_chunk).patch(annotate_chunk).delete(delete_chunk),
        )
        .route("/activities", get(list_activities).post(create_activity))
        .route(
            "/activities/{id}",
            get(get_activity).delete(delete_activity),
        )
        .route("/activities/{id}/evidence", get(list_activity_evidence))
        .route("/evidence", post(record_evidence))
        .route("/evidence/{id}", get(get_evidence).delete(delete_evidence))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { store })
}

/// Open the configured database and serve the API on `[server].bind` until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::open(config).await?;
    let app = build_router(Arc::new(store));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "SkillBucket API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Error type that converts into a JSON HTTP response.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let (status, code) = match &err {
            StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "conflict"),
            StoreError::InvalidReference { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_reference")
            }
            StoreError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            StoreError::Backend { .. } => {
                tracing::error!(error = %err, "store backend failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(entity: &'static str, id: Uuid) -> AppError {
    StoreError::not_found(entity, id).into()
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| bad_request(format!("invalid id: {}", raw)))
}

fn deleted(found: bool, entity: &'static str, id: Uuid) -> Result<StatusCode, AppError> {
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(entity, id))
    }
}

type ApiResult<T> = Result<T, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "I'm fine" })
}

// ============ Frameworks ============

async fn list_frameworks(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.list_frameworks().await?))
}

async fn create_framework(
    State(state): State<AppState>,
    body: Result<Json<NewFramework>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let framework = state.store.create_framework(&body).await?;
    tracing::info!(framework_id = %framework.id, name = %framework.name, "framework created");
    Ok((StatusCode::CREATED, Json(framework)))
}

async fn get_framework(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let framework = state
        .store
        .get_framework(id)
        .await?
        .ok_or_else(|| not_found("framework", id))?;
    Ok(Json(framework))
}

async fn update_framework(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NewFramework>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let id = parse_id(&id)?;
    Ok(Json(state.store.update_framework(id, &body).await?))
}

async fn delete_framework(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    deleted(state.store.delete_framework(id).await?, "framework", id)
}

// ============ Documents ============

async fn require_framework(state: &AppState, id: Uuid) -> ApiResult<()> {
    match state.store.get_framework(id).await? {
        Some(_) => Ok(()),
        None => Err(not_found("framework", id)),
    }
}

async fn list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    require_framework(&state, id).await?;
    Ok(Json(state.store.list_documents(id).await?))
}

async fn create_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NewFrameworkDocument>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(mut body) = body?;
    let id = parse_id(&id)?;
    require_framework(&state, id).await?;
    body.framework_id = id;
    let document = state.store.create_document(&body).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let document = state
        .store
        .get_document(id)
        .await?
        .ok_or_else(|| not_found("framework document", id))?;
    Ok(Json(document))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    deleted(
        state.store.delete_document(id).await?,
        "framework document",
        id,
    )
}

// ============ Chunks ============

#[derive(Deserialize)]
struct InsertChunksBody {
    chunks: Vec<NewKnowledgeChunk>,
}

async fn insert_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<InsertChunksBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let id = parse_id(&id)?;
    let document = state
        .store
        .get_document(id)
        .await?
        .ok_or_else(|| not_found("framework document", id))?;

    let chunks: Vec<NewKnowledgeChunk> = body
        .chunks
        .into_iter()
        .map(|mut c| {
            c.framework_id = document.framework_id;
            c.framework_document_id = document.id;
            c
        })
        .collect();
    let created = state.store.insert_chunks(&chunks).await?;
    tracing::info!(document_id = %document.id, count = created.len(), "chunks inserted");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
struct ChunkQuery {
    skill_code: Option<String>,
    level: Option<String>,
    document_id: Option<Uuid>,
    /// Keyword query; switches the response to ranked hits.
    q: Option<String>,
    limit: Option<i64>,
}

async fn list_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ChunkQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let id = parse_id(&id)?;
    require_framework(&state, id).await?;

    let filter = ChunkFilter {
        framework_id: Some(id),
        framework_document_id: query.document_id,
        skill_code: query.skill_code,
        level: query.level,
        limit: query.limit,
    };

    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        let filter = ChunkFilter {
            limit: Some(filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)),
            ..filter
        };
        let hits = state.store.search_chunks_matching(q, &filter).await?;
        return Ok(Json(hits).into_response());
    }

    Ok(Json(state.store.list_chunks(&filter).await?).into_response())
}

async fn get_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let chunk = state
        .store
        .get_chunk(id)
        .await?
        .ok_or_else(|| not_found("knowledge chunk", id))?;
    Ok(Json(chunk))
}

async fn annotate_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ChunkAnnotation>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let id = parse_id(&id)?;
    Ok(Json(state.store.annotate_chunk(id, &body).await?))
}

async fn delete_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    deleted(state.store.delete_chunk(id).await?, "knowledge chunk", id)
}

// ============ Activities ============

async fn list_activities(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.list_activities().await?))
}

async fn create_activity(
    State(state): State<AppState>,
    body: Result<Json<NewActivity>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let activity = state.store.create_activity(&body).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}

async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let activity = state
        .store
        .get_activity(id)
        .await?
        .ok_or_else(|| not_found("activity", id))?;
    Ok(Json(activity))
}

async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    deleted(state.store.delete_activity(id).await?, "activity", id)
}

async fn list_activity_evidence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    if state.store.get_activity(id).await?.is_none() {
        return Err(not_found("activity", id));
    }
    let filter = EvidenceFilter {
        activity_id: Some(id),
        ..Default::default()
    };
    Ok(Json(state.store.list_evidence(&filter).await?))
}

// ============ Evidence ============

async fn record_evidence(
    State(state): State<AppState>,
    body: Result<Json<NewActivityEvidence>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let evidence = state.store.record_evidence(&body).await?;
    tracing::info!(
        evidence_id = %evidence.id,
        activity_id = %evidence.activity_id,
        skill = %evidence.skill_name,
        "evidence recorded"
    );
    Ok((StatusCode::CREATED, Json(evidence)))
}

async fn get_evidence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let evidence = state
        .store
        .get_evidence(id)
        .await?
        .ok_or_else(|| not_found("activity evidence", id))?;
    Ok(Json(evidence))
}

async fn delete_evidence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    deleted(
        state.store.delete_evidence(id).await?,
        "activity evidence",
        id,
    )
}
