//! JSON HTTP interface to the timeline.
//!
//! Thin handlers over the engine: every route parses a request, runs the
//! synchronous engine work on a blocking thread, and translates the
//! outcome into a status code and a JSON body. Validation failures come
//! back as 422 with the full list of user-facing messages so a client can
//! show them inline; unknown identities are 404, stale edits 409, and
//! malformed dates 400.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::batch::{BatchReport, JobId, JobKind, JobRunner};
use crate::chronology::{Elapsed, PartialDate};
use crate::error::LifespanError;
use crate::search::{search, SearchQuery};
use crate::story::{reflect, story};
use crate::timeline::{
    AccessLevel, Connection, ConnectionEdit, ConnectionType, Database, Span, SpanEdit, SpanState,
    SpanType, TemporalConstraint,
};
use crate::validity::Direction;

// ------------- State -------------

/// Shared state handed to every handler: the engine plus the repair job
/// registry that runs against it.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    jobs: Arc<JobRunner>,
}

impl AppState {
    pub fn new(db: Arc<Database>) -> Self {
        let jobs = Arc::new(JobRunner::new(Arc::clone(&db)));
        Self { db, jobs }
    }
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }
}

// ------------- Error replies -------------

type Reply = (StatusCode, Json<ErrorBody>);

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<String>>,
}

fn reply_for(error: LifespanError) -> Reply {
    let (status, violations) = match &error {
        LifespanError::Validation(violations) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(violations.iter().map(|v| v.to_string()).collect()),
        ),
        LifespanError::NotFound { .. } => (StatusCode::NOT_FOUND, None),
        LifespanError::VersionConflict { .. } => (StatusCode::CONFLICT, None),
        LifespanError::Parse { .. } => (StatusCode::BAD_REQUEST, None),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };
    let message = error.to_string();
    warn!(%message, code = %status.as_u16(), "request failed");
    (
        status,
        Json(ErrorBody {
            error: message,
            violations,
        }),
    )
}

// The engine is synchronous, so every handler pushes its work off the
// async runtime.
async fn blocking<T, F>(work: F) -> Result<T, Reply>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(outcome) => outcome.map_err(reply_for),
        Err(e) => {
            warn!(error = %e, "join error");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: String::from("join error"),
                    violations: None,
                }),
            ))
        }
    }
}

// ------------- Bodies -------------

#[derive(Serialize)]
pub struct SpanBody {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub span_type: SpanType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<PartialDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<PartialDate>,
    pub state: SpanState,
    pub access: AccessLevel,
    pub version: u64,
}

impl From<&Span> for SpanBody {
    fn from(span: &Span) -> Self {
        Self {
            id: span.id(),
            name: span.name().to_owned(),
            slug: span.slug().map(str::to_owned),
            span_type: span.span_type(),
            start: span.start(),
            end: span.end(),
            state: span.state(),
            access: span.access(),
            version: span.version(),
        }
    }
}

#[derive(Serialize)]
pub struct ConnectionBody {
    pub id: u64,
    pub connection_type: String,
    pub subject: u64,
    pub object: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<PartialDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<PartialDate>,
    pub state: SpanState,
}

fn connection_body(
    connection: &Connection,
    start: Option<PartialDate>,
    end: Option<PartialDate>,
) -> ConnectionBody {
    ConnectionBody {
        id: connection.id(),
        connection_type: connection.connection_type().name().to_owned(),
        subject: connection.subject(),
        object: connection.object(),
        start,
        end,
        state: connection.state(),
    }
}

#[derive(Serialize)]
pub struct ConnectionTypeBody {
    pub name: String,
    pub forward_predicate: String,
    pub inverse_predicate: String,
    pub constraint: TemporalConstraint,
    pub subject_types: Vec<SpanType>,
    pub object_types: Vec<SpanType>,
    pub reserved: bool,
}

impl From<&ConnectionType> for ConnectionTypeBody {
    fn from(connection_type: &ConnectionType) -> Self {
        Self {
            name: connection_type.name().to_owned(),
            forward_predicate: connection_type.forward_predicate().to_owned(),
            inverse_predicate: connection_type.inverse_predicate().to_owned(),
            constraint: connection_type.constraint(),
            subject_types: connection_type.allowed_subject_types().to_vec(),
            object_types: connection_type.allowed_object_types().to_vec(),
            reserved: connection_type.reserved(),
        }
    }
}

// ------------- Search -------------

#[derive(Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub types: Vec<SpanType>,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub include_placeholders: Option<bool>,
    #[serde(default)]
    pub include_private: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchRequest {
    fn into_query(self) -> SearchQuery {
        let defaults = SearchQuery::default();
        SearchQuery {
            text: self.text,
            types: self.types,
            connection_type: self.connection_type,
            direction: self.direction.unwrap_or(defaults.direction),
            include_placeholders: self
                .include_placeholders
                .unwrap_or(defaults.include_placeholders),
            include_private: self.include_private.unwrap_or(defaults.include_private),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub spans: Vec<SpanBody>,
    pub count: usize,
    pub limited: bool,
}

async fn search_spans(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, Reply> {
    let db = state.database();
    let query = request.into_query();
    let outcome = blocking(move || search(&db, &query)).await?;
    let spans: Vec<SpanBody> = outcome
        .spans
        .iter()
        .map(|span| SpanBody::from(span.as_ref()))
        .collect();
    info!(count = spans.len(), limited = outcome.limited, "span search complete");
    Ok(Json(SearchResponse {
        count: spans.len(),
        limited: outcome.limited,
        spans,
    }))
}

// ------------- Spans -------------

#[derive(Deserialize)]
pub struct CreateSpanRequest {
    pub name: String,
    #[serde(default = "default_span_type")]
    pub span_type: SpanType,
    #[serde(default)]
    pub start: Option<PartialDate>,
    #[serde(default)]
    pub end: Option<PartialDate>,
    #[serde(default = "default_span_state")]
    pub state: SpanState,
    #[serde(default = "default_access")]
    pub access: AccessLevel,
}

// A bare name records a private placeholder thing.
fn default_span_type() -> SpanType {
    SpanType::Thing
}
fn default_span_state() -> SpanState {
    SpanState::Placeholder
}
fn default_access() -> AccessLevel {
    AccessLevel::Private
}

async fn create_span(
    State(state): State<AppState>,
    Json(request): Json<CreateSpanRequest>,
) -> Result<(StatusCode, Json<SpanBody>), Reply> {
    let db = state.database();
    let span = blocking(move || {
        db.create_span(
            request.name,
            request.span_type,
            request.start,
            request.end,
            request.state,
            request.access,
        )
    })
    .await?;
    info!(id = span.id(), "span created");
    Ok((StatusCode::CREATED, Json(SpanBody::from(span.as_ref()))))
}

// Numeric keys resolve by identity, anything else by slug.
async fn get_span(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SpanBody>, Reply> {
    let db = state.database();
    let span = blocking(move || match key.parse::<u64>() {
        Ok(id) => db.get_span(id),
        Err(_) => db.span_by_slug(&key),
    })
    .await?;
    Ok(Json(SpanBody::from(span.as_ref())))
}

async fn update_span(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(edit): Json<SpanEdit>,
) -> Result<Json<SpanBody>, Reply> {
    let db = state.database();
    let span = blocking(move || db.update_span(id, edit)).await?;
    info!(id, version = span.version(), "span revised");
    Ok(Json(SpanBody::from(span.as_ref())))
}

async fn delete_span(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Reply> {
    let db = state.database();
    blocking(move || db.delete_span(id)).await?;
    info!(id, "span deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn span_connections(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<ConnectionBody>>, Reply> {
    let db = state.database();
    let bodies = blocking(move || {
        db.get_span(id)?;
        let connections = db.connections_for(id);
        let mut bodies = Vec::with_capacity(connections.len());
        for connection in connections {
            let (start, end) = db.connection_extent(&connection)?;
            bodies.push(connection_body(&connection, start, end));
        }
        Ok(bodies)
    })
    .await?;
    Ok(Json(bodies))
}

// ------------- Stories -------------

#[derive(Deserialize)]
pub struct StoryParams {
    pub until: Option<PartialDate>,
}

#[derive(Serialize)]
pub struct StoryResponse {
    pub span: u64,
    pub sentences: Vec<String>,
}

async fn span_story(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<StoryParams>,
) -> Result<Json<StoryResponse>, Reply> {
    let db = state.database();
    let cutoff = params.until.map(|date| date.latest());
    let told = blocking(move || story(&db, id, cutoff)).await?;
    Ok(Json(StoryResponse {
        span: told.span,
        sentences: told.sentences,
    }))
}

#[derive(Serialize)]
pub struct ReflectionBody {
    pub subject: u64,
    pub counterpart: u64,
    pub as_of: String,
    pub age: Elapsed,
    pub sentences: Vec<String>,
}

async fn reflection(
    State(state): State<AppState>,
    Path((subject, counterpart)): Path<(u64, u64)>,
) -> Result<Json<ReflectionBody>, Reply> {
    let db = state.database();
    let today = Utc::now().date_naive();
    let reflection = blocking(move || reflect(&db, subject, counterpart, today)).await?;
    Ok(Json(ReflectionBody {
        subject: reflection.subject,
        counterpart: reflection.counterpart,
        as_of: reflection.as_of.to_string(),
        age: reflection.age,
        sentences: reflection.story.sentences,
    }))
}

// ------------- Connections -------------

#[derive(Deserialize)]
pub struct CreateConnectionRequest {
    pub connection_type: String,
    pub subject: u64,
    pub object: u64,
    #[serde(default)]
    pub start: Option<PartialDate>,
    #[serde(default)]
    pub end: Option<PartialDate>,
    #[serde(default = "default_connection_state")]
    pub state: SpanState,
}

fn default_connection_state() -> SpanState {
    SpanState::Draft
}

async fn create_connection(
    State(state): State<AppState>,
    Json(request): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionBody>), Reply> {
    let db = state.database();
    let body = blocking(move || {
        let connection = db.create_connection(
            &request.connection_type,
            request.subject,
            request.object,
            request.start,
            request.end,
            request.state,
        )?;
        let (start, end) = db.connection_extent(&connection)?;
        Ok(connection_body(&connection, start, end))
    })
    .await?;
    info!(id = body.id, "connection created");
    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ConnectionBody>, Reply> {
    let db = state.database();
    let body = blocking(move || {
        let connection = db.get_connection(id)?;
        let (start, end) = db.connection_extent(&connection)?;
        Ok(connection_body(&connection, start, end))
    })
    .await?;
    Ok(Json(body))
}

async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(edit): Json<ConnectionEdit>,
) -> Result<Json<ConnectionBody>, Reply> {
    let db = state.database();
    let body = blocking(move || {
        let connection = db.update_connection(id, edit)?;
        let (start, end) = db.connection_extent(&connection)?;
        Ok(connection_body(&connection, start, end))
    })
    .await?;
    info!(id, "connection revised");
    Ok(Json(body))
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, Reply> {
    let db = state.database();
    blocking(move || db.delete_connection(id)).await?;
    info!(id, "connection deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ------------- Connection types -------------

#[derive(Deserialize)]
pub struct CreateConnectionTypeRequest {
    pub name: String,
    pub forward_predicate: String,
    pub inverse_predicate: String,
    pub constraint: TemporalConstraint,
    pub subject_types: Vec<SpanType>,
    pub object_types: Vec<SpanType>,
}

async fn list_connection_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionTypeBody>>, Reply> {
    let db = state.database();
    let bodies = blocking(move || {
        Ok(db
            .connection_types()
            .iter()
            .map(|connection_type| ConnectionTypeBody::from(connection_type.as_ref()))
            .collect::<Vec<ConnectionTypeBody>>())
    })
    .await?;
    Ok(Json(bodies))
}

async fn create_connection_type(
    State(state): State<AppState>,
    Json(request): Json<CreateConnectionTypeRequest>,
) -> Result<(StatusCode, Json<ConnectionTypeBody>), Reply> {
    let db = state.database();
    let (kept, previously_kept) = blocking(move || {
        db.create_connection_type(ConnectionType::new(
            request.name,
            request.forward_predicate,
            request.inverse_predicate,
            request.constraint,
            request.subject_types,
            request.object_types,
            false,
        ))
    })
    .await?;
    let status = if previously_kept {
        StatusCode::OK
    } else {
        info!(name = kept.name(), "connection type created");
        StatusCode::CREATED
    };
    Ok((status, Json(ConnectionTypeBody::from(kept.as_ref()))))
}

// ------------- Admin jobs -------------

#[derive(Deserialize)]
pub struct StartJobRequest {
    pub kind: JobKind,
}

#[derive(Deserialize)]
pub struct ProcessJobRequest {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    25
}

#[derive(Serialize)]
pub struct JobBody {
    pub id: u64,
    pub processed: usize,
    pub changed: usize,
    pub remaining: usize,
    pub total: usize,
    pub done: bool,
}

fn job_body(id: JobId, report: BatchReport) -> JobBody {
    JobBody {
        id: id.0,
        processed: report.processed,
        changed: report.changed,
        remaining: report.remaining,
        total: report.total,
        done: report.done,
    }
}

async fn start_job(
    State(state): State<AppState>,
    Json(request): Json<StartJobRequest>,
) -> Result<(StatusCode, Json<JobBody>), Reply> {
    let jobs = Arc::clone(&state.jobs);
    let kind = request.kind;
    let body = blocking(move || {
        let id = jobs.start(kind);
        let report = jobs.status(id)?;
        Ok(job_body(id, report))
    })
    .await?;
    info!(id = body.id, kind = %kind, total = body.total, "job started");
    Ok((StatusCode::CREATED, Json(body)))
}

async fn process_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<ProcessJobRequest>,
) -> Result<Json<JobBody>, Reply> {
    let jobs = Arc::clone(&state.jobs);
    let body = blocking(move || {
        let report = jobs.process(JobId(id), request.batch_size)?;
        Ok(job_body(JobId(id), report))
    })
    .await?;
    info!(id, processed = body.processed, done = body.done, "job batch processed");
    Ok(Json(body))
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<JobBody>, Reply> {
    let report = state.jobs.status(JobId(id)).map_err(reply_for)?;
    Ok(Json(job_body(JobId(id), report)))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<JobBody>, Reply> {
    if !state.jobs.cancel(JobId(id)) {
        return Err(reply_for(LifespanError::NotFound {
            kind: "job",
            id: id.to_string(),
        }));
    }
    let report = state.jobs.status(JobId(id)).map_err(reply_for)?;
    info!(id, "job cancelled");
    Ok(Json(job_body(JobId(id), report)))
}

// ------------- Router -------------

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);
    Router::new()
        .route("/api/spans/search", post(search_spans))
        .route("/api/spans/create", post(create_span))
        .route(
            "/api/spans/:id",
            get(get_span).put(update_span).delete(delete_span),
        )
        .route("/api/spans/:id/connections", get(span_connections))
        .route("/api/spans/:id/story", get(span_story))
        .route("/api/connections", post(create_connection))
        .route(
            "/api/connections/:id",
            get(get_connection)
                .put(update_connection)
                .delete(delete_connection),
        )
        .route(
            "/api/connection-types",
            get(list_connection_types).post(create_connection_type),
        )
        .route("/api/reflection/:id/:counterpart", get(reflection))
        .route("/api/admin/jobs", post(start_job))
        .route("/api/admin/jobs/:id", get(job_status).delete(cancel_job))
        .route("/api/admin/jobs/:id/process", post(process_job))
        .layer(cors)
        .with_state(state)
}
