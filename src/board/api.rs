use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use super::db::{BoardDb, DbHandle};
use super::models::{ActivityAction, MemberRole, NewActivity};
use super::permissions::PermissionMode;
use super::reorder::{MoveRequest, Reorderer};
use super::ws::{WsMessage, broadcast_message};
use crate::errors::BoardError;

/// Header carrying the caller's identity.
pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub reorderer: Reorderer,
    pub permissions: PermissionMode,
}

impl AppState {
    pub fn new(db: DbHandle, permissions: PermissionMode) -> Self {
        let (ws_tx, _) = broadcast::channel(256);
        Self {
            db,
            ws_tx,
            reorderer: Reorderer::new(permissions.checker()),
            permissions,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    pub role: MemberRole,
}

#[derive(Deserialize)]
pub struct CreateColumnRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct MoveColumnRequest {
    pub position: i32,
}

#[derive(Deserialize)]
pub struct CreateCardRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCardRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveCardRequest {
    pub column_id: i64,
    pub position: i32,
    pub expected_column_id: Option<i64>,
    pub expected_position: Option<i32>,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        let msg = err.to_string();
        match err {
            BoardError::ProjectNotFound { .. }
            | BoardError::ColumnNotFound { .. }
            | BoardError::CardNotFound { .. } => ApiError::NotFound(msg),
            BoardError::InvalidPosition { .. }
            | BoardError::CrossProjectMove { .. }
            | BoardError::BadRequest(_) => ApiError::BadRequest(msg),
            BoardError::PermissionDenied { .. } => ApiError::Forbidden(msg),
            BoardError::ConcurrencyConflict { .. } => ApiError::Conflict(msg),
            BoardError::Database(_) | BoardError::LockPoisoned | BoardError::Other(_) => {
                tracing::error!(error = %msg, "Board store failure");
                ApiError::Internal(msg)
            }
        }
    }
}

// ── Caller identity ───────────────────────────────────────────────────

/// The user issuing a mutating request, from the `x-user-id` header.
pub struct Actor(pub String);

impl Actor {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Actor(v.to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_headers(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_HEADER)))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", get(get_project))
        .route("/api/projects/{id}/board", get(get_board))
        .route(
            "/api/projects/{id}/members",
            get(list_members).post(add_member),
        )
        .route("/api/projects/{id}/columns", post(create_column))
        .route("/api/projects/{id}/activity", get(list_activity))
        .route("/api/columns/{id}/move", patch(move_column))
        .route("/api/columns/{id}/cards", post(create_card))
        .route(
            "/api/cards/{id}",
            get(get_card).patch(update_card).delete(delete_card),
        )
        .route("/api/cards/{id}/move", patch(move_card))
        .route("/api/cards/{id}/archive", post(archive_card))
        .route("/api/cards/{id}/restore", post(restore_card))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn project_of_column(db: &BoardDb, column_id: i64) -> Result<i64, BoardError> {
    db.get_column(column_id)?
        .map(|c| c.project_id)
        .ok_or(BoardError::ColumnNotFound { id: column_id })
}

/// Record an activity row after the change committed. Failures are logged
/// and never reach the caller.
async fn record_activity(state: &SharedState, entry: NewActivity) {
    let action = entry.action;
    if let Err(e) = state.db.call(move |db| Ok(db.record_activity(&entry)?)).await {
        tracing::warn!(error = %e, action = action.as_str(), "Failed to record activity");
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

/// Projects the caller belongs to, or every project without an identity.
async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let actor = Actor::from_headers(&headers);
    let projects = state
        .db
        .call(move |db| match actor {
            Some(Actor(user)) => Ok(db.list_projects_for_user(&user)?),
            None => Ok(db.list_projects()?),
        })
        .await?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    non_empty("name", &req.name)?;
    let project = state
        .db
        .call(move |db| Ok(db.create_project(&req.name, &user)?))
        .await?;
    tracing::info!(project_id = project.id, name = %project.name, "Created project");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ProjectCreated {
            project: project.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| {
            db.get_project(id)?
                .ok_or(BoardError::ProjectNotFound { id })
        })
        .await?;
    Ok(Json(project))
}

async fn get_board(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state.db.call(move |db| db.get_board(id)).await?;
    Ok(Json(board))
}

async fn list_members(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state
        .db
        .call(move |db| {
            if db.get_project(id)?.is_none() {
                return Err(BoardError::ProjectNotFound { id });
            }
            Ok(db.list_members(id)?)
        })
        .await?;
    Ok(Json(members))
}

/// Only owners manage membership, unless the server runs in open mode.
async fn add_member(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    non_empty("user_id", &req.user_id)?;
    let mode = state.permissions;
    let member = state
        .db
        .call(move |db| {
            if db.get_project(id)?.is_none() {
                return Err(BoardError::ProjectNotFound { id });
            }
            if mode == PermissionMode::Members
                && db.member_role(id, &user)? != Some(MemberRole::Owner)
            {
                return Ok(None);
            }
            Ok(Some(db.add_member(id, &req.user_id, req.role)?))
        })
        .await?
        .ok_or_else(|| ApiError::Forbidden("Only project owners can manage members".into()))?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn create_column(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    non_empty("name", &req.name)?;
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let column = state
        .db
        .call(move |db| reorderer.append_column(db, &actor, project_id, &req.name))
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ColumnCreated {
            column: column.clone(),
        },
    );
    record_activity(
        &state,
        NewActivity {
            project_id,
            card_id: None,
            actor: user,
            action: ActivityAction::ColumnCreated,
            detail: serde_json::json!({"column_id": column.id, "name": column.name}),
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(column)))
}

async fn move_column(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
    Json(req): Json<MoveColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (before, column) = state
        .db
        .call(move |db| {
            let before = db
                .get_column(id)?
                .ok_or(BoardError::ColumnNotFound { id })?;
            let column = reorderer.move_column(db, &actor, id, req.position)?;
            Ok((before, column))
        })
        .await?;
    if before.position != column.position {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::ColumnMoved {
                column: column.clone(),
            },
        );
        record_activity(
            &state,
            NewActivity {
                project_id: column.project_id,
                card_id: None,
                actor: user,
                action: ActivityAction::ColumnMoved,
                detail: serde_json::json!({
                    "column_id": column.id,
                    "from": before.position,
                    "to": column.position,
                }),
            },
        )
        .await;
    }
    Ok(Json(column))
}

async fn create_card(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(column_id): Path<i64>,
    Json(req): Json<CreateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    non_empty("title", &req.title)?;
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (card, project_id) = state
        .db
        .call(move |db| {
            let description = req.description.unwrap_or_default();
            let card = reorderer.append(db, &actor, column_id, &req.title, &description)?;
            Ok((card, project_of_column(db, column_id)?))
        })
        .await?;
    broadcast_message(&state.ws_tx, &WsMessage::CardCreated { card: card.clone() });
    record_activity(
        &state,
        NewActivity {
            project_id,
            card_id: Some(card.id),
            actor: user,
            action: ActivityAction::CardCreated,
            detail: serde_json::json!({"column_id": column_id, "position": card.position}),
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(card)))
}

async fn get_card(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .db
        .call(move |db| db.get_card(id)?.ok_or(BoardError::CardNotFound { id }))
        .await?;
    Ok(Json(card))
}

async fn update_card(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(title) = &req.title {
        non_empty("title", title)?;
    }
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (card, project_id) = state
        .db
        .call(move |db| {
            let existing = db.get_card(id)?.ok_or(BoardError::CardNotFound { id })?;
            reorderer.authorize(db, &actor, existing.column_id)?;
            let card = db.update_card(id, req.title.as_deref(), req.description.as_deref())?;
            Ok((card, project_of_column(db, existing.column_id)?))
        })
        .await?;
    broadcast_message(&state.ws_tx, &WsMessage::CardUpdated { card: card.clone() });
    record_activity(
        &state,
        NewActivity {
            project_id,
            card_id: Some(card.id),
            actor: user,
            action: ActivityAction::CardUpdated,
            detail: serde_json::json!({"title": card.title}),
        },
    )
    .await;
    Ok(Json(card))
}

async fn move_card(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
    Json(req): Json<MoveCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = MoveRequest {
        card_id: id,
        column_id: req.column_id,
        position: req.position,
        expected_column_id: req.expected_column_id,
        expected_position: req.expected_position,
    };
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (outcome, project_id) = state
        .db
        .call(move |db| {
            let outcome = reorderer.move_card(db, &actor, &request)?;
            let project_id = project_of_column(db, outcome.card.column_id)?;
            Ok((outcome, project_id))
        })
        .await?;

    if outcome.changed() {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::CardMoved {
                card_id: outcome.card.id,
                from_column_id: outcome.from_column_id,
                from_position: outcome.from_position,
                to_column_id: outcome.card.column_id,
                position: outcome.card.position,
            },
        );
        record_activity(
            &state,
            NewActivity {
                project_id,
                card_id: Some(outcome.card.id),
                actor: user,
                action: ActivityAction::CardMoved,
                detail: serde_json::json!({
                    "from_column_id": outcome.from_column_id,
                    "from_position": outcome.from_position,
                    "to_column_id": outcome.card.column_id,
                    "to_position": outcome.card.position,
                }),
            },
        )
        .await;
    }
    Ok(Json(outcome.card))
}

async fn archive_card(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (card, project_id) = state
        .db
        .call(move |db| {
            let card = reorderer.archive(db, &actor, id)?;
            Ok((card.clone(), project_of_column(db, card.column_id)?))
        })
        .await?;
    broadcast_message(&state.ws_tx, &WsMessage::CardArchived { card: card.clone() });
    record_activity(
        &state,
        NewActivity {
            project_id,
            card_id: Some(card.id),
            actor: user,
            action: ActivityAction::CardArchived,
            detail: serde_json::json!({"column_id": card.column_id}),
        },
    )
    .await;
    Ok(Json(card))
}

async fn restore_card(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (card, project_id, was_archived) = state
        .db
        .call(move |db| {
            let was_archived = db
                .get_card(id)?
                .ok_or(BoardError::CardNotFound { id })?
                .archived;
            let card = reorderer.restore(db, &actor, id)?;
            let project_id = project_of_column(db, card.column_id)?;
            Ok((card, project_id, was_archived))
        })
        .await?;
    // Restoring a live card changes nothing.
    if was_archived {
        broadcast_message(&state.ws_tx, &WsMessage::CardRestored { card: card.clone() });
        record_activity(
            &state,
            NewActivity {
                project_id,
                card_id: Some(card.id),
                actor: user,
                action: ActivityAction::CardRestored,
                detail: serde_json::json!({"column_id": card.column_id, "position": card.position}),
            },
        )
        .await;
    }
    Ok(Json(card))
}

async fn delete_card(
    State(state): State<SharedState>,
    Actor(user): Actor,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let reorderer = state.reorderer.clone();
    let actor = user.clone();
    let (card, project_id) = state
        .db
        .call(move |db| {
            let project_id = match db.get_card(id)? {
                Some(card) => project_of_column(db, card.column_id)?,
                None => return Err(BoardError::CardNotFound { id }),
            };
            Ok((reorderer.delete(db, &actor, id)?, project_id))
        })
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CardDeleted {
            card_id: card.id,
            column_id: card.column_id,
        },
    );
    record_activity(
        &state,
        NewActivity {
            project_id,
            card_id: Some(card.id),
            actor: user,
            action: ActivityAction::CardDeleted,
            detail: serde_json::json!({"title": card.title}),
        },
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_activity(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 500);
    let entries = state
        .db
        .call(move |db| {
            if db.get_project(id)?.is_none() {
                return Err(BoardError::ProjectNotFound { id });
            }
            Ok(db.list_activity(id, limit)?)
        })
        .await?;
    Ok(Json(entries))
}

// ── Tests ─────────────────────────────────────────────────────────────
