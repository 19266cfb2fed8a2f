//! Note endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    routing::get,
};

use super::dto::{CreateNoteRequest, DeleteNoteResponse, NoteListQuery, UpdateNoteRequest};
use super::json_body;
use crate::AppState;
use crate::auth::{CurrentUser, require_csrf};
use crate::data::{NewNote, Note, NotePatch, PublicUser};
use crate::error::AppError;

/// Create the notes router
///
/// State-changing routes require a CSRF token.
pub fn notes_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/notes", get(list_notes).post(create_note))
        .route(
            "/api/notes/:id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route_layer(middleware::from_fn_with_state(state, require_csrf))
}

/// Load a note and check that `user` owns it
async fn owned_note(state: &AppState, user: &PublicUser, id: &str) -> Result<Note, AppError> {
    let note = state.db.get_note(id).await?.ok_or(AppError::NotFound)?;

    if note.owner_id != user.id {
        tracing::warn!(note_id = %id, user_id = %user.id, "Note access denied");
        return Err(AppError::Forbidden);
    }

    Ok(note)
}

/// GET /api/notes?tag=&query=
///
/// Most recently updated first.
async fn list_notes(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<NoteListQuery>,
) -> Result<Json<Vec<Note>>, AppError> {
    let tag = params.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let notes = state
        .db
        .list_notes(&user.id, false)
        .await?
        .into_iter()
        .filter(|note| tag.is_none_or(|tag| note.tags.iter().any(|t| t == tag)))
        .filter(|note| query.is_none_or(|query| note.matches_query(query)))
        .collect();

    Ok(Json(notes))
}

/// POST /api/notes
async fn create_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let request = json_body(payload)?;
    request.validate()?;

    let note = state
        .db
        .insert_note(
            &user.id,
            &NewNote {
                title: request.title,
                content: request.content,
                color: request.color.filter(|c| !c.trim().is_empty()),
                tags: request.tags,
            },
        )
        .await?;

    tracing::info!(note_id = %note.id, user_id = %user.id, "Note created");

    Ok((StatusCode::CREATED, Json(note)))
}

/// GET /api/notes/:id
async fn get_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Note>, AppError> {
    Ok(Json(owned_note(&state, &user, &id).await?))
}

/// PUT /api/notes/:id
async fn update_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Result<Json<Note>, AppError> {
    let request = json_body(payload)?;
    let existing = owned_note(&state, &user, &id).await?;

    let note = state
        .db
        .update_note(
            &existing,
            NotePatch {
                title: request.title,
                content: request.content,
                color: request.color,
                tags: request.tags,
            },
        )
        .await?;

    tracing::info!(note_id = %note.id, user_id = %user.id, "Note updated");

    Ok(Json(note))
}

/// DELETE /api/notes/:id
async fn delete_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteNoteResponse>, AppError> {
    owned_note(&state, &user, &id).await?;
    state.db.delete_note(&id).await?;

    tracing::info!(note_id = %id, user_id = %user.id, "Note deleted");

    Ok(Json(DeleteNoteResponse {
        success: true,
        message: "Note deleted successfully".to_string(),
    }))
}
