use axum::{
    Extension, Json, Router,
    http::StatusCode,
    routing::get,
};

use crate::errors::AppError;
use crate::models::note::{Note, NoteChanges, ValidatedNote};
use crate::security::json::{IdParam, SafeJson};
use crate::store::SharedStore;

pub fn router() -> Router {
    Router::new()
        .route("/notes", get(list_notes).post(create_note))
        .route(
            "/notes/{id}",
            get(get_note).patch(update_note).delete(delete_note),
        )
}

pub async fn list_notes(Extension(store): Extension<SharedStore>) -> Result<Json<Vec<Note>>, AppError> {
    Ok(Json(store.list_notes()?))
}

#[tracing::instrument(name = "create_note", skip(store, payload), fields(note_id))]
pub async fn create_note(
    Extension(store): Extension<SharedStore>,
    SafeJson(payload): SafeJson,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let note = ValidatedNote::from_input(&payload)?;
    let note = store.insert_note(note)?;

    tracing::Span::current().record("note_id", note.id);
    tracing::info!("Note created");

    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_note(
    Extension(store): Extension<SharedStore>,
    IdParam(note_id): IdParam,
) -> Result<Json<Note>, AppError> {
    Ok(Json(store.get_note(note_id)?))
}

#[tracing::instrument(name = "update_note", skip(store, payload))]
pub async fn update_note(
    Extension(store): Extension<SharedStore>,
    IdParam(note_id): IdParam,
    SafeJson(payload): SafeJson,
) -> Result<Json<Note>, AppError> {
    let changes = NoteChanges::from_input(&payload)?;
    let note = store.update_note(note_id, &changes)?;
    Ok(Json(note))
}

#[tracing::instrument(name = "delete_note", skip(store))]
pub async fn delete_note(
    Extension(store): Extension<SharedStore>,
    IdParam(note_id): IdParam,
) -> Result<StatusCode, AppError> {
    store.delete_note(note_id)?;
    Ok(StatusCode::NO_CONTENT)
}
