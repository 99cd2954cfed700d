use axum::{Extension, Json, Router, routing::{get, post}};

use crate::errors::AppError;
use crate::models::item::{Item, ItemDraft};
use crate::security::json::{IdParam, SafeJson};
use crate::store::SharedStore;

pub fn router() -> Router {
    Router::new()
        .route("/items", post(create_item))
        .route("/items/{id}", get(get_item))
}

pub async fn create_item(
    Extension(store): Extension<SharedStore>,
    SafeJson(payload): SafeJson,
) -> Result<Json<Item>, AppError> {
    let draft = ItemDraft::from_input(&payload)?;
    Ok(Json(store.insert_item(draft)?))
}

pub async fn get_item(
    Extension(store): Extension<SharedStore>,
    IdParam(item_id): IdParam,
) -> Result<Json<Item>, AppError> {
    Ok(Json(store.get_item(item_id)?))
}
