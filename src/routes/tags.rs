use axum::{Extension, Json, Router, http::StatusCode, routing::get};

use crate::errors::AppError;
use crate::models::tag::{Tag, TagName};
use crate::security::json::SafeJson;
use crate::store::SharedStore;

pub fn router() -> Router {
    Router::new().route("/tags", get(list_tags).post(create_tag))
}

pub async fn list_tags(Extension(store): Extension<SharedStore>) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(store.list_tags()?))
}

pub async fn create_tag(
    Extension(store): Extension<SharedStore>,
    SafeJson(payload): SafeJson,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let name = TagName::from_input(&payload)?;
    Ok((StatusCode::CREATED, Json(store.insert_tag(name)?)))
}
