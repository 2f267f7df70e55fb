//! Board object CRUD handlers.
//!
//! Thin wrappers over [`plank_store::ObjectStore`]; all change detection
//! and publication happens inside the store's write transaction.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use plank_core::object::{Category, Dependency, Object, Relationship, Stage};
use plank_store::{NewObject, ObjectPatch};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /objects`.
#[derive(Debug, Deserialize)]
pub struct CreateObjectRequest {
    /// Schema discriminator.
    pub category: Category,
    /// Initial stage, `draft` when omitted.
    #[serde(default = "default_stage")]
    pub stage: Stage,
    /// Initial relationship array.
    #[serde(default)]
    pub related: Vec<Relationship>,
    /// Initial dependency array.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Acting user.
    pub updated_by: String,
}

fn default_stage() -> Stage {
    Stage::Draft
}

/// Body of `PATCH /objects/{id}`. Omitted fields keep their value.
#[derive(Debug, Deserialize)]
pub struct UpdateObjectRequest {
    /// New stage.
    pub stage: Option<Stage>,
    /// Replacement relationship array.
    pub related: Option<Vec<Relationship>>,
    /// Replacement dependency array.
    pub dependencies: Option<Vec<Dependency>>,
    /// Acting user.
    pub updated_by: String,
}

/// Query for `GET /objects`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Restrict to one category.
    pub category: Option<Category>,
}

/// Query for `DELETE /objects/{id}`.
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Acting user, `system` when omitted.
    pub actor: Option<String>,
}

/// Body of the delete response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Ids removed, children first.
    pub deleted: Vec<i64>,
}

/// `POST /objects`
#[instrument(skip_all, fields(category = %body.category))]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateObjectRequest>,
) -> Result<(StatusCode, Json<Object>), ApiError> {
    if body.updated_by.is_empty() {
        return Err(ApiError::BadRequest("updated_by must not be empty".into()));
    }
    let object = state.store.create(NewObject {
        category: body.category,
        stage: body.stage,
        related: body.related,
        dependencies: body.dependencies,
        updated_by: body.updated_by,
    })?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// `GET /objects`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Object>>, ApiError> {
    Ok(Json(state.store.list(query.category)?))
}

/// `GET /objects/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Object>, ApiError> {
    Ok(Json(state.store.get(id)?))
}

/// `PATCH /objects/{id}`
#[instrument(skip_all, fields(object_id = id))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateObjectRequest>,
) -> Result<Json<Object>, ApiError> {
    if body.updated_by.is_empty() {
        return Err(ApiError::BadRequest("updated_by must not be empty".into()));
    }
    let (object, _published) = state.store.update(
        id,
        ObjectPatch {
            stage: body.stage,
            related: body.related,
            dependencies: body.dependencies,
        },
        &body.updated_by,
    )?;
    Ok(Json(object))
}

/// `DELETE /objects/{id}`
#[instrument(skip_all, fields(object_id = id))]
pub async fn delete_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let actor = query.actor.as_deref().unwrap_or("system");
    let deleted = state.store.delete(id, actor)?;
    Ok(Json(DeleteResponse { deleted }))
}
