use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    error::AppError,
    pagination::PageRequest,
    response::ApiResponse,
    state::AppState,
    users::{
        dto::{CreateUserRequest, ListUsersQuery, UpdateUserRequest},
        repo_types::User,
        validation::{validate_create, validate_update},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

fn today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

fn bad_request(e: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(e.to_string())
}

#[instrument(skip(state, query))]
pub async fn list_users(
    State(state): State<AppState>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<User>>>, AppError> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
    let page = PageRequest::new(query.page, query.per_page);

    let result = match query.term() {
        Some(term) => state.users.search(term, page).await?,
        None => state.users.list(page).await?,
    };
    Ok(Json(ApiResponse::page(result)))
}

#[instrument(skip(state, id))]
pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Path(id) = id.map_err(|e| bad_request(e.body_text()))?;
    let user = state.users.get_by_id(id).await?;
    Ok(Json(ApiResponse::data(user)))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let input = validate_create(payload, today()).map_err(AppError::Validation)?;

    let user = state.users.create(input).await?;
    let location = format!("/api/users/{}", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ApiResponse::data(user).with_message("User created successfully")),
    ))
}

#[instrument(skip(state, id, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let Path(id) = id.map_err(|e| bad_request(e.body_text()))?;
    let Json(payload) = payload.map_err(|e| bad_request(e.body_text()))?;
    let patch = validate_update(payload, today()).map_err(AppError::Validation)?;

    let user = state.users.update(id, patch).await?;
    Ok(Json(
        ApiResponse::data(user).with_message("User updated successfully"),
    ))
}

#[instrument(skip(state, id))]
pub async fn delete_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let Path(id) = id.map_err(|e| bad_request(e.body_text()))?;
    state.users.delete(id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}
