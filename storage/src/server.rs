//! HTTP surface of a storage node: the client router serving byte
//! operations and the command router serving the naming service.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use data_encoding::BASE64;

use dfs_wire::client::HttpClient;
use dfs_wire::{
    CopyRequest, ErrorBody, PathRequest, ReadRequest, ReadResponse, SizeResponse, SuccessResponse,
    WriteRequest,
};

use crate::store::{LocalStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LocalStore>,
    pub http: HttpClient,
}

impl AppState {
    pub fn new(store: Arc<LocalStore>) -> Self {
        AppState {
            store,
            http: HttpClient::new(),
        }
    }
}

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, exception_type: &str, info: impl Into<String>) -> Self {
        ApiError {
            status,
            body: ErrorBody::new(exception_type, info),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidArgument(info) => {
                ApiError::new(StatusCode::BAD_REQUEST, "IllegalArgumentException", info)
            }
            StoreError::NotFound(info) => {
                ApiError::new(StatusCode::NOT_FOUND, "FileNotFoundException", info)
            }
            StoreError::OutOfBounds(info) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "IndexOutOfBoundsException",
                info,
            ),
            StoreError::Io(e) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "IOException",
                e.to_string(),
            ),
        }
    }
}

/// Json extractor whose rejection is the protocol envelope instead of
/// axum's plain-text default.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "IllegalArgumentException",
                rejection.body_text(),
            )),
        }
    }
}

/// The router served on the client port.
pub fn client_router(state: AppState) -> Router {
    Router::new()
        .route("/storage_size", post(storage_size))
        .route("/storage_read", post(storage_read))
        .route("/storage_write", post(storage_write))
        .with_state(state)
}

/// The router served on the command port.
pub fn command_router(state: AppState) -> Router {
    Router::new()
        .route("/storage_create", post(storage_create))
        .route("/storage_delete", post(storage_delete))
        .route("/storage_copy", post(storage_copy))
        .with_state(state)
}

async fn storage_size(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SizeResponse>, ApiError> {
    let size = state.store.size(&request.path).await?;
    Ok(Json(SizeResponse { size }))
}

async fn storage_read(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ReadRequest>,
) -> Result<Json<ReadResponse>, ApiError> {
    let data = state
        .store
        .read(&request.path, request.offset, request.length)
        .await?;
    Ok(Json(ReadResponse {
        data: BASE64.encode(&data),
    }))
}

async fn storage_write(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<WriteRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let data = BASE64.decode(request.data.as_bytes()).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "IllegalArgumentException",
            format!("data is not valid base64: {}", e),
        )
    })?;
    state.store.write(&request.path, request.offset, &data).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn storage_create(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = state.store.create(&request.path).await?;
    Ok(Json(SuccessResponse { success }))
}

async fn storage_delete(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = state.store.delete(&request.path).await?;
    Ok(Json(SuccessResponse { success }))
}

async fn storage_copy(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CopyRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = state
        .store
        .copy_from_peer(
            &state.http,
            &request.path,
            &request.server_ip,
            request.server_port,
        )
        .await?;
    Ok(Json(SuccessResponse { success }))
}
