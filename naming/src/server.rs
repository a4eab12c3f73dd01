//! HTTP surface of the naming service: one router per listening port,
//! translating between the wire bodies and [NamingService] operations.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use dfs_wire::{
    ErrorBody, ListResponse, LockRequest, PathRequest, RegisterRequest, RegisterResponse,
    StorageLocation, SuccessResponse,
};

use crate::error::NamingError;
use crate::service::NamingService;

/// An error response carrying the protocol's exception envelope.
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

impl From<NamingError> for ApiError {
    fn from(value: NamingError) -> Self {
        match value {
            NamingError::InvalidArgument(info) => {
                ApiError::new(StatusCode::BAD_REQUEST, "IllegalArgumentException", info)
            }
            NamingError::NotFound(info) => {
                ApiError::new(StatusCode::BAD_REQUEST, "FileNotFoundException", info)
            }
            NamingError::IllegalState(info) => {
                ApiError::new(StatusCode::CONFLICT, "IllegalStateException", info)
            }
        }
    }
}

/// Json extractor whose rejection is the protocol envelope instead of
/// axum's plain-text default, so a missing field comes back as an
/// `IllegalArgumentException`.
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

/// The router served on the registration port.
pub fn registration_router(service: Arc<NamingService>) -> Router {
    Router::new()
        .route("/register", post(register))
        .with_state(service)
}

/// The router served on the service port.
pub fn service_router(service: Arc<NamingService>) -> Router {
    Router::new()
        .route("/is_valid_path", post(is_valid_path))
        .route("/getstorage", post(get_storage))
        .route("/list", post(list))
        .route("/is_directory", post(is_directory))
        .route("/is_file", post(is_file))
        .route("/create_directory", post(create_directory))
        .route("/create_file", post(create_file))
        .route("/delete", post(delete))
        .route("/lock", post(lock))
        .route("/unlock", post(unlock))
        .with_state(service)
}

async fn register(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let files = service.register(request)?;
    Ok(Json(RegisterResponse { files }))
}

async fn is_valid_path(ApiJson(request): ApiJson<PathRequest>) -> Json<SuccessResponse> {
    Json(SuccessResponse {
        success: NamingService::is_valid_path(&request.path),
    })
}

async fn get_storage(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<StorageLocation>, ApiError> {
    let node = service.storage_location(&request.path)?;
    Ok(Json(StorageLocation {
        server_ip: node.storage_ip,
        server_port: node.client_port,
    }))
}

async fn list(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<ListResponse>, ApiError> {
    let files = service.list(&request.path)?;
    Ok(Json(ListResponse { files }))
}

async fn is_directory(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = service.is_directory(&request.path)?;
    Ok(Json(SuccessResponse { success }))
}

async fn is_file(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = service.is_file(&request.path)?;
    Ok(Json(SuccessResponse { success }))
}

async fn create_directory(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = service.create_directory(&request.path)?;
    Ok(Json(SuccessResponse { success }))
}

async fn create_file(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = service.create_file(&request.path).await?;
    Ok(Json(SuccessResponse { success }))
}

async fn delete(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let success = service.delete(&request.path).await?;
    Ok(Json(SuccessResponse { success }))
}

async fn lock(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<LockRequest>,
) -> Result<&'static str, ApiError> {
    service.lock(&request.path, request.exclusive).await?;
    Ok("")
}

async fn unlock(
    State(service): State<Arc<NamingService>>,
    ApiJson(request): ApiJson<PathRequest>,
) -> Result<&'static str, ApiError> {
    service.unlock(&request.path)?;
    Ok("")
}
