use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ServiceError;
use crate::rpc::wire::RpcFault;

/// Error side of an RPC handler.
#[derive(Debug)]
pub struct RpcError(pub ServiceError);

pub type RpcResult<T> = Result<Json<T>, RpcError>;

impl From<ServiceError> for RpcError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

pub fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::AccessDenied => StatusCode::FORBIDDEN,
        ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ServiceError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let error = self.0;
        if error.is_dependency_failure() {
            tracing::error!(%error, "rpc failed on a dependency");
        }
        (status_for(&error), Json(RpcFault::from(&error))).into_response()
    }
}
