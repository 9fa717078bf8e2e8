use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// A write or read the caller's identity is not allowed to perform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionError {
    /// The document path that was refused, e.g. `institutions/I1/students/S1`.
    pub path: String,
    pub operation: Operation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl std::fmt::Display for PermissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operation = match self.operation {
            Operation::Read => "read",
            Operation::Write => "write",
        };
        write!(f, "missing permission to {operation} {}", self.path)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    PermissionDenied(PermissionError),

    /// No institution could be resolved for the caller.
    #[error("{0}")]
    MissingContext(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("message rejected: {0}")]
    ModerationRejected(String),

    #[error("subscription fell behind the change feed")]
    SubscriptionLagged,

    #[error("database error: {0}")]
    Store(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn permission(path: impl Into<String>, operation: Operation) -> Self {
        AppError::PermissionDenied(PermissionError {
            path: path.into(),
            operation,
        })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::PermissionDenied(_) | AppError::MissingContext(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::ModerationRejected(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SubscriptionLagged
            | AppError::Store(_)
            | AppError::Pool(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::MissingContext(_) => "missing_context",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::ModerationRejected(_) => "moderation_rejected",
            AppError::SubscriptionLagged
            | AppError::Store(_)
            | AppError::Pool(_)
            | AppError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // We should not expose this exact error for safety reasons.
            tracing::error!(error = %self, "request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };
        let redirect =
            matches!(self, AppError::MissingContext(_)).then_some("/dashboard/unauthorized");

        let body = ErrorBody {
            error,
            code: self.code(),
            redirect,
        };
        (status, Json(body)).into_response()
    }
}

/// Shared channel on which every permission failure is published,
/// regardless of which request or subscription raised it.
#[derive(Clone)]
pub struct ErrorEvents {
    sender: broadcast::Sender<PermissionError>,
}

impl ErrorEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        ErrorEvents { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PermissionError> {
        self.sender.subscribe()
    }

    /// Publishes the error if it is a permission failure. Returns it unchanged.
    pub fn observe(&self, error: AppError) -> AppError {
        if let AppError::PermissionDenied(permission) = &error {
            // Nobody listening is fine.
            let _ = self.sender.send(permission.clone());
        }
        error
    }

    /// Logs every published permission failure until the channel closes.
    pub fn spawn_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(permission) => tracing::warn!(
                        path = %permission.path,
                        operation = ?permission.operation,
                        "permission denied"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "permission error log fell behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for ErrorEvents {
    fn default() -> Self {
        Self::new()
    }
}
