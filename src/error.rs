use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("too many attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Store and signing failures arrive as `anyhow::Error`; a unique-constraint
/// violation from postgres means another account already owns the value.
impl From<anyhow::Error> for AppError {
    fn from(inner: anyhow::Error) -> Self {
        if let Some(sqlx::Error::Database(db_err)) = inner.downcast_ref::<sqlx::Error>() {
            if db_err.is_unique_violation() {
                return AppError::Conflict("Email or mobile already registered".into());
            }
        }
        AppError::Internal(inner)
    }
}

/// Request body fields a deserialization error can name.
const BODY_FIELDS: [&str; 7] = [
    "email",
    "mobile",
    "password",
    "firstName",
    "lastName",
    "grade",
    "avatar",
];

fn rejected_field(detail: &str) -> &'static str {
    BODY_FIELDS
        .iter()
        .find(|f| detail.contains(&format!("`{f}`")))
        .copied()
        .unwrap_or("body")
}

/// Bodies that fail to parse are reported like any other validation error.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        let message = match &rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a JSON body with content-type application/json".to_string()
            }
            JsonRejection::JsonSyntaxError(_) => "Malformed JSON body".to_string(),
            JsonRejection::JsonDataError(_) => match detail.split_once(": ") {
                Some((_, reason)) => reason.to_string(),
                None => detail.clone(),
            },
            _ => detail.clone(),
        };
        AppError::Validation {
            field: rejected_field(&detail),
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation { field, message } => json!({
                "success": false,
                "error": message,
                "field": field,
            }),
            AppError::RateLimited { retry_after_secs } => json!({
                "success": false,
                "error": self.to_string(),
                "retryAfterSecs": retry_after_secs,
            }),
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                json!({ "success": false, "error": "Internal server error" })
            }
            other => json!({ "success": false, "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
