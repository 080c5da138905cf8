use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    #[serde(serialize_with = "serialize_status")]
    pub status_code: StatusCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} has not loaded yet")]
    NotLoaded(&'static str),
    #[error("weather is disabled")]
    WeatherDisabled,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotLoaded(what) => {
                debug!(what, "requested data that has not loaded yet");
                ErrorMessage::from((StatusCode::SERVICE_UNAVAILABLE, self.to_string())).into_response()
            }
            ApiError::WeatherDisabled => {
                ErrorMessage::from((StatusCode::NOT_FOUND, self.to_string())).into_response()
            }
        }
    }
}

fn serialize_status<S>(value: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u16(value.as_u16())
}

impl From<(StatusCode, String)> for ErrorMessage {
    fn from((status_code, message): (StatusCode, String)) -> Self {
        Self {
            status_code,
            message,
        }
    }
}

impl IntoResponse for ErrorMessage {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}
