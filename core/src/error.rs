//! The normalized error every client operation fails with.
//!
//! # Design
//! Callers never see a raw reqwest or serde error. Network failures (no
//! response at all) become `Connectivity` with no status code; HTTP failures
//! are classified by status through a fixed table whose messages are the
//! dashboard's user-facing strings; envelope failures inside a 2xx body become
//! `Envelope`. The original cause is kept behind an `Arc` so the error stays
//! `Clone` and a retried operation can surface its last failure unchanged.

use std::error::Error as StdError;
use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::envelope::FieldErrors;
use crate::http::HttpResponse;

pub const CONNECTIVITY_MESSAGE: &str =
    "No se puede conectar con el servidor. Verifica tu conexión a internet.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Sesión expirada. Por favor inicia sesión nuevamente.";
pub const FORBIDDEN_MESSAGE: &str = "No tienes permisos para realizar esta acción.";
pub const NOT_FOUND_MESSAGE: &str = "El recurso solicitado no fue encontrado.";
pub const VALIDATION_MESSAGE: &str = "Datos inválidos. Verifica la información ingresada.";
pub const RATE_LIMITED_MESSAGE: &str =
    "Demasiadas solicitudes. Intenta nuevamente en unos momentos.";
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Error interno del servidor. Nuestro equipo ha sido notificado.";
pub const UNAVAILABLE_MESSAGE: &str =
    "Servicio temporalmente no disponible. Intenta nuevamente más tarde.";
pub const INVALID_RESPONSE_MESSAGE: &str = "Respuesta inválida del servidor.";

pub type Cause = Arc<dyn StdError + Send + Sync>;

/// Failure taxonomy surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response reached the client: timeout, DNS, refused, offline.
    Connectivity,
    /// 401. The session has already been invalidated when this is observed.
    Authorization,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 422, or 400 carrying a field error map.
    Validation,
    /// 429.
    RateLimited,
    /// 500 and 503.
    ServerFault,
    /// Any status outside the table.
    Http,
    /// 2xx transport whose payload encodes a failure or does not decode.
    Envelope,
    /// The request could not be produced locally (body encoding, upload file).
    InvalidRequest,
}

/// Normalized error: status (absent for network failures), message, cause
/// and whatever body the backend sent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    #[source]
    pub cause: Option<Cause>,
    pub data: Value,
}

impl ApiError {
    pub fn new(kind: ErrorKind, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
            cause: None,
            data: Value::Null,
        }
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// No response was received.
    pub fn connectivity(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::Connectivity, None, CONNECTIVITY_MESSAGE).with_cause(cause)
    }

    /// A 2xx body did not satisfy the endpoint's envelope rule.
    pub fn envelope(status_code: u16, message: impl Into<String>, data: Value) -> Self {
        Self::new(ErrorKind::Envelope, Some(status_code), message).with_data(data)
    }

    pub fn invalid_request(cause: impl StdError + Send + Sync + 'static) -> Self {
        let message = cause.to_string();
        Self::new(ErrorKind::InvalidRequest, None, message).with_cause(cause)
    }

    /// Classify a non-2xx response through the status table.
    pub fn from_response(response: &HttpResponse) -> Self {
        let status = response.status;
        let data = response.json_body();
        let backend = backend_message(&data);

        let (kind, message) = match status {
            401 => (ErrorKind::Authorization, SESSION_EXPIRED_MESSAGE.to_string()),
            403 => (ErrorKind::Forbidden, FORBIDDEN_MESSAGE.to_string()),
            404 => (ErrorKind::NotFound, NOT_FOUND_MESSAGE.to_string()),
            422 => (
                ErrorKind::Validation,
                backend.unwrap_or(VALIDATION_MESSAGE).to_string(),
            ),
            429 => (ErrorKind::RateLimited, RATE_LIMITED_MESSAGE.to_string()),
            500 => (ErrorKind::ServerFault, INTERNAL_ERROR_MESSAGE.to_string()),
            503 => (ErrorKind::ServerFault, UNAVAILABLE_MESSAGE.to_string()),
            _ => {
                let kind = if status == 400 && data.get("errors").is_some_and(Value::is_object) {
                    ErrorKind::Validation
                } else {
                    ErrorKind::Http
                };
                let message = match backend {
                    Some(message) => message.to_string(),
                    None => format!("Error {status}: {}", StatusFailure(status)),
                };
                (kind, message)
            }
        };

        error!(status, message = %message, "API error");

        Self::new(kind, Some(status), message)
            .with_cause(StatusFailure(status))
            .with_data(data)
    }

    /// Field errors carried in the body under `errors`, when present.
    pub fn field_errors(&self) -> Option<FieldErrors> {
        let errors = self.data.get("errors")?;
        serde_json::from_value(errors.clone()).ok()
    }

    pub fn is_connectivity(&self) -> bool {
        self.kind == ErrorKind::Connectivity
    }
}

/// The raw transport-level description of an HTTP failure.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("Request failed with status code {0}")]
pub struct StatusFailure(pub u16);

fn backend_message(data: &Value) -> Option<&str> {
    data.get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
}
