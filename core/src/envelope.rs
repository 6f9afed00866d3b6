//! Response envelopes returned by the backend.
//!
//! # Design
//! The backend wraps payloads in two incompatible shapes: a numeric `code`
//! (200 ok, 400 validation with a field map in `data`, 404 not found) or a
//! string `status` (`"ok"` on success). They cannot be told apart reliably
//! from the JSON alone, so each facade operation names the shape its endpoint
//! uses and decodes straight into that variant. Unwrapping either yields the
//! whole payload or an `ApiError`; a half-read envelope never escapes.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Field name to message, produced by the validation branch of the code envelope.
pub type FieldErrors = BTreeMap<String, String>;

pub const CODE_OK: u16 = 200;
pub const CODE_INVALID: u16 = 400;
pub const CODE_NOT_FOUND: u16 = 404;
pub const STATUS_OK: &str = "ok";

const GENERIC_ENVELOPE_MESSAGE: &str = "La operación no pudo completarse.";

/// `{ code, data, msg }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEnvelope {
    pub code: u16,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub msg: Option<String>,
}

/// `{ status, data, msg }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub status: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub msg: Option<String>,
}

/// Both wire shapes. Which one applies is fixed per endpoint.
#[derive(Debug, Clone)]
pub enum Envelope {
    Code(CodeEnvelope),
    Status(StatusEnvelope),
}

/// Result of a mutation on a code-envelope endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Saved(T),
    /// The backend rejected the input; render these next to the form fields.
    Invalid(FieldErrors),
}

impl<T> Outcome<T> {
    pub fn saved(self) -> Option<T> {
        match self {
            Outcome::Saved(value) => Some(value),
            Outcome::Invalid(_) => None,
        }
    }
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        match self {
            Envelope::Code(env) => env.code == CODE_OK,
            Envelope::Status(env) => env.status == STATUS_OK,
        }
    }

    pub fn msg(&self) -> Option<&str> {
        let msg = match self {
            Envelope::Code(env) => env.msg.as_deref(),
            Envelope::Status(env) => env.msg.as_deref(),
        };
        msg.filter(|msg| !msg.is_empty())
    }

    /// Unwrap a successful envelope into `T`, or fail with the envelope's
    /// own message (else `fallback`).
    pub fn into_payload<T: DeserializeOwned>(self, fallback: &str) -> Result<T, ApiError> {
        if !self.is_success() {
            return Err(self.failure(fallback));
        }
        let data = match self {
            Envelope::Code(env) => env.data,
            Envelope::Status(env) => env.data,
        };
        decode(data)
    }

    fn failure(self, fallback: &str) -> ApiError {
        let message = self.msg().unwrap_or(fallback).to_string();
        match self {
            Envelope::Code(env) => {
                let code = env.code;
                ApiError::envelope(code, message, to_value(env))
            }
            Envelope::Status(env) => ApiError::envelope(CODE_OK, message, to_value(env)),
        }
    }
}

impl CodeEnvelope {
    /// Code 200 with a list payload; missing or null data reads as empty.
    pub fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>, ApiError> {
        if self.code == CODE_OK && self.data.is_null() {
            return Ok(Vec::new());
        }
        Envelope::Code(self).into_payload(GENERIC_ENVELOPE_MESSAGE)
    }

    /// Code 200 → `Saved`, code 400 with a field map → `Invalid`, else error.
    pub fn into_outcome<T: DeserializeOwned>(self) -> Result<Outcome<T>, ApiError> {
        if self.code == CODE_INVALID {
            if let Ok(fields) = serde_json::from_value::<FieldErrors>(self.data.clone()) {
                return Ok(Outcome::Invalid(fields));
            }
        }
        Envelope::Code(self)
            .into_payload(GENERIC_ENVELOPE_MESSAGE)
            .map(Outcome::Saved)
    }

    /// Code 200 with data → `Some`, anything else → `None`.
    pub fn into_found<T: DeserializeOwned>(self) -> Option<T> {
        if self.code != CODE_OK || self.data.is_null() {
            return None;
        }
        serde_json::from_value(self.data).ok()
    }
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, ApiError> {
    serde_json::from_value(data.clone()).map_err(|err| {
        ApiError::envelope(CODE_OK, crate::error::INVALID_RESPONSE_MESSAGE, data).with_cause(err)
    })
}

fn to_value<E: Serialize>(env: E) -> Value {
    serde_json::to_value(env).unwrap_or(Value::Null)
}
