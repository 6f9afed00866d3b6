//! Data-access layer of the administrative dashboard.
//!
//! # Overview
//! Every backend call goes through one `Transport`, which attaches the bearer
//! credential, times and logs the request, normalizes failures into
//! `ApiError`, and on a 401 clears the credential and signals the host to
//! navigate to sign-in. `DashboardClient` sits on top with one typed method
//! per backend capability, unwrapping whichever response envelope that
//! endpoint uses.
//!
//! # Design
//! - The session (credential store + redirect channel) is passed in at
//!   construction; nothing reads ambient storage.
//! - Requests and responses pass through plain-data `HttpRequest` /
//!   `HttpResponse` values so the interceptors are testable offline.
//! - Only GETs are retried, with bounded deterministic backoff.
//! - `health` probes the backend with its own client and short timeout.

pub mod auth;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod http;
pub mod retry;
pub mod transport;
pub mod types;

pub use auth::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, Redirect, RedirectReceiver,
    Session, CREDENTIAL_KEY,
};
pub use client::DashboardClient;
pub use config::{ApiConfigInfo, ClientConfig};
pub use envelope::{CodeEnvelope, Envelope, FieldErrors, Outcome, StatusEnvelope};
pub use error::{ApiError, ErrorKind};
pub use health::{
    check_api_health, health_url, probe_backend, BackendProbe, BackendStatus, InvalidBackendUrl,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use retry::{with_retry, with_retry_if};
pub use transport::{ProgressFn, Transport};
pub use types::{
    LoginRequest, LoginResponse, Participant, ParticipantAssessments, ParticipantKind,
    ParticipantState, Record, TestListItem,
};
