//! Typed facade over the dashboard backend.
//!
//! # Design
//! One method per backend capability. Each method is bound to the envelope
//! shape its endpoint returns (see the table below) and unwraps it; no
//! method guesses the shape from the payload. Reads go through
//! `Transport::get_with_retry`, writes are sent exactly once.
//!
//! | shape  | endpoints |
//! |--------|-----------|
//! | none   | login |
//! | code   | users, search, assessments, test lists, progress, save/update/delete test |
//! | status | get-test |

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::auth::Session;
use crate::config::ClientConfig;
use crate::envelope::{CodeEnvelope, Envelope, Outcome, StatusEnvelope};
use crate::error::{ApiError, ErrorKind};
use crate::retry::DEFAULT_MAX_ATTEMPTS;
use crate::transport::Transport;
use crate::types::{
    DniQuery, LoginRequest, LoginResponse, Participant, ParticipantAssessments, Record,
    TestListItem, UpdateTest,
};

pub const PROGRESS_FAILED_MESSAGE: &str = "Error al obtener progreso";
pub const TEST_DETAIL_FAILED_MESSAGE: &str = "Error al obtener el detalle del test";
pub const PARTICIPANT_FAILED_MESSAGE: &str = "Error al obtener el participante";
pub const DELETE_FAILED_MESSAGE: &str = "Error al eliminar el test";
const LIST_FAILED_MESSAGE: &str = "Error al obtener la lista";

/// Client for the dashboard backend.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    transport: Transport,
    read_attempts: u32,
}

impl DashboardClient {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, ApiError> {
        Ok(Self::from_transport(Transport::new(config, session)?))
    }

    pub fn from_transport(transport: Transport) -> Self {
        Self {
            transport,
            read_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Attempts per read request (default 3).
    pub fn with_read_attempts(mut self, attempts: u32) -> Self {
        self.read_attempts = attempts.max(1);
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn session(&self) -> &Session {
        self.transport.session()
    }

    // ---------------------------------------------------------------------
    // Auth
    // ---------------------------------------------------------------------

    /// Exchange credentials for a token and store it in the session.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response: LoginResponse = self.transport.post("/api/auth/login", credentials).await?;
        self.session().sign_in(&response.token);
        Ok(response)
    }

    pub fn logout(&self) {
        self.session().logout();
    }

    // ---------------------------------------------------------------------
    // Participants
    // ---------------------------------------------------------------------

    pub async fn get_participants(&self) -> Result<Vec<Participant>, ApiError> {
        self.read_list("/api/users", &[]).await
    }

    pub async fn create_participant(
        &self,
        participant: &Participant,
    ) -> Result<Outcome<Participant>, ApiError> {
        settle(self.transport.post("/api/users", participant).await)
    }

    pub async fn get_participant(&self, external_id: &str) -> Result<Participant, ApiError> {
        let path = format!("/api/users/{}", segment(external_id));
        self.read_code(&path, &[], PARTICIPANT_FAILED_MESSAGE).await
    }

    pub async fn update_participant(
        &self,
        external_id: &str,
        participant: &Participant,
    ) -> Result<Outcome<Participant>, ApiError> {
        let path = format!("/api/users/{}", segment(external_id));
        settle(self.transport.put(&path, participant).await)
    }

    /// Look a participant up by DNI.
    ///
    /// `None` covers both "no such participant" and "the request failed";
    /// callers cannot tell the two apart.
    pub async fn search_participant_by_dni(&self, dni: &str) -> Option<Participant> {
        let result: Result<CodeEnvelope, ApiError> = self
            .transport
            .post("/api/users/search", &DniQuery { dni })
            .await;
        match result {
            Ok(envelope) => envelope.into_found(),
            Err(err) => {
                debug!(status = ?err.status_code, error = %err, "DNI search failed, reporting no match");
                None
            }
        }
    }

    // ---------------------------------------------------------------------
    // Assessments
    // ---------------------------------------------------------------------

    pub async fn save_assessment(&self, data: &Record) -> Result<Outcome<Record>, ApiError> {
        settle(self.transport.post("/api/save-assessment", data).await)
    }

    pub async fn get_records(&self) -> Result<Vec<Record>, ApiError> {
        self.read_list("/api/list-assessment", &[]).await
    }

    pub async fn get_assessments_by_participant(
        &self,
        participant_external_id: &str,
    ) -> Result<ParticipantAssessments, ApiError> {
        let path = format!(
            "/api/participants/{}/assessments",
            segment(participant_external_id)
        );
        self.read_code(&path, &[], PARTICIPANT_FAILED_MESSAGE).await
    }

    // ---------------------------------------------------------------------
    // Test forms
    // ---------------------------------------------------------------------

    pub async fn get_tests(&self) -> Result<Vec<TestListItem>, ApiError> {
        self.read_list("/api/list-test", &[]).await
    }

    pub async fn save_test(&self, data: &Record) -> Result<Outcome<Record>, ApiError> {
        settle(self.transport.post("/api/save-test", data).await)
    }

    pub async fn register_form(&self, data: &Record) -> Result<Outcome<Value>, ApiError> {
        settle(self.transport.post("/api/apply_test", data).await)
    }

    pub async fn get_tests_for_participant(
        &self,
        participant_external_id: &str,
    ) -> Result<Vec<Record>, ApiError> {
        self.read_list(
            "/api/list-tests-participant",
            &[("participant_external_id", participant_external_id)],
        )
        .await
    }

    /// Any `code` other than 200 is a failure, even on a 2xx transport status.
    pub async fn get_participant_progress(
        &self,
        participant_external_id: &str,
    ) -> Result<Record, ApiError> {
        self.read_code(
            "/api/participant-progress",
            &[("participant_external_id", participant_external_id)],
            PROGRESS_FAILED_MESSAGE,
        )
        .await
    }

    /// Uses the status envelope: anything but `"ok"` is a failure.
    pub async fn get_test_by_id(&self, external_id: &str) -> Result<Value, ApiError> {
        let path = format!("/api/get-test/{}", segment(external_id));
        let envelope: StatusEnvelope = self
            .transport
            .get_with_retry(&path, &[], self.read_attempts)
            .await?;
        Envelope::Status(envelope).into_payload(TEST_DETAIL_FAILED_MESSAGE)
    }

    pub async fn update_test(
        &self,
        test_external_id: &str,
        test: &Record,
    ) -> Result<Outcome<Record>, ApiError> {
        let body = UpdateTest {
            test_external_id,
            test,
        };
        settle(self.transport.put("/api/update-test", &body).await)
    }

    pub async fn delete_test(&self, external_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/delete-test/{}", segment(external_id));
        let envelope: CodeEnvelope = self.transport.delete(&path).await?;
        Envelope::Code(envelope).into_payload::<Value>(DELETE_FAILED_MESSAGE)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    async fn read_code<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        fallback: &str,
    ) -> Result<T, ApiError> {
        let envelope: CodeEnvelope = self
            .transport
            .get_with_retry(path, query, self.read_attempts)
            .await?;
        Envelope::Code(envelope).into_payload(fallback)
    }

    async fn read_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError> {
        let envelope: CodeEnvelope = self
            .transport
            .get_with_retry(path, query, self.read_attempts)
            .await?;
        if envelope.code != crate::envelope::CODE_OK {
            return Envelope::Code(envelope).into_payload(LIST_FAILED_MESSAGE);
        }
        envelope.into_list()
    }
}

/// Percent-encode an id so it stays one path segment.
fn segment(id: &str) -> Cow<'_, str> {
    urlencoding::encode(id)
}

/// Resolve a code-envelope mutation. Field errors, whether inside the
/// envelope or in an HTTP 400/422 body, come back as `Outcome::Invalid`.
fn settle<T: DeserializeOwned>(
    result: Result<CodeEnvelope, ApiError>,
) -> Result<Outcome<T>, ApiError> {
    match result {
        Ok(envelope) => envelope.into_outcome(),
        Err(err) if err.kind == ErrorKind::Validation => match err.field_errors() {
            Some(fields) => Ok(Outcome::Invalid(fields)),
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}
