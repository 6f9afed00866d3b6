//! Transport and facade behaviour against scripted backends.

use std::sync::Arc;
use std::time::Duration;

use dashboard_core::client::PROGRESS_FAILED_MESSAGE;
use dashboard_core::{
    ClientConfig, DashboardClient, ErrorKind, MemoryCredentialStore, Outcome, Participant,
    ParticipantKind, RedirectReceiver, Session,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(base_url: &str, token: Option<&str>) -> (DashboardClient, RedirectReceiver) {
    let store = match token {
        Some(token) => MemoryCredentialStore::with_token(token),
        None => MemoryCredentialStore::new(),
    };
    let (session, redirects) = Session::new(Arc::new(store));
    let client = DashboardClient::new(ClientConfig::new(base_url), session)
        .unwrap()
        .with_read_attempts(1);
    (client, redirects)
}

fn participant() -> Participant {
    Participant {
        id: None,
        external_id: None,
        nombre: "Ana".to_string(),
        apellido: "Pérez".to_string(),
        dni: "0102030405".to_string(),
        edad: 20,
        tipo: ParticipantKind::Docente,
        correo: None,
        telefono: None,
        direccion: None,
        estado: None,
    }
}

#[tokio::test]
async fn bearer_credential_is_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200, "data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok-1"));
    assert!(client.get_participants().await.unwrap().is_empty());
}

#[tokio::test]
async fn timeout_is_a_connectivity_failure() {
    let server = MockServer::start().await;
    Mock::given(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (session, _redirects) = Session::in_memory();
    let config = ClientConfig::new(&server.uri()).with_timeout(Duration::from_millis(100));
    let client = DashboardClient::new(config, session)
        .unwrap()
        .with_read_attempts(1);

    let err = client.get_participants().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Connectivity);
    assert_eq!(err.status_code, None);
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn concurrent_401s_expire_the_session_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;

    let (client, mut redirects) = client_for(&server.uri(), Some("tok-1"));
    let (a, b, c) = tokio::join!(
        client.get_participants(),
        client.get_records(),
        client.get_tests(),
    );

    for err in [a.unwrap_err(), b.unwrap_err(), c.unwrap_err()] {
        assert_eq!(err.kind, ErrorKind::Authorization);
    }
    assert!(client.session().credential().is_none());
    assert!(redirects.try_recv().is_ok());
    assert!(redirects.try_recv().is_err());
}

#[tokio::test]
async fn status_envelope_error_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(path("/api/get-test/t-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "error", "msg": "not found"})),
        )
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    let err = client.get_test_by_id("t-1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Envelope);
    assert_eq!(err.message, "not found");
}

#[tokio::test]
async fn code_envelope_failure_without_msg_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(path("/api/participant-progress"))
        .and(query_param("participant_external_id", "p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 404})))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    let err = client.get_participant_progress("p-1").await.unwrap_err();
    assert_eq!(err.status_code, Some(404));
    assert_eq!(err.message, PROGRESS_FAILED_MESSAGE);
}

#[tokio::test]
async fn dni_search_swallows_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/search"))
        .and(body_json(json!({"dni": "0102030405"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    assert!(client.search_participant_by_dni("0102030405").await.is_none());

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (offline, _) = client_for(&format!("http://{addr}"), Some("tok"));
    assert!(offline.search_participant_by_dni("0102030405").await.is_none());
}

#[tokio::test]
async fn reads_are_retried_and_writes_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/list-test"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    let client = client.with_read_attempts(2);

    let err = client.get_tests().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerFault);
    assert_eq!(err.status_code, Some(503));

    let err = client.create_participant(&participant()).await.unwrap_err();
    assert_eq!(err.status_code, Some(503));
}

#[tokio::test]
async fn http_400_with_errors_is_a_validation_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Datos inválidos",
            "errors": {"dni": "El DNI ya está registrado"}
        })))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    match client.create_participant(&participant()).await.unwrap() {
        Outcome::Invalid(fields) => assert_eq!(fields["dni"], "El DNI ya está registrado"),
        Outcome::Saved(p) => panic!("unexpected save: {p:?}"),
    }
}

#[tokio::test]
async fn unmapped_status_gets_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    let err = client.delete_test("t-1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Http);
    assert_eq!(err.message, "Error 409: Request failed with status code 409");
}

#[tokio::test]
async fn expired_session_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (client, mut redirects) = client_for(&server.uri(), Some("tok-1"));
    let client = client.with_read_attempts(3);

    let started = std::time::Instant::now();
    let err = client.get_participants().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(redirects.try_recv().is_ok());
}

#[tokio::test]
async fn ids_are_sent_as_single_path_segments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/get-test/a%3Fb%2Fc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "data": {"name": "x"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/delete-test/t%231"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client_for(&server.uri(), Some("tok"));
    let detail = client.get_test_by_id("a?b/c").await.unwrap();
    assert_eq!(detail["name"], "x");
    client.delete_test("t#1").await.unwrap();
}
