//! In-memory stand-in for the dashboard backend.
//!
//! Speaks both envelope shapes exactly as the real service does: most
//! endpoints answer `{code, data, msg}`, `get-test` answers
//! `{status, data, msg}`. Envelope-level failures (validation, not found) are
//! sent with HTTP 200 except where the real backend uses the transport status
//! (DNI search, single-participant reads, test-form validation). Every `/api`
//! route except login requires a bearer token issued by login.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const DEMO_EMAIL: &str = "admin@example.com";
pub const DEMO_PASSWORD: &str = "admin123";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub apellido: String,
    #[serde(default)]
    pub dni: String,
    #[serde(default)]
    pub edad: u32,
    #[serde(default)]
    pub tipo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct DniBody {
    pub dni: String,
}

#[derive(Deserialize)]
pub struct ParticipantQuery {
    pub participant_external_id: String,
}

#[derive(Default)]
pub struct Store {
    tokens: HashSet<String>,
    next_id: u64,
    participants: HashMap<String, Participant>,
    assessments: Vec<Map<String, Value>>,
    tests: HashMap<String, Map<String, Value>>,
    // (participant_external_id, test_external_id)
    applied: HashSet<(String, String)>,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Token inválido o ausente")]
    Unauthorized,
    #[error("Credenciales inválidas")]
    BadCredentials,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{message}")]
    Invalid {
        message: &'static str,
        errors: HashMap<&'static str, &'static str>,
    },
    #[error("multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            BackendError::Unauthorized | BackendError::BadCredentials => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
            }
            BackendError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "code": 404, "msg": message })),
            )
                .into_response(),
            BackendError::Invalid { errors, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "message": message, "errors": errors })),
            )
                .into_response(),
            BackendError::Multipart(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
            }
        }
    }
}

fn code(code: u16, data: impl Serialize, msg: &str) -> Json<Value> {
    Json(json!({ "code": code, "data": data, "msg": msg }))
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));

    let protected = Router::new()
        .route("/api/users", get(list_participants).post(create_participant))
        .route("/api/users/search", post(search_by_dni))
        .route("/api/users/{id}", get(get_participant).put(update_participant))
        .route("/api/save-assessment", post(save_assessment))
        .route("/api/list-assessment", get(list_assessments))
        .route("/api/participants/{id}/assessments", get(participant_assessments))
        .route("/api/list-test", get(list_tests))
        .route("/api/save-test", post(save_test))
        .route("/api/apply_test", post(apply_test))
        .route("/api/list-tests-participant", get(tests_for_participant))
        .route("/api/participant-progress", get(participant_progress))
        .route("/api/get-test/{id}", get(get_test))
        .route("/api/update-test", put(update_test))
        .route("/api/delete-test/{id}", delete(delete_test))
        .route("/api/uploads", post(upload))
        .route_layer(middleware::from_fn_with_state(db.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .merge(protected)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_token(
    State(db): State<Db>,
    request: Request,
    next: Next,
) -> Result<Response, BackendError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    let authorized = match token {
        Some(token) => db.read().await.tokens.contains(&token),
        None => false,
    };
    if !authorized {
        return Err(BackendError::Unauthorized);
    }
    Ok(next.run(request).await)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn login(
    State(db): State<Db>,
    Json(body): Json<LoginBody>,
) -> Result<Json<Value>, BackendError> {
    if body.email != DEMO_EMAIL || body.password != DEMO_PASSWORD {
        return Err(BackendError::BadCredentials);
    }
    let token = Uuid::new_v4().to_string();
    db.write().await.tokens.insert(token.clone());
    info!(email = %body.email, "issued token");
    Ok(Json(json!({ "token": token, "user": { "email": body.email } })))
}

fn validate_participant(p: &Participant) -> HashMap<&'static str, &'static str> {
    let mut errors = HashMap::new();
    if p.nombre.trim().is_empty() {
        errors.insert("nombre", "El nombre es obligatorio");
    }
    if p.apellido.trim().is_empty() {
        errors.insert("apellido", "El apellido es obligatorio");
    }
    if p.dni.len() != 10 || !p.dni.chars().all(|c| c.is_ascii_digit()) {
        errors.insert("dni", "El DNI debe tener 10 dígitos");
    }
    if p.edad == 0 {
        errors.insert("edad", "La edad debe ser mayor a 0");
    }
    errors
}

async fn list_participants(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let participants: Vec<&Participant> = store.participants.values().collect();
    code(200, participants, "OK")
}

async fn create_participant(
    State(db): State<Db>,
    Json(mut input): Json<Participant>,
) -> Json<Value> {
    let errors = validate_participant(&input);
    if !errors.is_empty() {
        return code(400, errors, "Errores de validación");
    }
    let mut store = db.write().await;
    if store.participants.values().any(|p| p.dni == input.dni) {
        return code(400, json!({ "dni": "El DNI ya está registrado" }), "Errores de validación");
    }
    store.next_id += 1;
    let external_id = Uuid::new_v4().to_string();
    input.id = Some(store.next_id);
    input.external_id = Some(external_id.clone());
    input.estado.get_or_insert_with(|| "ACTIVO".to_string());
    store.participants.insert(external_id, input.clone());
    code(200, input, "Participante creado")
}

async fn get_participant(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>, BackendError> {
    let store = db.read().await;
    let participant = store
        .participants
        .get(&id)
        .ok_or(BackendError::NotFound("Participante no encontrado"))?;
    Ok(code(200, participant, "OK"))
}

async fn update_participant(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(mut input): Json<Participant>,
) -> Json<Value> {
    let errors = validate_participant(&input);
    if !errors.is_empty() {
        return code(400, errors, "Errores de validación");
    }
    let mut store = db.write().await;
    let Some(existing) = store.participants.get_mut(&id) else {
        return code(404, Value::Null, "Participante no encontrado");
    };
    input.id = existing.id;
    input.external_id = existing.external_id.clone();
    if input.estado.is_none() {
        input.estado = existing.estado.clone();
    }
    *existing = input.clone();
    code(200, input, "Participante actualizado")
}

async fn search_by_dni(
    State(db): State<Db>,
    Json(body): Json<DniBody>,
) -> Result<Json<Value>, BackendError> {
    let store = db.read().await;
    let participant = store
        .participants
        .values()
        .find(|p| p.dni == body.dni)
        .ok_or(BackendError::NotFound("Participante no encontrado"))?;
    Ok(code(200, participant, "OK"))
}

async fn save_assessment(
    State(db): State<Db>,
    Json(mut input): Json<Map<String, Value>>,
) -> Json<Value> {
    let mut store = db.write().await;
    let participant = input
        .get("participant_external_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    match participant {
        Some(id) if store.participants.contains_key(&id) => {
            input.insert("external_id".to_string(), json!(Uuid::new_v4().to_string()));
            store.assessments.push(input.clone());
            code(200, input, "Evaluación registrada")
        }
        Some(_) => code(404, Value::Null, "Participante no encontrado"),
        None => code(
            400,
            json!({ "participant_external_id": "El participante es obligatorio" }),
            "Errores de validación",
        ),
    }
}

async fn list_assessments(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    code(200, &store.assessments, "OK")
}

async fn participant_assessments(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>, BackendError> {
    let store = db.read().await;
    let participant = store
        .participants
        .get(&id)
        .ok_or(BackendError::NotFound("Participante no encontrado"))?;
    let assessments: Vec<&Map<String, Value>> = store
        .assessments
        .iter()
        .filter(|a| a.get("participant_external_id").and_then(Value::as_str) == Some(id.as_str()))
        .collect();
    Ok(code(
        200,
        json!({ "participant": participant, "assessments": assessments }),
        "OK",
    ))
}

async fn list_tests(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    let tests: Vec<Value> = store
        .tests
        .values()
        .map(|test| {
            let mut item = test.clone();
            item.insert("already_done".to_string(), json!(0));
            Value::Object(item)
        })
        .collect();
    code(200, tests, "OK")
}

async fn save_test(
    State(db): State<Db>,
    Json(mut input): Json<Map<String, Value>>,
) -> Result<Json<Value>, BackendError> {
    let named = input
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !named {
        return Err(BackendError::Invalid {
            message: "Datos del test inválidos",
            errors: HashMap::from([("name", "El nombre del test es obligatorio")]),
        });
    }
    let external_id = Uuid::new_v4().to_string();
    input.insert("external_id".to_string(), json!(external_id));
    db.write().await.tests.insert(external_id, input.clone());
    Ok(code(200, input, "Test registrado"))
}

async fn apply_test(State(db): State<Db>, Json(input): Json<Map<String, Value>>) -> Json<Value> {
    let field = |name: &str| input.get(name).and_then(Value::as_str).map(str::to_string);
    let (Some(participant), Some(test)) = (
        field("participant_external_id"),
        field("test_external_id"),
    ) else {
        return code(
            400,
            json!({ "test_external_id": "Participante y test son obligatorios" }),
            "Errores de validación",
        );
    };
    let mut store = db.write().await;
    if !store.participants.contains_key(&participant) || !store.tests.contains_key(&test) {
        return code(404, Value::Null, "Participante o test no encontrado");
    }
    store.applied.insert((participant, test));
    code(200, Value::Null, "Test aplicado")
}

async fn tests_for_participant(
    State(db): State<Db>,
    Query(query): Query<ParticipantQuery>,
) -> Json<Value> {
    let store = db.read().await;
    let tests: Vec<Value> = store
        .tests
        .iter()
        .map(|(id, test)| {
            let done = store
                .applied
                .contains(&(query.participant_external_id.clone(), id.clone()));
            let mut item = test.clone();
            item.insert("already_done".to_string(), json!(u8::from(done)));
            Value::Object(item)
        })
        .collect();
    code(200, tests, "OK")
}

async fn participant_progress(
    State(db): State<Db>,
    Query(query): Query<ParticipantQuery>,
) -> Json<Value> {
    let store = db.read().await;
    let id = &query.participant_external_id;
    if !store.participants.contains_key(id) {
        return code(404, Value::Null, "Participante no encontrado");
    }
    let completed = store.applied.iter().filter(|(p, _)| p == id).count();
    code(
        200,
        json!({
            "participant_external_id": id,
            "completed_tests": completed,
            "total_tests": store.tests.len(),
        }),
        "OK",
    )
}

async fn get_test(State(db): State<Db>, Path(id): Path<String>) -> Json<Value> {
    let store = db.read().await;
    match store.tests.get(&id) {
        Some(test) => Json(json!({ "status": "ok", "data": test, "msg": "OK" })),
        None => Json(json!({ "status": "error", "msg": "not found" })),
    }
}

async fn update_test(
    State(db): State<Db>,
    Json(mut input): Json<Map<String, Value>>,
) -> Json<Value> {
    let Some(id) = input
        .remove("test_external_id")
        .and_then(|id| id.as_str().map(str::to_string))
    else {
        return code(
            400,
            json!({ "test_external_id": "El test es obligatorio" }),
            "Errores de validación",
        );
    };
    let mut store = db.write().await;
    let Some(test) = store.tests.get_mut(&id) else {
        return code(404, Value::Null, "Test no encontrado");
    };
    test.extend(input);
    test.insert("external_id".to_string(), json!(id));
    code(200, test.clone(), "Test actualizado")
}

async fn delete_test(State(db): State<Db>, Path(id): Path<String>) -> Json<Value> {
    let mut store = db.write().await;
    if store.tests.remove(&id).is_none() {
        return code(404, Value::Null, "Test no encontrado");
    }
    store.applied.retain(|(_, test)| test != &id);
    code(200, Value::Null, "Test eliminado")
}

async fn upload(mut multipart: Multipart) -> Result<Json<Value>, BackendError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(code(
            200,
            json!({ "file_name": file_name, "size": bytes.len() }),
            "Archivo recibido",
        ));
    }
    Ok(code(400, json!({ "file": "Archivo requerido" }), "Errores de validación"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(dni: &str) -> Participant {
        Participant {
            id: None,
            external_id: None,
            nombre: "Ana".to_string(),
            apellido: "Pérez".to_string(),
            dni: dni.to_string(),
            edad: 20,
            tipo: "ESTUDIANTE".to_string(),
            correo: None,
            telefono: None,
            direccion: None,
            estado: None,
        }
    }

    #[test]
    fn valid_participant_has_no_errors() {
        assert!(validate_participant(&participant("0102030405")).is_empty());
    }

    #[test]
    fn dni_must_be_ten_digits() {
        let errors = validate_participant(&participant("12ab"));
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key("dni"));
    }

    #[test]
    fn participant_optional_fields_are_omitted() {
        let json = serde_json::to_value(participant("0102030405")).unwrap();
        assert!(json.get("correo").is_none());
        assert_eq!(json["tipo"], "ESTUDIANTE");
    }

    #[test]
    fn code_envelope_shape() {
        let Json(body) = code(400, json!({"dni": "x"}), "Errores de validación");
        assert_eq!(body["code"], 400);
        assert_eq!(body["data"]["dni"], "x");
        assert_eq!(body["msg"], "Errores de validación");
    }

    #[test]
    fn not_found_error_carries_code_envelope() {
        let resp = BackendError::NotFound("Participante no encontrado").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
