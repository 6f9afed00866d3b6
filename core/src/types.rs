//! Domain DTOs exchanged with the backend.
//!
//! # Design
//! Participants and logins are fully typed. Assessment and test-form bodies
//! are owned by the form components and only passed through, so they stay as
//! JSON objects (`Record`); the few fields the client itself reads are
//! lifted into typed wrappers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A JSON object passed through without interpretation.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantKind {
    Estudiante,
    Docente,
    Administrativo,
    Externo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantState {
    Activo,
    Inactivo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub nombre: String,
    pub apellido: String,
    pub dni: String,
    pub edad: u32,
    pub tipo: ParticipantKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<ParticipantState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login. Anything besides the token is kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(flatten)]
    pub extra: Record,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantAssessments {
    pub participant: Participant,
    #[serde(default)]
    pub assessments: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestListItem {
    #[serde(default)]
    pub external_id: Option<String>,
    /// The backend sends 0/1, booleans or nothing.
    #[serde(default, deserialize_with = "truthy")]
    pub already_done: bool,
    #[serde(flatten)]
    pub details: Record,
}

/// Body of `PUT /api/update-test`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateTest<'a> {
    pub test_external_id: &'a str,
    #[serde(flatten)]
    pub test: &'a Record,
}

#[derive(Debug, Clone, Serialize)]
pub struct DniQuery<'a> {
    pub dni: &'a str,
}

/// JavaScript-style truthiness: `null`, `false`, `0`, `""` are false.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn participant_wire_names() {
        let p: Participant = serde_json::from_value(json!({
            "external_id": "p-1",
            "nombre": "Ana",
            "apellido": "Pérez",
            "dni": "0102030405",
            "edad": 20,
            "tipo": "ESTUDIANTE",
            "estado": "ACTIVO"
        }))
        .unwrap();
        assert_eq!(p.tipo, ParticipantKind::Estudiante);
        assert_eq!(p.estado, Some(ParticipantState::Activo));

        let back = serde_json::to_value(&p).unwrap();
        assert!(back.get("id").is_none());
        assert!(back.get("correo").is_none());
        assert_eq!(back["tipo"], "ESTUDIANTE");
    }

    #[test]
    fn already_done_is_coerced() {
        let cases = [
            (json!(1), true),
            (json!(0), false),
            (json!(true), true),
            (json!(null), false),
            (json!("x"), true),
            (json!(""), false),
        ];
        for (raw, expected) in cases {
            let item: TestListItem =
                serde_json::from_value(json!({"external_id": "t", "already_done": raw})).unwrap();
            assert_eq!(item.already_done, expected, "{raw}");
        }
        let missing: TestListItem = serde_json::from_value(json!({"name": "Test"})).unwrap();
        assert!(!missing.already_done);
        assert_eq!(missing.details["name"], "Test");
    }

    #[test]
    fn update_test_flattens_payload() {
        let mut test = Record::new();
        test.insert("name".to_string(), json!("Resistencia"));
        let body = serde_json::to_value(UpdateTest {
            test_external_id: "t-9",
            test: &test,
        })
        .unwrap();
        assert_eq!(body, json!({"test_external_id": "t-9", "name": "Resistencia"}));
    }

    #[test]
    fn login_keeps_extra_fields() {
        let login: LoginResponse =
            serde_json::from_value(json!({"token": "abc", "user": {"email": "a@b.c"}})).unwrap();
        assert_eq!(login.token, "abc");
        assert_eq!(login.extra["user"]["email"], "a@b.c");
    }
}
