use clinica_client_core::{Role, SessionUser};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_USUARIOS_LIMIT: u32 = 50;

pub const TIPOS_DOCUMENTO: &[&str] = &["CC", "TI", "CE", "PA", "RC"];
pub const GRUPOS_SANGUINEOS: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const TIPOS_ATENCION: &[&str] = &[
    "Urgencias",
    "Consulta Externa",
    "Hospitalizacion",
    "Cirugia",
    "Procedimiento",
];

const PACIENTE_CHOICES: [(&str, &[&str]); 3] = [
    ("tipo_documento", TIPOS_DOCUMENTO),
    ("grupo_sanguineo", GRUPOS_SANGUINEOS),
    ("tipo_atencion", TIPOS_ATENCION),
];

/// A patient field holding a value outside the backend's enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidChoice {
    pub field: &'static str,
    pub value: String,
    pub allowed: &'static [&'static str],
}

/// First enumerated field of a patient payload whose value the backend would
/// reject. Absent and `null` fields pass.
pub fn invalid_paciente_choice(paciente: &Value) -> Option<InvalidChoice> {
    PACIENTE_CHOICES.iter().find_map(|&(field, allowed)| {
        let value = paciente.get(field)?;
        if value.is_null() || value.as_str().is_some_and(|choice| allowed.contains(&choice)) {
            return None;
        }
        Some(InvalidChoice {
            field,
            value: value.as_str().map_or_else(|| value.to_string(), str::to_string),
            allowed,
        })
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: SessionUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct UsuarioCreate {
    pub username: String,
    pub password: String,
    pub rol: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombres: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apellidos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documento_vinculado: Option<String>,
}

/// Offset pagination for `GET /pacientes`; the limit is kept within `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacientePage {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PacientePage {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl PacientePage {
    #[must_use]
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: clamp_limit(limit),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacienteSearch {
    pub nombre: Option<String>,
    pub documento: Option<String>,
    pub limit: u32,
}

impl Default for PacienteSearch {
    fn default() -> Self {
        Self {
            nombre: None,
            documento: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PacienteSearch {
    #[must_use]
    pub fn by_nombre(nombre: impl Into<String>) -> Self {
        Self {
            nombre: Some(nombre.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn by_documento(documento: impl Into<String>) -> Self {
        Self {
            documento: Some(documento.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = clamp_limit(limit);
        self
    }
}

pub(crate) fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn paciente_choices_follow_backend_enumerations() {
        let valid = json!({
            "documento": "12345",
            "tipo_documento": "CC",
            "grupo_sanguineo": "AB-",
            "tipo_atencion": "Consulta Externa",
        });
        assert_eq!(invalid_paciente_choice(&valid), None);
        assert_eq!(
            invalid_paciente_choice(&json!({ "grupo_sanguineo": null, "nombres": "Ana" })),
            None
        );

        let wrong = invalid_paciente_choice(&json!({ "tipo_documento": "NIT" }))
            .expect("unknown document type");
        assert_eq!(wrong.field, "tipo_documento");
        assert_eq!(wrong.value, "NIT");
        assert_eq!(wrong.allowed, TIPOS_DOCUMENTO);

        let numeric = invalid_paciente_choice(&json!({ "tipo_atencion": 3 }))
            .expect("non-string choice");
        assert_eq!(numeric.field, "tipo_atencion");
        assert_eq!(numeric.value, "3");
    }

    #[test]
    fn token_response_accepts_backend_usuario_shape() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "a.b.c",
            "token_type": "bearer",
            "expires_in": 1800,
            "user": {
                "id": 3,
                "username": "admisionista1",
                "rol": "admisionista",
                "nombres": "Ana",
                "apellidos": null,
                "documento_vinculado": null,
                "activo": true,
                "fecha_creacion": "2024-01-10T08:00:00",
                "ultimo_acceso": null
            }
        }))
        .expect("token response");

        assert_eq!(response.expires_in, Some(1_800));
        assert_eq!(response.user.rol, Role::Admisionista);
        assert_eq!(response.user.display_name(), "Ana");
    }

    #[test]
    fn page_limits_are_clamped() {
        assert_eq!(PacientePage::new(0, 5), PacientePage { limit: 1, offset: 5 });
        assert_eq!(PacientePage::new(500, 0).limit, MAX_PAGE_LIMIT);
        assert_eq!(PacienteSearch::by_nombre("Juan").with_limit(0).limit, 1);
    }

    #[test]
    fn usuario_create_omits_absent_fields() {
        let body = serde_json::to_value(UsuarioCreate {
            username: "paciente_juan".to_string(),
            password: "secreto123".to_string(),
            rol: Role::Paciente,
            nombres: None,
            apellidos: None,
            documento_vinculado: Some("12345".to_string()),
        })
        .expect("encode");
        assert_eq!(
            body,
            json!({
                "username": "paciente_juan",
                "password": "secreto123",
                "rol": "paciente",
                "documento_vinculado": "12345"
            })
        );
    }
}
