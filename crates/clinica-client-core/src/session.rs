use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Stored profile of the signed-in user, as returned by the backend `Usuario` model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub rol: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documento_vinculado: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombres: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apellidos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activo: Option<bool>,
}

impl SessionUser {
    pub fn new(id: i64, username: impl Into<String>, rol: Role) -> Self {
        Self {
            id,
            username: username.into(),
            rol,
            documento_vinculado: None,
            nombres: None,
            apellidos: None,
            activo: None,
        }
    }

    #[must_use]
    pub fn with_documento_vinculado(mut self, documento: impl Into<String>) -> Self {
        self.documento_vinculado = Some(documento.into());
        self
    }

    pub fn has_id(&self) -> bool {
        self.id != 0
    }

    pub fn display_name(&self) -> String {
        match (self.nombres.as_deref(), self.apellidos.as_deref()) {
            (Some(nombres), Some(apellidos)) => format!("{nombres} {apellidos}"),
            (Some(nombres), None) => nombres.to_string(),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: SessionUser,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_backend_usuario_ignoring_unknown_fields() {
        let user: SessionUser = serde_json::from_str(
            r#"{
                "id": 7,
                "username": "paciente_juan",
                "rol": "paciente",
                "documento_vinculado": "12345",
                "activo": true,
                "fecha_creacion": "2024-01-01T00:00:00",
                "ultimo_acceso": null
            }"#,
        )
        .expect("usuario parses");

        assert_eq!(user.id, 7);
        assert_eq!(user.rol, Role::Paciente);
        assert_eq!(user.documento_vinculado.as_deref(), Some("12345"));
        assert_eq!(user.display_name(), "paciente_juan");
    }

    #[test]
    fn display_name_prefers_full_name() {
        let mut user = SessionUser::new(1, "dr_rodriguez", Role::Medico);
        user.nombres = Some("Carlos".to_string());
        user.apellidos = Some("Rodriguez".to_string());
        assert_eq!(user.display_name(), "Carlos Rodriguez");
    }
}
