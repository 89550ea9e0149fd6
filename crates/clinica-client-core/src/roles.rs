use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Medico,
    Admisionista,
    Resultados,
    Paciente,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Medico,
        Role::Admisionista,
        Role::Resultados,
        Role::Paciente,
    ];

    /// Roles allowed to read every patient record.
    pub const STAFF: [Role; 4] = [
        Role::Admin,
        Role::Medico,
        Role::Admisionista,
        Role::Resultados,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Medico => "medico",
            Self::Admisionista => "admisionista",
            Self::Resultados => "resultados",
            Self::Paciente => "paciente",
        }
    }

    #[must_use]
    pub fn is_staff(self) -> bool {
        !matches!(self, Self::Paciente)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| UnknownRole(raw.to_string()))
    }
}
