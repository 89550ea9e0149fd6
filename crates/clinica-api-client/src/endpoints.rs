//! Backend route paths, relative to the API base url.

use url::form_urlencoded;

use crate::models::{PacientePage, PacienteSearch};

pub const TOKEN_PATH: &str = "/token";
pub const ME_PATH: &str = "/me";
pub const PACIENTES_PATH: &str = "/pacientes";
pub const PACIENTES_SEARCH_PATH: &str = "/pacientes/buscar/query";
pub const USUARIOS_PATH: &str = "/usuarios";
pub const HEALTH_PATH: &str = "/health";
pub const ESTADISTICAS_PATH: &str = "/estadisticas";

#[must_use]
pub fn paciente_path(documento: &str) -> String {
    format!("{PACIENTES_PATH}/{}", encode_segment(documento))
}

#[must_use]
pub fn paciente_pdf_path(documento: &str) -> String {
    format!("{}/pdf", paciente_path(documento))
}

#[must_use]
pub fn pacientes_page_path(page: &PacientePage) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("limit", &page.limit.to_string())
        .append_pair("offset", &page.offset.to_string())
        .finish();
    format!("{PACIENTES_PATH}?{query}")
}

/// Blank filters are left out of the query.
#[must_use]
pub fn pacientes_search_path(search: &PacienteSearch) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if let Some(nombre) = non_blank(search.nombre.as_deref()) {
        query.append_pair("nombre", nombre);
    }
    if let Some(documento) = non_blank(search.documento.as_deref()) {
        query.append_pair("documento", documento);
    }
    query.append_pair("limit", &search.limit.to_string());
    format!("{PACIENTES_SEARCH_PATH}?{}", query.finish())
}

#[must_use]
pub fn usuarios_path(limit: u32) -> String {
    format!("{USUARIOS_PATH}?limit={limit}")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn encode_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.trim().as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
