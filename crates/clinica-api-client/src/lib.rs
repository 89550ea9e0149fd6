//! Authenticated HTTP client for the clinica records backend.
//!
//! Every call goes through one retry loop: 5xx responses and transport
//! failures are retried with linear backoff, a 401 ends the session and sends
//! the user to the login route, and other error statuses are returned at once
//! with the backend's `detail` message.

pub mod endpoints;
pub mod error;
pub mod models;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clinica_client_core::config::normalize_base_url;
use clinica_client_core::{ClinicaSession, SessionUser};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

pub use error::{ApiClientError, Result};
pub use models::{
    DEFAULT_PAGE_LIMIT, DEFAULT_USUARIOS_LIMIT, GRUPOS_SANGUINEOS, InvalidChoice, LoginRequest,
    MAX_PAGE_LIMIT, PacientePage, PacienteSearch, TIPOS_ATENCION, TIPOS_DOCUMENTO, TokenResponse,
    UsuarioCreate, invalid_paciente_choice,
};

pub const DEFAULT_DOWNLOAD_FILENAME: &str = "download";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnUnauthorized {
    ExpireSession,
    RejectCredentials,
}

struct RawResponse {
    status: StatusCode,
    body: Vec<u8>,
}

#[derive(Clone)]
pub struct ClinicaApiClient {
    base_url: String,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    http: reqwest::Client,
    session: Arc<ClinicaSession>,
}

impl ClinicaApiClient {
    pub fn new(session: Arc<ClinicaSession>) -> Result<Self> {
        let api = &session.config().api;
        let base_url = normalize_base_url(&api.base_url)?;
        let timeout = api.timeout();
        let retry_attempts = api.retry_attempts.max(1);
        let retry_delay = api.retry_delay();
        Ok(Self {
            base_url,
            timeout,
            retry_attempts,
            retry_delay,
            http: reqwest::Client::new(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<ClinicaSession> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    /// Sends `method endpoint` with retries.
    ///
    /// `Ok(None)` means the backend rejected the session: credentials were
    /// cleared and the navigator was sent to the login route.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let outcome = self.request_inner(&method, endpoint, body).await;
        if let Err(error) = &outcome {
            tracing::error!(%method, endpoint, %error, "request failed");
        }
        outcome
    }

    pub async fn get(&self, endpoint: &str) -> Result<Option<Value>> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Option<Value>> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: &Value) -> Result<Option<Value>> {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Option<Value>> {
        self.request(Method::DELETE, endpoint, None).await
    }

    pub async fn get_json<T>(&self, endpoint: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let value = self.get(endpoint).await?;
        decode_value(value)
    }

    pub async fn post_json<Req, Res>(&self, endpoint: &str, payload: &Req) -> Result<Option<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let body = encode_value(payload)?;
        let value = self.post(endpoint, &body).await?;
        decode_value(value)
    }

    /// Saves the raw body as `destination/filename` (`download` by default).
    ///
    /// Only the final path component of `filename` is used.
    pub async fn download_file(
        &self,
        endpoint: &str,
        destination: &Path,
        filename: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let outcome = self.download_inner(endpoint, destination, filename).await;
        if let Err(error) = &outcome {
            tracing::error!(endpoint, %error, "download failed");
        }
        outcome
    }

    /// Exchanges credentials for a token, saves the session and starts
    /// presence tracking. A rejected login leaves the stored session untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let body = encode_value(&LoginRequest {
            username: username.trim().to_string(),
            password: password.to_string(),
        })?;
        let response = self
            .send(
                &Method::POST,
                endpoints::TOKEN_PATH,
                Some(&body),
                OnUnauthorized::RejectCredentials,
            )
            .await
            .inspect_err(|error| tracing::warn!(username, %error, "login failed"))?
            .ok_or_else(|| ApiClientError::InvalidCredentials {
                message: http_status_message(StatusCode::UNAUTHORIZED),
            })?;
        if !response.status.is_success() {
            return Err(status_error(response.status, &response.body));
        }

        let token = serde_json::from_slice::<TokenResponse>(&response.body).map_err(|error| {
            ApiClientError::Decode {
                message: error.to_string(),
            }
        })?;
        self.session.tokens().save(&token.access_token, &token.user)?;
        if !self.session.start_presence() {
            tracing::debug!(username, "presence tracking not started");
        }
        tracing::info!(username = %token.user.username, rol = %token.user.rol, "signed in");
        Ok(token)
    }

    /// Erases the local session and returns to the login route.
    pub fn logout(&self) -> Result<()> {
        self.session.clear()?;
        self.session.navigator().navigate(self.session.login_route());
        Ok(())
    }

    pub async fn me(&self) -> Result<Option<SessionUser>> {
        self.get_json(endpoints::ME_PATH).await
    }

    pub async fn list_pacientes(&self, page: PacientePage) -> Result<Option<Value>> {
        let page = PacientePage::new(page.limit, page.offset);
        self.get(&endpoints::pacientes_page_path(&page)).await
    }

    pub async fn get_paciente(&self, documento: &str) -> Result<Option<Value>> {
        self.get(&endpoints::paciente_path(documento)).await
    }

    pub async fn search_pacientes(&self, search: &PacienteSearch) -> Result<Option<Value>> {
        self.get(&endpoints::pacientes_search_path(search)).await
    }

    pub async fn create_paciente(&self, paciente: &Value) -> Result<Option<Value>> {
        self.post(endpoints::PACIENTES_PATH, paciente).await
    }

    pub async fn update_paciente(&self, documento: &str, changes: &Value) -> Result<Option<Value>> {
        self.put(&endpoints::paciente_path(documento), changes).await
    }

    pub async fn delete_paciente(&self, documento: &str) -> Result<Option<Value>> {
        self.delete(&endpoints::paciente_path(documento)).await
    }

    /// Saves the clinical history PDF as `historia_<documento>.pdf`.
    pub async fn download_paciente_pdf(
        &self,
        documento: &str,
        destination: &Path,
    ) -> Result<Option<PathBuf>> {
        let filename = format!("historia_{}.pdf", documento.trim());
        self.download_file(
            &endpoints::paciente_pdf_path(documento),
            destination,
            Some(&filename),
        )
        .await
    }

    pub async fn list_usuarios(&self, limit: u32) -> Result<Option<Value>> {
        self.get(&endpoints::usuarios_path(models::clamp_limit(limit)))
            .await
    }

    pub async fn create_usuario(&self, usuario: &UsuarioCreate) -> Result<Option<SessionUser>> {
        self.post_json(endpoints::USUARIOS_PATH, usuario).await
    }

    pub async fn health(&self) -> Result<Option<Value>> {
        self.get(endpoints::HEALTH_PATH).await
    }

    pub async fn estadisticas(&self) -> Result<Option<Value>> {
        self.get(endpoints::ESTADISTICAS_PATH).await
    }

    async fn request_inner(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let Some(response) = self
            .send(method, endpoint, body, OnUnauthorized::ExpireSession)
            .await?
        else {
            return Ok(None);
        };
        if !response.status.is_success() {
            return Err(status_error(response.status, &response.body));
        }
        decode_body(&response.body).map(Some)
    }

    async fn download_inner(
        &self,
        endpoint: &str,
        destination: &Path,
        filename: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let Some(response) = self
            .send(&Method::GET, endpoint, None, OnUnauthorized::ExpireSession)
            .await?
        else {
            return Ok(None);
        };
        if !response.status.is_success() {
            let message = http_status_message(response.status);
            return Err(if response.status.is_server_error() {
                ApiClientError::Server {
                    status: response.status,
                    message,
                }
            } else {
                ApiClientError::Client {
                    status: response.status,
                    message,
                }
            });
        }

        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|error| io_error(destination, &error))?;
        let path = destination.join(download_filename(filename));
        tokio::fs::write(&path, &response.body)
            .await
            .map_err(|error| io_error(&path, &error))?;
        tracing::info!(path = %path.display(), bytes = response.body.len(), "file downloaded");
        Ok(Some(path))
    }

    /// The retry loop shared by every call. Returns the first response that
    /// is neither a 401 nor a retryable 5xx; `None` after a session expiry.
    async fn send(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&Value>,
        on_unauthorized: OnUnauthorized,
    ) -> Result<Option<RawResponse>> {
        let url = self.endpoint(endpoint).ok_or(ApiClientError::InvalidPath)?;
        let mut attempt: u32 = 1;

        loop {
            let retry_reason = match self.attempt(method, &url, body).await {
                Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                    return match on_unauthorized {
                        OnUnauthorized::ExpireSession => {
                            tracing::warn!(%method, endpoint, "token expired or rejected");
                            self.session.expire_session();
                            Ok(None)
                        }
                        OnUnauthorized::RejectCredentials => {
                            Err(ApiClientError::InvalidCredentials {
                                message: error_message(response.status, &response.body),
                            })
                        }
                    };
                }
                Ok(response)
                    if response.status.is_server_error() && attempt < self.retry_attempts =>
                {
                    http_status_message(response.status)
                }
                Ok(response) => return Ok(Some(response)),
                Err(error) if attempt < self.retry_attempts => error.to_string(),
                Err(error) => return Err(error),
            };

            let delay = retry_delay_for(self.retry_delay, attempt);
            tracing::warn!(
                %method,
                endpoint,
                attempt,
                max_attempts = self.retry_attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout);
        if let Some(token) = self.session.tokens().token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ApiClientError::from_reqwest(&error))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|error| {
            if error.is_timeout() {
                ApiClientError::Timeout
            } else {
                ApiClientError::Read {
                    message: error.to_string(),
                }
            }
        })?;
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Delay before retrying after the 1-based `attempt` failed.
#[must_use]
pub fn retry_delay_for(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// The backend's `detail` field, or `HTTP <status>` when there is none.
pub fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned())
        .and_then(|detail| match detail {
            Value::Null => None,
            Value::String(message) => Some(message.trim().to_string()),
            other => Some(other.to_string()),
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| http_status_message(status))
}

pub fn status_error(status: StatusCode, body: &[u8]) -> ApiClientError {
    let message = error_message(status, body);
    if status.is_server_error() {
        ApiClientError::Server { status, message }
    } else {
        ApiClientError::Client { status, message }
    }
}

fn http_status_message(status: StatusCode) -> String {
    format!("HTTP {}", status.as_u16())
}

fn decode_body(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|error| ApiClientError::Decode {
        message: error.to_string(),
    })
}

fn decode_value<T>(value: Option<Value>) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(|error| ApiClientError::Decode {
            message: error.to_string(),
        })
}

fn encode_value<T>(payload: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    serde_json::to_value(payload).map_err(|error| ApiClientError::Encode {
        message: error.to_string(),
    })
}

fn download_filename(filename: Option<&str>) -> &str {
    filename
        .and_then(|name| Path::new(name.trim()).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DOWNLOAD_FILENAME)
}

fn io_error(path: &Path, error: &std::io::Error) -> ApiClientError {
    ApiClientError::Io {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}
