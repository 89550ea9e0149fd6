//! Unverified decoding of bearer-token claims.
//!
//! The payload segment is decoded for display and expiry checks only. The
//! signature is never checked here; the backend remains the authority on
//! whether a token is genuine.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenParseError {
    #[error("token must have 3 segments, found {0}")]
    SegmentCount(usize),
    #[error("token payload is not base64: {0}")]
    Base64(String),
    #[error("token payload is not json: {0}")]
    Json(String),
    #[error("token payload is not a json object")]
    NotAnObject,
}

/// Claims carried in the payload segment; times are seconds since the epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: Option<String>,
    pub rol: Option<String>,
    pub user_id: Option<i64>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl TokenClaims {
    /// Live only while `exp` is strictly in the future; no `exp` never expires.
    pub fn is_expired_at(&self, now_unix_secs: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now_unix_secs)
    }

    pub fn expires_in(&self, now_unix_secs: i64) -> Option<i64> {
        self.expires_at.map(|exp| exp - now_unix_secs)
    }

    pub fn issued_at_utc(&self) -> Option<DateTime<Utc>> {
        self.issued_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

pub fn decode_token_claims(token: &str) -> Result<TokenClaims, TokenParseError> {
    let segments = token.trim().split('.').collect::<Vec<_>>();
    let [_, payload, _] = segments.as_slice() else {
        return Err(TokenParseError::SegmentCount(segments.len()));
    };

    let bytes = decode_segment(payload)?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|error| TokenParseError::Json(error.to_string()))?;
    let Value::Object(object) = value else {
        return Err(TokenParseError::NotAnObject);
    };

    Ok(TokenClaims {
        subject: string_claim(&object, "sub"),
        rol: string_claim(&object, "rol"),
        user_id: numeric_claim(&object, "user_id"),
        issued_at: numeric_claim(&object, "iat"),
        expires_at: numeric_claim(&object, "exp"),
    })
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenParseError> {
    let unpadded = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(unpadded)
        .or_else(|_| STANDARD_NO_PAD.decode(unpadded))
        .map_err(|error| TokenParseError::Base64(error.to_string()))
}

fn string_claim(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn numeric_claim(object: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = object.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|float| float.floor() as i64))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn token_with_payload(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn decodes_backend_claims() {
        let token = token_with_payload(&serde_json::json!({
            "sub": "dr_rodriguez",
            "rol": "medico",
            "user_id": 2,
            "iat": 1_700_000_000,
            "exp": 1_700_001_800,
        }));

        let claims = decode_token_claims(&token).expect("claims decode");
        assert_eq!(claims.subject.as_deref(), Some("dr_rodriguez"));
        assert_eq!(claims.rol.as_deref(), Some("medico"));
        assert_eq!(claims.user_id, Some(2));
        assert_eq!(claims.expires_in(1_700_000_800), Some(1_000));
        assert_eq!(
            claims.issued_at_utc().map(|at| at.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert_eq!(
            decode_token_claims("only.two"),
            Err(TokenParseError::SegmentCount(2))
        );
        assert_eq!(
            decode_token_claims("a.b.c.d"),
            Err(TokenParseError::SegmentCount(4))
        );
    }

    #[test]
    fn rejects_non_json_payload() {
        let body = URL_SAFE_NO_PAD.encode("not json");
        let error = decode_token_claims(&format!("h.{body}.s")).expect_err("non json");
        assert!(matches!(error, TokenParseError::Json(_)));

        let array = URL_SAFE_NO_PAD.encode("[1,2]");
        assert_eq!(
            decode_token_claims(&format!("h.{array}.s")),
            Err(TokenParseError::NotAnObject)
        );
    }

    #[test]
    fn accepts_padded_standard_alphabet() {
        let body = STANDARD_NO_PAD.encode(r#"{"sub":"admin"}"#);
        let claims = decode_token_claims(&format!("h.{body}==.s")).expect("padded payload");
        assert_eq!(claims.subject.as_deref(), Some("admin"));
    }

    #[test]
    fn token_expires_at_its_exp_second() {
        let claims = TokenClaims {
            expires_at: Some(100),
            ..TokenClaims::default()
        };
        assert!(!claims.is_expired_at(99));
        assert!(claims.is_expired_at(100));
        assert!(claims.is_expired_at(101));
        assert!(!TokenClaims::default().is_expired_at(i64::MAX));
    }
}
