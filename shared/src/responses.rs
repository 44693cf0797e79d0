use lambda_http::{http::StatusCode, Body, Response};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApiError;

/// JSON response with the CORS header every endpoint carries.
pub fn json<T: Serialize>(status: StatusCode, payload: &T) -> Result<Response<Body>, ApiError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(payload)?.into())?)
}

pub fn ok<T: Serialize>(payload: &T) -> Result<Response<Body>, ApiError> {
    json(StatusCode::OK, payload)
}

/// CORS preflight answer.
pub fn preflight() -> Result<Response<Body>, ApiError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET,POST,PATCH,OPTIONS",
        )
        .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
        .body(Body::Empty)?)
}

/// Parse a JSON request body. An empty body parses as `{}` so that
/// all-optional payloads can be omitted.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };

    serde_json::from_slice(raw).map_err(|e| {
        tracing::warn!("Parse error: {}", e);
        ApiError::bad_request(format!("Invalid request body: {}", e))
    })
}

/// Trimmed, non-empty value of a required text field.
pub fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, ApiError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Deserialize)]
    struct Payload {
        #[serde(default)]
        name: Option<String>,
    }

    #[test]
    fn empty_body_parses_as_empty_object() {
        let parsed: Payload = parse_body(b"").unwrap();
        assert!(parsed.name.is_none());
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = parse_body::<Payload>(b"{not json").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct Credentials {
        password: Option<String>,
        team: Option<String>,
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn parse_failure_log_omits_request_body() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || {
            parse_body::<Credentials>(br#"{"password":"hunter2-secret","team":5}"#)
        });
        assert!(result.is_err());

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Parse error"));
        assert!(!output.contains("hunter2-secret"));
    }

    #[test]
    fn required_rejects_blank_values() {
        assert!(required(Some("   "), "Name is required").is_err());
        assert!(required(None, "Name is required").is_err());
        assert_eq!(required(Some("  Rima "), "Name is required").unwrap(), "Rima");
    }

    #[test]
    fn json_sets_cors_header() {
        let response = ok(&serde_json::json!({ "status": "ok" })).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
    }
}
