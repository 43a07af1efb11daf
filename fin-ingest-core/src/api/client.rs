//! Resilient authenticated API client.
//!
//! Holds one session token, fetched lazily by exchanging a long-lived secret.
//! A call that fails because the token was rejected (HTTP 401, or HTTP 500
//! carrying the source's token-error code) is retried exactly once with a
//! freshly fetched token. Everything else surfaces unchanged.
//!
//! Token state lives behind `&mut self`; share across threads only with
//! external synchronization.

use super::error::{ApiError, ErrorBody};
use super::transport::{ApiRequest, ApiResponse, Transport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// How a source issues and rejects session tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    /// Path of the session endpoint; receives `{"secret": ...}`, answers `{"token": ...}`.
    pub session_path: String,
    /// Application error code (inside an HTTP 500 body) meaning "token expired or invalid".
    pub token_error_code: Option<i64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_path: "sessions".to_string(),
            token_error_code: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: Option<String>,
}

/// What to do with a response after the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Recovery {
    /// Refresh the token and try once more.
    Retry,
    /// Hand the response to the caller as is.
    Surface,
}

/// JSON API client holding one session token, refreshed on demand.
pub struct AuthenticatedClient<T: Transport> {
    transport: T,
    secret: String,
    token: Option<String>,
    auth: AuthConfig,
}

impl<T: Transport> AuthenticatedClient<T> {
    /// No token is fetched until the first call.
    pub fn new(transport: T, secret: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            transport,
            secret: secret.into(),
            token: None,
            auth,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a session token is currently held.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Drop the held token; the next call fetches a new one.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    /// Send `request` and decode the JSON body of the successful response.
    pub fn call(&mut self, request: &ApiRequest) -> Result<Value, ApiError> {
        self.call_with(|_| request.clone())
    }

    /// Like [`call`](Self::call), deserializing into `R`.
    pub fn call_json<R: DeserializeOwned>(&mut self, request: &ApiRequest) -> Result<R, ApiError> {
        let value = self.call(request)?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send a request built from the current token, for endpoints that also
    /// expect the token in the body. `build` runs once per attempt.
    pub fn call_with<F>(&mut self, build: F) -> Result<Value, ApiError>
    where
        F: Fn(&str) -> ApiRequest,
    {
        let response = self.send_with_recovery(&build)?;
        decode_body(&response)
    }

    fn send_with_recovery<F>(&mut self, build: &F) -> Result<ApiResponse, ApiError>
    where
        F: Fn(&str) -> ApiRequest,
    {
        if self.token.is_none() {
            self.refresh_token()?;
        }

        let response = self.attempt(build)?;
        let response = match self.recovery(&response) {
            Recovery::Retry => {
                self.refresh_token()?;
                self.attempt(build)?
            }
            Recovery::Surface => response,
        };

        ensure_success(response)
    }

    fn attempt<F>(&self, build: &F) -> Result<ApiResponse, ApiError>
    where
        F: Fn(&str) -> ApiRequest,
    {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        let request = build(token);
        self.transport.send(&request, Some(token))
    }

    fn recovery(&self, response: &ApiResponse) -> Recovery {
        match response.status {
            401 => {
                debug!("Unauthorized, trying to recover");
                Recovery::Retry
            }
            500 => match ErrorBody::parse(&response.body) {
                Ok(body) if Some(body.code) == self.auth.token_error_code => {
                    debug!(
                        "Token error: {}",
                        body.message.as_deref().unwrap_or("no message")
                    );
                    Recovery::Retry
                }
                Ok(_) => Recovery::Surface,
                Err(e) => {
                    warn!("Failed to recover after HTTP 500: {e}");
                    Recovery::Surface
                }
            },
            _ => Recovery::Surface,
        }
    }

    /// Exchange the secret for a fresh token, replacing the held one.
    pub fn refresh_token(&mut self) -> Result<(), ApiError> {
        debug!("Updating token");
        self.token = None;

        let request = ApiRequest::post(
            self.auth.session_path.clone(),
            json!({ "secret": self.secret }),
        );
        let response = ensure_success(self.transport.send(&request, None)?)?;
        let session: SessionResponse = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Decode(format!("session response: {e}")))?;

        self.token = Some(session.token.ok_or(ApiError::MissingToken)?);
        Ok(())
    }
}

fn ensure_success(response: ApiResponse) -> Result<ApiResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    let (code, message) = match ErrorBody::parse(&response.body) {
        Ok(body) => (Some(body.code), body.message.unwrap_or_default()),
        Err(_) => (None, response.body.chars().take(200).collect()),
    };
    Err(ApiError::Status {
        status: response.status,
        code,
        message,
    })
}

fn decode_body(response: &ApiResponse) -> Result<Value, ApiError> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned responses and records what was sent.
    #[derive(Default)]
    struct Scripted {
        responses: RefCell<VecDeque<ApiResponse>>,
        sent: RefCell<Vec<(ApiRequest, Option<String>)>>,
    }

    impl Scripted {
        fn new(responses: &[(u16, &str)]) -> Self {
            Self {
                responses: RefCell::new(
                    responses
                        .iter()
                        .map(|(s, b)| ApiResponse::new(*s, *b))
                        .collect(),
                ),
                sent: RefCell::default(),
            }
        }

        fn paths(&self) -> Vec<String> {
            self.sent.borrow().iter().map(|(r, _)| r.path.clone()).collect()
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse, ApiError> {
            self.sent
                .borrow_mut()
                .push((request.clone(), token.map(str::to_string)));
            self.responses
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| ApiError::Transport("script exhausted".into()))
        }
    }

    fn client(script: &Scripted) -> AuthenticatedClient<&Scripted> {
        AuthenticatedClient::new(
            script,
            "secret",
            AuthConfig {
                token_error_code: Some(13),
                ..AuthConfig::default()
            },
        )
    }

    #[test]
    fn fetches_token_lazily_and_attaches_it() {
        let script = Scripted::new(&[(200, r#"{"token":"t1"}"#), (200, r#"{"ok":true}"#)]);
        let mut c = client(&script);
        assert!(!c.has_token());

        let v = c.call(&ApiRequest::get("assets")).unwrap();
        assert_eq!(v, json!({"ok": true}));

        let sent = script.sent.borrow();
        assert_eq!(sent[0].0.path, "sessions");
        assert_eq!(sent[0].0.body, Some(json!({"secret": "secret"})));
        assert_eq!(sent[0].1, None);
        assert_eq!(sent[1].1.as_deref(), Some("t1"));
    }

    #[test]
    fn token_is_reused_across_calls() {
        let script = Scripted::new(&[
            (200, r#"{"token":"t1"}"#),
            (200, "{}"),
            (200, "{}"),
        ]);
        let mut c = client(&script);
        c.call(&ApiRequest::get("a")).unwrap();
        c.call(&ApiRequest::get("b")).unwrap();
        assert_eq!(script.paths(), vec!["sessions", "a", "b"]);
    }

    #[test]
    fn unauthorized_once_then_success() {
        let script = Scripted::new(&[
            (200, r#"{"token":"old"}"#),
            (401, ""),
            (200, r#"{"token":"new"}"#),
            (200, r#"{"n":1}"#),
        ]);
        let mut c = client(&script);
        let v = c.call(&ApiRequest::get("bars")).unwrap();
        assert_eq!(v, json!({"n": 1}));
        assert_eq!(script.paths(), vec!["sessions", "bars", "sessions", "bars"]);
        assert_eq!(script.sent.borrow()[3].1.as_deref(), Some("new"));
    }

    #[test]
    fn unauthorized_twice_surfaces_second_failure() {
        let script = Scripted::new(&[
            (200, r#"{"token":"a"}"#),
            (401, "first"),
            (200, r#"{"token":"b"}"#),
            (401, "second"),
        ]);
        let mut c = client(&script);
        let err = c.call(&ApiRequest::get("bars")).unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 401, ref message, .. } if message == "second"));
        assert_eq!(script.sent.borrow().len(), 4);
    }

    #[test]
    fn token_error_code_triggers_one_retry() {
        let script = Scripted::new(&[
            (200, r#"{"token":"a"}"#),
            (500, r#"{"code":13,"message":"token is expired"}"#),
            (200, r#"{"token":"b"}"#),
            (200, "[]"),
        ]);
        let mut c = client(&script);
        assert_eq!(c.call(&ApiRequest::get("x")).unwrap(), json!([]));
        assert_eq!(script.sent.borrow().len(), 4);
    }

    #[test]
    fn other_application_code_is_fatal() {
        let script = Scripted::new(&[
            (200, r#"{"token":"a"}"#),
            (500, r#"{"code":5,"message":"not found"}"#),
        ]);
        let mut c = client(&script);
        let err = c.call(&ApiRequest::get("x")).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status {
                status: 500,
                code: Some(5),
                ..
            }
        ));
        assert_eq!(script.sent.borrow().len(), 2);
    }

    #[test]
    fn unparseable_500_is_fatal() {
        let script = Scripted::new(&[(200, r#"{"token":"a"}"#), (500, "<html>oops</html>")]);
        let mut c = client(&script);
        let err = c.call(&ApiRequest::get("x")).unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(script.sent.borrow().len(), 2);
    }

    #[test]
    fn other_statuses_are_not_retried() {
        let script = Scripted::new(&[(200, r#"{"token":"a"}"#), (404, "missing")]);
        let mut c = client(&script);
        assert_eq!(c.call(&ApiRequest::get("x")).unwrap_err().status(), Some(404));
        assert_eq!(script.sent.borrow().len(), 2);
    }

    #[test]
    fn failed_session_fetch_surfaces() {
        let script = Scripted::new(&[(403, "denied")]);
        let mut c = client(&script);
        assert_eq!(c.call(&ApiRequest::get("x")).unwrap_err().status(), Some(403));
        assert!(!c.has_token());
    }

    #[test]
    fn session_without_token_is_an_error() {
        let script = Scripted::new(&[(200, "{}")]);
        let mut c = client(&script);
        assert!(matches!(
            c.call(&ApiRequest::get("x")).unwrap_err(),
            ApiError::MissingToken
        ));
    }

    #[test]
    fn call_with_rebuilds_request_with_fresh_token() {
        let script = Scripted::new(&[
            (200, r#"{"token":"a"}"#),
            (401, ""),
            (200, r#"{"token":"b"}"#),
            (200, r#"{"account_ids":["1"]}"#),
        ]);
        let mut c = client(&script);
        c.call_with(|token| ApiRequest::post("sessions/details", json!({ "token": token })))
            .unwrap();
        let sent = script.sent.borrow();
        assert_eq!(sent[1].0.body, Some(json!({"token": "a"})));
        assert_eq!(sent[3].0.body, Some(json!({"token": "b"})));
    }

    #[test]
    fn without_token_error_code_500_is_never_retried() {
        let script = Scripted::new(&[
            (200, r#"{"token":"a"}"#),
            (500, r#"{"code":13,"message":"expired"}"#),
        ]);
        let mut c = AuthenticatedClient::new(&script, "s", AuthConfig::default());
        assert_eq!(c.call(&ApiRequest::get("x")).unwrap_err().status(), Some(500));
        assert_eq!(script.sent.borrow().len(), 2);
    }
}
