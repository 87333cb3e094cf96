//! Broker HTTP client
//!
//! Resolves sessions through the rendezvous broker. Transport failures
//! map to their own kind so callers can tell "broker unreachable" apart
//! from "bad session id"; malformed ids are rejected locally before any
//! request goes out.

use std::time::Duration;

use ferry_core::id::is_valid_session_id;
use ferry_core::{Error, Result, Session};
use reqwest::StatusCode;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    base_url: String,
}

impl BrokerClient {
    /// `addr` is a bare `host:port`.
    pub fn new(addr: &str) -> Self {
        Self::with_base_url(format!("http://{addr}"))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Ask the broker for a fresh session.
    pub async fn create_session(&self) -> Result<Session> {
        let response = self
            .http
            .post(format!("{}/new", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::BrokerUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Broker {
                status: response.status().as_u16(),
                message: error_body(response).await,
            });
        }
        decode_session(response).await
    }

    /// Join `session_id`, attaching this party as the receiver.
    pub async fn join_session(&self, session_id: &str) -> Result<Session> {
        if !is_valid_session_id(session_id) {
            return Err(Error::InvalidSessionId(session_id.to_string()));
        }
        let response = self
            .http
            .get(format!("{}/join/{}", self.base_url, session_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::BrokerUnreachable(e.to_string()))?;
        match response.status() {
            StatusCode::OK => decode_session(response).await,
            StatusCode::NOT_FOUND => Err(Error::SessionNotFound(session_id.to_string())),
            StatusCode::CONFLICT => Err(Error::SessionConflict),
            status => Err(Error::Broker {
                status: status.as_u16(),
                message: error_body(response).await,
            }),
        }
    }

    /// Release the receiver slot so the session can be joined again.
    ///
    /// An empty id is an Ok no-op; there is nothing to leave.
    pub async fn leave_session(&self, session_id: &str) -> Result<()> {
        if session_id.is_empty() {
            return Ok(());
        }
        let response = self
            .http
            .get(format!("{}/leave/{}", self.base_url, session_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::BrokerUnreachable(e.to_string()))?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::SessionNotFound(session_id.to_string())),
            StatusCode::CONFLICT => Err(Error::SessionConflict),
            status => Err(Error::Broker {
                status: status.as_u16(),
                message: error_body(response).await,
            }),
        }
    }
}

async fn decode_session(response: reqwest::Response) -> Result<Session> {
    response
        .json::<Session>()
        .await
        .map_err(|e| Error::Protocol(format!("invalid session data: {e}")))
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .map(|body| body.trim().to_string())
        .unwrap_or_default()
}
