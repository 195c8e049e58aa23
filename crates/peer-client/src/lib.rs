//! Peer Client
//!
//! HTTP implementation of [`PeerTransport`], used between party services
//! and by the host CLI.

use async_trait::async_trait;
use mafia_core::transport::{PeerRequest, PeerResponse, PeerTransport};
use mafia_core::{Error, PartyId, Result};
use peer_relay::{path_for, ErrorBody};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Only stateless share requests are resent; every other operation
/// changes the receiver or costs it a delay, so it reaches a party at most
/// once
fn is_retry_safe(op: &str) -> bool {
    matches!(op, "partial_decrypt" | "investigate_partial")
}

fn error_from_response(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(body) => body.into_error(),
        Err(_) if status.is_server_error() => Error::Transport(format!("HTTP {}", status)),
        Err(_) => Error::UnexpectedResponse(format!("HTTP {}: {}", status, body)),
    }
}

/// HTTP transport addressing parties by join index
pub struct HttpTransport {
    client: Client,
    /// Base URL of every party, indexed by party
    peers: Vec<String>,
    /// Request timeout
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpTransport {
    pub fn new(peers: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            peers: peers
                .into_iter()
                .map(|url| url.trim_end_matches('/').to_string())
                .collect(),
            timeout: Duration::from_secs(90),
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attempts per retry-safe request and the first backoff, doubled after
    /// every failure
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    fn url_for(&self, to: PartyId, op: &str) -> Result<String> {
        let base = self.peers.get(to).ok_or(Error::InvalidPartyId(to))?;
        Ok(format!("{}{}", base, path_for(op)))
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<PeerResponse> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("{}: {}", url, e))
                } else {
                    Error::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(error_from_response(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    #[instrument(skip_all, fields(party = to, op = request.op()))]
    async fn send(&self, to: PartyId, request: PeerRequest) -> Result<PeerResponse> {
        let op = request.op();
        let url = self.url_for(to, op)?;
        let body = request.body()?;

        let attempts = if is_retry_safe(op) { self.max_attempts } else { 1 };
        let mut backoff = self.backoff;
        let mut attempt = 1;
        loop {
            match self.post(&url, &body).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, error = %e, "Request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                result => {
                    debug!(attempt, ok = result.is_ok(), "Request finished");
                    return result;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mafia_core::dkg::EvalMultKeyRequest;
    use mafia_core::action::ActionRequest;
    use mafia_core::Phase;
    use mafia_core::ErrorKind;

    #[test]
    fn test_url_for() {
        let transport = HttpTransport::new(vec!["http://party-0:8080/".into()]);
        assert_eq!(
            transport.url_for(0, "relay_step").unwrap(),
            "http://party-0:8080/v1/peer/relay_step"
        );
        assert!(matches!(
            transport.url_for(1, "relay_step"),
            Err(Error::InvalidPartyId(1))
        ));
    }

    #[test]
    fn test_only_share_requests_are_retried() {
        assert!(is_retry_safe("partial_decrypt"));
        assert!(is_retry_safe("investigate_partial"));

        for op in [
            "relay_step",
            "join_key",
            "merge_mult_keys",
            "request_action",
            "reveal_own_role",
            "relay_decrypt",
            "distribute_roles",
            "run_investigation",
        ] {
            assert!(!is_retry_safe(op), "{} must not be retried", op);
        }
    }

    #[test]
    fn test_error_body_becomes_remote_error() {
        let body = r#"{"error":"Protocol sequence violation: late","kind":"protocol_sequence"}"#;
        let err = error_from_response(StatusCode::CONFLICT, body);
        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(err.kind(), ErrorKind::ProtocolSequence);

        let err = error_from_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.is_retryable());

        let err = error_from_response(StatusCode::NOT_FOUND, "no route");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_party_is_transport_error() {
        let transport = HttpTransport::new(vec!["http://127.0.0.1:1".into()])
            .with_retry(3, Duration::from_millis(5));

        let err = transport
            .send(
                0,
                PeerRequest::RequestAction(ActionRequest {
                    game_id: "g".into(),
                    phase: Phase::Vote,
                    survivors: vec![0],
                    turn: 1,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = transport
            .send(
                0,
                PeerRequest::GenerateEvalMultKey(EvalMultKeyRequest {
                    game_id: "g".into(),
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
