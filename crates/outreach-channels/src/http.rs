//! JSON-over-HTTP provider adapter.
//!
//! Request body:
//! ```json
//! { "channel": "email", "to": "...", "from": "...", "subject": "...",
//!   "body": "...", "idempotency_key": "...", "campaign_id": "...", "lead_id": "..." }
//! ```
//! The idempotency key is also sent as the `Idempotency-Key` header so
//! providers that deduplicate on it can drop a resend after an in-doubt retry.
//!
//! Status mapping: 2xx delivered; 408, 425, 429 and 5xx transient; any other
//! status permanent. Timeouts and connection errors are transient.

use std::time::Duration;

use async_trait::async_trait;
use outreach_core::dispatch::{DispatchFailure, DispatchPort, DispatchResult, OutboundMessage};
use outreach_core::types::Channel;
use outreach_core::{OutreachError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest provider error body kept in an attempt's error field.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    from: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    channel: Channel,
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    body: &'a str,
    idempotency_key: &'a str,
    campaign_id: &'a str,
    lead_id: &'a str,
}

#[derive(Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

impl HttpDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        from: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(OutreachError::ChannelConfig(format!(
                "endpoint must be an http(s) URL: '{endpoint}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OutreachError::ChannelConfig(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            token,
            from,
        })
    }
}

/// Statuses worth retrying.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..600).contains(&status)
}

fn truncate(mut s: String) -> String {
    if s.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[async_trait]
impl DispatchPort for HttpDispatcher {
    async fn send(&self, message: &OutboundMessage) -> Result<DispatchResult> {
        let payload = SendRequest {
            channel: message.channel,
            to: &message.recipient,
            from: self.from.as_deref(),
            subject: message.subject.as_deref(),
            body: &message.body,
            idempotency_key: &message.idempotency_key,
            campaign_id: &message.campaign_id,
            lead_id: &message.lead_id,
        };
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", &message.idempotency_key)
            .json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_builder() => {
                return Err(OutreachError::ChannelConfig(format!(
                    "cannot build request for {}: {e}",
                    self.endpoint
                )))
            }
            Err(e) => {
                let what = if e.is_timeout() {
                    "request timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                return Ok(DispatchResult::Failed(DispatchFailure::transient(format!(
                    "{what}: {e}"
                ))));
            }
        };

        let status = response.status();
        debug!(endpoint = %self.endpoint, status = status.as_u16(), idempotency_key = %message.idempotency_key, "provider responded");
        if status.is_success() {
            // A 2xx without a parseable body still means the provider took it.
            let body: SendResponse = response.json().await.unwrap_or_default();
            return Ok(DispatchResult::Delivered {
                provider_message_id: body.id.or(body.message_id),
            });
        }

        let text = truncate(response.text().await.unwrap_or_default());
        let detail = format!("provider returned {status}: {text}");
        let failure = if is_transient_status(status.as_u16()) {
            DispatchFailure::transient(detail)
        } else {
            DispatchFailure::permanent(detail)
        };
        Ok(DispatchResult::Failed(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use outreach_core::types::FailureKind;
    use serde_json::json;

    fn message() -> OutboundMessage {
        OutboundMessage {
            idempotency_key: "key-123".into(),
            campaign_id: "spring".into(),
            lead_id: "abc".into(),
            channel: Channel::Sms,
            recipient: "+15550100".into(),
            subject: None,
            body: "Hi Ada".into(),
        }
    }

    fn dispatcher(url: &str, token: Option<&str>) -> HttpDispatcher {
        HttpDispatcher::new(
            format!("{url}/send"),
            token.map(str::to_string),
            Some("Grace".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn delivered_with_provider_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_header("idempotency-key", "key-123")
            .match_header("authorization", "Bearer s3cret")
            .match_body(Matcher::PartialJson(json!({
                "channel": "sms",
                "to": "+15550100",
                "from": "Grace",
                "body": "Hi Ada",
                "idempotency_key": "key-123",
            })))
            .with_status(202)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message_id":"prov-9"}"#)
            .create_async()
            .await;

        let result = dispatcher(&server.url(), Some("s3cret"))
            .send(&message())
            .await
            .unwrap();
        assert_eq!(
            result,
            DispatchResult::Delivered {
                provider_message_id: Some("prov-9".into())
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn success_without_body_is_delivered() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/send")
            .with_status(200)
            .create_async()
            .await;
        let result = dispatcher(&server.url(), None).send(&message()).await.unwrap();
        assert_eq!(
            result,
            DispatchResult::Delivered {
                provider_message_id: None
            }
        );
    }

    #[tokio::test]
    async fn status_codes_classify_failures() {
        let cases = [
            (429, FailureKind::Transient),
            (503, FailureKind::Transient),
            (408, FailureKind::Transient),
            (400, FailureKind::Permanent),
            (404, FailureKind::Permanent),
            (422, FailureKind::Permanent),
        ];
        for (status, expected) in cases {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/send")
                .with_status(status)
                .with_body("nope")
                .create_async()
                .await;
            match dispatcher(&server.url(), None).send(&message()).await.unwrap() {
                DispatchResult::Failed(f) => {
                    assert_eq!(f.kind, expected, "status {status}");
                    assert!(f.message.contains("nope"));
                }
                other => panic!("status {status}: expected failure, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        // Port 9 (discard) is not listening in test environments.
        let d = dispatcher("http://127.0.0.1:9", None);
        match d.send(&message()).await.unwrap() {
            DispatchResult::Failed(f) => assert_eq!(f.kind, FailureKind::Transient),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(matches!(
            HttpDispatcher::new("ftp://x", None, None, Duration::from_secs(1)),
            Err(OutreachError::ChannelConfig(_))
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let s = truncate("é".repeat(600));
        assert!(s.len() <= MAX_ERROR_BODY + '…'.len_utf8());
        assert!(s.ends_with('…'));
    }
}
