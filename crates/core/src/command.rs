//! HTTP command channel to the VoiceNet backend.
//!
//! Commands are dispatched exactly once per call to the client; retrying is
//! left to the caller, who gets a fresh idempotency key on every attempt.

use crate::{
    error::{CommandKind, FailureKind, VoiceError},
    idempotency::idempotency_key,
    model::{CreateSessionRequest, DispatchRegistration, MediaAsset, PlaySource, PlayStarted},
};
use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Commands the orchestrator and tools issue against a call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandClient: Send + Sync {
    async fn answer(&self, call_id: &str) -> Result<Value, VoiceError>;

    async fn play(
        &self,
        call_id: &str,
        source: &PlaySource,
        barge_in: bool,
    ) -> Result<PlayStarted, VoiceError>;

    async fn say(&self, call_id: &str, text: &str) -> Result<Value, VoiceError>;

    async fn transfer(&self, call_id: &str, target: &str) -> Result<Value, VoiceError>;

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Value, VoiceError>;

    async fn list_media_assets(&self) -> Result<Vec<MediaAsset>, VoiceError>;

    /// Registers a dispatch subscription, returning its id.
    async fn register_dispatch(
        &self,
        registration: &DispatchRegistration,
    ) -> Result<String, VoiceError>;

    async fn unregister_dispatch(&self, subscription_id: &str) -> Result<Value, VoiceError>;
}

/// [`CommandClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpCommandClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl HttpCommandClient {
    /// Creates a client; every request is bounded by `timeout`.
    pub fn new(base_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self, VoiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| VoiceError::InvalidConfig(format!("base URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(VoiceError::InvalidConfig(format!(
                "base URL '{base_url}' cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        command: CommandKind,
        call_id: &str,
        segments: &[&str],
        body: &B,
    ) -> Result<Value, VoiceError> {
        let key = idempotency_key(command, call_id);
        let url = self.endpoint(segments);
        debug!(%command, %call_id, %url, idempotency_key = %key, "Dispatching command");
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .header(IDEMPOTENCY_HEADER, key)
            .json(body)
            .send()
            .await
            .map_err(|e| request_failure(command, e))?;
        read_json(command, response).await
    }

    async fn get(&self, command: CommandKind, segments: &[&str]) -> Result<Value, VoiceError> {
        let response = self
            .http
            .get(self.endpoint(segments))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| request_failure(command, e))?;
        read_json(command, response).await
    }
}

fn request_failure(command: CommandKind, err: reqwest::Error) -> VoiceError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() {
        FailureKind::Decode
    } else if let Some(status) = err.status() {
        FailureKind::Rejected {
            status: status.as_u16(),
        }
    } else {
        FailureKind::Transport
    };
    warn!(%command, %kind, error = %err, "Command request failed");
    VoiceError::CommandFailed {
        command,
        kind,
        message: err.to_string(),
    }
}

async fn read_json(command: CommandKind, response: reqwest::Response) -> Result<Value, VoiceError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| request_failure(command, e))?;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes);
        let message = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", body.trim())
        };
        warn!(%command, status = status.as_u16(), "Backend rejected command");
        return Err(VoiceError::CommandFailed {
            command,
            kind: FailureKind::Rejected {
                status: status.as_u16(),
            },
            message,
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| VoiceError::CommandFailed {
        command,
        kind: FailureKind::Decode,
        message: e.to_string(),
    })
}

fn decode_failure(command: CommandKind, message: impl Into<String>) -> VoiceError {
    VoiceError::CommandFailed {
        command,
        kind: FailureKind::Decode,
        message: message.into(),
    }
}

#[async_trait]
impl CommandClient for HttpCommandClient {
    async fn answer(&self, call_id: &str) -> Result<Value, VoiceError> {
        self.post(
            CommandKind::Answer,
            call_id,
            &["calls", call_id, "answer"],
            &json!({}),
        )
        .await
    }

    async fn play(
        &self,
        call_id: &str,
        source: &PlaySource,
        barge_in: bool,
    ) -> Result<PlayStarted, VoiceError> {
        let body = match source {
            PlaySource::Url { url } => json!({"assetUrl": url, "bargeIn": barge_in}),
            PlaySource::LibraryAsset { asset_id } => {
                json!({"assetId": asset_id, "bargeIn": barge_in})
            }
            PlaySource::BinaryUpload { .. } => {
                return Err(VoiceError::UnsupportedSource(
                    "binary upload is not supported yet".to_string(),
                ));
            }
        };
        let response = self
            .post(CommandKind::Play, call_id, &["calls", call_id, "play"], &body)
            .await?;
        Ok(PlayStarted {
            play_id: response
                .get("playId")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn say(&self, call_id: &str, text: &str) -> Result<Value, VoiceError> {
        self.post(
            CommandKind::Say,
            call_id,
            &["calls", call_id, "say"],
            &json!({"text": text}),
        )
        .await
    }

    async fn transfer(&self, call_id: &str, target: &str) -> Result<Value, VoiceError> {
        self.post(
            CommandKind::Transfer,
            call_id,
            &["calls", call_id, "transfer"],
            &json!({"target": target}),
        )
        .await
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Value, VoiceError> {
        self.post(
            CommandKind::CreateSession,
            &request.call_id,
            &["session.create"],
            request,
        )
        .await
    }

    async fn list_media_assets(&self) -> Result<Vec<MediaAsset>, VoiceError> {
        let command = CommandKind::ListMediaAssets;
        let response = self.get(command, &["media", "assets"]).await?;
        serde_json::from_value(response).map_err(|e| decode_failure(command, e.to_string()))
    }

    async fn register_dispatch(
        &self,
        registration: &DispatchRegistration,
    ) -> Result<String, VoiceError> {
        let command = CommandKind::RegisterDispatch;
        let scope = format!("{}:{}", registration.workflow_id, registration.node_id);
        let response = self
            .post(
                command,
                &scope,
                &["integrations", "dispatch", "register"],
                registration,
            )
            .await?;
        response
            .get("subscriptionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| decode_failure(command, "response is missing 'subscriptionId'"))
    }

    async fn unregister_dispatch(&self, subscription_id: &str) -> Result<Value, VoiceError> {
        self.post(
            CommandKind::UnregisterDispatch,
            subscription_id,
            &["integrations", "dispatch", "unregister"],
            &json!({"subscriptionId": subscription_id}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{any, body_json, header, header_exists, method, path},
    };

    fn client(server: &MockServer) -> HttpCommandClient {
        HttpCommandClient::new(
            &server.uri(),
            SecretString::from("secret-key".to_string()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_answer_sends_api_key_and_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calls/c1/answer"))
            .and(header(API_KEY_HEADER, "secret-key"))
            .and(header_exists(IDEMPOTENCY_HEADER))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.answer("c1").await.unwrap(), json!({"status": "ok"}));
        client.answer("c1").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let keys: Vec<_> = requests
            .iter()
            .map(|r| r.headers.get(IDEMPOTENCY_HEADER).unwrap().clone())
            .collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
        assert!(keys[0].to_str().unwrap().starts_with("answer-c1-"));
    }

    #[tokio::test]
    async fn test_binary_play_is_rejected_without_network() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let source = PlaySource::BinaryUpload {
            data: vec![1, 2, 3],
            mime_type: Some("audio/wav".to_string()),
        };
        let err = client(&server).play("c1", &source, false).await.unwrap_err();
        assert!(matches!(err, VoiceError::UnsupportedSource(_)));
        assert_eq!(err.to_outcome("c1").call_id, "c1");
    }

    #[tokio::test]
    async fn test_play_url_and_asset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calls/c1/play"))
            .and(body_json(json!({"assetUrl": "https://cdn/a.wav", "bargeIn": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"playId": "p1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/calls/c2/play"))
            .and(body_json(json!({"assetId": "welcome", "bargeIn": false})))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client(&server);
        let started = client
            .play(
                "c1",
                &PlaySource::Url {
                    url: "https://cdn/a.wav".to_string(),
                },
                true,
            )
            .await
            .unwrap();
        assert_eq!(started.play_id.as_deref(), Some("p1"));

        let started = client
            .play(
                "c2",
                &PlaySource::LibraryAsset {
                    asset_id: "welcome".to_string(),
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(started.play_id, None);
    }

    #[tokio::test]
    async fn test_rejection_is_a_typed_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calls/c1/transfer"))
            .respond_with(ResponseTemplate::new(409).set_body_string("call not active"))
            .mount(&server)
            .await;

        let err = client(&server).transfer("c1", "100").await.unwrap_err();
        match err {
            VoiceError::CommandFailed {
                command,
                kind,
                message,
            } => {
                assert_eq!(command, CommandKind::Transfer);
                assert_eq!(kind, FailureKind::Rejected { status: 409 });
                assert!(message.contains("call not active"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpCommandClient::new(
            &server.uri(),
            SecretString::from("k".to_string()),
            Duration::from_millis(50),
        )
        .unwrap();
        let err = client.say("c1", "hello").await.unwrap_err();
        assert!(matches!(
            err,
            VoiceError::CommandFailed {
                kind: FailureKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_session_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session.create"))
            .and(body_json(json!({
                "callId": "c1",
                "tools": [],
                "promptBase": "Be brief.",
                "userInstr": "",
                "locale": "en-GB",
                "bargeIn": false
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let prompt = crate::PromptConfig {
            prompt_base: "Be brief.".to_string(),
            user_instructions: String::new(),
            locale: "en-GB".to_string(),
            barge_in: false,
        };
        let request = CreateSessionRequest::new("c1", vec![], &prompt);
        assert_eq!(client(&server).create_session(&request).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_dispatch_registration_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/integrations/dispatch/register"))
            .and(body_json(json!({
                "workflowId": "wf1",
                "nodeId": "n1",
                "callbackUrl": "https://hooks/voicenet",
                "rule": {"did": "+3900"},
                "events": ["incoming-call"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subscriptionId": "sub-1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/integrations/dispatch/unregister"))
            .and(body_json(json!({"subscriptionId": "sub-1"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let registration =
            DispatchRegistration::incoming_call("wf1", "n1", "https://hooks/voicenet", "+3900");
        let id = client.register_dispatch(&registration).await.unwrap();
        assert_eq!(id, "sub-1");
        client.unregister_dispatch(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_media_assets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/assets"))
            .and(header(API_KEY_HEADER, "secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a1", "name": "Welcome", "description": "Greeting"},
                {"id": "a2", "name": "Hold music"}
            ])))
            .mount(&server)
            .await;

        let assets = client(&server).list_media_assets().await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].description.as_deref(), Some("Greeting"));
        assert_eq!(assets[1].description, None);
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes_ids() {
        let client = HttpCommandClient::new(
            "https://api.example.com/v1/",
            SecretString::from("k".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(&["calls", "a/b", "answer"]).as_str(),
            "https://api.example.com/v1/calls/a%2Fb/answer"
        );
        assert!(HttpCommandClient::new(
            "not a url",
            SecretString::from("k".to_string()),
            Duration::from_secs(1)
        )
        .is_err());
    }
}
