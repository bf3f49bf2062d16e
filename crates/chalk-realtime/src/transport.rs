//! Collaborators the session runtime talks to: local audio capture, the
//! credential endpoint and the realtime control channel.
//!
//! Each is a trait so the runtime can be driven offline. The production
//! implementations are [`PcmFileInput`], [`HttpCredentialIssuer`] and
//! [`WebSocketConnector`]; [`ScriptedConnector`] replays recorded events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest, http::HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use chalk_core::config::RealtimeConfig;
use chalk_core::error::{ChalkError, Result};

use crate::events::{ClientEvent, SAMPLE_RATE, ServerEvent};

// --- Audio input ---------------------------------------------------------

/// Local microphone, or something standing in for one.
#[async_trait]
pub trait AudioInput: Send {
    /// Acquire the device and start delivering PCM16 chunks.
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<i16>>>;

    /// Release the device. Safe to call when not started.
    async fn stop(&mut self);
}

/// Text-only sessions: a stream that never yields.
#[derive(Debug, Default)]
pub struct NoAudioInput {
    keep_alive: Option<mpsc::UnboundedSender<Vec<i16>>>,
}

#[async_trait]
impl AudioInput for NoAudioInput {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<i16>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.keep_alive = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) {
        self.keep_alive = None;
    }
}

/// Audio pushed in by the caller, e.g. from a capture callback.
#[derive(Debug)]
pub struct ChannelAudioInput {
    rx: Option<mpsc::UnboundedReceiver<Vec<i16>>>,
}

impl ChannelAudioInput {
    pub fn new() -> (Self, mpsc::UnboundedSender<Vec<i16>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx: Some(rx) }, tx)
    }
}

#[async_trait]
impl AudioInput for ChannelAudioInput {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<i16>>> {
        self.rx
            .take()
            .ok_or_else(|| ChalkError::Device("audio channel already in use".into()))
    }

    async fn stop(&mut self) {}
}

/// Streams a raw PCM16 or WAV file in real time.
#[derive(Debug)]
pub struct PcmFileInput {
    path: PathBuf,
    chunk: Duration,
    cancel: Option<CancellationToken>,
}

impl PcmFileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk: Duration::from_millis(100),
            cancel: None,
        }
    }

    pub fn with_chunk(mut self, chunk: Duration) -> Self {
        self.chunk = chunk;
        self
    }
}

/// Samples from a WAV file's data chunk, or the whole buffer for raw PCM.
fn pcm_samples(bytes: &[u8]) -> Vec<i16> {
    let body = if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        let mut offset = 12;
        let mut data = &bytes[bytes.len()..];
        while offset + 8 <= bytes.len() {
            let id = &bytes[offset..offset + 4];
            let len = u32::from_le_bytes([
                bytes[offset + 4],
                bytes[offset + 5],
                bytes[offset + 6],
                bytes[offset + 7],
            ]) as usize;
            let start = offset + 8;
            let end = (start + len).min(bytes.len());
            if id == b"data" {
                data = &bytes[start..end];
                break;
            }
            offset = end + (len & 1);
        }
        data
    } else {
        bytes
    };
    body.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

#[async_trait]
impl AudioInput for PcmFileInput {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<i16>>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ChalkError::Device(format!("{}: {e}", self.path.display())))?;
        let samples = pcm_samples(&bytes);
        let chunk_len = ((SAMPLE_RATE as u128 * self.chunk.as_millis()) / 1000).max(1) as usize;
        info!(path = %self.path.display(), samples = samples.len(), "Audio file opened");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let period = self.chunk;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            for chunk in samples.chunks(chunk_len) {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {}
                }
                if tx.send(chunk.to_vec()).is_err() {
                    return;
                }
            }
            // Hold the stream open so end of file is not a device failure.
            cancel.cancelled().await;
        });

        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

// --- Credentials ---------------------------------------------------------

/// A short-lived secret for opening the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self) -> Result<Credential>;
}

/// Uses a fixed token, typically the API key itself.
#[derive(Debug, Clone)]
pub struct StaticCredential(pub String);

#[async_trait]
impl CredentialIssuer for StaticCredential {
    async fn issue(&self) -> Result<Credential> {
        if self.0.is_empty() {
            return Err(ChalkError::Credential("empty token".into()));
        }
        Ok(Credential {
            token: self.0.clone(),
            expires_at: None,
        })
    }
}

/// Requests an ephemeral client secret from the sessions endpoint.
pub struct HttpCredentialIssuer {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SessionSecretResponse {
    client_secret: ClientSecret,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl HttpCredentialIssuer {
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            endpoint: config.session_endpoint(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn issue(&self) -> Result<Credential> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ChalkError::Credential("no realtime API key configured".into()))?;

        debug!(endpoint = %self.endpoint, model = %self.model, "Requesting session credential");

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&serde_json::json!({ "model": self.model, "voice": self.voice }))
            .send()
            .await
            .map_err(|e| ChalkError::Credential(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChalkError::Credential(format!("HTTP {status}: {body}")));
        }

        let parsed: SessionSecretResponse = resp
            .json()
            .await
            .map_err(|e| ChalkError::Credential(format!("unexpected response: {e}")))?;

        Ok(Credential {
            token: parsed.client_secret.value,
            expires_at: parsed
                .client_secret
                .expires_at
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        })
    }
}

// --- Control channel -----------------------------------------------------

/// An open control channel. Dropping `outgoing` or cancelling `closed` shuts
/// it down; `incoming` ends when the remote side goes away.
pub struct RealtimeLink {
    pub outgoing: mpsc::UnboundedSender<ClientEvent>,
    pub incoming: mpsc::UnboundedReceiver<ServerEvent>,
    pub closed: CancellationToken,
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<RealtimeLink>;
}

/// JSON text frames over a WebSocket.
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.websocket_url())
    }
}

#[async_trait]
impl RealtimeConnector for WebSocketConnector {
    async fn connect(&self, credential: &Credential) -> Result<RealtimeLink> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChalkError::Negotiation(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential.token))
            .map_err(|e| ChalkError::Credential(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(tungstenite::Error::Http(response)) => {
                return Err(ChalkError::Negotiation(format!(
                    "handshake rejected with HTTP {}",
                    response.status()
                )));
            }
            Err(e) => return Err(ChalkError::Transport(e.to_string())),
        };
        info!(url = %self.url, "Realtime channel open");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let closed = CancellationToken::new();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_closed.cancelled() => break,
                    event = out_rx.recv() => {
                        let Some(event) = event else { break };
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode client event");
                                continue;
                            }
                        };
                        trace!(kind = event.kind(), "Sending client event");
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = sink.close().await;
            writer_closed.cancel();
        });

        let reader_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_closed.cancelled() => break,
                    msg = stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                    Ok(event) => {
                                        if in_tx.send(event).is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!(error = %e, "Unparseable server event"),
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!(?frame, "Remote closed realtime channel");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "Realtime channel error");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            reader_closed.cancel();
        });

        Ok(RealtimeLink {
            outgoing: out_tx,
            incoming: in_rx,
            closed,
        })
    }
}

// --- Scripted channel ----------------------------------------------------

/// One step of a recorded conversation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    /// Pause before the next step.
    Delay { delay_ms: u64 },
    /// Wait until the client has sent an event of this type.
    Await {
        #[serde(rename = "await")]
        event_type: String,
    },
    /// Close the channel from the remote side.
    Close { close: bool },
    Event(ServerEvent),
}

/// Plays back a fixed script of server events and records what the client
/// sends.
#[derive(Clone)]
pub struct ScriptedConnector {
    steps: Vec<ScriptStep>,
    reject: Option<String>,
    sent: Arc<Mutex<Vec<ClientEvent>>>,
    sent_signal: Arc<Notify>,
}

impl ScriptedConnector {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            reject: None,
            sent: Arc::new(Mutex::new(Vec::new())),
            sent_signal: Arc::new(Notify::new()),
        }
    }

    /// A connector whose handshake always fails.
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject: Some(message.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Parse a JSON-lines script. Blank lines and `//` comments are skipped.
    pub fn from_jsonl(script: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for (index, line) in script.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let step = serde_json::from_str(line)
                .map_err(|e| ChalkError::Protocol(format!("script line {}: {e}", index + 1)))?;
            steps.push(step);
        }
        Ok(Self::new(steps))
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Everything the client sent so far, across connections.
    pub async fn sent(&self) -> Vec<ClientEvent> {
        self.sent.lock().await.clone()
    }

    /// Wait until `count` events of `kind` have been sent.
    pub async fn wait_for_sent(&self, kind: &str, count: usize) {
        loop {
            let notified = self.sent_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let seen = self.sent.lock().await.iter().filter(|e| e.kind() == kind).count();
            if seen >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl RealtimeConnector for ScriptedConnector {
    async fn connect(&self, _credential: &Credential) -> Result<RealtimeLink> {
        if let Some(message) = &self.reject {
            return Err(ChalkError::Negotiation(message.clone()));
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let closed = CancellationToken::new();

        let sent = self.sent.clone();
        let signal = self.sent_signal.clone();
        let recorder_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = recorder_closed.cancelled() => break,
                    event = out_rx.recv() => {
                        let Some(event) = event else { break };
                        sent.lock().await.push(event);
                        signal.notify_waiters();
                    }
                }
            }
        });

        let steps = self.steps.clone();
        let sent = self.sent.clone();
        let signal = self.sent_signal.clone();
        let script_closed = closed.clone();
        tokio::spawn(async move {
            let mut awaited = 0usize;
            for step in steps {
                match step {
                    ScriptStep::Delay { delay_ms } => {
                        tokio::select! {
                            _ = script_closed.cancelled() => return,
                            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        }
                    }
                    ScriptStep::Await { event_type } => loop {
                        let notified = signal.notified();
                        tokio::pin!(notified);
                        notified.as_mut().enable();
                        let position = sent.lock().await[awaited..]
                            .iter()
                            .position(|e| e.kind() == event_type);
                        if let Some(position) = position {
                            awaited += position + 1;
                            break;
                        }
                        tokio::select! {
                            _ = script_closed.cancelled() => return,
                            _ = notified => {}
                        }
                    },
                    ScriptStep::Close { close } => {
                        if close {
                            debug!("Script closing channel");
                            script_closed.cancel();
                            return;
                        }
                    }
                    ScriptStep::Event(event) => {
                        if in_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
            script_closed.cancelled().await;
        });

        Ok(RealtimeLink {
            outgoing: out_tx,
            incoming: in_rx,
            closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::pcm_to_wav;

    #[test]
    fn test_pcm_samples_from_wav_and_raw() {
        let wav = pcm_to_wav(&[1, -2, 3], 24_000, 1, 16);
        assert_eq!(pcm_samples(&wav), vec![1, -2, 3]);

        let raw: Vec<u8> = [7i16, 8].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(pcm_samples(&raw), vec![7, 8]);
    }

    #[test]
    fn test_script_parsing() {
        let script = r#"
// greeting
{"type": "session.created", "session": {"id": "sess_1"}}
{"await": "session.update"}
{"delay_ms": 20}
{"type": "response.created", "response": {"id": "r1"}}
{"close": true}
"#;
        let connector = ScriptedConnector::from_jsonl(script).unwrap();
        let steps = connector.steps();
        assert_eq!(steps.len(), 5);
        assert!(matches!(steps[0], ScriptStep::Event(ServerEvent::SessionCreated { .. })));
        assert!(matches!(&steps[1], ScriptStep::Await { event_type } if event_type == "session.update"));
        assert!(matches!(steps[2], ScriptStep::Delay { delay_ms: 20 }));
        assert!(matches!(steps[4], ScriptStep::Close { close: true }));
    }

    #[test]
    fn test_script_parse_error_names_line() {
        let err = ScriptedConnector::from_jsonl("{\"delay_ms\": 1}\nnot json")
            .err()
            .unwrap();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[tokio::test]
    async fn test_scripted_link_replays_and_records() {
        let connector = ScriptedConnector::new(vec![
            ScriptStep::Event(ServerEvent::SessionCreated {
                session: serde_json::Value::Null,
            }),
            ScriptStep::Await {
                event_type: "response.create".into(),
            },
            ScriptStep::Close { close: true },
        ]);
        let credential = StaticCredential("k".into()).issue().await.unwrap();
        let mut link = connector.connect(&credential).await.unwrap();

        let first = link.incoming.recv().await.unwrap();
        assert_eq!(first.kind(), "session.created");

        link.outgoing.send(ClientEvent::ResponseCreate).unwrap();
        // The script closes once it sees the response.create.
        assert!(link.incoming.recv().await.is_none());
        assert!(link.closed.is_cancelled());

        connector.wait_for_sent("response.create", 1).await;
        assert_eq!(connector.sent().await, vec![ClientEvent::ResponseCreate]);
    }

    #[tokio::test]
    async fn test_rejecting_connector() {
        let connector = ScriptedConnector::rejecting("HTTP 401");
        let credential = StaticCredential("k".into()).issue().await.unwrap();
        let err = connector.connect(&credential).await.err().unwrap();
        assert!(matches!(err, ChalkError::Negotiation(_)));
    }

    #[tokio::test]
    async fn test_static_credential_rejects_empty() {
        assert!(matches!(
            StaticCredential(String::new()).issue().await,
            Err(ChalkError::Credential(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_audio_file_is_device_error() {
        let mut input = PcmFileInput::new("/nonexistent/chalk/mic.pcm");
        let err = input.start().await.err().unwrap();
        assert!(matches!(err, ChalkError::Device(_)));
    }

    #[tokio::test]
    async fn test_audio_file_is_streamed_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mic.wav");
        std::fs::write(&path, pcm_to_wav(&vec![100i16; 4_800], 24_000, 1, 16)).unwrap();

        let mut input = PcmFileInput::new(&path).with_chunk(Duration::from_millis(10));
        let mut rx = input.start().await.unwrap();
        let mut total = 0;
        while total < 4_800 {
            let chunk = rx.recv().await.unwrap();
            assert!(chunk.len() <= 240);
            total += chunk.len();
        }
        input.stop().await;
        assert_eq!(total, 4_800);
    }

    #[tokio::test]
    async fn test_credential_without_key_fails() {
        let config = RealtimeConfig {
            api_key: None,
            api_key_env: None,
            ..RealtimeConfig::default()
        };
        let issuer = HttpCredentialIssuer::from_config(&config);
        assert!(matches!(issuer.issue().await, Err(ChalkError::Credential(_))));
    }
}
