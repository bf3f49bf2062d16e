//! Realtime control-channel events.
//!
//! Only the event kinds the session engine reacts to are modelled; anything
//! else deserializes to [`ServerEvent::Unknown`].

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sample rate of PCM16 audio exchanged with the remote service.
pub const SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Events received from the remote speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: Value,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: Value,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptCompleted {
        transcript: String,
        #[serde(default)]
        item_id: Option<String>,
    },
    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseRef },
    #[serde(rename = "response.audio.delta", alias = "response.output_audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: String,
        delta: String,
    },
    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    AudioTranscriptDone {
        #[serde(default)]
        response_id: String,
        transcript: String,
    },
    #[serde(rename = "response.text.done", alias = "response.output_text.done")]
    TextDone {
        #[serde(default)]
        response_id: String,
        text: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        response_id: String,
        call_id: String,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        response_id: String,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseRef },
    #[serde(rename = "output_audio_buffer.started")]
    OutputAudioStarted {
        #[serde(default)]
        response_id: Option<String>,
    },
    #[serde(rename = "output_audio_buffer.stopped")]
    OutputAudioStopped {
        #[serde(default)]
        response_id: Option<String>,
    },
    #[serde(rename = "error")]
    Error { error: RemoteError },
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Wire name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::SpeechStarted { .. } => "input_audio_buffer.speech_started",
            Self::SpeechStopped { .. } => "input_audio_buffer.speech_stopped",
            Self::InputTranscriptCompleted { .. } => "conversation.item.input_audio_transcription.completed",
            Self::ResponseCreated { .. } => "response.created",
            Self::AudioDelta { .. } => "response.audio.delta",
            Self::AudioTranscriptDone { .. } => "response.audio_transcript.done",
            Self::TextDone { .. } => "response.text.done",
            Self::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta",
            Self::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done",
            Self::ResponseDone { .. } => "response.done",
            Self::OutputAudioStarted { .. } => "output_audio_buffer.started",
            Self::OutputAudioStopped { .. } => "output_audio_buffer.stopped",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Events that describe the session itself rather than a response turn.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::SessionCreated { .. } | Self::SessionUpdated { .. } | Self::Error { .. }
        )
    }
}

/// `session.update` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub modalities: Vec<String>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<Value>,
    #[serde(default)]
    pub tools: Vec<Value>,
    pub tool_choice: String,
}

impl SessionSettings {
    pub fn new(instructions: Option<String>, voice: Option<String>, tools: Vec<Value>) -> Self {
        Self {
            instructions,
            voice,
            modalities: vec!["audio".into(), "text".into()],
            input_audio_format: "pcm16".into(),
            output_audio_format: "pcm16".into(),
            input_audio_transcription: Some(serde_json::json!({"model": "whisper-1"})),
            turn_detection: Some(serde_json::json!({"type": "server_vad"})),
            tools,
            tool_choice: "auto".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    InputImage { image_url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message { role: String, content: Vec<ContentPart> },
    FunctionCallOutput { call_id: String, output: String },
}

impl ConversationItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::Message {
            role: "user".into(),
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }

    pub fn user_image(image_url: impl Into<String>) -> Self {
        Self::Message {
            role: "user".into(),
            content: vec![ContentPart::InputImage {
                image_url: image_url.into(),
            }],
        }
    }
}

/// Events sent to the remote speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioAppend { .. } => "input_audio_buffer.append",
            Self::ItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate => "response.create",
            Self::ResponseCancel => "response.cancel",
        }
    }

    /// Wrap PCM16 samples as an `input_audio_buffer.append`.
    pub fn audio_append(samples: &[i16]) -> Self {
        Self::InputAudioAppend {
            audio: encode_pcm16(samples),
        }
    }
}

/// Base64 little-endian PCM16.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_pcm16(data: &str) -> Result<Vec<i16>, base64::DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_function_call_events() {
        let delta: ServerEvent = serde_json::from_value(json!({
            "type": "response.function_call_arguments.delta",
            "event_id": "ev_1",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "call_id": "c1",
            "delta": "{\"la"
        }))
        .unwrap();
        assert_eq!(
            delta,
            ServerEvent::FunctionCallArgumentsDelta {
                response_id: "resp_1".into(),
                call_id: "c1".into(),
                delta: "{\"la".into(),
            }
        );

        let done: ServerEvent = serde_json::from_value(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "c1",
            "name": "draw_equation",
            "arguments": "{\"latex\":\"x^2\"}"
        }))
        .unwrap();
        assert_eq!(done.kind(), "response.function_call_arguments.done");
    }

    #[test]
    fn test_audio_delta_aliases() {
        for kind in ["response.audio.delta", "response.output_audio.delta"] {
            let event: ServerEvent =
                serde_json::from_value(json!({"type": kind, "response_id": "r", "delta": "AAA="})).unwrap();
            assert!(matches!(event, ServerEvent::AudioDelta { .. }));
        }
    }

    #[test]
    fn test_unknown_events_tolerated() {
        let event: ServerEvent =
            serde_json::from_value(json!({"type": "rate_limits.updated", "rate_limits": []})).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_error_event() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "code": "response_cancel_not_active", "message": "nothing to cancel"}
        }))
        .unwrap();
        let ServerEvent::Error { error } = event else {
            panic!("wrong variant");
        };
        assert_eq!(error.code.as_deref(), Some("response_cancel_not_active"));
        assert_eq!(error.kind.as_deref(), Some("invalid_request_error"));
    }

    #[test]
    fn test_client_event_wire_shape() {
        assert_eq!(
            serde_json::to_value(ClientEvent::ResponseCancel).unwrap(),
            json!({"type": "response.cancel"})
        );
        let output = ClientEvent::ItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: "c1".into(),
                output: "ok".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"type": "conversation.item.create", "item": {"type": "function_call_output", "call_id": "c1", "output": "ok"}})
        );
        let text = serde_json::to_value(ClientEvent::ItemCreate {
            item: ConversationItem::user_text("hi"),
        })
        .unwrap();
        assert_eq!(text["item"]["content"][0], json!({"type": "input_text", "text": "hi"}));
    }

    #[test]
    fn test_session_update_carries_tools() {
        let settings = SessionSettings::new(Some("Be kind".into()), Some("alloy".into()), vec![json!({"name": "t"})]);
        let value = serde_json::to_value(ClientEvent::SessionUpdate { session: settings }).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["tools"][0]["name"], "t");
        assert_eq!(value["session"]["voice"], "alloy");
        assert_eq!(value["session"]["tool_choice"], "auto");
    }

    #[test]
    fn test_pcm16_codec() {
        let samples = [0i16, 1, -1, i16::MAX, i16::MIN];
        let encoded = encode_pcm16(&samples);
        assert_eq!(decode_pcm16(&encoded).unwrap(), samples);
        assert!(decode_pcm16("not base64!").is_err());
    }
}
