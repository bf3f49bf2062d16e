//! Realtime tutoring session: wire events, local speech detection, audio
//! output, transports and the session state machine with its async runtime.

pub mod events;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod transport;
pub mod vad;

pub use events::{ClientEvent, ServerEvent};
pub use runtime::{RunningSession, RuntimeDeps, RuntimeParts, SessionHandle, spawn};
pub use session::{Command, Effect, Phase, Session, SessionInput, SessionNotice, SessionOptions};
pub use sink::{OutputSink, PlaybackBuffer};
pub use transport::{
    AudioInput, ChannelAudioInput, Credential, CredentialIssuer, HttpCredentialIssuer, NoAudioInput, PcmFileInput,
    RealtimeConnector, RealtimeLink, ScriptStep, ScriptedConnector, StaticCredential, WebSocketConnector,
};
