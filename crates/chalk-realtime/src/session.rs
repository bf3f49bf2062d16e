//! The tutoring session as a pure state machine.
//!
//! [`Session::handle`] consumes one [`SessionInput`] at a time and returns the
//! [`Effect`]s the runtime must perform. It never touches the network, the
//! audio output or the canvas itself, so every transition can be exercised
//! synchronously.
//!
//! Three sources feed it: local speech detection, the remote control channel
//! and local commands. A local interrupt (stop or a new typed question) opens
//! an *ignore window*: until it elapses, remote events that belong to the
//! interrupted turn are dropped. Each window carries a generation number so
//! the timer of an earlier window can never close a later one.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use chalk_canvas::tools::realtime_tools;
use chalk_canvas::{ActionKind, ActionOutcome, CursorActivity, SafeBounds, StreamingDecoder, ValidatedAction, decode_batch};
use chalk_core::config::Config;
use chalk_core::types::{Transcript, TranscriptMessage};

use crate::events::{ClientEvent, ConversationItem, ServerEvent, SessionSettings, decode_pcm16};

/// Remote error code for a cancel that arrived after the response ended.
const CANCEL_NOT_ACTIVE: &str = "response_cancel_not_active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    Listening,
    Speaking,
    Interrupting,
    Disconnected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Interrupting => "interrupting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Local UI commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    Stop,
    SendText(String),
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Command(Command),
    /// Local speech detection saw the user start talking.
    UserSpeechStarted,
    UserSpeechStopped,
    /// An event from the control channel opened as `link`.
    Remote { link: u64, event: ServerEvent },
    /// Opening `link` failed before the channel was usable.
    ConnectFailed { link: u64, error: String },
    LinkClosed { link: u64 },
    IgnoreWindowElapsed { generation: u64 },
    /// The executor finished an action requested by `Effect::Execute`.
    ActionCompleted {
        call_id: Option<String>,
        outcome: ActionOutcome,
    },
}

/// User-facing events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    PhaseChanged { phase: Phase },
    Transcript { message: TranscriptMessage },
    Error { message: String, fatal: bool },
    ActionApplied {
        kind: ActionKind,
        content: String,
        is_error: bool,
    },
}

/// Work requested from the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Acquire audio input, fetch a credential and open the channel, tagging
    /// everything it produces with `link`.
    OpenLink { link: u64 },
    CloseLink,
    Send(ClientEvent),
    MuteOutput,
    ResetOutput,
    AttachOutput,
    PlayAudio(Vec<i16>),
    Execute {
        action: ValidatedAction,
        call_id: Option<String>,
    },
    ScheduleIgnoreWindowEnd { generation: u64, after: Duration },
    SetActivity(CursorActivity),
    Notify(SessionNotice),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub instructions: Option<String>,
    pub voice: Option<String>,
    pub interrupt_grace: Duration,
    pub bounds: SafeBounds,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        let realtime = config.realtime();
        Self {
            instructions: realtime.instructions.clone(),
            voice: Some(realtime.voice.clone()),
            interrupt_grace: realtime.interrupt_grace(),
            bounds: SafeBounds::from(&config.canvas()),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    phase: Phase,
    interrupting: bool,
    ignore_until: Option<Instant>,
    generation: u64,
    link_epoch: u64,
    active_link: Option<u64>,
    decoder: StreamingDecoder,
    transcript: Transcript,
    current_response: Option<String>,
    cancelled_responses: HashSet<String>,
    awaiting_own_response: bool,
    outputs_pending: bool,
    options: SessionOptions,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            phase: Phase::Idle,
            interrupting: false,
            ignore_until: None,
            generation: 0,
            link_epoch: 0,
            active_link: None,
            decoder: StreamingDecoder::new(options.bounds),
            transcript: Transcript::new(),
            current_response: None,
            cancelled_responses: HashSet::new(),
            awaiting_own_response: false,
            outputs_pending: false,
            options,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Phase as reported to the user: `Interrupting` while an ignore window
    /// is open, the underlying phase otherwise.
    pub fn phase(&self) -> Phase {
        if self.interrupting {
            Phase::Interrupting
        } else {
            self.phase
        }
    }

    /// Phase underneath any open ignore window.
    pub fn base_phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ignoring(&self) -> bool {
        self.interrupting
    }

    pub fn ignore_until(&self) -> Option<Instant> {
        self.ignore_until
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_link(&self) -> Option<u64> {
        self.active_link
    }

    pub fn pending_calls(&self) -> usize {
        self.decoder.pending_count()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn current_response(&self) -> Option<&str> {
        self.current_response.as_deref()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Connected | Phase::Listening | Phase::Speaking)
    }

    /// Apply one input and return the effects to perform, in order.
    pub fn handle(&mut self, input: SessionInput, now: Instant) -> Vec<Effect> {
        let before = self.phase();
        let mut effects = Vec::new();

        if self.interrupting && self.ignore_until.is_some_and(|until| now >= until) {
            self.end_ignore_window(&mut effects);
        }

        match input {
            SessionInput::Command(command) => self.on_command(command, now, &mut effects),
            SessionInput::UserSpeechStarted => self.on_speech_started(&mut effects),
            SessionInput::UserSpeechStopped => self.on_speech_stopped(&mut effects),
            SessionInput::Remote { link, event } => {
                if self.active_link == Some(link) {
                    self.on_remote(event, &mut effects);
                } else {
                    trace!(link, kind = event.kind(), "Dropping event from stale link");
                }
            }
            SessionInput::ConnectFailed { link, error } => {
                if self.active_link == Some(link) {
                    warn!(link, %error, "Connect failed");
                    self.teardown(Phase::Idle, &mut effects);
                    effects.push(Effect::Notify(SessionNotice::Error {
                        message: error,
                        fatal: true,
                    }));
                }
            }
            SessionInput::LinkClosed { link } => {
                if self.active_link == Some(link) {
                    let target = if self.phase == Phase::Connecting {
                        Phase::Idle
                    } else {
                        Phase::Disconnected
                    };
                    info!(link, "Realtime channel closed by remote");
                    self.teardown(target, &mut effects);
                    effects.push(Effect::Notify(SessionNotice::Error {
                        message: "Connection to the tutor was lost".into(),
                        fatal: true,
                    }));
                }
            }
            SessionInput::IgnoreWindowElapsed { generation } => {
                if generation == self.generation && self.interrupting {
                    self.end_ignore_window(&mut effects);
                } else {
                    trace!(generation, current = self.generation, "Stale ignore-window timer");
                }
            }
            SessionInput::ActionCompleted { call_id, outcome } => {
                self.on_action_completed(call_id, outcome, &mut effects)
            }
        }

        let after = self.phase();
        if before != after {
            info!(from = %before, to = %after, "Session phase changed");
            effects.push(Effect::Notify(SessionNotice::PhaseChanged { phase: after }));
        }
        if !effects.is_empty() {
            self.updated_at = Utc::now();
        }
        effects
    }

    fn on_command(&mut self, command: Command, now: Instant, effects: &mut Vec<Effect>) {
        match command {
            Command::Connect => {
                if !matches!(self.phase, Phase::Idle | Phase::Disconnected) {
                    debug!(phase = %self.phase, "Connect ignored");
                    return;
                }
                self.link_epoch += 1;
                self.active_link = Some(self.link_epoch);
                self.phase = Phase::Connecting;
                effects.push(Effect::OpenLink {
                    link: self.link_epoch,
                });
            }
            Command::Stop => {
                if !self.is_live() {
                    debug!(phase = %self.phase, "Stop ignored");
                    return;
                }
                self.interrupt(now, effects);
            }
            Command::SendText(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                if !self.is_live() {
                    effects.push(Effect::Notify(SessionNotice::Error {
                        message: "Not connected".into(),
                        fatal: false,
                    }));
                    return;
                }
                self.interrupt(now, effects);
                effects.push(Effect::Send(ClientEvent::ItemCreate {
                    item: ConversationItem::user_text(text),
                }));
                effects.push(Effect::Send(ClientEvent::ResponseCreate));
                self.awaiting_own_response = true;
                let message = TranscriptMessage::user(text);
                if self.transcript.push(message.clone()) {
                    effects.push(Effect::Notify(SessionNotice::Transcript { message }));
                }
                effects.push(Effect::SetActivity(CursorActivity::Thinking));
            }
            Command::Disconnect => {
                if self.active_link.is_none() && matches!(self.phase, Phase::Idle | Phase::Disconnected) {
                    debug!(phase = %self.phase, "Already disconnected");
                    return;
                }
                let target = if self.phase == Phase::Idle {
                    Phase::Idle
                } else {
                    Phase::Disconnected
                };
                self.teardown(target, effects);
            }
        }
    }

    /// Silence the current turn and open a fresh ignore window.
    fn interrupt(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        effects.push(Effect::MuteOutput);
        effects.push(Effect::ResetOutput);
        effects.push(Effect::Send(ClientEvent::ResponseCancel));
        self.cancel_current_response();
        self.decoder.clear();
        self.awaiting_own_response = false;
        self.outputs_pending = false;

        self.generation += 1;
        self.interrupting = true;
        self.ignore_until = Some(now + self.options.interrupt_grace);
        self.phase = Phase::Listening;
        effects.push(Effect::ScheduleIgnoreWindowEnd {
            generation: self.generation,
            after: self.options.interrupt_grace,
        });
        effects.push(Effect::SetActivity(CursorActivity::Listening));
        debug!(generation = self.generation, "Ignore window opened");
    }

    fn end_ignore_window(&mut self, effects: &mut Vec<Effect>) {
        self.interrupting = false;
        self.ignore_until = None;
        effects.push(Effect::AttachOutput);
        debug!(generation = self.generation, "Ignore window closed");
    }

    fn cancel_current_response(&mut self) {
        if let Some(id) = self.current_response.take() {
            self.cancelled_responses.insert(id);
        }
    }

    fn is_cancelled(&self, response_id: &str) -> bool {
        !response_id.is_empty() && self.cancelled_responses.contains(response_id)
    }

    fn teardown(&mut self, target: Phase, effects: &mut Vec<Effect>) {
        effects.push(Effect::CloseLink);
        effects.push(Effect::MuteOutput);
        effects.push(Effect::ResetOutput);
        effects.push(Effect::SetActivity(CursorActivity::Idle));
        self.active_link = None;
        self.phase = target;
        self.interrupting = false;
        self.ignore_until = None;
        self.generation += 1;
        self.decoder.clear();
        self.current_response = None;
        self.cancelled_responses.clear();
        self.awaiting_own_response = false;
        self.outputs_pending = false;
    }

    fn on_speech_started(&mut self, effects: &mut Vec<Effect>) {
        if !self.is_live() {
            return;
        }
        if self.phase == Phase::Speaking || self.current_response.is_some() {
            info!(response = ?self.current_response, "User barged in");
            effects.push(Effect::MuteOutput);
            effects.push(Effect::ResetOutput);
            effects.push(Effect::AttachOutput);
            effects.push(Effect::Send(ClientEvent::ResponseCancel));
            self.cancel_current_response();
            self.decoder.clear();
            self.outputs_pending = false;
        }
        self.phase = Phase::Listening;
        effects.push(Effect::SetActivity(CursorActivity::Listening));
    }

    fn on_speech_stopped(&mut self, effects: &mut Vec<Effect>) {
        if self.phase == Phase::Listening {
            effects.push(Effect::SetActivity(CursorActivity::Thinking));
        }
    }

    /// Whether `event` gets through an open ignore window.
    fn passes_ignore_window(&self, event: &ServerEvent) -> bool {
        event.is_lifecycle()
            || matches!(
                event,
                ServerEvent::SpeechStarted { .. }
                    | ServerEvent::SpeechStopped { .. }
                    | ServerEvent::InputTranscriptCompleted { .. }
            )
            || (self.awaiting_own_response && matches!(event, ServerEvent::ResponseCreated { .. }))
    }

    fn on_remote(&mut self, event: ServerEvent, effects: &mut Vec<Effect>) {
        if self.interrupting {
            if !self.passes_ignore_window(&event) {
                trace!(kind = event.kind(), "Ignoring event inside interrupt window");
                return;
            }
            if matches!(event, ServerEvent::ResponseCreated { .. }) {
                self.end_ignore_window(effects);
            }
        }
        debug!(kind = event.kind(), "Remote event");

        match event {
            ServerEvent::SessionCreated { .. } => {
                if self.phase != Phase::Connecting {
                    return;
                }
                self.phase = Phase::Connected;
                let settings = SessionSettings::new(
                    self.options.instructions.clone(),
                    self.options.voice.clone(),
                    realtime_tools(),
                );
                effects.push(Effect::Send(ClientEvent::SessionUpdate { session: settings }));
                effects.push(Effect::AttachOutput);
                effects.push(Effect::SetActivity(CursorActivity::Listening));
            }
            ServerEvent::SessionUpdated { .. } => {}
            ServerEvent::SpeechStarted { .. } => self.on_speech_started(effects),
            ServerEvent::SpeechStopped { .. } => self.on_speech_stopped(effects),
            ServerEvent::InputTranscriptCompleted { transcript, .. } => {
                let message = TranscriptMessage::user(transcript.trim());
                if self.transcript.push(message.clone()) {
                    effects.push(Effect::Notify(SessionNotice::Transcript { message }));
                }
            }
            ServerEvent::ResponseCreated { response } => {
                // One response is active at a time, so earlier cancellations are settled.
                self.cancelled_responses.clear();
                self.current_response = Some(response.id);
                self.awaiting_own_response = false;
                self.outputs_pending = false;
                effects.push(Effect::SetActivity(CursorActivity::Thinking));
            }
            ServerEvent::AudioDelta { response_id, delta } => {
                if self.is_cancelled(&response_id) {
                    return;
                }
                let samples = match decode_pcm16(&delta) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!(error = %e, "Undecodable audio delta");
                        return;
                    }
                };
                if self.current_response.is_none() && !response_id.is_empty() {
                    self.current_response = Some(response_id);
                }
                if self.phase != Phase::Speaking {
                    self.phase = Phase::Speaking;
                    effects.push(Effect::SetActivity(CursorActivity::Speaking));
                }
                effects.push(Effect::PlayAudio(samples));
            }
            ServerEvent::AudioTranscriptDone {
                response_id,
                transcript: text,
            }
            | ServerEvent::TextDone { response_id, text } => {
                if self.is_cancelled(&response_id) {
                    return;
                }
                let decoded = decode_batch(&text, self.decoder.bounds());
                let message = TranscriptMessage::assistant(decoded.text);
                if self.transcript.push(message.clone()) {
                    effects.push(Effect::Notify(SessionNotice::Transcript { message }));
                }
                for action in decoded.actions {
                    effects.push(Effect::Execute {
                        action,
                        call_id: None,
                    });
                }
            }
            ServerEvent::FunctionCallArgumentsDelta {
                response_id,
                call_id,
                delta,
            } => {
                if !self.is_cancelled(&response_id) {
                    self.decoder.push_fragment(&call_id, &delta);
                }
            }
            ServerEvent::FunctionCallArgumentsDone {
                response_id,
                call_id,
                name,
                arguments,
            } => {
                if self.is_cancelled(&response_id) {
                    return;
                }
                match self.decoder.finish(&call_id, &name, &arguments) {
                    Some(action) => effects.push(Effect::Execute {
                        action,
                        call_id: Some(call_id),
                    }),
                    None => {
                        let output = serde_json::json!({
                            "error": format!("'{name}' could not be decoded; check the tool name and arguments")
                        })
                        .to_string();
                        effects.push(Effect::Send(ClientEvent::ItemCreate {
                            item: ConversationItem::FunctionCallOutput { call_id, output },
                        }));
                        self.outputs_pending = true;
                    }
                }
            }
            ServerEvent::ResponseDone { response } => {
                let cancelled = self.cancelled_responses.remove(&response.id);
                if self.current_response.as_deref() == Some(response.id.as_str()) {
                    self.current_response = None;
                }
                if cancelled {
                    return;
                }
                if matches!(self.phase, Phase::Speaking | Phase::Connected) {
                    self.phase = Phase::Listening;
                }
                effects.push(Effect::SetActivity(CursorActivity::Listening));
                if self.outputs_pending {
                    self.outputs_pending = false;
                    self.awaiting_own_response = true;
                    effects.push(Effect::Send(ClientEvent::ResponseCreate));
                }
            }
            ServerEvent::OutputAudioStarted { .. } | ServerEvent::OutputAudioStopped { .. } => {}
            ServerEvent::Error { error } => {
                if error.code.as_deref() == Some(CANCEL_NOT_ACTIVE) {
                    debug!(message = %error.message, "Cancel arrived after response ended");
                    return;
                }
                warn!(code = ?error.code, message = %error.message, "Remote error");
                effects.push(Effect::Notify(SessionNotice::Error {
                    message: error.message,
                    fatal: false,
                }));
            }
            ServerEvent::Unknown => {}
        }
    }

    fn on_action_completed(&mut self, call_id: Option<String>, outcome: ActionOutcome, effects: &mut Vec<Effect>) {
        effects.push(Effect::Notify(SessionNotice::ActionApplied {
            kind: outcome.kind,
            content: outcome.content.clone(),
            is_error: outcome.is_error,
        }));
        if self.active_link.is_none() {
            return;
        }
        if let Some(call_id) = call_id {
            effects.push(Effect::Send(ClientEvent::ItemCreate {
                item: ConversationItem::FunctionCallOutput {
                    call_id,
                    output: outcome.content,
                },
            }));
            self.outputs_pending = true;
        }
        if let Some(image) = outcome.image {
            effects.push(Effect::Send(ClientEvent::ItemCreate {
                item: ConversationItem::user_image(image.data_url()),
            }));
        }
    }
}
