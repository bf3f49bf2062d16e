//! Async driver for [`Session`].
//!
//! A single task owns the session, the canvas executor and the output sink.
//! Link readers, the microphone pump and ignore-window timers run as separate
//! tasks and only ever send messages into that task's inbox.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use chalk_canvas::{CanvasExecutor, CanvasSurface};
use chalk_core::config::VadConfig;
use chalk_core::error::{ChalkError, Result};

use crate::events::{ClientEvent, SAMPLE_RATE};
use crate::session::{Command, Effect, Phase, Session, SessionInput, SessionNotice};
use crate::sink::OutputSink;
use crate::transport::{AudioInput, CredentialIssuer, RealtimeConnector, RealtimeLink};
use crate::vad::{SpeechActivity, VoiceActivityDetector};

enum RuntimeMessage {
    Input(SessionInput),
    Connect(oneshot::Sender<Result<()>>),
}

/// Everything the runtime needs besides the session itself.
pub struct RuntimeDeps<S, O> {
    pub executor: CanvasExecutor<S>,
    pub sink: O,
    pub audio: Box<dyn AudioInput>,
    pub credentials: Arc<dyn CredentialIssuer>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub vad: VadConfig,
}

/// What is left once the runtime has stopped.
pub struct RuntimeParts<S, O> {
    pub session: Session,
    pub executor: CanvasExecutor<S>,
    pub sink: O,
}

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<RuntimeMessage>,
}

fn runtime_stopped() -> ChalkError {
    ChalkError::Transport("session runtime has stopped".into())
}

impl SessionHandle {
    /// Resolves once the remote side has confirmed the session, or with the
    /// error that ended the attempt.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(RuntimeMessage::Connect(tx))
            .map_err(|_| runtime_stopped())?;
        rx.await.map_err(|_| runtime_stopped())?
    }

    pub fn stop(&self) -> Result<()> {
        self.command(Command::Stop)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.command(Command::SendText(text.into()))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Report speech detected outside the runtime's own microphone pump.
    pub fn user_speech_started(&self) -> Result<()> {
        self.input(SessionInput::UserSpeechStarted)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.input(SessionInput::Command(command))
    }

    fn input(&self, input: SessionInput) -> Result<()> {
        self.inbox
            .send(RuntimeMessage::Input(input))
            .map_err(|_| runtime_stopped())
    }
}

/// A spawned session runtime.
pub struct RunningSession<S, O> {
    pub handle: SessionHandle,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
    cancel: CancellationToken,
    task: JoinHandle<RuntimeParts<S, O>>,
}

impl<S, O> RunningSession<S, O> {
    /// Disconnect, stop the runtime and hand back its state.
    pub async fn shutdown(self) -> Result<RuntimeParts<S, O>> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| ChalkError::Other(anyhow::anyhow!("session runtime panicked: {e}")))
    }
}

struct ActiveLink {
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    closed: CancellationToken,
    tasks: CancellationToken,
}

struct Runtime<S, O> {
    session: Session,
    executor: CanvasExecutor<S>,
    sink: O,
    audio: Box<dyn AudioInput>,
    credentials: Arc<dyn CredentialIssuer>,
    connector: Arc<dyn RealtimeConnector>,
    vad: VadConfig,
    link: Option<ActiveLink>,
    inbox: mpsc::UnboundedSender<RuntimeMessage>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
    cancel: CancellationToken,
}

/// Start the runtime task for `session`.
pub fn spawn<S, O>(session: Session, deps: RuntimeDeps<S, O>) -> RunningSession<S, O>
where
    S: CanvasSurface + 'static,
    O: OutputSink + 'static,
{
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let runtime = Runtime {
        session,
        executor: deps.executor,
        sink: deps.sink,
        audio: deps.audio,
        credentials: deps.credentials,
        connector: deps.connector,
        vad: deps.vad,
        link: None,
        inbox: inbox_tx.clone(),
        notices: notice_tx,
        waiters: Vec::new(),
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(async move {
        info!(session_id = runtime.session.id(), "Session runtime started");
        let parts = runtime.run(inbox_rx).await;
        info!(session_id = parts.session.id(), "Session runtime ended");
        parts
    });

    RunningSession {
        handle: SessionHandle { inbox: inbox_tx },
        notices: notice_rx,
        cancel,
        task,
    }
}

impl<S, O> Runtime<S, O>
where
    S: CanvasSurface,
    O: OutputSink,
{
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<RuntimeMessage>) -> RuntimeParts<S, O> {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbox.recv() => {
                    let Some(message) = message else { break };
                    match message {
                        RuntimeMessage::Input(input) => self.dispatch(input).await,
                        RuntimeMessage::Connect(waiter) => {
                            self.waiters.push(waiter);
                            self.dispatch(SessionInput::Command(Command::Connect)).await;
                        }
                    }
                }
            }
        }

        self.dispatch(SessionInput::Command(Command::Disconnect)).await;
        self.close_link().await;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(runtime_stopped()));
        }

        RuntimeParts {
            session: self.session,
            executor: self.executor,
            sink: self.sink,
        }
    }

    /// Feed one input and everything it causes through the session.
    async fn dispatch(&mut self, input: SessionInput) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            let effects = self.session.handle(input, Instant::now());
            for effect in effects {
                self.apply(effect, &mut queue).await;
            }
        }
        self.resolve_waiters();
    }

    async fn apply(&mut self, effect: Effect, queue: &mut VecDeque<SessionInput>) {
        match effect {
            Effect::OpenLink { link } => {
                if let Err(e) = self.open_link(link).await {
                    warn!(link, error = %e, "Could not open realtime link");
                    queue.push_back(SessionInput::ConnectFailed {
                        link,
                        error: e.to_string(),
                    });
                    self.fail_waiters(e);
                }
            }
            Effect::CloseLink => self.close_link().await,
            Effect::Send(event) => match &self.link {
                Some(link) => {
                    trace!(kind = event.kind(), "Queueing client event");
                    if link.outgoing.send(event).is_err() {
                        debug!("Link writer is gone");
                    }
                }
                None => debug!(kind = event.kind(), "No link, dropping client event"),
            },
            Effect::MuteOutput => self.sink.mute(),
            Effect::ResetOutput => self.sink.reset(),
            Effect::AttachOutput => self.sink.attach(),
            Effect::PlayAudio(samples) => self.sink.play(&samples),
            Effect::Execute { action, call_id } => {
                let outcome = self.executor.apply(action);
                queue.push_back(SessionInput::ActionCompleted { call_id, outcome });
            }
            Effect::ScheduleIgnoreWindowEnd { generation, after } => {
                let inbox = self.inbox.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(after) => {
                            let _ = inbox.send(RuntimeMessage::Input(SessionInput::IgnoreWindowElapsed { generation }));
                        }
                    }
                });
            }
            Effect::SetActivity(activity) => self.executor.set_activity(activity),
            Effect::Notify(notice) => {
                let _ = self.notices.send(notice);
            }
        }
    }

    /// Acquire the microphone, a credential and the channel, in that order.
    async fn open_link(&mut self, link: u64) -> Result<()> {
        let mut audio_rx = self.audio.start().await?;

        let opened = async {
            let credential = self.credentials.issue().await?;
            self.connector.connect(&credential).await
        }
        .await;
        let RealtimeLink {
            outgoing,
            mut incoming,
            closed,
        } = match opened {
            Ok(link) => link,
            Err(e) => {
                self.audio.stop().await;
                return Err(e);
            }
        };
        info!(link, "Realtime link established");

        let tasks = self.cancel.child_token();

        let inbox = self.inbox.clone();
        let forwarder_cancel = tasks.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forwarder_cancel.cancelled() => return,
                    event = incoming.recv() => match event {
                        Some(event) => {
                            if inbox.send(RuntimeMessage::Input(SessionInput::Remote { link, event })).is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
            }
            let _ = inbox.send(RuntimeMessage::Input(SessionInput::LinkClosed { link }));
        });

        let inbox = self.inbox.clone();
        let pump_cancel = tasks.clone();
        let pump_out = outgoing.clone();
        let mut vad = VoiceActivityDetector::from_config(&self.vad, SAMPLE_RATE);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => break,
                    chunk = audio_rx.recv() => {
                        let Some(chunk) = chunk else { break };
                        for change in vad.process(&chunk) {
                            let input = match change {
                                SpeechActivity::Started => SessionInput::UserSpeechStarted,
                                SpeechActivity::Ended => SessionInput::UserSpeechStopped,
                            };
                            let _ = inbox.send(RuntimeMessage::Input(input));
                        }
                        if pump_out.send(ClientEvent::audio_append(&chunk)).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(link, "Microphone pump stopped");
        });

        self.link = Some(ActiveLink {
            outgoing,
            closed,
            tasks,
        });
        Ok(())
    }

    async fn close_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.tasks.cancel();
            link.closed.cancel();
            info!("Realtime link closed");
        }
        self.audio.stop().await;
    }

    fn fail_waiters(&mut self, error: ChalkError) {
        let mut error = Some(error);
        for waiter in self.waiters.drain(..) {
            let result = match error.take() {
                Some(e) => Err(e),
                None => Err(ChalkError::Transport("connect failed".into())),
            };
            let _ = waiter.send(result);
        }
    }

    fn resolve_waiters(&mut self) {
        if self.waiters.is_empty() {
            return;
        }
        match self.session.phase() {
            Phase::Connecting => {}
            Phase::Idle | Phase::Disconnected => {
                let phase = self.session.phase();
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Err(ChalkError::Transport(format!("session is {phase}"))));
                }
            }
            _ => {
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
        }
    }
}
