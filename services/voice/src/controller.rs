//! The session controller: the single owner of the active voice session.
//!
//! It starts the transport, decodes every inbound frame, appends transcripts
//! and hands tool invocations to the dispatcher, whose results travel back
//! over the same transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geovoice_core::transcript::{Role, Transcript, TranscriptEntry};
use geovoice_core::{Dispatcher, ResultSink, ToolExecutor};
use openai_realtime::{ConnectionStatus, TransportError, TransportSession};
use openai_realtime_types::client::ClientEvent;
use openai_realtime_types::{Inbound, ProtocolEvent, ToolResult, decode, reply_sequence};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already {0}")]
    AlreadyActive(ConnectionStatus),
    #[error("the connection attempt was cancelled")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A snapshot of the current session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Where outbound events leave the process.
#[async_trait]
pub trait EventSender: Send + Sync {
    /// Returns whether the event was handed to an open channel.
    async fn send(&self, event: &ClientEvent) -> bool;
}

#[async_trait]
impl EventSender for TransportSession {
    async fn send(&self, event: &ClientEvent) -> bool {
        TransportSession::send(self, event).await
    }
}

/// Sends tool results as function output plus turn trigger.
pub struct TransportReplies(Arc<dyn EventSender>);

impl TransportReplies {
    pub fn new(sender: Arc<dyn EventSender>) -> Self {
        Self(sender)
    }
}

#[async_trait]
impl ResultSink for TransportReplies {
    async fn deliver(&self, result: ToolResult) {
        let [output, trigger] = reply_sequence(&result);
        if !self.0.send(&output).await {
            warn!(call_id = %result.invocation_id, "Session closed, tool result dropped");
            return;
        }
        if !self.0.send(&trigger).await {
            // The agent now holds a result it was never asked to answer.
            warn!(call_id = %result.invocation_id, "Session closed between tool result and turn trigger");
        }
    }
}

/// Turns inbound frames into transcript entries and dispatched tool calls.
pub struct EventLoop {
    dispatcher: Dispatcher,
    replies: Arc<dyn ResultSink>,
    transcript: Arc<RwLock<Transcript>>,
}

impl EventLoop {
    pub fn new(
        tools: Arc<dyn ToolExecutor>,
        replies: Arc<dyn ResultSink>,
        transcript: Arc<RwLock<Transcript>>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(tools),
            replies,
            transcript,
        }
    }

    /// Runs until the transport closes the frame stream.
    pub async fn run(mut self, mut frames: mpsc::Receiver<String>) {
        while let Some(frame) = frames.recv().await {
            self.handle_frame(&frame).await;
        }
        info!("Event stream closed");
    }

    pub async fn handle_frame(&mut self, frame: &str) {
        let event = match decode(frame) {
            Ok(Inbound::Event(event)) => event,
            Ok(Inbound::Audio(_)) | Ok(Inbound::Ignored) => return,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };
        match event {
            ProtocolEvent::InputTranscribed { text } => self.append(Role::User, text),
            ProtocolEvent::OutputTranscribed { text } => self.append(Role::Assistant, text),
            ProtocolEvent::ResponseCompleted { invocations } => {
                if !invocations.is_empty() {
                    debug!(count = invocations.len(), "Dispatching tool invocations");
                    self.dispatcher.dispatch(invocations, self.replies.as_ref()).await;
                }
            }
            ProtocolEvent::TranscriptionFailed { message } => {
                warn!(%message, "Input transcription failed");
            }
            ProtocolEvent::GenericError { message } => {
                error!(%message, "Agent reported an error");
            }
        }
    }

    fn append(&self, role: Role, text: String) {
        if text.trim().is_empty() {
            return;
        }
        info!(%role, %text, "Transcript");
        self.transcript
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(role, text);
    }
}

#[derive(Default)]
struct ControllerState {
    session: Option<(Uuid, DateTime<Utc>)>,
    /// The negotiating attempt, tagged with the session it belongs to.
    connecting: Option<(Uuid, AbortHandle)>,
}

/// Owns at most one session at a time.
pub struct SessionController {
    transport: Arc<TransportSession>,
    tools: Arc<dyn ToolExecutor>,
    transcript: Arc<RwLock<Transcript>>,
    state: Mutex<ControllerState>,
}

impl SessionController {
    pub fn new(transport: Arc<TransportSession>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            transport,
            tools,
            transcript: Arc::new(RwLock::new(Transcript::new())),
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Starts a new session.
    ///
    /// Rejected while another session is connecting or connected. The
    /// negotiation runs on its own task so [`disconnect`](Self::disconnect)
    /// can abort it; aborting releases everything acquired so far.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (session_id, task) = {
            let mut state = self.lock_state();
            if state.connecting.is_some() {
                return Err(SessionError::AlreadyActive(ConnectionStatus::Connecting));
            }
            let status = self.transport.status();
            if matches!(status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
                return Err(SessionError::AlreadyActive(status));
            }

            let session_id = Uuid::new_v4();
            self.transcript
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .clear();
            let transport = self.transport.clone();
            let task = tokio::spawn(async move { transport.connect().await });
            state.session = Some((session_id, Utc::now()));
            state.connecting = Some((session_id, task.abort_handle()));
            (session_id, task)
        };
        info!(%session_id, "Connecting voice session");

        let outcome = task.await;
        let still_current = {
            let mut state = self.lock_state();
            if state.connecting.as_ref().is_some_and(|(id, _)| *id == session_id) {
                state.connecting = None;
            }
            state.session.map(|(id, _)| id) == Some(session_id)
        };

        // A session that is no longer current was retired by `disconnect`,
        // which already released the transport.
        let frames = match outcome {
            Ok(Ok(frames)) if still_current => frames,
            Ok(Ok(_)) | Ok(Err(TransportError::Superseded)) => return Err(SessionError::Cancelled),
            Ok(Err(e)) => return Err(e.into()),
            Err(e) if e.is_cancelled() => return Err(SessionError::Cancelled),
            Err(e) => {
                error!(error = %e, "Connection task failed");
                if still_current {
                    self.transport.disconnect();
                }
                return Err(SessionError::Cancelled);
            }
        };

        let replies: Arc<dyn ResultSink> = Arc::new(TransportReplies::new(self.transport.clone()));
        let event_loop = EventLoop::new(self.tools.clone(), replies, self.transcript.clone());
        tokio::spawn(
            event_loop
                .run(frames)
                .instrument(info_span!("voice_session", %session_id)),
        );
        info!(%session_id, "Voice session connected");
        Ok(())
    }

    /// Ends the current session, or aborts one that is still negotiating.
    ///
    /// In-flight tool handlers are left to finish; their replies are dropped.
    #[instrument(skip(self))]
    pub fn disconnect(&self) {
        let connecting = {
            let mut state = self.lock_state();
            state.session = None;
            state.connecting.take().map(|(_, task)| task)
        };
        if let Some(task) = connecting {
            info!("Aborting connection attempt");
            task.abort();
        }
        self.transport.disconnect();
    }

    /// Connects when idle, disconnects otherwise. Returns whether a session is now up.
    pub async fn toggle(&self) -> Result<bool, SessionError> {
        let busy = self.lock_state().connecting.is_some()
            || matches!(
                self.transport.status(),
                ConnectionStatus::Connecting | ConnectionStatus::Connected
            );
        if busy {
            self.disconnect();
            Ok(false)
        } else {
            self.connect().await.map(|_| true)
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    pub fn session(&self) -> Option<SessionInfo> {
        let (id, created_at) = self.lock_state().session?;
        Some(SessionInfo {
            id,
            status: self.transport.status(),
            last_error: self.transport.last_error(),
            created_at,
        })
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .entries()
            .to_vec()
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
